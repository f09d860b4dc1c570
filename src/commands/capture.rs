use crate::config::ProfilerConfig;
use crate::cpu::{PollStats, SamplingSession};
use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::signal::CancelFlag;
use crate::storage::ProfileWriter;
use crate::symbols::Symbolizer;
use std::time::Instant;

/// Totals for one capture window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSummary {
    pub samples: usize,
    pub skipped: usize,
}

impl WindowSummary {
    fn add(&mut self, stats: PollStats) {
        self.samples += stats.samples;
        self.skipped += stats.skipped;
    }
}

/// Sample `config.session.cpu` for one window and append the resolved
/// samples to `writer`.
///
/// Cancellation ends the window early; whatever is already in the ring is
/// still drained and written.
pub fn capture_window(
    config: &ProfilerConfig,
    symbolizer: &Symbolizer,
    writer: &mut ProfileWriter,
    cancel: &CancelFlag,
) -> Result<WindowSummary> {
    writer.message(format_args!(
        "starting profile on CPU {} for {}",
        config.session.cpu,
        humantime::format_duration(config.window)
    ))?;
    writer.begin_window()?;

    let mut session = SamplingSession::open(&config.session)?;
    let event_loop = EventLoop::new(cancel.clone())?;
    event_loop.add(&session.fd())?;

    let mut summary = WindowSummary::default();
    let start = Instant::now();

    event_loop.run_for(
        config.window,
        |_| {
            summary.add(drain(&mut session, symbolizer, writer)?);
            Ok(())
        },
        || {},
    )?;

    // Records published after the last wakeup, below the watermark
    summary.add(drain(&mut session, symbolizer, writer)?);
    drop(session);

    writer.flush()?;
    writer.message(format_args!(
        "captured {} samples ({} skipped records) in {:.2?}",
        summary.samples,
        summary.skipped,
        start.elapsed()
    ))?;

    if cancel.is_cancelled() {
        log::info!("capture window cut short by termination request");
    }

    Ok(summary)
}

/// Write every pending sample; the first write error aborts the window
fn drain(
    session: &mut SamplingSession,
    symbolizer: &Symbolizer,
    writer: &mut ProfileWriter,
) -> Result<PollStats> {
    let mut failed: Option<Error> = None;

    let stats = session.poll(|sample| {
        if failed.is_some() {
            return;
        }
        let info = symbolizer.resolve(sample.pid, sample.ip);
        if let Err(e) = writer.record_sample(sample, &info) {
            failed = Some(e);
        }
    })?;

    match failed {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}
