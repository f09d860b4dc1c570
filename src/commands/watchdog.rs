use super::{capture_window, load_symbolizer};
use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::process::ProcFs;
use crate::sched::{self, ThreadPriority};
use crate::signal::CancelFlag;
use crate::storage::ProfileWriter;
use crate::trigger::{ControlFifo, TriggerOutcome, wait_for_trigger};
use crate::watchdog::Watchdog;

/// Wait for triggers and capture one window per trigger until cancelled
pub fn run(config: &ProfilerConfig, cancel: &CancelFlag) -> Result<()> {
    let symbolizer = load_symbolizer(&ProcFs::default())?;
    let mut writer = ProfileWriter::open(&config.output)?;
    let fifo = ControlFifo::create(&config.fifo)?;

    // Started while this thread still runs SCHED_OTHER
    let watchdog = Watchdog::start(config.watchdog.clone())?;

    if let ThreadPriority::RealTime(prio) = config.priority {
        sched::set_current_thread_priority(config.priority)?;
        log::info!("profiling thread running SCHED_FIFO at priority {}", prio);
    }

    writer.message(format_args!(
        "waiting for triggers on {} (watchdog every {})",
        fifo.path().display(),
        humantime::format_duration(watchdog.interval())
    ))?;

    let mut windows = 0u64;
    loop {
        let outcome = wait_for_trigger(&fifo, &watchdog, config.check_interval, cancel)?;
        match outcome {
            TriggerOutcome::None => break,
            TriggerOutcome::External => {
                writer.message(format_args!("capture requested through {}", fifo.path().display()))?;
            }
            TriggerOutcome::Starvation => {
                writer.message(format_args!(
                    "watchdog starved on CPU {}, capturing",
                    config.session.cpu
                ))?;
            }
        }

        capture_window(config, &symbolizer, &mut writer, cancel)?;
        windows += 1;

        // Next check starts from a cleared flag
        watchdog.ping();

        if cancel.is_cancelled() {
            break;
        }
    }

    log::info!(
        "shutting down after {} capture windows, {} samples written",
        windows,
        writer.total_samples()
    );
    Ok(())
}
