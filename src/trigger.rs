//! Deciding when to start a capture window.

use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::signal::CancelFlag;
use crate::watchdog::Liveness;
use nix::sys::stat::Mode;
use std::cell::Cell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the control FIFO
pub const DEFAULT_FIFO_PATH: &str = "/run/poor-profiler";

/// Result of one arbitration round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Cancelled before anything fired
    None,
    /// A byte arrived on the control FIFO
    External,
    /// The watchdog missed its interval
    Starvation,
}

/// Named pipe external tools write to in order to request a capture.
///
/// Content is ignored, only the arrival of data matters. A write end is
/// kept open internally so the read end never reports hang-up between
/// writers.
pub struct ControlFifo {
    path: PathBuf,
    reader: File,
    _keepalive: File,
    /// Set when this process made the FIFO, which is then unlinked on drop
    _created: Option<CreatedPath>,
}

/// Unlinks a path this process created once dropped
struct CreatedPath(PathBuf);

impl Drop for CreatedPath {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            log::warn!("could not remove {}: {}", self.0.display(), e);
        }
    }
}

impl ControlFifo {
    /// Create (or reuse) the FIFO at `path` and open it for reading
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let created = match fs::metadata(&path) {
            Ok(meta) if meta.file_type().is_fifo() => None,
            Ok(_) => {
                return Err(Error::ControlChannel(format!(
                    "{} exists and is not a FIFO",
                    path.display()
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o666)).map_err(|e| {
                    Error::ControlChannel(format!(
                        "could not create control fifo {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                // From here on, failing to open the FIFO also removes it
                Some(CreatedPath(path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let open = |write: bool| {
            OpenOptions::new()
                .read(!write)
                .write(write)
                .custom_flags(libc::O_NONBLOCK)
                .open(&path)
                .map_err(|e| {
                    Error::ControlChannel(format!(
                        "could not open control fifo {}: {}",
                        path.display(),
                        e
                    ))
                })
        };

        // The write end can only be opened once a reader exists
        let reader = open(false)?;
        let keepalive = open(true)?;

        let fifo = ControlFifo {
            path,
            reader,
            _keepalive: keepalive,
            _created: created,
        };

        log::info!("control fifo ready at {}", fifo.path.display());
        Ok(fifo)
    }

    /// Discard everything written so far; returns the number of bytes
    pub fn drain(&self) -> Result<usize> {
        let mut buf = [0u8; 256];
        let mut total = 0;

        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for ControlFifo {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

/// Block until the FIFO is written to, `liveness` fails a ping, or `cancel`
/// is set.
///
/// `liveness` is pinged every `check_interval`, which must be longer than
/// the watchdog's own interval.
pub fn wait_for_trigger<L: Liveness + ?Sized>(
    fifo: &ControlFifo,
    liveness: &L,
    check_interval: Duration,
    cancel: &CancelFlag,
) -> Result<TriggerOutcome> {
    // Requests that arrived while capturing are folded into the last window
    let stale = fifo.drain()?;
    if stale > 0 {
        log::debug!("discarded {} stale trigger bytes", stale);
    }

    let event_loop = EventLoop::new(cancel.clone())?;
    event_loop.add(fifo)?;

    let outcome = Cell::new(TriggerOutcome::None);

    loop {
        event_loop.run_for(
            check_interval,
            |_| {
                fifo.drain()?;
                outcome.set(TriggerOutcome::External);
                event_loop.stop();
                Ok(())
            },
            || {
                if !liveness.ping() {
                    outcome.set(TriggerOutcome::Starvation);
                }
            },
        )?;

        match outcome.get() {
            TriggerOutcome::None if !event_loop.is_cancelled() => continue,
            other => return Ok(other),
        }
    }
}
