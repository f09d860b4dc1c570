use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide cancellation request.
///
/// Set from the termination handler, polled by the event loops at each
/// iteration. Nothing else is done in signal context.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Route SIGINT and SIGTERM to `flag`.
///
/// SIGHUP is routed there too, so losing the controlling terminal stops the
/// daemon at its next check instead of killing it mid-window.
pub fn install_handler(flag: &CancelFlag) -> Result<()> {
    let flag = flag.clone();
    ctrlc::set_handler(move || flag.cancel())
        .map_err(|e| Error::Scheduling(format!("Failed to set termination handler: {}", e)))
}
