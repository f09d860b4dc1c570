//! Run modes built on top of the capture pipeline.

pub mod capture;
pub mod oneshot;
pub mod watchdog;

pub use capture::{WindowSummary, capture_window};

use crate::error::Result;
use crate::process::{ProcFs, ProcessSnapshot};
use crate::symbols::{KernelSymbols, Symbolizer};

/// Snapshot every process and the kernel symbol table under `proc`
pub fn load_symbolizer(proc: &ProcFs) -> Result<Symbolizer> {
    let processes = ProcessSnapshot::capture(proc)?;
    let kernel = KernelSymbols::load(proc);
    log::info!(
        "symbolizer ready: {} processes, {} kernel symbols",
        processes.len(),
        kernel.len()
    );
    Ok(Symbolizer::new(processes, kernel))
}
