use super::kallsyms::KernelSymbols;
use crate::process::ProcessSnapshot;

/// Process name reported for pid 0
pub const SWAPPER: &str = "<swapper>";
/// Process name reported for pids missing from the snapshot
pub const NO_MAPS: &str = "<no maps>";
/// Binary reported for kernel addresses below every known symbol
pub const NO_KERNEL: &str = "<nokernel>";
/// Filler for fields that have no value
pub const NONE: &str = "-";

/// Where a sampled instruction pointer landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo<'a> {
    pub process_name: &'a str,
    /// Backing file, kernel module, or a placeholder
    pub binary_path: &'a str,
    /// File offset for user-space hits, the raw address otherwise
    pub address: u64,
    pub symbol_name: &'a str,
}

/// Maps (pid, ip) to binary and symbol using startup snapshots
pub struct Symbolizer {
    processes: ProcessSnapshot,
    kernel: KernelSymbols,
}

impl Symbolizer {
    pub fn new(processes: ProcessSnapshot, kernel: KernelSymbols) -> Self {
        Symbolizer { processes, kernel }
    }

    /// Resolve a sample. Never fails; misses produce placeholders.
    pub fn resolve(&self, pid: u32, ip: u64) -> SymbolInfo<'_> {
        if pid == 0 {
            // idle task, almost always an arch-specific halt, not worth a lookup
            return SymbolInfo {
                process_name: SWAPPER,
                binary_path: NONE,
                address: ip,
                symbol_name: NONE,
            };
        }

        let Some(process) = self.processes.get(pid) else {
            // started after the snapshot
            return SymbolInfo {
                process_name: NO_MAPS,
                binary_path: NONE,
                address: ip,
                symbol_name: NONE,
            };
        };

        if let Some(region) = process.find_region(ip) {
            return SymbolInfo {
                process_name: &process.comm,
                binary_path: if region.pathname.is_empty() {
                    NONE
                } else {
                    &region.pathname
                },
                address: region.file_offset(ip),
                symbol_name: NONE,
            };
        }

        // not in user space, assume a kernel address
        match self.kernel.find(ip) {
            Some(symbol) => SymbolInfo {
                process_name: &process.comm,
                binary_path: &symbol.module,
                address: ip,
                symbol_name: &symbol.name,
            },
            None => SymbolInfo {
                process_name: &process.comm,
                binary_path: NO_KERNEL,
                address: ip,
                symbol_name: NONE,
            },
        }
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn kernel_symbol_count(&self) -> usize {
        self.kernel.len()
    }
}
