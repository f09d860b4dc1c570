use crate::process::ProcSource;

/// Module reported for symbols built into the kernel image
pub const KERNEL_MODULE: &str = "[kernel]";

/// One line of /proc/kallsyms: `address mode name [module]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSymbol {
    pub address: u64,
    pub mode: char,
    pub name: String,
    pub module: String,
}

impl KernelSymbol {
    pub fn parse(line: &str) -> Option<KernelSymbol> {
        let mut fields = line.split_whitespace();

        let address = u64::from_str_radix(fields.next()?, 16).ok()?;
        let mode = fields.next()?.chars().next()?;
        let name = fields.next()?.to_string();
        let module = fields
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| KERNEL_MODULE.to_string());

        Some(KernelSymbol {
            address,
            mode,
            name,
            module,
        })
    }
}

/// Kernel symbols sorted by address
#[derive(Debug, Clone, Default)]
pub struct KernelSymbols {
    symbols: Vec<KernelSymbol>,
}

impl KernelSymbols {
    /// Load from `source`, falling back to an empty table when the listing
    /// cannot be read.
    pub fn load<S: ProcSource + ?Sized>(source: &S) -> Self {
        match source.kallsyms() {
            Ok(content) => {
                let table = Self::parse(&content);
                if table.is_empty() {
                    log::warn!(
                        "no usable kernel symbols (kptr_restrict?), kernel samples will be unresolved"
                    );
                } else {
                    log::info!("read {} kernel symbols", table.len());
                }
                table
            }
            Err(e) => {
                log::warn!("cannot read kernel symbols: {}", e);
                KernelSymbols::default()
            }
        }
    }

    /// Parse a kallsyms listing. Zero addresses (hidden by kptr_restrict)
    /// are dropped.
    pub fn parse(content: &str) -> Self {
        let symbols = content
            .lines()
            .filter_map(KernelSymbol::parse)
            .filter(|s| s.address != 0)
            .collect();
        Self::from_symbols(symbols)
    }

    pub fn from_symbols(mut symbols: Vec<KernelSymbol>) -> Self {
        symbols.sort_by_key(|s| s.address);
        KernelSymbols { symbols }
    }

    /// Greatest symbol whose address is `<= addr`
    pub fn find(&self, addr: u64) -> Option<&KernelSymbol> {
        // upper bound, then step back one
        let idx = self.symbols.partition_point(|s| s.address <= addr);
        idx.checked_sub(1).map(|i| &self.symbols[i])
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
