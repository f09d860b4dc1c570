pub mod kallsyms;
pub mod resolver;

pub use kallsyms::{KernelSymbol, KernelSymbols};
pub use resolver::{SymbolInfo, Symbolizer};
