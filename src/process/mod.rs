pub mod maps;
pub mod snapshot;

pub use maps::Region;
pub use snapshot::{ProcFs, ProcSource, ProcessEntry, ProcessSnapshot};
