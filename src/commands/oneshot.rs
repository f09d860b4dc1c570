use super::{capture_window, load_symbolizer};
use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::process::ProcFs;
use crate::signal::CancelFlag;
use crate::storage::ProfileWriter;

/// Capture a single window right away
pub fn run(config: &ProfilerConfig, cancel: &CancelFlag) -> Result<()> {
    let symbolizer = load_symbolizer(&ProcFs::default())?;
    let mut writer = ProfileWriter::open(&config.output)?;

    capture_window(config, &symbolizer, &mut writer, cancel)?;
    Ok(())
}
