pub mod cli;
pub mod commands;
pub mod config;
pub mod cpu;
pub mod error;
pub mod event_loop;
pub mod process;
pub mod sched;
pub mod signal;
pub mod storage;
pub mod symbols;
pub mod trigger;
pub mod watchdog;

pub use error::{Error, Result};
