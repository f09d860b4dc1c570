use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("perf_event error: {0}")]
    PerfEvent(String),

    #[error("Event loop error: {0}")]
    EventLoop(String),

    #[error("Watchdog error: {0}")]
    Watchdog(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Control channel error: {0}")]
    ControlChannel(String),

    #[error("Ring buffer protocol violation: {0}")]
    Protocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const PERMISSION_DENIED: i32 = 4;
    pub const PROTOCOL_ERROR: i32 = 7;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::PermissionDenied(_) => exit_code::PERMISSION_DENIED,
            Error::InvalidArgument(_) => exit_code::INVALID_ARGUMENTS,
            Error::Protocol(_) => exit_code::PROTOCOL_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}
