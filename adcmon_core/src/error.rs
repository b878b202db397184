use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AdcError {
    /// SPI response echoed a different register address than requested.
    #[error("register readback mismatch")]
    RegisterMismatch,
    /// Capture busy bit never cleared within the poll budget.
    #[error("capture timed out after {0} status polls")]
    CaptureTimeout(u32),
    /// Register layout could not be resolved at startup.
    #[error("register layout unresolved: {0}")]
    ConfigUnresolved(String),
    #[error("calibration read failed: {0}")]
    PersistenceRead(String),
    #[error("calibration write failed: {0}")]
    PersistenceWrite(String),
    /// Write attempted before any successful load of the record.
    #[error("calibration record never loaded")]
    NotWarm,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("task already running")]
    AlreadyRunning,
    #[error("task not running")]
    NotRunning,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
