use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    /// A required register name was missing from the configured layout, or
    /// its region does not fit inside the mapped window. Fatal at startup.
    #[error("register layout unresolved: {0}")]
    Unresolved(String),
    #[error("device access out of range: {name} @ {offset:#x}")]
    OutOfRange { name: &'static str, offset: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
