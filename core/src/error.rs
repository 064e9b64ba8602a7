//! Core error types and utilities

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("unknown process {0}")]
    NotFound(u32),

    #[error("process table full ({0} slots)")]
    CapacityExceeded(usize),

    #[error("process {0} already terminated")]
    ProcessTerminated(u32),

    #[error("input of process {0} is closed")]
    InputClosed(u32),

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::NotFound(_) => "CORE010",
            CoreError::CapacityExceeded(_) => "CORE011",
            CoreError::ProcessTerminated(_) => "CORE012",
            CoreError::InputClosed(_) => "CORE013",
            CoreError::ProcessSpawn(_) => "CORE020",
            CoreError::ProcessSignal(_) => "CORE021",
            CoreError::ProcessWait(_) => "CORE022",
            CoreError::IoError(_) => "CORE005",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
