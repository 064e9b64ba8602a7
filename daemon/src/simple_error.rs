//! Simple daemon error types

#[derive(Debug)]
pub enum DaemonError {
    ServerError(String),
    IoError(std::io::Error),
    SerializationError(serde_json::Error),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::ServerError(msg) => write!(f, "Server error: {}", msg),
            DaemonError::IoError(err) => write!(f, "I/O error: {}", err),
            DaemonError::SerializationError(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<std::io::Error> for DaemonError {
    fn from(err: std::io::Error) -> Self {
        DaemonError::IoError(err)
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(err: serde_json::Error) -> Self {
        DaemonError::SerializationError(err)
    }
}

impl From<tether_core::CoreError> for DaemonError {
    fn from(err: tether_core::CoreError) -> Self {
        DaemonError::ServerError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DaemonError {
    fn from(err: tokio::task::JoinError) -> Self {
        DaemonError::ServerError(format!("worker task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
