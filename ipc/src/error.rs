//! IPC error types and utilities

use thiserror::Error;

/// IPC-specific error types
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Failed to receive response: {0}")]
    ReceiveFailed(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Connection closed by daemon")]
    ConnectionClosed,

    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl IpcError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            IpcError::ConnectionFailed(_) => "IPC001",
            IpcError::SendFailed(_) => "IPC002",
            IpcError::ReceiveFailed(_) => "IPC003",
            IpcError::ProtocolError(_) => "IPC007",
            IpcError::ConnectionClosed => "IPC006",
            IpcError::Timeout(_) => "IPC008",
        }
    }
}

/// IPC-specific result type
pub type Result<T> = std::result::Result<T, IpcError>;
