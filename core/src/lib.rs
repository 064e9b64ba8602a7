//! Core functionality for the Tether daemon
//!
//! This crate holds the process-supervision engine and the line-protocol
//! dispatcher. It knows nothing about sockets: the daemon feeds it request
//! lines and writes back the encoded replies.

pub mod config;
pub mod dispatcher;
pub mod error;
#[cfg(unix)]
pub mod process;
pub mod supervisor;
pub mod table;


// Re-export schema types for convenience
pub use schema::*;

pub use dispatcher::{Command, Dispatcher, Reply};
pub use error::{CoreError, Result};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use table::ProcessSummary;

/// Smallest accepted `maxLineLength`
pub const MIN_LINE_LENGTH: usize = 64;

/// Largest accepted `maxConnections`
pub const MAX_CONNECTIONS: usize = 65_536;

/// Core utilities and helper functions
pub mod utils {
    use tracing::{debug, info};

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate_config(config: &crate::DaemonConfig) -> crate::Result<()> {
        if config.port == 0 {
            return Err(crate::CoreError::ConfigurationError(
                "Port cannot be 0".to_string(),
            ));
        }

        if config.host.is_empty() {
            return Err(crate::CoreError::ConfigurationError(
                "Host cannot be empty".to_string(),
            ));
        }

        if config.max_connections == 0 {
            return Err(crate::CoreError::ConfigurationError(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if config.max_connections > crate::MAX_CONNECTIONS {
            return Err(crate::CoreError::ConfigurationError(format!(
                "Max connections must be at most {}",
                crate::MAX_CONNECTIONS
            )));
        }

        if config.max_processes == 0 {
            return Err(crate::CoreError::ConfigurationError(
                "Max processes must be greater than 0".to_string(),
            ));
        }

        if config.max_line_length < crate::MIN_LINE_LENGTH {
            return Err(crate::CoreError::ConfigurationError(format!(
                "Max line length must be at least {}",
                crate::MIN_LINE_LENGTH
            )));
        }

        debug!("Configuration validated successfully");
        Ok(())
    }
}
