//! Daemon configuration loading
//!
//! The daemon reads an optional TOML file into `schema::DaemonConfig`. Missing
//! keys fall back to the serde defaults on the schema type; the result is then
//! checked by [`crate::utils::validate_config`].
//!
//! ```toml
//! port = 53553
//! maxProcesses = 10
//! logLevel = "debug"
//! ```

use crate::{CoreError, Result};
use schema::DaemonConfig;
use std::fs;
use std::path::Path;

/// Load daemon config from a TOML file path
pub fn load_daemon_config_from_toml_path(path: impl AsRef<Path>) -> Result<DaemonConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_daemon_config_from_toml_str(&data)
}

/// Load daemon config from a TOML string
pub fn load_daemon_config_from_toml_str(input: &str) -> Result<DaemonConfig> {
    let cfg: DaemonConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    crate::utils::validate_config(&cfg)?;
    Ok(cfg)
}
