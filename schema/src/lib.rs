//! Schema definitions for Tether
//!
//! Shared data structures used by the daemon, the engine and the client.
//! Configuration types implement JSON Schema generation for external
//! consumption.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default TCP port of the daemon
pub const DEFAULT_PORT: u16 = 53553;

/// Outcome prefix of every reply line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ReplyStatus {
    /// Command succeeded
    #[serde(rename = "OK")]
    Ok,
    /// Command failed
    #[serde(rename = "ERR")]
    Err,
}

impl ReplyStatus {
    /// Wire token for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Ok => "OK",
            ReplyStatus::Err => "ERR",
        }
    }

    /// Parse a status line (without its trailing newline) into status and detail.
    ///
    /// Returns `None` when the line is not a status line.
    pub fn parse_line(line: &str) -> Option<(ReplyStatus, String)> {
        for status in [ReplyStatus::Ok, ReplyStatus::Err] {
            let token = status.as_str();
            if line == token {
                return Some((status, String::new()));
            }
            if let Some(detail) = line.strip_prefix(token).and_then(|r| r.strip_prefix(' ')) {
                return Some((status, detail.to_string()));
            }
        }
        None
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output pipe of a child to drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StdStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdStream::Stdout => f.write_str("stdout"),
            StdStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Configuration structure for the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Host to bind the daemon to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the daemon to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level for the daemon
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Capacity of the process table
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    /// Longest accepted request line, in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// How long a destroy waits for a signalled child before escalating, in milliseconds.
    /// Zero sends the signals without waiting.
    #[serde(default = "default_destroy_grace_ms")]
    pub destroy_grace_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_connections: default_max_connections(),
            max_processes: default_max_processes(),
            max_line_length: default_max_line_length(),
            destroy_grace_ms: default_destroy_grace_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_max_processes() -> usize {
    10
}

fn default_max_line_length() -> usize {
    1024
}

fn default_destroy_grace_ms() -> u64 {
    100
}

/// Client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Daemon host to connect to
    pub daemon_host: String,
    /// Daemon port to connect to
    pub daemon_port: u16,
    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_host: "127.0.0.1".to_string(),
            daemon_port: DEFAULT_PORT,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
