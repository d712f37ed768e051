//! Unified error handling for the BS2 controller
//!
//! A single error type shared by every crate in the workspace, built on
//! thiserror for proper Display and Error impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using Bs2Error
pub type Result<T> = std::result::Result<T, Bs2Error>;

/// Unified error type for all controller operations
#[derive(thiserror::Error, Debug)]
pub enum Bs2Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Invalid fan curve: {0}")]
    InvalidCurve(String),

    #[error("Malformed device report: {0}")]
    MalformedReport(String),

    #[error("Fan transport error: {0}")]
    Transport(String),

    #[error("Temperature bridge error: {0}")]
    Bridge(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Generic(String),
}

impl Bs2Error {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error from a string
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a bridge error from a string
    pub fn bridge(msg: impl Into<String>) -> Self {
        Self::Bridge(msg.into())
    }
}

impl From<String> for Bs2Error {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for Bs2Error {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
