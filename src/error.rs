//! # Error Types
//!
//! Custom error types for hoplink using `thiserror`.

use thiserror::Error;

use crate::radio::Antenna;

/// Main error type for hoplink
#[derive(Debug, Error)]
pub enum LinkError {
    /// Frame codec misuse (e.g. payload larger than the frame can carry)
    #[error("Frame error: {0}")]
    Frame(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized for storing
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stats record serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transceiver did not respond at startup, the link cannot run
    #[error("Radio on {antenna} not responding")]
    RadioNotResponding { antenna: Antenna },
}

/// Result type alias for hoplink
pub type Result<T> = std::result::Result<T, LinkError>;
