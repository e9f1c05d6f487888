//! Error types for WireGuard primitives.

use thiserror::Error;

/// Errors that can occur in key, address, and config-file operations.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Not a valid IP address or CIDR network.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Not a valid `host:port` endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A config file line that could not be understood.
    #[error("parse error at line {line}: {message}")]
    ParseError {
        /// 1-based line number in the config text.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, WireGuardError>;
