//! Error types for the file key store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing the key store file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("key store I/O on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The store file exists but does not parse.
    #[error("key store {path} is corrupt: {source}")]
    Corrupt {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The adjacent `.lock` file stayed held past the wait budget.
    #[error("timed out waiting for lock {0}")]
    LockTimeout(PathBuf),

    /// Stored key material that no longer decodes.
    #[error("stored key for '{name}' is invalid: {source}")]
    InvalidKey {
        /// The node or pair the key belongs to.
        name: String,
        /// The underlying error.
        #[source]
        source: wgforge_wireguard::WireGuardError,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
