//! CLI error types.

use std::fmt;

use wgforge_engine::BuildFailure;
use wgforge_keystore::StoreError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// The document could not be read or parsed.
    Document(String),
    /// The engine rejected the document.
    Build(BuildFailure),
    /// Key store failure.
    Store(StoreError),
    /// Output formatting error.
    Format(String),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(msg) => write!(f, "document error: {msg}"),
            Self::Build(failure) => write!(f, "{failure}"),
            Self::Store(e) => write!(f, "key store error: {e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Build(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<BuildFailure> for CliError {
    fn from(err: BuildFailure) -> Self {
        Self::Build(err)
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_error_display() {
        let err = CliError::Document("missing file".into());
        assert_eq!(err.to_string(), "document error: missing file");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(CliError::from(io_err), CliError::Io(_)));
    }
}
