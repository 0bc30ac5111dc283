//! Error types for enumeration, loading and builder lifecycle.

use std::path::PathBuf;

use compact_str::CompactString;
use thiserror::Error;

/// Errors raised while expanding a single reference.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The package has no loaded path list in its group.
    #[error("No listfile loaded for package '{package}' in group '{group}'")]
    MissingListfile {
        group: CompactString,
        package: CompactString,
    },

    /// The expansion was abandoned before it completed.
    #[error("Enumeration interrupted")]
    Interrupted,
}

impl EnumerationError {
    /// Create a missing listfile error.
    pub fn missing_listfile(
        group: impl Into<CompactString>,
        package: impl Into<CompactString>,
    ) -> Self {
        Self::MissingListfile {
            group: group.into(),
            package: package.into(),
        }
    }
}

/// Errors that can occur while loading a package group from disk.
#[derive(Debug, Error)]
pub enum ListfileError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source path is not a directory.
    #[error("Package source is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Source directory holds no listfiles.
    #[error("No listfiles found in {path}")]
    Empty { path: PathBuf },
}

impl ListfileError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors reported synchronously by the builder facade.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// A lifecycle operation was attempted in the wrong state.
    #[error("Cannot {operation}: builder is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The builder was started outside of a tokio runtime.
    #[error("No tokio runtime available to run the builder loops")]
    NoRuntime,

    /// A package group failed to load.
    #[error(transparent)]
    Load(#[from] ListfileError),

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl BuilderError {
    /// Create an invalid state error.
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listfile_error_io() {
        let err = ListfileError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ListfileError::PermissionDenied { .. }));

        let err = ListfileError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ListfileError::NotFound { .. }));
    }

    #[test]
    fn test_missing_listfile_message() {
        let err = EnumerationError::missing_listfile("data", "patch.MPQ");
        let message = err.to_string();
        assert!(message.contains("patch.MPQ"));
        assert!(message.contains("data"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = BuilderError::invalid_state("start", "running");
        assert_eq!(err.to_string(), "Cannot start: builder is running");
    }
}
