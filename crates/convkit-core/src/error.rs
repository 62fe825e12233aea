//! Error types for convkit.
//!
//! Crate-level failures use [`ConvkitError`]. Per-model failures inside a
//! pipeline run are not errors at this level; they are recorded as
//! [`StageError`](crate::pipeline::StageError) values in the run summary.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for the convkit library.
#[derive(Debug, Error)]
pub enum ConvkitError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Export errors
    #[error("Export environment for {backend} not ready: {message}")]
    ExportEnvNotReady { backend: String, message: String },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for convkit operations.
pub type Result<T> = std::result::Result<T, ConvkitError>;

impl From<std::io::Error> for ConvkitError {
    fn from(err: std::io::Error) -> Self {
        ConvkitError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ConvkitError {
    fn from(err: serde_json::Error) -> Self {
        ConvkitError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ConvkitError {
    fn from(err: reqwest::Error) -> Self {
        ConvkitError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ConvkitError {
    /// Create an IO error with an operation description and path context.
    pub fn io(operation: &str, path: impl AsRef<Path>, err: std::io::Error) -> Self {
        let path = path.as_ref();
        ConvkitError::Io {
            message: format!("{operation} failed: {err}"),
            path: Some(path.to_path_buf()),
            source: Some(err),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        ConvkitError::Config {
            message: message.into(),
        }
    }
}

/// Attach a path to `std::io::Result` values.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| ConvkitError::Io {
            message: e.to_string(),
            path: Some(path.as_ref().to_path_buf()),
            source: Some(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvkitError::DownloadFailed {
            url: "https://example.com/a.pt".into(),
            message: "status 404".into(),
        };
        assert_eq!(
            err.to_string(),
            "Download failed for https://example.com/a.pt: status 404"
        );
    }

    #[test]
    fn test_with_path_keeps_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        match result.with_path("/tmp/models") {
            Err(ConvkitError::Io { path, .. }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/models")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
