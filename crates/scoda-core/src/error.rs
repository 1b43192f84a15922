//! Container and package error types.

use std::path::PathBuf;

/// Errors that can occur while building, reading or opening `.scoda` containers.
#[derive(Debug, thiserror::Error)]
pub enum ScodaError {
    /// The container (or source database) does not exist.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The archive or its manifest is unreadable or malformed.
    #[error("invalid container format: {detail}")]
    Format { detail: String },

    /// The embedded payload does not match the manifest checksum.
    #[error("checksum mismatch for '{name}': expected {expected}, got {actual}")]
    Checksum {
        name: String,
        expected: String,
        actual: String,
    },

    /// A version string could not be parsed.
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    /// An accessor was called on a handle that has already been closed.
    #[error("package {} is closed", path.display())]
    PackageClosed { path: PathBuf },

    /// ZIP archive error.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScodaError {
    pub(crate) fn format(detail: impl Into<String>) -> Self {
        ScodaError::Format {
            detail: detail.into(),
        }
    }

    /// True for payload checksum mismatches.
    pub fn is_checksum(&self) -> bool {
        matches!(self, ScodaError::Checksum { .. })
    }
}

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, ScodaError>;
