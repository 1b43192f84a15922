//! Registry error types.

use scoda_core::ScodaError;

/// Errors that can occur during registry, overlay and hub operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Package name not present in the catalog.
    #[error("unknown package: {name}")]
    UnknownPackage { name: String },

    /// A declared dependency cannot be attached.
    #[error("dependency error in '{package}': {detail}")]
    Dependency { package: String, detail: String },

    /// Opening or reading a container failed.
    #[error(transparent)]
    Package(#[from] ScodaError),

    /// The hub index is missing or malformed.
    #[error("invalid hub index: {detail}")]
    HubIndex { detail: String },

    /// A downloaded file does not match the hub checksum.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    HubChecksum {
        file: String,
        expected: String,
        actual: String,
    },

    /// A hub download URL cannot be served.
    #[error("hub source error: {detail}")]
    HubSource { detail: String },

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

impl RegistryError {
    pub(crate) fn dependency(package: &str, detail: impl Into<String>) -> Self {
        RegistryError::Dependency {
            package: package.to_string(),
            detail: detail.into(),
        }
    }

    /// True for payload or download checksum mismatches.
    pub fn is_checksum(&self) -> bool {
        match self {
            RegistryError::HubChecksum { .. } => true,
            RegistryError::Package(e) => e.is_checksum(),
            _ => false,
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
