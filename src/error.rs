//! Error types for the configuration store.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ConfigStoreError>;

/// Top-level error for store operations.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid persisted state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Errors from the key-value persistence backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("No storage medium available")]
    Unavailable,
}

/// Errors returned by the configuration API collaborator.
///
/// Validation failures map to a 400-class response with a machine-readable
/// `code` and a user-facing `message`.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        priority: u8,
    },
}

impl ApiError {
    /// HTTP-style status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation { .. } => 400,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { code, .. } => code,
        }
    }
}
