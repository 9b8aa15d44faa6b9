//! Error types for client settings.

use thiserror::Error;

use crate::api::error::ApiError;

/// Settings error type.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `SQLite` cache error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` cache error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The backend rejected a settings push.
    #[error("backend error: {0}")]
    Backend(#[from] ApiError),
}

/// Convenience result alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;
