//! Error types for ThreadSync.
//!
//! Library crates use [`ThreadSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ThreadSync operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the document or tabular store.
    #[error("network error: {0}")]
    Network(String),

    /// Response decoding error (unexpected shape from the store API).
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Target store schema does not satisfy the sync contract. Always fatal.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Store-side write rejection (record or work item creation).
    #[error("store error: {0}")]
    Store(String),

    /// Notification dispatch error. Recorded, never escalated to fatal.
    #[error("notify error: {0}")]
    Notify(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid id, empty document set, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ThreadSyncError>;

impl ThreadSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a schema error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run before any writes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::Config { .. })
    }
}
