//! Unified store error model and mapping helpers.
//! One error enum is used across the storage modules and the HTTP frontend,
//! along with helpers to map each kind to a stable code string and HTTP status.

use thiserror::Error;

/// Error kinds raised by the file store. Per-item I/O failures surface as
/// `Io` inside a partial-result report; the other kinds abort a whole call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Empty upload set: nothing to ingest or bundle.
    #[error("no input: {0}")]
    NoInput(String),

    /// Folder items share no common top-level path segment.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// Delete/read/history lookup on a file that has no current content.
    #[error("not found: {0}")]
    NotFound(String),

    /// Restore target tag does not match any historical entry.
    #[error("version not found: {0}")]
    VersionNotFound(String),

    /// Read/write/move failure on a specific path.
    #[error("io failure on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A logical name that would escape the bucket subtree or is malformed.
    #[error("invalid name: {0}")]
    InvalidName(String),
}

impl StoreError {
    pub fn io<P: AsRef<std::path::Path>>(path: P, source: std::io::Error) -> Self {
        StoreError::Io { path: path.as_ref().display().to_string(), source }
    }

    /// Stable machine-readable code for the HTTP layer and reports.
    pub fn code_str(&self) -> &'static str {
        match self {
            StoreError::NoInput(_) => "no_input",
            StoreError::InvalidBundle(_) => "invalid_bundle",
            StoreError::NotFound(_) => "not_found",
            StoreError::VersionNotFound(_) => "version_not_found",
            StoreError::Io { .. } => "io_error",
            StoreError::InvalidName(_) => "invalid_name",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::NoInput(_) => 400,
            StoreError::InvalidBundle(_) => 400,
            StoreError::InvalidName(_) => 400,
            StoreError::NotFound(_) => 404,
            StoreError::VersionNotFound(_) => 404,
            StoreError::Io { .. } => 503,
        }
    }
}

pub type AppResult<T> = Result<T, StoreError>;
