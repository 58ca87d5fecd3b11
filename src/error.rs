//! Error types for the pagesift library.
//!
//! All fallible operations return [`PageSiftError`] through the crate-wide
//! [`Result`] alias. The three domain kinds map onto the lifecycle of an index:
//!
//! - [`PageSiftError::Storage`]: a persisted artifact is missing, truncated or corrupt.
//! - [`PageSiftError::Consistency`]: the artifacts disagree with each other
//!   (count or dimension mismatch, empty page embeddings).
//! - [`PageSiftError::Encoding`]: an encoder failed or produced malformed output.
//!
//! # Examples
//!
//! ```
//! use pagesift::error::{PageSiftError, Result};
//!
//! fn load_something() -> Result<()> {
//!     Err(PageSiftError::storage("manifest.json not found"))
//! }
//!
//! match load_something() {
//!     Err(e) if e.is_storage() => eprintln!("cannot serve: {e}"),
//!     Err(e) => eprintln!("Error: {e}"),
//!     Ok(()) => {}
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for pagesift operations.
#[derive(Error, Debug)]
pub enum PageSiftError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing, truncated or corrupt persisted data.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding/metadata count mismatch or vector dimension mismatch.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Encoder failure or malformed encoder output.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with PageSiftError.
pub type Result<T> = std::result::Result<T, PageSiftError>;

impl PageSiftError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PageSiftError::Storage(msg.into())
    }

    /// Create a new consistency error.
    pub fn consistency<S: Into<String>>(msg: S) -> Self {
        PageSiftError::Consistency(msg.into())
    }

    /// Create a new encoding error.
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        PageSiftError::Encoding(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        PageSiftError::InvalidConfig(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PageSiftError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PageSiftError::Other(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        PageSiftError::Other(format!("Internal error: {}", msg.into()))
    }

    /// Whether this error describes missing or corrupt persisted data.
    ///
    /// I/O failures count as storage failures.
    pub fn is_storage(&self) -> bool {
        matches!(self, PageSiftError::Storage(_) | PageSiftError::Io(_))
    }

    /// Whether this error describes a cross-store invariant violation.
    pub fn is_consistency(&self) -> bool {
        matches!(self, PageSiftError::Consistency(_))
    }

    /// Whether this error came from an encoder.
    pub fn is_encoding(&self) -> bool {
        matches!(self, PageSiftError::Encoding(_))
    }
}
