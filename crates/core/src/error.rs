//! Core error types for driftwatch configuration handling.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// The standard Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("YAML parse error: {reason}")]
    YamlParseFailed { reason: String },

    #[error("application #{index}: field '{field}' must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("application #{index} duplicates application #{first} ({name})")]
    DuplicateApplication {
        index: usize,
        first: usize,
        name: String,
    },

    #[error("invalid digest '{value}': {reason}")]
    InvalidDigest { value: String, reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(reason: impl Into<String>) -> Self {
        Self::YamlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an empty field error.
    #[must_use]
    pub const fn empty_field(index: usize, field: &'static str) -> Self {
        Self::EmptyField { index, field }
    }

    /// Create an invalid digest error.
    pub fn invalid_digest(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDigest {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
