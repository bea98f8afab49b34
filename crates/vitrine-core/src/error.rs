//! Error types for Vitrine operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Vitrine crates. Uses `thiserror` for derive macros.
//!
//! Only [`Error::Provider`] is retryable. [`Error::DimensionMismatch`] and
//! [`Error::RetrievalTimeout`] are the only errors the retrieval path
//! surfaces to its caller; everything else degrades.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in Vitrine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing snapshot, record, or product.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input, e.g. a snapshot with an empty title.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Embedding or index backend failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Stored and requested vector lengths differ.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the partition or model requires.
        expected: usize,
        /// Dimension that was supplied.
        actual: usize,
    },

    /// Invalid shop settings or configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A write lost against newer data or targeted a different model.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Retrieval exceeded its deadline.
    #[error("Retrieval timed out after {0:?}")]
    RetrievalTimeout(Duration),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    /// Whether this is a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Vitrine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
