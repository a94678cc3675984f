//! Error types for PlateDB
//!
//! Provides a unified error type for all operations.
//!
//! Lookup misses and end-of-log are not errors: a read that matches nothing
//! returns a count of zero, and a truncated record at the tail of the durable
//! tier simply ends recovery.

use thiserror::Error;

use crate::record::Column;

/// Result type alias using PlateError
pub type Result<T> = std::result::Result<T, PlateError>;

/// Unified error type for PlateDB operations
#[derive(Debug, Error)]
pub enum PlateError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration / Manifest Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest corruption detected: {0}")]
    ManifestCorruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Invalid record length: expected {expected} bytes, got {actual}")]
    InvalidRecordLength { expected: usize, actual: usize },

    #[error("Invalid column id: {0}")]
    InvalidColumn(i32),

    #[error("Invalid key length for column {column:?}: got {actual} bytes, column width is {width}")]
    InvalidKeyLength {
        column: Column,
        width: usize,
        actual: usize,
    },

    #[error("Output buffer too small: need {needed} bytes, {available} available")]
    OutputTooSmall { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Background Flush Errors
    // -------------------------------------------------------------------------
    #[error("Background flush failed: {0}")]
    FlushFailed(String),
}
