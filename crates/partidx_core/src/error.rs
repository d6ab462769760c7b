//! Error types for the collection index.
//!
//! Only I/O failures, capacity violations and caller mistakes surface as
//! errors. Disagreements between the location table and the partition files
//! are repaired in place and counted by [`HealthState`](crate::HealthState);
//! they never reach the caller.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in collection index operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] partidx_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A collection is larger than the top size class can hold.
    #[error("collection of {requested} elements exceeds the largest partition capacity {max}")]
    CapacityExceeded {
        /// Requested number of elements.
        requested: usize,
        /// Capacity of the largest size class.
        max: usize,
    },

    /// Key has the wrong length or is not well-formed under the key order.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// Element does not match the configured element width.
    #[error("invalid element: expected {expected} bytes, got {actual}")]
    InvalidElement {
        /// Configured element width.
        expected: usize,
        /// Width of the element passed in.
        actual: usize,
    },

    /// Configuration cannot describe a valid index.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Stored bytes could not be decoded.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted with these arguments.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Another process holds the index lock.
    #[error("index locked: another process has exclusive access")]
    IndexLocked,

    /// The index was closed.
    #[error("index is closed")]
    IndexClosed,
}

impl CoreError {
    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
