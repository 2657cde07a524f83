//! Error types for store operations.

use thiserror::Error;

use crate::Rev;

/// Errors raised by the mutation and query engines.
///
/// Conflicts and invalid paths are detected before any write is prepared, so
/// an operation failing with either has changed nothing.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The expected revision does not match the stored one.
    #[error("Revision conflict at '{path}': expected {expected:?}, found {current:?}")]
    Conflict {
        /// The checked path
        path: String,
        /// Revision supplied by the caller
        expected: Option<Rev>,
        /// Revision currently stored
        current: Option<Rev>,
    },

    /// The path or fragment cannot be written or read as requested.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Nothing is stored at the path.
    #[error("Nothing stored at '{path}'")]
    NotFound {
        /// The requested path
        path: String,
    },

    /// A stored value could not be decoded.
    #[error("Malformed value at key '{key}': {reason}")]
    MalformedValue {
        /// The physical key
        key: String,
        /// Decoding failure
        reason: String,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self, StoreError::InvalidPath { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::MalformedValue { .. })
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
