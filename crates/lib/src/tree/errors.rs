//! Error types for the tree data model.

use thiserror::Error;

/// Errors raised while building, converting or validating trees and paths.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TreeError {
    /// A path segment is not allowed where it was used.
    #[error("Invalid segment '{segment}' in path '{path}': {reason}")]
    InvalidSegment {
        /// The full path, joined
        path: String,
        /// The offending segment
        segment: String,
        /// Why the segment was rejected
        reason: String,
    },

    /// A JSON value has no tree representation.
    #[error("Unsupported value of kind {kind}")]
    UnsupportedValue {
        /// JSON kind that was rejected
        kind: &'static str,
    },

    /// A metadata key held a value of the wrong type.
    #[error("Invalid metadata '{key}': {reason}")]
    InvalidMetadata {
        /// The metadata key (`_rev`, `_del`, ...)
        key: String,
        /// Description of the problem
        reason: String,
    },

    /// Numbers must be finite to be stored.
    #[error("Cannot store non-finite number {value}")]
    NonFiniteNumber {
        /// The rejected number
        value: f64,
    },

    /// JSON could not be parsed or produced.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl TreeError {
    /// Check if this error rejects a path or segment.
    pub fn is_invalid_path(&self) -> bool {
        matches!(self, TreeError::InvalidSegment { .. })
    }

    /// Check if this error comes from malformed input data.
    pub fn is_invalid_data(&self) -> bool {
        matches!(
            self,
            TreeError::UnsupportedValue { .. }
                | TreeError::InvalidMetadata { .. }
                | TreeError::NonFiniteNumber { .. }
                | TreeError::Json { .. }
        )
    }
}

impl From<TreeError> for crate::Error {
    fn from(err: TreeError) -> Self {
        crate::Error::Tree(err)
    }
}
