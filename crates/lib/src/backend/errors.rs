//! Storage error types for the canopy backends.
//!
//! Every error here is fatal to the operation that hit it. Because writes are
//! committed as a single batch, retrying the whole operation is always safe.

use thiserror::Error;

/// Errors that can occur inside a storage engine.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// File I/O failed while loading or saving a snapshot.
    #[error("File I/O error: {source}")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A snapshot could not be serialized.
    #[error("Failed to serialize snapshot: {source}")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot could not be deserialized.
    #[error("Failed to deserialize snapshot: {source}")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot was written by an unsupported format version.
    #[error("Unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion {
        /// The version found in the file
        found: u8,
        /// The version this build reads
        expected: u8,
    },

    /// A snapshot held a key or value that is not valid hex.
    #[error("Corrupt snapshot entry: {reason}")]
    CorruptSnapshot {
        /// Description of the corruption
        reason: String,
    },

    /// A counter key holds something other than a decimal number.
    #[error("Counter at '{key}' is not a number: {reason}")]
    InvalidCounter {
        /// The counter key, lossily decoded
        key: String,
        /// Why the stored value was rejected
        reason: String,
    },

    /// A SQL operation failed.
    #[cfg(feature = "sqlite")]
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Context for the failing statement
        reason: String,
        /// The underlying sqlx error
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The stored schema is newer than this build understands.
    #[error("Schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version recorded in the database
        found: i64,
        /// Highest version this build supports
        supported: i64,
    },
}

impl BackendError {
    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, BackendError::FileIo { .. })
    }

    /// Check if this error comes from snapshot encoding or decoding.
    pub fn is_serialization_error(&self) -> bool {
        matches!(
            self,
            BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
                | BackendError::UnsupportedVersion { .. }
                | BackendError::CorruptSnapshot { .. }
                | BackendError::InvalidCounter { .. }
        )
    }

    /// Check if this error was raised by the SQL engine.
    pub fn is_sql_error(&self) -> bool {
        #[cfg(feature = "sqlite")]
        if matches!(self, BackendError::SqlxError { .. }) {
            return true;
        }
        matches!(self, BackendError::SchemaTooNew { .. })
    }
}

/// Parse a stored counter value; absent counts as zero.
pub(crate) fn parse_counter(key: &[u8], value: Option<&[u8]>) -> Result<u64, BackendError> {
    let Some(value) = value else {
        return Ok(0);
    };
    std::str::from_utf8(value)
        .map_err(|e| e.to_string())
        .and_then(|text| text.parse::<u64>().map_err(|e| e.to_string()))
        .map_err(|reason| BackendError::InvalidCounter {
            key: String::from_utf8_lossy(key).into_owned(),
            reason,
        })
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
