//! Ordered key-value engines for canopy storage.
//!
//! The [`Backend`] trait is the whole contract the document store needs from
//! its storage: point reads and writes, ordered range scans and an atomic
//! multi-key batch write. Keys and values are opaque byte strings compared
//! lexicographically.
//!
//! Two engines are provided:
//!
//! - [`database::InMemory`]: a `BTreeMap` behind an async lock, with JSON
//!   snapshot persistence
//! - [`database::Sqlite`] (feature `sqlite`): a single SQLite table

use std::any::Any;

use async_trait::async_trait;

use crate::Result;

pub mod database;
mod errors;

pub use errors::BackendError;

/// A key and its value as returned by a scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Bounds and direction of a range scan.
///
/// `start` is inclusive and `end` exclusive regardless of direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    /// Yield keys from `end` down to `start`.
    pub reverse: bool,
    /// Maximum number of pairs to return.
    pub limit: Option<usize>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            reverse: false,
            limit: None,
        }
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Ordered key-value storage abstraction.
///
/// Implementations must be `Send` and `Sync` so a single engine can be shared
/// by every clone of a store and its background view worker, and implement
/// `Any` to allow downcasting to the concrete engine (for example to persist
/// an [`database::InMemory`] snapshot).
///
/// ## Atomicity
///
/// [`Backend::write`] must apply all operations or none, and no reader may
/// observe a partially applied batch. Operations inside one batch are applied
/// in order.
#[async_trait]
pub trait Backend: Send + Sync + Any {
    /// Read the value at `key`, or `None` if absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write a single key.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(vec![BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
        .await
    }

    /// Remove a single key. Removing an absent key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(vec![BatchOp::Delete { key: key.to_vec() }]).await
    }

    /// Return the pairs with keys in `range`, in key order (or reverse key order).
    async fn scan(&self, range: &KeyRange) -> Result<Vec<KvPair>>;

    /// Apply every operation atomically.
    async fn write(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Add one to the decimal counter stored at `key` and return the new value.
    ///
    /// An absent key counts as zero. Concurrent callers on the same engine,
    /// including separate stores sharing it, always get distinct values.
    async fn increment(&self, key: &[u8]) -> Result<u64>;

    /// Returns a reference to the engine as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}
