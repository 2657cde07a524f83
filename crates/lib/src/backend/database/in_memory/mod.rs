//! In-memory engine implementation
//!
//! This module provides an in-memory implementation of the [`Backend`] trait,
//! suitable for testing, development, or embedding where durability is
//! handled by saving snapshots.

mod persistence;

use std::{any::Any, collections::BTreeMap, ops::Bound, path::Path};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Result,
    backend::{Backend, BatchOp, KeyRange, KvPair, errors::parse_counter},
};

/// An ordered map held in memory.
///
/// Readers share the lock; a batch takes the write lock once and applies every
/// operation before releasing it, which makes batches atomic to all readers.
///
/// State can be saved to and restored from a JSON file with
/// [`InMemory::save_to_file`] and [`InMemory::load_from_file`].
#[derive(Debug, Default)]
pub struct InMemory {
    pub(crate) data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemory {
    /// Creates a new, empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Saves every key and value to a JSON file.
    ///
    /// # Arguments
    /// * `path` - The file to write (replaced if it exists).
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads state previously written by [`InMemory::save_to_file`].
    ///
    /// A missing file yields an empty engine.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }
}

#[async_trait]
impl Backend for InMemory {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn scan(&self, range: &KeyRange) -> Result<Vec<KvPair>> {
        if range.start >= range.end {
            return Ok(Vec::new());
        }
        let data = self.data.read().await;
        let bounds = (
            Bound::Included(range.start.as_slice()),
            Bound::Excluded(range.end.as_slice()),
        );
        let limit = range.limit.unwrap_or(usize::MAX);
        let iter = data.range::<[u8], _>(bounds);
        let pairs = if range.reverse {
            iter.rev()
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            iter.take(limit).map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        Ok(pairs)
    }

    async fn write(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut data = self.data.write().await;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn increment(&self, key: &[u8]) -> Result<u64> {
        let mut data = self.data.write().await;
        let next = parse_counter(key, data.get(key).map(Vec::as_slice))? + 1;
        data.insert(key.to_vec(), next.to_string().into_bytes());
        Ok(next)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
