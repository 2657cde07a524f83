//! Namespaced views over one storage engine.
//!
//! A [`Sublevel`] prefixes every key with `!<name>!`, so several logical
//! stores share a single [`Backend`] without seeing each other's keys. A
//! [`Batch`] collects writes for any number of sublevels and commits them in
//! one [`Backend::write`], which makes cross-namespace updates atomic.
//!
//! ```rust
//! # tokio_test_block(async {
//! use std::sync::Arc;
//! use canopy::{backend::{Backend, database::InMemory}, sublevel::{Batch, Sublevel}};
//!
//! let backend: Arc<dyn Backend> = Arc::new(InMemory::new());
//! let docs = Sublevel::new(backend.clone(), "docs");
//! let local = Sublevel::new(backend.clone(), "local");
//!
//! let mut batch = Batch::new();
//! batch.put(&docs, "fruits", "\"can be eaten\"");
//! batch.put(&local, "note", "x");
//! batch.commit(backend.as_ref()).await?;
//!
//! assert!(docs.get(b"note").await?.is_none());
//! assert_eq!(local.get(b"note").await?, Some(b"x".to_vec()));
//! # Ok::<(), canopy::Error>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    Result,
    backend::{Backend, BatchOp, KeyRange, KvPair},
};

/// A key-prefix-isolated view of a shared engine.
#[derive(Clone)]
pub struct Sublevel {
    backend: Arc<dyn Backend>,
    name: String,
    prefix: Vec<u8>,
}

impl fmt::Debug for Sublevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sublevel").field("name", &self.name).finish()
    }
}

impl Sublevel {
    /// Create the namespace `name` on `backend`.
    ///
    /// `name` must not contain `!`.
    pub fn new(backend: Arc<dyn Backend>, name: &str) -> Self {
        let prefix = format!("!{name}!").into_bytes();
        Self {
            backend,
            name: name.to_string(),
            prefix,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Full physical key for `key` in this namespace.
    pub(crate) fn prefixed(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.backend.get(&self.prefixed(key)).await
    }

    pub async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.backend.put(&self.prefixed(key), value).await
    }

    pub async fn delete(&self, key: &[u8]) -> Result<()> {
        self.backend.delete(&self.prefixed(key)).await
    }

    /// See [`Backend::increment`].
    pub async fn increment(&self, key: &[u8]) -> Result<u64> {
        self.backend.increment(&self.prefixed(key)).await
    }

    /// Scan a range expressed in unprefixed keys; returned keys are unprefixed too.
    pub async fn scan(&self, range: &KeyRange) -> Result<Vec<KvPair>> {
        let physical = KeyRange {
            start: self.prefixed(&range.start),
            end: self.prefixed(&range.end),
            reverse: range.reverse,
            limit: range.limit,
        };
        let prefix_len = self.prefix.len();
        Ok(self
            .backend
            .scan(&physical)
            .await?
            .into_iter()
            .map(|(mut key, value)| {
                key.drain(..prefix_len);
                (key, value)
            })
            .collect())
    }
}

/// Writes collected for an atomic commit.
///
/// Only the last write to each key is kept, so a batch that deletes a subtree
/// and then rewrites part of it ends up with exactly the final state.
#[derive(Debug, Default)]
pub struct Batch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, level: &Sublevel, key: impl AsRef<[u8]>, value: impl Into<Vec<u8>>) {
        self.ops
            .insert(level.prefixed(key.as_ref()), Some(value.into()));
    }

    pub fn delete(&mut self, level: &Sublevel, key: impl AsRef<[u8]>) {
        self.ops.insert(level.prefixed(key.as_ref()), None);
    }

    /// The pending value for `key`: `Some(None)` means a pending delete.
    pub fn pending(&self, level: &Sublevel, key: impl AsRef<[u8]>) -> Option<Option<&[u8]>> {
        self.ops
            .get(&level.prefixed(key.as_ref()))
            .map(|value| value.as_deref())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOp::Put { key, value },
                None => BatchOp::Delete { key },
            })
            .collect()
    }

    /// Apply every collected write in one atomic engine write.
    pub async fn commit(self, backend: &dyn Backend) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        backend.write(self.into_ops()).await
    }
}
