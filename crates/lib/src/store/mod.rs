//! The document store handle and its mutation protocol.
//!
//! [`Store`] is a cheap-to-clone handle over shared state. All document
//! operations go through it:
//!
//! - [`Store::set`], [`Store::merge`], [`Store::patch`] and [`Store::delete`]
//!   check revisions, build one atomic batch and cascade revision bumps to
//!   every ancestor of the target
//! - [`Store::read`], [`Store::rows`] and [`Store::records`] fold range scans
//!   back into trees
//!
//! After each committed mutation the view engine is notified in the
//! background; [`Store::flush_views`] waits for it to catch up.

mod changes;
mod config;
mod delete;
mod errors;
mod merge;
mod mutation;
mod patch;
mod read;
mod set;

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use tracing::debug;

pub use changes::Change;
pub use config::{DEFAULT_INSTRUCTION_LIMIT, StoreConfig};
pub use errors::StoreError;
pub(crate) use mutation::Mutation;
pub use patch::PatchOp;
pub use read::{Record, RowsParams};

use crate::{
    Error, Path, Result, Rev,
    backend::{Backend, KeyRange},
    constants::{DOCS_NAMESPACE, LOCAL_NAMESPACE, REV, SCAN_SENTINEL, SEQ_NAMESPACE},
    sublevel::Sublevel,
    views::{ScriptRuntime, ViewCommand, ViewEngine},
};

struct StoreInner {
    backend: Arc<dyn Backend>,
    docs: Sublevel,
    local: Sublevel,
    seqs: Sublevel,
    config: StoreConfig,
    runtime: Arc<dyn ScriptRuntime>,
    views: Option<ViewEngine>,
}

/// Handle to a document store.
///
/// Cloning is cheap; every clone shares the same engine, configuration and
/// view worker. The worker stops once the last handle is dropped.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// A non-owning handle, used by the background view worker.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    /// Upgrade to a full handle if the store is still alive.
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Configures and opens a [`Store`].
pub struct StoreBuilder {
    backend: Arc<dyn Backend>,
    config: StoreConfig,
    runtime: Option<Arc<dyn ScriptRuntime>>,
}

impl StoreBuilder {
    pub fn new(backend: impl Backend) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Use an engine that is already shared.
    ///
    /// Several stores may be open on one engine at once; sequence numbers are
    /// reserved through the engine, so their change feeds never collide.
    pub fn from_arc(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            config: StoreConfig::default(),
            runtime: None,
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default script runtime.
    pub fn script_runtime(mut self, runtime: Arc<dyn ScriptRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Open the store and start its view worker.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<Store> {
        let docs = Sublevel::new(self.backend.clone(), DOCS_NAMESPACE);
        let local = Sublevel::new(self.backend.clone(), LOCAL_NAMESPACE);
        let seqs = Sublevel::new(self.backend.clone(), SEQ_NAMESPACE);
        let last_seq = changes::load_update_seq(&seqs).await?;
        changes::seed_counter(&local, last_seq).await?;
        let config = self.config;
        let runtime = self
            .runtime
            .unwrap_or_else(|| crate::views::default_runtime(&config));

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            let views = config.views_enabled.then(|| {
                ViewEngine::spawn(WeakStore {
                    inner: weak.clone(),
                })
            });
            StoreInner {
                backend: self.backend,
                docs,
                local,
                seqs,
                config,
                runtime,
                views,
            }
        });

        debug!(update_seq = last_seq, "opened store");
        Ok(Store { inner })
    }
}

impl Store {
    /// Open a store with the default configuration.
    pub async fn open(backend: impl Backend) -> Result<Self> {
        StoreBuilder::new(backend).build().await
    }

    pub fn builder(backend: impl Backend) -> StoreBuilder {
        StoreBuilder::new(backend)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The underlying engine, e.g. to downcast and snapshot an `InMemory`.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Wait until every view update queued so far has been applied.
    pub async fn flush_views(&self) -> Result<()> {
        match &self.inner.views {
            Some(views) => views.flush().await,
            None => Ok(()),
        }
    }

    pub(crate) fn docs(&self) -> &Sublevel {
        &self.inner.docs
    }

    pub(crate) fn local(&self) -> &Sublevel {
        &self.inner.local
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn ScriptRuntime> {
        &self.inner.runtime
    }

    /// The stored revision of `path`.
    pub(crate) async fn current_rev(&self, path: &Path) -> Result<Option<Rev>> {
        let key = path.meta_key(REV);
        match self.docs().get(&key).await? {
            Some(bytes) => Ok(Some(Rev::new(utf8_key(&key, bytes)?))),
            None => Ok(None),
        }
    }

    /// Compare the caller's expected revision with the stored one.
    ///
    /// Passes when both are absent or both are equal.
    pub(crate) async fn check_rev(&self, path: &Path, expected: Option<&Rev>) -> Result<Option<Rev>> {
        let current = self.current_rev(path).await?;
        if current.as_ref() != expected {
            return Err(StoreError::Conflict {
                path: path.join(),
                expected: expected.cloned(),
                current,
            }
            .into());
        }
        Ok(current)
    }

    /// Every key in the subtree at `path`, split relative to it.
    pub(crate) async fn scan_subtree(&self, path: &Path) -> Result<Vec<ScannedKey>> {
        let (start, end) = path.subtree_range();
        self.scan_keys(path, KeyRange::new(start, end)).await
    }

    pub(crate) async fn scan_keys(&self, path: &Path, range: KeyRange) -> Result<Vec<ScannedKey>> {
        let mut scanned = Vec::new();
        for (key, value) in self.docs().scan(&range).await? {
            let key = utf8_key(&key, key.clone())?;
            if let Some(rel) = path.relative_key(&key) {
                scanned.push(ScannedKey { rel, key, value });
            }
        }
        Ok(scanned)
    }

    /// Bump revisions, record the change and commit a prepared mutation.
    ///
    /// Every target and every strict ancestor of a target is bumped in addition
    /// to whatever the mutation already marked. Returns the new revision of each
    /// target, in order.
    pub(crate) async fn commit(&self, targets: &[Path], mut mutation: Mutation) -> Result<Vec<Rev>> {
        for target in targets {
            for path in target.ancestors().iter().chain(std::iter::once(target)) {
                if !mutation.is_bumped(path) {
                    let current = self.current_rev(path).await?;
                    mutation.bump(path, current);
                }
            }
        }

        let suffix_len = self.inner.config.revision_suffix_len;
        let mut new_revs = BTreeMap::new();
        for (path, current) in &mutation.revs {
            let rev = Rev::bump(current.as_ref(), suffix_len);
            mutation
                .batch
                .put(self.docs(), path.meta_key(REV), rev.as_str());
            new_revs.insert(path.clone(), rev);
        }

        let seq = changes::reserve_seq(self.local()).await?;
        let change = Change {
            seq,
            revs: new_revs
                .iter()
                .map(|(path, rev)| (path.clone(), rev.clone()))
                .collect(),
        };
        mutation.batch.put(
            &self.inner.seqs,
            changes::seq_key(seq),
            serde_json::to_vec(&change)?,
        );

        let writes = mutation.batch.len();
        let Mutation {
            batch,
            map_changes,
            touched,
            ..
        } = mutation;
        batch.commit(self.inner.backend.as_ref()).await?;
        debug!(seq, writes, targets = ?targets.iter().map(Path::join).collect::<Vec<_>>(), "committed mutation");

        for (base, script) in map_changes {
            self.notify_views(ViewCommand::RecomputeChildren { base, script });
        }
        if !touched.is_empty() {
            self.notify_views(ViewCommand::DocumentsChanged {
                paths: touched.into_iter().collect(),
            });
        }

        targets
            .iter()
            .map(|target| {
                new_revs.get(target).cloned().ok_or_else(|| -> Error {
                    StoreError::NotFound {
                        path: target.join(),
                    }
                    .into()
                })
            })
            .collect()
    }

    /// [`Store::commit`] for a single target.
    pub(crate) async fn commit_one(&self, target: &Path, mutation: Mutation) -> Result<Rev> {
        let mut revs = self.commit(std::slice::from_ref(target), mutation).await?;
        revs.pop().ok_or_else(|| {
            StoreError::NotFound {
                path: target.join(),
            }
            .into()
        })
    }

    fn notify_views(&self, command: ViewCommand) {
        if let Some(views) = &self.inner.views {
            views.send(command);
        }
    }
}

/// One physical key found under a scanned path.
#[derive(Debug)]
pub(crate) struct ScannedKey {
    /// Segments below the scanned path.
    pub rel: Vec<String>,
    /// Full physical key (without namespace prefix).
    pub key: String,
    pub value: Vec<u8>,
}

fn utf8_key(key: &[u8], bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        StoreError::MalformedValue {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Exclusive upper bound for keys starting with `prefix`.
pub(crate) fn prefix_end(prefix: &str) -> Vec<u8> {
    let mut end = prefix.as_bytes().to_vec();
    end.push(SCAN_SENTINEL);
    end
}
