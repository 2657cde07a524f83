//! Revision listings for replicating subtrees between stores.
//!
//! A replica asks its peer for [`Store::all_revs`] of a subtree, then feeds
//! the listing to its own [`Store::revs_diff`] to learn which nodes it lacks
//! or has diverged on. Paths in both are relative to the subtree root, so two
//! differently named subtrees can be compared. [`Replicator::last_seq`] tells
//! a peer whether anything below the subtree moved since it last looked.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Path, Result, Rev, Store,
    store::Change,
    tree::{KeyKind, classify},
};

/// A node and its revision, relative to a scanned subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRev {
    pub path: Path,
    pub rev: Rev,
}

/// A node both sides changed the same number of times, differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevConflict {
    pub path: Path,
    pub local: Rev,
    pub remote: Rev,
}

/// Result of comparing a remote listing with the local subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevsDiff {
    /// Nodes absent locally or behind the remote revision.
    pub missing: Vec<Path>,
    pub conflicts: Vec<RevConflict>,
}

impl RevsDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.conflicts.is_empty()
    }
}

impl Store {
    /// Every revision strictly below `path`, in key order.
    ///
    /// View rows and reductions carry no revisions and are never listed.
    pub async fn all_revs(&self, path: &Path) -> Result<Vec<PathRev>> {
        let mut revs = Vec::new();
        for scanned in self.scan_subtree(path).await? {
            if let KeyKind::Rev(node) = classify(&scanned.rel) {
                if node.is_empty() {
                    continue;
                }
                revs.push(PathRev {
                    path: Path::from_segments(node.iter().cloned()),
                    rev: Rev::new(String::from_utf8_lossy(&scanned.value).into_owned()),
                });
            }
        }
        Ok(revs)
    }

    /// Compare a remote listing against the subtree at `path`.
    pub async fn revs_diff(&self, path: &Path, remote: &[PathRev]) -> Result<RevsDiff> {
        let local: BTreeMap<Path, Rev> = self
            .all_revs(path)
            .await?
            .into_iter()
            .map(|entry| (entry.path, entry.rev))
            .collect();

        let mut diff = RevsDiff::default();
        for entry in remote {
            match local.get(&entry.path) {
                None => diff.missing.push(entry.path.clone()),
                Some(rev) if rev.number() < entry.rev.number() => diff.missing.push(entry.path.clone()),
                Some(rev) if rev.number() == entry.rev.number() && rev != &entry.rev => {
                    diff.conflicts.push(RevConflict {
                        path: entry.path.clone(),
                        local: rev.clone(),
                        remote: entry.rev.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(diff)
    }

    /// A [`Replicator`] scoped to `path`.
    pub fn replicator(&self, path: impl Into<Path>) -> Replicator {
        Replicator::new(self.clone(), path)
    }
}

/// One side of a replication session, bound to a subtree.
#[derive(Debug, Clone)]
pub struct Replicator {
    store: Store,
    path: Path,
}

impl Replicator {
    pub fn new(store: Store, path: impl Into<Path>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn all_revs(&self) -> Result<Vec<PathRev>> {
        self.store.all_revs(&self.path).await
    }

    pub async fn revs_diff(&self, remote: &[PathRev]) -> Result<RevsDiff> {
        self.store.revs_diff(&self.path, remote).await
    }

    /// Changes below this subtree after `since`, relative to it.
    pub async fn changes(&self, since: u64) -> Result<Vec<Change>> {
        self.store.changes_at(&self.path, since).await
    }

    /// Sequence of the last change below this subtree.
    pub async fn last_seq(&self) -> Result<u64> {
        self.store.last_seq_at(&self.path).await
    }

    /// What this side lacks compared to `source`.
    pub async fn diff_from(&self, source: &Replicator) -> Result<RevsDiff> {
        let remote = source.all_revs().await?;
        self.revs_diff(&remote).await
    }
}
