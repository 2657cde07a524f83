//! Physical edits prepared by a mutation before commit.

use std::collections::{BTreeMap, BTreeSet};

use super::StoreError;
use crate::{
    Leaf, Path, Result, Rev, Tree,
    constants::{DELETED, TOMBSTONE},
    sublevel::{Batch, Sublevel},
    tree::TreeError,
};

/// Reject a write target, and the fragment written there, before any I/O.
pub(crate) fn validate_target(path: &Path, fragment: Option<&Tree>) -> Result<()> {
    let invalid = |err: TreeError| StoreError::InvalidPath {
        path: path.join(),
        reason: err.to_string(),
    };
    path.validate_writable().map_err(invalid)?;
    if let Some(fragment) = fragment {
        fragment.validate_fragment(path).map_err(invalid)?;
    }
    Ok(())
}

/// Everything one Set/Merge/Patch/Delete will write.
///
/// Revisions are only collected here; the store turns them into `_rev`
/// writes when committing, after adding the targets' ancestors.
pub(crate) struct Mutation {
    docs: Sublevel,
    pub(crate) batch: Batch,
    /// Node to bump, with its revision before the mutation.
    pub(crate) revs: BTreeMap<Path, Option<Rev>>,
    /// Nodes whose map script changed, with the new script (empty when removed).
    pub(crate) map_changes: BTreeMap<Path, String>,
    /// Documents whose content changed, for ancestor map triggers.
    pub(crate) touched: BTreeSet<Path>,
}

impl Mutation {
    pub(crate) fn new(docs: &Sublevel) -> Self {
        Self {
            docs: docs.clone(),
            batch: Batch::new(),
            revs: BTreeMap::new(),
            map_changes: BTreeMap::new(),
            touched: BTreeSet::new(),
        }
    }

    /// Mark `path` for a revision bump. The first known current revision wins.
    pub(crate) fn bump(&mut self, path: &Path, current: Option<Rev>) {
        self.revs.entry(path.clone()).or_insert(current);
    }

    pub(crate) fn is_bumped(&self, path: &Path) -> bool {
        self.revs.contains_key(path)
    }

    pub(crate) fn write_leaf(&mut self, path: &Path, leaf: &Leaf) -> Result<()> {
        if leaf.is_undefined() {
            self.batch.delete(&self.docs, path.key());
        } else {
            self.batch.put(&self.docs, path.key(), leaf.to_stored()?);
        }
        Ok(())
    }

    pub(crate) fn delete_key(&mut self, key: &str) {
        self.batch.delete(&self.docs, key);
    }

    /// Remove the node's value and mark it deleted.
    pub(crate) fn tombstone(&mut self, path: &Path) {
        self.batch.delete(&self.docs, path.key());
        self.batch.put(&self.docs, path.meta_key(DELETED), TOMBSTONE);
    }

    /// Clear the node's tombstone.
    pub(crate) fn revive(&mut self, path: &Path) {
        self.batch.delete(&self.docs, path.meta_key(DELETED));
    }

    /// Clear tombstones on every strict ancestor of `path`.
    pub(crate) fn revive_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            self.revive(&ancestor);
        }
    }

    /// Write or remove (when empty) the script stored under `segment`.
    pub(crate) fn write_script(&mut self, path: &Path, segment: &str, script: &str) {
        if script.is_empty() {
            self.batch.delete(&self.docs, path.meta_key(segment));
        } else {
            self.batch.put(&self.docs, path.meta_key(segment), script);
        }
    }

    pub(crate) fn map_changed(&mut self, path: &Path, script: &str) {
        self.map_changes.insert(path.clone(), script.to_string());
    }

    pub(crate) fn touch(&mut self, path: &Path) {
        self.touched.insert(path.clone());
    }
}
