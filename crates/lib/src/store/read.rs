//! Folding range scans back into trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ScannedKey, Store, StoreError};
use crate::{
    Path, Result, Rev, Tree,
    constants::{REDUCE, REDUCED_VALUE},
    tree::is_reserved,
};

/// Selects and orders the children returned by [`Store::rows`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowsParams {
    /// First child key to include.
    pub key_start: Option<String>,
    /// First child key to exclude.
    pub key_end: Option<String>,
    pub descending: bool,
    /// Maximum number of children; `None` or `Some(0)` means no limit.
    pub limit: Option<usize>,
}

impl RowsParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_start(mut self, key: impl Into<String>) -> Self {
        self.key_start = Some(key.into());
        self
    }

    pub fn key_end(mut self, key: impl Into<String>) -> Self {
        self.key_end = Some(key.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn contains(&self, key: &str) -> bool {
        self.key_start.as_deref().is_none_or(|start| key >= start)
            && self.key_end.as_deref().is_none_or(|end| key < end)
    }
}

/// A child tree paired with its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub tree: Tree,
}

impl Store {
    /// Read the subtree at `path`.
    ///
    /// View rows and reductions are left out unless `path` itself lies inside
    /// `@map` or `!reduce`. A tombstoned node comes back with `deleted` set.
    pub async fn read(&self, path: &Path) -> Result<Tree> {
        path.validate_readable().map_err(|err| StoreError::InvalidPath {
            path: path.join(),
            reason: err.to_string(),
        })?;

        // Inside a view the node's own key is the script, not a value.
        let skip_own = path.is_script_key();
        let scanned: Vec<ScannedKey> = self
            .scan_subtree(path)
            .await?
            .into_iter()
            .filter(|key| !(skip_own && key.rel.is_empty()))
            .collect();
        if scanned.is_empty() {
            return Err(StoreError::NotFound { path: path.join() }.into());
        }

        let mut tree = Tree::new();
        for key in &scanned {
            fold(&mut tree, key, &key.rel)?;
        }
        Ok(tree)
    }

    /// The stored revision of `path`, if it was ever written.
    pub async fn rev(&self, path: &Path) -> Result<Option<Rev>> {
        self.current_rev(path).await
    }

    /// The accumulated reduction of the view at `base`.
    ///
    /// Empty when no reduce script ran yet.
    pub async fn reduced(&self, base: &Path) -> Result<Tree> {
        match self.read(&base.child(REDUCE).child(REDUCED_VALUE)).await {
            Ok(tree) => Ok(tree),
            Err(err) if err.is_not_found() => Ok(Tree::new()),
            Err(err) => Err(err),
        }
    }

    /// The live children of `path`, ordered by key.
    pub async fn rows(&self, path: &Path, params: &RowsParams) -> Result<Vec<Tree>> {
        Ok(self
            .records(path, params)
            .await?
            .into_iter()
            .map(|record| record.tree)
            .collect())
    }

    /// Like [`Store::rows`], keeping each child's key.
    pub async fn records(&self, path: &Path, params: &RowsParams) -> Result<Vec<Record>> {
        path.validate_readable().map_err(|err| StoreError::InvalidPath {
            path: path.join(),
            reason: err.to_string(),
        })?;

        let mut children: BTreeMap<String, Tree> = BTreeMap::new();
        for key in self.scan_subtree(path).await? {
            let Some((child, rest)) = key.rel.split_first() else {
                continue;
            };
            if is_reserved(child) || !params.contains(child) {
                continue;
            }
            fold(children.entry(child.clone()).or_default(), &key, rest)?;
        }

        let mut records: Vec<Record> = children
            .into_iter()
            .filter(|(_, tree)| !tree.deleted)
            .map(|(key, tree)| Record { key, tree })
            .collect();
        if params.descending {
            records.reverse();
        }
        if let Some(limit) = params.limit.filter(|limit| *limit > 0) {
            records.truncate(limit);
        }
        Ok(records)
    }
}

fn fold(tree: &mut Tree, key: &ScannedKey, rel: &[String]) -> Result<()> {
    tree.insert_stored(rel, &key.value).map_err(|err| {
        StoreError::MalformedValue {
            key: key.key.clone(),
            reason: err.to_string(),
        }
        .into()
    })
}
