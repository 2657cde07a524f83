//! Full replacement of a subtree.

use std::collections::{BTreeMap, BTreeSet};

use super::{Mutation, Store, mutation::validate_target};
use crate::{
    Error, Path, Result, Rev, Tree,
    constants::{MAP, REDUCE},
    tree::{KeyKind, classify},
};

impl Store {
    /// Replace everything at `path` with `tree`.
    ///
    /// `tree.rev` must equal the stored revision of `path` (both absent for a
    /// path that was never written). Nodes that existed before and are missing
    /// from `tree` are tombstoned, so their revision lineage survives. Nodes of
    /// `tree` flagged `deleted` are tombstoned while their descendants are
    /// still written.
    ///
    /// Returns the new revision of `path`.
    pub async fn set(&self, path: &Path, tree: &Tree) -> Result<Rev> {
        validate_target(path, Some(tree))?;
        self.check_rev(path, tree.rev.as_ref()).await?;

        let mut mutation = Mutation::new(self.docs());
        let mut existing: BTreeMap<Path, Rev> = BTreeMap::new();
        let mut tombstoned = BTreeSet::new();
        let mut old_maps = BTreeSet::new();

        for scanned in self.scan_subtree(path).await? {
            match classify(&scanned.rel) {
                KeyKind::Rev(node) => {
                    let rev = String::from_utf8_lossy(&scanned.value).into_owned();
                    existing.insert(path.descendant(node), Rev::new(rev));
                }
                KeyKind::Deleted(node) => {
                    tombstoned.insert(path.descendant(node));
                }
                KeyKind::MapScript(node) => {
                    old_maps.insert(path.descendant(node));
                    mutation.delete_key(&scanned.key);
                }
                _ => mutation.delete_key(&scanned.key),
            }
        }

        let mut written = BTreeSet::new();
        tree.try_walk(path, &mut |node_path, node| {
            written.insert(node_path.clone());
            mutation.bump(node_path, existing.get(node_path).cloned());
            if node.deleted {
                mutation.tombstone(node_path);
            } else {
                mutation.revive(node_path);
                mutation.write_leaf(node_path, &node.leaf)?;
            }
            if let Some(script) = node.reduce.as_deref().filter(|s| !s.is_empty()) {
                mutation.write_script(node_path, REDUCE, script);
            }
            if let Some(script) = node.map.as_deref().filter(|s| !s.is_empty()) {
                mutation.write_script(node_path, MAP, script);
                mutation.map_changed(node_path, script);
            }
            Ok::<_, Error>(true)
        })?;

        for (node_path, current) in existing {
            if written.contains(&node_path) || tombstoned.contains(&node_path) {
                continue;
            }
            mutation.tombstone(&node_path);
            mutation.bump(&node_path, Some(current));
        }
        for node_path in old_maps {
            if !mutation.map_changes.contains_key(&node_path) {
                mutation.map_changed(&node_path, "");
            }
        }

        if !tree.deleted {
            mutation.revive_ancestors(path);
        }
        mutation.touch(path);
        self.commit_one(path, mutation).await
    }
}
