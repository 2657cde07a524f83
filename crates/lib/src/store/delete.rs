//! Subtree deletion.

use std::collections::{BTreeMap, BTreeSet};

use super::{Mutation, Store, mutation::validate_target};
use crate::{
    Path, Result, Rev,
    tree::{KeyKind, classify},
};

impl Store {
    /// Delete the subtree at `path`.
    ///
    /// Values, scripts and derived view data are removed. Every node keeps its
    /// `_rev`; nodes not already tombstoned are tombstoned and bumped, so
    /// replicas can tell a deletion from a node they never saw. The target is
    /// always tombstoned, even when nothing was stored there.
    pub async fn delete(&self, path: &Path, rev: Option<&Rev>) -> Result<Rev> {
        validate_target(path, None)?;
        self.check_rev(path, rev).await?;

        let mut mutation = Mutation::new(self.docs());
        let mut revs: BTreeMap<Path, Rev> = BTreeMap::new();
        let mut tombstoned = BTreeSet::new();

        for scanned in self.scan_subtree(path).await? {
            match classify(&scanned.rel) {
                KeyKind::Rev(node) => {
                    let rev = String::from_utf8_lossy(&scanned.value).into_owned();
                    revs.insert(path.descendant(node), Rev::new(rev));
                }
                KeyKind::Deleted(node) => {
                    tombstoned.insert(path.descendant(node));
                }
                KeyKind::MapScript(node) => {
                    mutation.delete_key(&scanned.key);
                    mutation.map_changed(&path.descendant(node), "");
                }
                _ => mutation.delete_key(&scanned.key),
            }
        }

        for (node, current) in revs {
            if node != *path && tombstoned.contains(&node) {
                continue;
            }
            mutation.tombstone(&node);
            mutation.bump(&node, Some(current));
        }
        mutation.tombstone(path);
        mutation.touch(path);
        self.commit_one(path, mutation).await
    }
}
