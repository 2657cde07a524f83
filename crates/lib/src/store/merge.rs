//! Partial updates that leave unmentioned nodes alone.

use super::{Mutation, Store, mutation::validate_target};
use crate::{
    Path, Result, Rev, Tree,
    constants::{MAP, REDUCE},
};

impl Store {
    /// Merge `fragment` into the subtree at `path`.
    ///
    /// Only nodes present in the fragment are touched. A node flagged
    /// `deleted` loses its value and scripts and is tombstoned; every other
    /// node is revived and gets its leaf written unless the leaf is
    /// `Undefined`. Scripts are written only when they differ from the stored
    /// ones, and an empty script removes the stored one.
    ///
    /// `fragment.rev` must match the stored revision of `path`.
    pub async fn merge(&self, path: &Path, fragment: &Tree) -> Result<Rev> {
        validate_target(path, Some(fragment))?;
        self.check_rev(path, fragment.rev.as_ref()).await?;

        let mut nodes = Vec::new();
        let mut leaves = Vec::new();
        fragment.walk(path, |node_path, node| {
            nodes.push(node_path.clone());
            if node.branches.is_empty() {
                leaves.push(node_path.clone());
            }
            true
        });

        let mut mutation = Mutation::new(self.docs());
        for node_path in nodes {
            let Some(node) = node_path.relative_to(path).and_then(|rel| fragment.get(&rel)) else {
                continue;
            };
            let current = self.current_rev(&node_path).await?;
            mutation.bump(&node_path, current);

            let stored_map = self.stored_script(&node_path, MAP).await?;
            if node.deleted {
                mutation.tombstone(&node_path);
                mutation.write_script(&node_path, REDUCE, "");
                mutation.write_script(&node_path, MAP, "");
                if stored_map.is_some() {
                    mutation.map_changed(&node_path, "");
                }
                continue;
            }

            mutation.revive(&node_path);
            if !node.leaf.is_undefined() {
                mutation.write_leaf(&node_path, &node.leaf)?;
            }

            let mut effective_map = stored_map.clone().unwrap_or_default();
            if let Some(map) = node.map.as_deref() {
                if stored_map.as_deref().unwrap_or_default() != map {
                    mutation.write_script(&node_path, MAP, map);
                    mutation.map_changed(&node_path, map);
                    effective_map = map.to_string();
                }
            }
            if let Some(reduce) = node.reduce.as_deref() {
                let stored_reduce = self.stored_script(&node_path, REDUCE).await?;
                if stored_reduce.as_deref().unwrap_or_default() != reduce {
                    mutation.write_script(&node_path, REDUCE, reduce);
                    mutation.map_changed(&node_path, &effective_map);
                }
            }
        }

        if !fragment.deleted {
            mutation.revive_ancestors(path);
        }
        for leaf in &leaves {
            mutation.touch(leaf);
        }
        self.commit_one(path, mutation).await
    }

    /// The script stored under `segment` of `path`, if any.
    pub(crate) async fn stored_script(&self, path: &Path, segment: &str) -> Result<Option<String>> {
        let key = path.meta_key(segment);
        match self.docs().get(&key).await? {
            Some(bytes) if !bytes.is_empty() => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            _ => Ok(None),
        }
    }
}
