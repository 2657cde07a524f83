//! Batched single-node edits.

use super::{Mutation, Store, StoreError, mutation::validate_target};
use crate::{
    Leaf, Path, Result, Rev, Tree,
    constants::{MAP, REDUCE},
};

/// One edit of a [`Store::patch`] call.
///
/// An `Undefined` leaf deletes the node. A path ending in `@map` or `!reduce`
/// replaces that script of the parent node instead, and `rev` is then checked
/// against the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    pub path: Path,
    pub rev: Option<Rev>,
    pub leaf: Leaf,
}

impl PatchOp {
    pub fn new(path: impl Into<Path>, rev: Option<Rev>, leaf: impl Into<Leaf>) -> Self {
        Self {
            path: path.into(),
            rev,
            leaf: leaf.into(),
        }
    }

    /// An op deleting `path`.
    pub fn delete(path: impl Into<Path>, rev: Option<Rev>) -> Self {
        Self::new(path, rev, Leaf::Undefined)
    }
}

/// What a validated op will do.
enum Edit<'a> {
    Leaf(&'a Leaf),
    Script { segment: &'static str, source: &'a str },
}

impl Store {
    /// Apply every op atomically.
    ///
    /// All paths, leaves and revisions are checked before anything is written;
    /// one failure rejects the whole patch. Returns the new revision of each
    /// op's node, in op order.
    pub async fn patch(&self, ops: &[PatchOp]) -> Result<Vec<Rev>> {
        let mut planned = Vec::with_capacity(ops.len());
        for op in ops {
            planned.push(plan(op)?);
        }
        for ((node, _), op) in planned.iter().zip(ops) {
            self.check_rev(node, op.rev.as_ref()).await?;
        }
        if planned.is_empty() {
            return Ok(Vec::new());
        }

        let mut mutation = Mutation::new(self.docs());
        for (node, edit) in &planned {
            match edit {
                Edit::Leaf(Leaf::Undefined) => mutation.tombstone(node),
                Edit::Leaf(leaf) => {
                    mutation.revive(node);
                    mutation.write_leaf(node, leaf)?;
                    mutation.revive_ancestors(node);
                }
                Edit::Script { segment, source } => {
                    mutation.write_script(node, segment, source);
                    let map = if *segment == MAP {
                        source.to_string()
                    } else {
                        self.stored_script(node, MAP).await?.unwrap_or_default()
                    };
                    mutation.map_changed(node, &map);
                }
            }
            mutation.touch(node);
        }

        let targets: Vec<Path> = planned.into_iter().map(|(node, _)| node).collect();
        self.commit(&targets, mutation).await
    }
}

/// Resolve the node an op addresses and check its path and leaf.
fn plan(op: &PatchOp) -> Result<(Path, Edit<'_>)> {
    let segment = match op.path.last() {
        Some(MAP) => Some(MAP),
        Some(REDUCE) => Some(REDUCE),
        _ => None,
    };
    let Some(segment) = segment else {
        validate_target(&op.path, Some(&Tree::from_leaf(op.leaf.clone())))?;
        return Ok((op.path.clone(), Edit::Leaf(&op.leaf)));
    };

    let node = op.path.parent().unwrap_or_default();
    validate_target(&node, None)?;
    let source = match &op.leaf {
        Leaf::String(source) => source.as_str(),
        Leaf::Undefined => "",
        _ => {
            return Err(StoreError::InvalidPath {
                path: op.path.join(),
                reason: "inconsistent types: scripts must be strings".to_string(),
            }
            .into());
        }
    };
    Ok((node, Edit::Script { segment, source }))
}
