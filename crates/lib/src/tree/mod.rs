//! In-memory document trees and their flat key encoding.
//!
//! A [`Tree`] is one node of the document hierarchy together with everything
//! beneath it. On disk the same node is spread over several physical keys:
//!
//! | key                 | holds                              |
//! |---------------------|------------------------------------|
//! | `a/b`               | the leaf value (JSON)              |
//! | `a/b/_rev`          | the revision                       |
//! | `a/b/_del`          | the tombstone flag                 |
//! | `a/b/@map`          | the map script                     |
//! | `a/b/@map/...`      | rows emitted by the map script     |
//! | `a/b/!reduce`       | the reduce script                  |
//! | `a/b/!reduce/value` | the accumulated reduction          |
//!
//! JSON fragments use `_val`, `_rev`, `_del`, `@map` and `!reduce` object keys
//! for the same metadata:
//!
//! ```rust
//! use canopy::{Leaf, Tree};
//!
//! let tree: Tree = serde_json::from_str(
//!     r#"{"fruits": {"_val": "can be eaten", "banana": {"color": "blue", "size": 15}}}"#,
//! )?;
//! let fruits = tree.branch("fruits").unwrap();
//! assert_eq!(fruits.leaf, Leaf::String("can be eaten".into()));
//! assert_eq!(fruits.branch("banana").unwrap().branch("size").unwrap().leaf, Leaf::Number(15.0));
//! # Ok::<(), serde_json::Error>(())
//! ```

mod errors;
mod leaf;
mod path;

use std::{collections::BTreeMap, convert::Infallible};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub use errors::TreeError;
pub use leaf::Leaf;
pub use path::{Path, is_reserved};
pub(crate) use path::validate_segment;

use crate::{
    Rev,
    constants::{DELETED, MAP, REDUCE, REV, VALUE},
};

/// A document node and its subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    /// The node's own value.
    pub leaf: Leaf,
    /// Child nodes keyed by segment.
    pub branches: BTreeMap<String, Tree>,
    /// Current revision. In fragments passed to `set`/`merge`, the expected revision.
    pub rev: Option<Rev>,
    /// Whether the node is tombstoned.
    pub deleted: bool,
    /// Map script. In merge fragments, `None` leaves the stored script alone
    /// and `Some("")` removes it.
    pub map: Option<String>,
    /// Reduce script, with the same conventions as `map`.
    pub reduce: Option<String>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree holding only a leaf value.
    pub fn from_leaf(leaf: impl Into<Leaf>) -> Self {
        Self {
            leaf: leaf.into(),
            ..Self::default()
        }
    }

    /// A tombstone marker, used in merge fragments.
    pub fn tombstone() -> Self {
        Self {
            deleted: true,
            ..Self::default()
        }
    }

    pub fn with_leaf(mut self, leaf: impl Into<Leaf>) -> Self {
        self.leaf = leaf.into();
        self
    }

    pub fn with_branch(mut self, key: impl Into<String>, branch: Tree) -> Self {
        self.branches.insert(key.into(), branch);
        self
    }

    pub fn with_rev(mut self, rev: Option<Rev>) -> Self {
        self.rev = rev;
        self
    }

    pub fn with_map(mut self, script: impl Into<String>) -> Self {
        self.map = Some(script.into());
        self
    }

    pub fn with_reduce(mut self, script: impl Into<String>) -> Self {
        self.reduce = Some(script.into());
        self
    }

    pub fn branch(&self, key: &str) -> Option<&Tree> {
        self.branches.get(key)
    }

    /// Descend along `path`.
    pub fn get(&self, path: &Path) -> Option<&Tree> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.branches.get(segment))
    }

    /// Whether the node carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.leaf.is_undefined()
            && self.branches.is_empty()
            && self.rev.is_none()
            && !self.deleted
            && self.map.is_none()
            && self.reduce.is_none()
    }

    /// Find or create the node at `rel`.
    pub(crate) fn node_mut(&mut self, rel: &[String]) -> &mut Tree {
        rel.iter().fold(self, |node, segment| {
            node.branches.entry(segment.clone()).or_default()
        })
    }

    /// Visit every node once, depth first, with its absolute path.
    ///
    /// The visitor returns `false` to skip the node's descendants.
    pub fn walk<F>(&self, base: &Path, mut visit: F)
    where
        F: FnMut(&Path, &Tree) -> bool,
    {
        let _ = self.try_walk(base, &mut |path, node| Ok::<_, Infallible>(visit(path, node)));
    }

    /// Fallible form of [`Tree::walk`]; the first error stops the traversal.
    pub fn try_walk<E, F>(&self, base: &Path, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&Path, &Tree) -> Result<bool, E>,
    {
        if visit(base, self)? {
            for (key, branch) in &self.branches {
                branch.try_walk(&base.child(key.as_str()), visit)?;
            }
        }
        Ok(())
    }

    /// Every defined leaf under `base`, as (path, stored bytes).
    pub(crate) fn flatten(&self, base: &Path) -> Result<Vec<(Path, Vec<u8>)>, TreeError> {
        let mut entries = Vec::new();
        self.try_walk(base, &mut |path, node| {
            if !node.leaf.is_undefined() {
                entries.push((path.clone(), node.leaf.to_stored()?));
            }
            Ok::<_, TreeError>(true)
        })?;
        Ok(entries)
    }

    /// Check every branch key of a fragment for use as a document segment.
    pub(crate) fn validate_fragment(&self, base: &Path) -> Result<(), TreeError> {
        self.try_walk(base, &mut |path, node| {
            for key in node.branches.keys() {
                validate_segment(key).map_err(|reason| TreeError::InvalidSegment {
                    path: path.child(key.as_str()).join(),
                    segment: key.clone(),
                    reason,
                })?;
            }
            if let Leaf::Number(n) = node.leaf {
                if !n.is_finite() {
                    return Err(TreeError::NonFiniteNumber { value: n });
                }
            }
            Ok(true)
        })
    }

    /// Fold one scanned physical key into the tree.
    ///
    /// `rel` is the key split into segments relative to the tree's own path.
    pub(crate) fn insert_stored(&mut self, rel: &[String], value: &[u8]) -> Result<(), TreeError> {
        if value.is_empty() {
            return Ok(());
        }
        match classify(rel) {
            KeyKind::Value(node) => {
                self.node_mut(node).leaf = Leaf::from_stored(value)?;
            }
            KeyKind::Rev(node) => {
                self.node_mut(node).rev = Some(Rev::new(utf8(REV, value)?));
            }
            KeyKind::Deleted(node) => {
                self.node_mut(node).deleted = true;
            }
            KeyKind::MapScript(node) => {
                self.node_mut(node).map = Some(utf8(MAP, value)?);
            }
            KeyKind::ReduceScript(node) => {
                self.node_mut(node).reduce = Some(utf8(REDUCE, value)?);
            }
            KeyKind::Derived => {}
        }
        Ok(())
    }

    /// Build a tree from a JSON value.
    pub fn from_json(value: &Value) -> Result<Self, TreeError> {
        let Value::Object(object) = value else {
            return Ok(Self::from_leaf(Leaf::from_json(value)?));
        };

        let mut tree = Tree::new();
        for (key, value) in object {
            match key.as_str() {
                VALUE => tree.leaf = Leaf::from_json(value)?,
                REV => match value {
                    Value::String(rev) => tree.rev = Some(Rev::new(rev.as_str())),
                    Value::Null => {}
                    _ => return Err(invalid_metadata(REV, "expected a string")),
                },
                DELETED => {
                    tree.deleted = match value {
                        Value::Bool(b) => *b,
                        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
                        Value::Null => false,
                        _ => return Err(invalid_metadata(DELETED, "expected a boolean")),
                    }
                }
                MAP => tree.map = Some(script(MAP, value)?),
                REDUCE => tree.reduce = Some(script(REDUCE, value)?),
                _ => {
                    tree.branches.insert(key.clone(), Tree::from_json(value)?);
                }
            }
        }
        Ok(tree)
    }

    /// Mirror of [`Tree::from_json`].
    ///
    /// A node with only a leaf becomes a bare scalar; anything else becomes an object.
    pub fn to_json(&self) -> Value {
        let leaf_only = self.branches.is_empty()
            && self.rev.is_none()
            && !self.deleted
            && self.map.is_none()
            && self.reduce.is_none();
        if leaf_only {
            if let Some(value) = self.leaf.to_json() {
                return value;
            }
        }

        let mut object = Map::new();
        if let Some(value) = self.leaf.to_json() {
            object.insert(VALUE.to_string(), value);
        }
        if let Some(rev) = &self.rev {
            object.insert(REV.to_string(), Value::String(rev.to_string()));
        }
        if self.deleted {
            object.insert(DELETED.to_string(), Value::Bool(true));
        }
        if let Some(map) = &self.map {
            object.insert(MAP.to_string(), Value::String(map.clone()));
        }
        if let Some(reduce) = &self.reduce {
            object.insert(REDUCE.to_string(), Value::String(reduce.clone()));
        }
        for (key, branch) in &self.branches {
            object.insert(key.clone(), branch.to_json());
        }
        Value::Object(object)
    }
}

fn invalid_metadata(key: &str, reason: &str) -> TreeError {
    TreeError::InvalidMetadata {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn script(key: &str, value: &Value) -> Result<String, TreeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        _ => Err(invalid_metadata(key, "expected script source")),
    }
}

fn utf8(key: &str, value: &[u8]) -> Result<String, TreeError> {
    String::from_utf8(value.to_vec()).map_err(|_| invalid_metadata(key, "not valid UTF-8"))
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Tree::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// What a physical key holds, judged by its segments below a scanned node.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum KeyKind<'a> {
    /// Leaf value of the node at the given relative path.
    Value(&'a [String]),
    Rev(&'a [String]),
    Deleted(&'a [String]),
    MapScript(&'a [String]),
    ReduceScript(&'a [String]),
    /// Rows or reductions written by the view engine.
    Derived,
}

pub(crate) fn classify(rel: &[String]) -> KeyKind<'_> {
    if let Some(i) = rel.iter().position(|s| s == MAP || s == REDUCE) {
        if i + 1 < rel.len() {
            return KeyKind::Derived;
        }
        return if rel[i] == MAP {
            KeyKind::MapScript(&rel[..i])
        } else {
            KeyKind::ReduceScript(&rel[..i])
        };
    }
    match rel.split_last() {
        Some((last, node)) if last == REV => KeyKind::Rev(node),
        Some((last, node)) if last == DELETED => KeyKind::Deleted(node),
        _ => KeyKind::Value(rel),
    }
}
