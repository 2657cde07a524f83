//!
//! Canopy: a hierarchical, revisioned document store.
//! This library turns a flat ordered key-value engine into a versioned tree of
//! JSON-like documents with incrementally maintained map/reduce views.
//!
//! ## Core Concepts
//!
//! * **Paths (`tree::Path`)**: Slash-separated segment lists addressing nodes. The empty path is the root.
//! * **Trees (`tree::Tree`)**: A node's leaf value, children, revision, tombstone flag and view scripts.
//! * **Revisions (`rev::Rev`)**: `"<N>-<suffix>"` stamps used for optimistic concurrency. Every write bumps
//!   the revision of the written node and of all its ancestors.
//! * **Backends (`backend::Backend`)**: The pluggable ordered key-value engine underneath.
//! * **Sublevels (`sublevel::Sublevel`)**: Key-prefix namespaces sharing one engine, written together through
//!   atomic batches.
//! * **Store (`store::Store`)**: The handle exposing `set`, `merge`, `patch`, `delete`, `read`, `rows` and
//!   `records`.
//! * **Views (`views`)**: Map scripts installed on a node run once per child document and write derived rows
//!   under `<node>/@map`; reduce scripts fold those rows into `<node>/!reduce/value`.
//! * **Replication (`replication`)**: Revision listings and diffs between two stores or subtrees.

pub mod backend;
pub mod collate;
pub mod constants;
pub mod replication;
pub mod rev;
pub mod store;
pub mod sublevel;
pub mod tree;
pub mod views;

pub use rev::Rev;
pub use store::{Store, StoreBuilder, StoreConfig, WeakStore};
pub use tree::{Leaf, Path, Tree};

/// Result type used throughout the canopy library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the canopy library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured store errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured storage engine errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),

    /// Structured data model errors from the tree module
    #[error(transparent)]
    Tree(tree::TreeError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Store(_) => "store",
            Error::Backend(_) => "backend",
            Error::Tree(_) => "tree",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error is a revision mismatch.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error indicates a path holds nothing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error rejects a path, fragment or patch.
    pub fn is_invalid_path(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_invalid_path(),
            Error::Tree(tree_err) => tree_err.is_invalid_path() || tree_err.is_invalid_data(),
            _ => false,
        }
    }

    /// Check if this error comes from the storage engine.
    pub fn is_storage_error(&self) -> bool {
        match self {
            Error::Io(_) | Error::Backend(_) => true,
            Error::Store(store_err) => store_err.is_malformed(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }
}
