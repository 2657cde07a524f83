use std::sync::Arc;

use canopy::{
    Path, Store, StoreBuilder, StoreConfig, Tree,
    backend::{Backend, database::InMemory},
    views::ScriptRuntime,
};
use serde_json::Value;

// ==========================
// CORE TEST FACTORIES
// ==========================
// Single point of change for backend matrix testing via TEST_BACKEND.

/// Creates a test engine based on the TEST_BACKEND env var.
///
/// Supported values:
/// - "inmemory" or unset: InMemory engine (default)
/// - "sqlite": SQLite in-memory engine (requires `sqlite` feature)
///
/// # Panics
/// Panics if TEST_BACKEND=sqlite but the `sqlite` feature is not enabled.
pub async fn test_backend() -> Arc<dyn Backend> {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("sqlite") => {
            #[cfg(feature = "sqlite")]
            {
                use canopy::backend::database::Sqlite;
                Arc::new(
                    Sqlite::in_memory()
                        .await
                        .expect("Failed to create SQLite backend"),
                )
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok("inmemory") | Err(_) => Arc::new(InMemory::new()),
        Ok(other) => panic!("Unknown TEST_BACKEND: {other}"),
    }
}

/// A store with default configuration and script runtime.
pub async fn test_store() -> Store {
    StoreBuilder::from_arc(test_backend().await)
        .build()
        .await
        .expect("Failed to open store")
}

/// A store running scripts through `runtime`.
pub async fn test_store_with_runtime(runtime: Arc<dyn ScriptRuntime>) -> Store {
    StoreBuilder::from_arc(test_backend().await)
        .script_runtime(runtime)
        .build()
        .await
        .expect("Failed to open store")
}

/// A store that never runs views.
pub async fn test_store_without_views() -> Store {
    StoreBuilder::from_arc(test_backend().await)
        .config(StoreConfig {
            views_enabled: false,
            ..Default::default()
        })
        .build()
        .await
        .expect("Failed to open store")
}

// ==========================
// DATA HELPERS
// ==========================

pub fn path(raw: &str) -> Path {
    Path::parse(raw)
}

pub fn tree(value: Value) -> Tree {
    Tree::from_json(&value).expect("Invalid test fragment")
}

/// The fruits fixture used across store tests.
pub fn fruits() -> Tree {
    tree(serde_json::json!({
        "fruits": {
            "_val": "can be eaten",
            "banana": { "color": "blue", "size": 15 },
        }
    }))
}

/// Copy of `tree` with every revision removed.
pub fn without_revs(tree: &Tree) -> Tree {
    let mut copy = tree.clone();
    copy.rev = None;
    for branch in copy.branches.values_mut() {
        *branch = without_revs(branch);
    }
    copy
}

/// Numeric part of the stored revision at `raw`, 0 when absent.
pub async fn rev_number(store: &Store, raw: &str) -> u64 {
    store
        .rev(&path(raw))
        .await
        .expect("Failed to read revision")
        .map_or(0, |rev| rev.number())
}

/// Every node of `tree` carries a revision starting with `prefix`.
pub fn assert_revs_prefixed(tree: &Tree, prefix: &str) {
    tree.walk(&Path::root(), |node_path, node| {
        let rev = node
            .rev
            .as_ref()
            .unwrap_or_else(|| panic!("no revision at '{node_path}'"));
        assert!(
            rev.as_str().starts_with(prefix),
            "revision {rev} at '{node_path}' does not start with {prefix}"
        );
        true
    });
}
