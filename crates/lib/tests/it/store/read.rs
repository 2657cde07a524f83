use canopy::{Leaf, Tree, store::RowsParams};
use serde_json::json;

use crate::helpers::*;

async fn letters() -> canopy::Store {
    let store = test_store_without_views().await;
    store
        .set(
            &path("letters"),
            &tree(json!({
                "a": 1,
                "b": { "_val": 2, "nested": { "deep": true } },
                "c": 3,
                "d": 4,
                "@map": "emit(key, 1)",
            })),
        )
        .await
        .unwrap();
    store
}

fn keys(trees: &[canopy::store::Record]) -> Vec<&str> {
    trees.iter().map(|record| record.key.as_str()).collect()
}

#[tokio::test]
async fn read_missing_path_is_not_found() {
    let store = test_store().await;
    let err = store.read(&path("nothing/here")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.rev(&path("nothing/here")).await.unwrap(), None);
}

#[tokio::test]
async fn read_rejects_metadata_paths() {
    let store = test_store().await;
    store.set(&path(""), &fruits()).await.unwrap();
    assert!(store.read(&path("fruits/_rev")).await.unwrap_err().is_invalid_path());
    assert!(store.read(&path("fruits/_val")).await.unwrap_err().is_invalid_path());
}

#[tokio::test]
async fn read_does_not_confuse_prefix_siblings() {
    let store = test_store().await;
    store.set(&path("fruits"), &Tree::from_leaf("a")).await.unwrap();
    store.set(&path("fruits-old"), &Tree::from_leaf("b")).await.unwrap();
    store.set(&path("fruitsalad"), &Tree::from_leaf("c")).await.unwrap();

    let fruits = store.read(&path("fruits")).await.unwrap();
    assert_eq!(fruits.leaf, Leaf::String("a".into()));
    assert!(fruits.branches.is_empty());
}

#[tokio::test]
async fn read_includes_scripts_but_not_rows() {
    let store = letters().await;
    let letters = store.read(&path("letters")).await.unwrap();
    assert_eq!(letters.map.as_deref(), Some("emit(key, 1)"));
    assert!(!letters.branches.contains_key("@map"));
    assert_eq!(letters.branches.len(), 4);
}

#[tokio::test]
async fn rows_are_children_in_key_order() {
    let store = letters().await;
    let records = store.records(&path("letters"), &RowsParams::new()).await.unwrap();
    assert_eq!(keys(&records), vec!["a", "b", "c", "d"]);

    let b = &records[1].tree;
    assert_eq!(b.leaf, Leaf::Number(2.0));
    assert_eq!(
        b.branch("nested").unwrap().branch("deep").unwrap().leaf,
        Leaf::Bool(true)
    );

    let rows = store.rows(&path("letters"), &RowsParams::new()).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].leaf, Leaf::Number(1.0));
}

#[tokio::test]
async fn rows_honour_range_order_and_limit() {
    let store = letters().await;
    let letters = path("letters");

    let records = store
        .records(&letters, &RowsParams::new().key_start("b").key_end("d"))
        .await
        .unwrap();
    assert_eq!(keys(&records), vec!["b", "c"]);

    let records = store
        .records(&letters, &RowsParams::new().descending().limit(3))
        .await
        .unwrap();
    assert_eq!(keys(&records), vec!["d", "c", "b"]);

    let records = store
        .records(&letters, &RowsParams::new().limit(0))
        .await
        .unwrap();
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn rows_of_empty_path_is_empty() {
    let store = test_store().await;
    let rows = store.rows(&path("empty"), &RowsParams::new()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn reduced_is_empty_without_a_reduction() {
    let store = letters().await;
    assert!(store.reduced(&path("letters")).await.unwrap().is_empty());
}
