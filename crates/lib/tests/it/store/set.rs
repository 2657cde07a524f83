use canopy::{Leaf, Tree};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn set_then_read_round_trips() {
    let store = test_store().await;
    store.set(&path(""), &fruits()).await.unwrap();

    let read = store.read(&path("fruits")).await.unwrap();
    assert_eq!(without_revs(&read), *fruits().branch("fruits").unwrap());
    assert_revs_prefixed(&read, "1-");
}

#[tokio::test]
async fn set_leaf_bumps_ancestors_only() {
    let store = test_store().await;
    store.set(&path(""), &fruits()).await.unwrap();

    let color_rev = store.rev(&path("fruits/banana/color")).await.unwrap();
    let size_before = store.rev(&path("fruits/banana/size")).await.unwrap();
    store
        .set(
            &path("fruits/banana/color"),
            &Tree::from_leaf("yellow").with_rev(color_rev),
        )
        .await
        .unwrap();

    let fruits = store.read(&path("fruits")).await.unwrap();
    assert!(fruits.rev.as_ref().unwrap().as_str().starts_with("2-"));
    let banana = fruits.branch("banana").unwrap();
    assert!(banana.rev.as_ref().unwrap().as_str().starts_with("2-"));
    let color = banana.branch("color").unwrap();
    assert_eq!(color.leaf, Leaf::String("yellow".into()));
    assert!(color.rev.as_ref().unwrap().as_str().starts_with("2-"));
    assert_eq!(banana.branch("size").unwrap().rev, size_before);
    assert_eq!(rev_number(&store, "").await, 2);
}

#[tokio::test]
async fn set_is_idempotent_with_returned_rev() {
    let store = test_store().await;
    let fragment = tree(json!({ "a": 1, "b": { "c": "x" } }));

    let rev = store.set(&path("doc"), &fragment).await.unwrap();
    let first = store.read(&path("doc")).await.unwrap();
    let rev2 = store
        .set(&path("doc"), &fragment.clone().with_rev(Some(rev.clone())))
        .await
        .unwrap();
    let second = store.read(&path("doc")).await.unwrap();

    assert_eq!(without_revs(&first), without_revs(&second));
    assert_eq!(rev2.number(), rev.number() + 1);
}

#[tokio::test]
async fn set_tombstones_nodes_missing_from_new_tree() {
    let store = test_store().await;
    let rev = store
        .set(&path("doc"), &tree(json!({ "keep": 1, "drop": { "deep": 2 } })))
        .await
        .unwrap();
    store
        .set(&path("doc"), &tree(json!({ "keep": 3 })).with_rev(Some(rev)))
        .await
        .unwrap();

    let doc = store.read(&path("doc")).await.unwrap();
    assert_eq!(doc.branch("keep").unwrap().leaf, Leaf::Number(3.0));
    let dropped = doc.branch("drop").unwrap();
    assert!(dropped.deleted);
    assert!(dropped.leaf.is_undefined());
    assert!(dropped.branch("deep").unwrap().deleted);
    // The lineage survives: both dropped nodes were bumped
    assert_eq!(rev_number(&store, "doc/drop").await, 2);
    assert_eq!(rev_number(&store, "doc/drop/deep").await, 2);
}

#[tokio::test]
async fn set_deleted_node_still_writes_descendants() {
    let store = test_store().await;
    store
        .set(
            &path("doc"),
            &tree(json!({ "gone": { "_del": true, "child": "still here" } })),
        )
        .await
        .unwrap();

    let gone = store.read(&path("doc/gone")).await.unwrap();
    assert!(gone.deleted);
    assert_eq!(gone.branch("child").unwrap().leaf, Leaf::String("still here".into()));
}

#[tokio::test]
async fn set_revives_tombstoned_path() {
    let store = test_store().await;
    let rev = store.set(&path("doc"), &Tree::from_leaf(1)).await.unwrap();
    let rev = store.delete(&path("doc"), Some(&rev)).await.unwrap();
    assert!(store.read(&path("doc")).await.unwrap().deleted);

    store
        .set(&path("doc"), &Tree::from_leaf(2).with_rev(Some(rev)))
        .await
        .unwrap();
    let doc = store.read(&path("doc")).await.unwrap();
    assert!(!doc.deleted);
    assert_eq!(doc.leaf, Leaf::Number(2.0));
}

#[tokio::test]
async fn set_with_stale_rev_changes_nothing() {
    let store = test_store().await;
    store.set(&path(""), &fruits()).await.unwrap();
    store.set(&path("other"), &Tree::from_leaf("x")).await.unwrap();
    let before = store.read(&path("")).await.unwrap();

    let err = store
        .set(
            &path("fruits/banana"),
            &tree(json!({ "color": "red" })).with_rev(Some("1-stale".into())),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Supplying no revision for an existing path is a conflict too
    let err = store.set(&path("fruits"), &Tree::from_leaf(1)).await.unwrap_err();
    assert!(err.is_conflict());

    assert_eq!(store.read(&path("")).await.unwrap(), before);
}

#[tokio::test]
async fn set_rejects_reserved_paths_and_keys() {
    let store = test_store().await;

    let err = store.set(&path("a/_rev"), &Tree::from_leaf(1)).await.unwrap_err();
    assert!(err.is_invalid_path());

    let err = store
        .set(&path("a"), &Tree::new().with_branch("@x", Tree::from_leaf(1)))
        .await
        .unwrap_err();
    assert!(err.is_invalid_path());

    let err = store.set(&path("a"), &Tree::from_leaf(f64::NAN)).await.unwrap_err();
    assert!(err.is_invalid_path());

    assert!(store.read(&path("a")).await.unwrap_err().is_not_found());
}
