use std::time::Duration;

use canopy::{Leaf, StoreBuilder, StoreConfig, Tree, store::PatchOp};
use serde_json::json;
use tokio::time::timeout;

use crate::helpers::*;

const BY_KIND: &str = "emit('by-kind', doc.kind._val, doc._id, doc.name._val)";
const PREFIXES: &str = "for i=1,#key do emit(key:sub(1,i), key) end";

fn food(kind: &str, name: &str) -> Tree {
    tree(json!({ "kind": kind, "name": name }))
}

#[tokio::test]
async fn map_indexes_children_and_follows_updates() {
    let store = test_store().await;
    let rev = store
        .set(
            &path("food"),
            &Tree::new()
                .with_map(BY_KIND)
                .with_branch("1", food("fruit", "apple"))
                .with_branch("2", food("tuber", "potato"))
                .with_branch("3", food("tuber", "carrot")),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();

    let view = store.read(&path("food/@map/by-kind")).await.unwrap();
    assert_eq!(view.branches.len(), 2);
    let tuber = view.branch("tuber").unwrap();
    assert_eq!(tuber.branch("2").unwrap().leaf, Leaf::String("potato".into()));
    assert_eq!(tuber.branch("3").unwrap().leaf, Leaf::String("carrot".into()));
    assert_eq!(
        view.branch("fruit").unwrap().branch("1").unwrap().leaf,
        Leaf::String("apple".into())
    );

    // A new child is indexed incrementally
    store.set(&path("food/4"), &food("tuber", "yam")).await.unwrap();
    store.flush_views().await.unwrap();
    let tuber = store.read(&path("food/@map/by-kind/tuber")).await.unwrap();
    let names: Vec<&str> = tuber.branches.values().filter_map(|t| t.leaf.as_str()).collect();
    assert_eq!(names, vec!["potato", "carrot", "yam"]);

    // Changing a child moves its row
    let apple = store.rev(&path("food/1")).await.unwrap();
    store
        .set(&path("food/1"), &food("tuber", "beet").with_rev(apple))
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    let view = store.read(&path("food/@map/by-kind")).await.unwrap();
    assert!(view.branch("fruit").is_none());
    assert_eq!(view.branch("tuber").unwrap().branches.len(), 4);

    // Views never show up as data or as children
    let food = store.read(&path("food")).await.unwrap();
    assert!(!food.branches.contains_key("@map"));
    assert_eq!(food.rev.as_ref().map(|r| r.number()), Some(rev.number() + 2));
}

#[tokio::test]
async fn prefix_map_emits_one_row_per_prefix() {
    let store = test_store().await;
    let rev = store
        .set(
            &path("eatables"),
            &tree(json!({ "apple": "red", "banana": "yellow", "cherry": "dark" })),
        )
        .await
        .unwrap();
    store
        .patch(&[PatchOp::new("eatables/@map", Some(rev), PREFIXES)])
        .await
        .unwrap();
    store.flush_views().await.unwrap();

    let rows = store.read(&path("eatables/@map")).await.unwrap();
    assert_eq!(rows.branches.len(), 5 + 6 + 6);
    for (prefix, row) in &rows.branches {
        let key = row.leaf.as_str().unwrap();
        assert!(key.starts_with(prefix.as_str()), "{prefix} -> {key}");
    }
    assert_eq!(rows.branch("ban").unwrap().leaf, Leaf::String("banana".into()));

    // Deleting a child removes exactly its rows
    let banana = store.rev(&path("eatables/banana")).await.unwrap();
    store
        .delete(&path("eatables/banana"), banana.as_ref())
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    let rows = store.read(&path("eatables/@map")).await.unwrap();
    assert_eq!(rows.branches.len(), 5 + 6);
    assert!(rows.branch("b").is_none());
    assert!(rows.branch("c").is_some());
}

#[tokio::test]
async fn replacing_the_script_rebuilds_the_view() {
    let store = test_store().await;
    let rev = store
        .set(
            &path("eatables"),
            &tree(json!({ "kiwi": "green", "plum": "purple", "@map": PREFIXES })),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert_eq!(
        store.read(&path("eatables/@map")).await.unwrap().branches.len(),
        8
    );

    let rev = store
        .patch(&[PatchOp::new("eatables/@map", Some(rev), "emit('all', key, doc._val)")])
        .await
        .unwrap()
        .remove(0);
    store.flush_views().await.unwrap();
    let rows = store.read(&path("eatables/@map")).await.unwrap();
    assert_eq!(rows.branches.len(), 1);
    assert_eq!(
        rows.branch("all").unwrap().branch("plum").unwrap().leaf,
        Leaf::String("purple".into())
    );

    // Removing the script clears every row
    store
        .patch(&[PatchOp::new("eatables/@map", Some(rev), "")])
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert!(store.read(&path("eatables/@map")).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failing_script_emits_nothing() {
    let store = test_store().await;
    store
        .set(
            &path("broken"),
            &tree(json!({ "a": 1, "@map": "error('boom')" })),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert!(store.read(&path("broken/@map")).await.unwrap_err().is_not_found());
    // The write itself succeeded
    assert_eq!(store.read(&path("broken/a")).await.unwrap().leaf, Leaf::Number(1.0));
}

#[tokio::test]
async fn numeric_row_keys_sort_by_value() {
    let store = test_store().await;
    store
        .set(
            &path("people"),
            &tree(json!({
                "ann": { "age": 9 },
                "bob": { "age": 10 },
                "cy": { "age": -2 },
                "@map": "emit('by-age', doc.age._val, key)",
            })),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();

    let by_age = store.read(&path("people/@map/by-age")).await.unwrap();
    let names: Vec<&str> = by_age.branches.values().filter_map(|t| t.leaf.as_str()).collect();
    assert_eq!(names, vec!["cy", "ann", "bob"]);
}

#[tokio::test]
async fn runaway_script_does_not_stall_other_views() {
    let store = StoreBuilder::from_arc(test_backend().await)
        .config(StoreConfig {
            script_instruction_limit: 1_000_000,
            ..Default::default()
        })
        .build()
        .await
        .unwrap();
    store
        .set(&path("bad"), &tree(json!({ "a": 1, "@map": "while true do end" })))
        .await
        .unwrap();
    store
        .set(&path("good"), &tree(json!({ "a": 1, "b": 2, "@map": "emit(key, 1)" })))
        .await
        .unwrap();

    // Writes go through while the worker is busy with the script
    let write = timeout(Duration::from_secs(10), store.set(&path("other"), &Tree::from_leaf(1))).await;
    assert!(write.expect("write blocked behind a view script").is_ok());

    timeout(Duration::from_secs(30), store.flush_views())
        .await
        .expect("view engine stalled")
        .unwrap();

    let good = store.read(&path("good/@map")).await.unwrap();
    assert_eq!(good.branch("a").unwrap().leaf, Leaf::Number(1.0));
    assert_eq!(good.branch("b").unwrap().leaf, Leaf::Number(1.0));
    assert!(store.read(&path("bad/@map")).await.unwrap_err().is_not_found());
}
