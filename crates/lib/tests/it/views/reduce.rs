use canopy::{Leaf, Tree};
use serde_json::json;

use crate::helpers::*;

const COUNT: &str = "if directive == 'add' then return (current or 0) + 1 else return (current or 0) - 1 end";
const TOTALS: &str = r#"
local totals = current or {}
local sign = directive == 'add' and 1 or -1
local kind = row.path[2]
totals[kind] = (totals[kind] or 0) + sign * row.value
return totals
"#;

#[tokio::test]
async fn reduce_counts_rows_incrementally() {
    let store = test_store().await;
    store
        .set(
            &path("food"),
            &tree(json!({
                "1": { "kind": "fruit" },
                "2": { "kind": "tuber" },
                "3": { "kind": "tuber" },
                "@map": "emit('by-kind', doc.kind._val, key, 1)",
                "!reduce": COUNT,
            })),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert_eq!(store.reduced(&path("food")).await.unwrap().leaf, Leaf::Number(3.0));

    store
        .set(&path("food/4"), &tree(json!({ "kind": "fruit" })))
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert_eq!(store.reduced(&path("food")).await.unwrap().leaf, Leaf::Number(4.0));

    let two = store.rev(&path("food/2")).await.unwrap();
    store.delete(&path("food/2"), two.as_ref()).await.unwrap();
    store.flush_views().await.unwrap();
    assert_eq!(store.reduced(&path("food")).await.unwrap().leaf, Leaf::Number(3.0));

    // Editing a child removes then re-adds its row
    let one = store.rev(&path("food/1")).await.unwrap();
    store
        .set(&path("food/1"), &tree(json!({ "kind": "tuber" })).with_rev(one))
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert_eq!(store.reduced(&path("food")).await.unwrap().leaf, Leaf::Number(3.0));
}

#[tokio::test]
async fn reduce_can_build_a_tree() {
    let store = test_store().await;
    store
        .set(
            &path("stock"),
            &tree(json!({
                "a": { "kind": "fruit", "qty": 3 },
                "b": { "kind": "tuber", "qty": 5 },
                "c": { "kind": "fruit", "qty": 4 },
                "@map": "emit('qty', doc.kind._val, key, doc.qty._val)",
                "!reduce": TOTALS,
            })),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();

    let totals = store.reduced(&path("stock")).await.unwrap();
    assert_eq!(totals.branch("fruit").unwrap().leaf, Leaf::Number(7.0));
    assert_eq!(totals.branch("tuber").unwrap().leaf, Leaf::Number(5.0));

    let c = store.rev(&path("stock/c")).await.unwrap();
    store.delete(&path("stock/c"), c.as_ref()).await.unwrap();
    store.flush_views().await.unwrap();
    let totals = store.reduced(&path("stock")).await.unwrap();
    assert_eq!(totals.branch("fruit").unwrap().leaf, Leaf::Number(3.0));
}

#[tokio::test]
async fn reduction_is_visible_under_the_script_path() {
    let store = test_store().await;
    store
        .set(
            &path("n"),
            &tree(json!({ "x": 1, "@map": "emit(key, 1)", "!reduce": COUNT })),
        )
        .await
        .unwrap();
    store.flush_views().await.unwrap();

    let reduce = store.read(&path("n/!reduce")).await.unwrap();
    assert_eq!(reduce.branch("value").unwrap().leaf, Leaf::Number(1.0));

    // Removing the map clears the reduction on the next rebuild
    let rev = store.rev(&path("n")).await.unwrap();
    store
        .merge(&path("n"), &Tree::new().with_map("").with_rev(rev))
        .await
        .unwrap();
    store.flush_views().await.unwrap();
    assert!(store.reduced(&path("n")).await.unwrap().is_empty());
}
