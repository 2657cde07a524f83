use canopy::{Tree, replication::PathRev};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn empty_subtree_misses_everything() {
    let store = test_store().await;
    store
        .set(
            &path(""),
            &tree(json!({ "sub1": { "1": { "ok": true }, "2": { "ok": true } }, "sub2": {} })),
        )
        .await
        .unwrap();

    let all = store.all_revs(&path("")).await.unwrap();
    assert!(all.iter().all(|entry| !entry.path.is_root()));
    assert!(all.iter().any(|entry| entry.path == path("sub1/2/ok")));

    let remote = store.all_revs(&path("sub1")).await.unwrap();
    let remote_paths: Vec<String> = remote.iter().map(|entry| entry.path.join()).collect();
    assert_eq!(remote_paths, vec!["1", "1/ok", "2", "2/ok"]);

    let diff = store.revs_diff(&path("sub2"), &remote).await.unwrap();
    assert_eq!(diff.missing, remote.iter().map(|e| e.path.clone()).collect::<Vec<_>>());
    assert!(diff.conflicts.is_empty());
}

#[tokio::test]
async fn identical_subtrees_have_no_diff() {
    let store = test_store().await;
    store.set(&path("a"), &tree(json!({ "x": 1 }))).await.unwrap();

    let local = store.replicator("a");
    let diff = local.diff_from(&local).await.unwrap();
    assert!(diff.is_empty());
}

#[tokio::test]
async fn lower_local_revision_is_missing() {
    let source = test_store().await;
    let target = test_store().await;
    source.set(&path("doc"), &Tree::from_leaf(1)).await.unwrap();
    target.set(&path("doc"), &Tree::from_leaf(1)).await.unwrap();

    let rev = source.rev(&path("doc")).await.unwrap();
    source.set(&path("doc"), &Tree::from_leaf(2).with_rev(rev)).await.unwrap();

    let diff = target
        .replicator("")
        .diff_from(&source.replicator(""))
        .await
        .unwrap();
    assert_eq!(diff.missing, vec![path("doc")]);

    // The other way around nothing is missing: the target is behind
    let diff = source
        .replicator("")
        .diff_from(&target.replicator(""))
        .await
        .unwrap();
    assert!(diff.missing.is_empty());
}

#[tokio::test]
async fn equal_numbers_with_different_suffixes_conflict() {
    let store = test_store().await;
    store.set(&path("doc"), &Tree::from_leaf(1)).await.unwrap();
    let local = store.rev(&path("doc")).await.unwrap().unwrap();
    let remote = PathRev {
        path: path("doc"),
        rev: format!("{}-different", local.number()).into(),
    };

    let diff = store.revs_diff(&path(""), &[remote.clone()]).await.unwrap();
    assert!(diff.missing.is_empty());
    assert_eq!(diff.conflicts.len(), 1);
    assert_eq!(diff.conflicts[0].local, local);
    assert_eq!(diff.conflicts[0].remote, remote.rev);
}

#[tokio::test]
async fn deleted_nodes_are_still_listed() {
    let store = test_store().await;
    let rev = store.set(&path("d/x"), &Tree::from_leaf(1)).await.unwrap();
    store.delete(&path("d/x"), Some(&rev)).await.unwrap();

    let revs = store.all_revs(&path("d")).await.unwrap();
    assert_eq!(revs.len(), 1);
    assert_eq!(revs[0].path, path("x"));
    assert_eq!(revs[0].rev.number(), 2);
}

#[tokio::test]
async fn changes_are_scoped_to_a_subtree() {
    let store = test_store().await;
    store
        .set(&path(""), &tree(json!({ "sub1": { "1": { "ok": true } }, "sub2": {} })))
        .await
        .unwrap();
    let sub1 = store.replicator("sub1");
    let sub2 = store.replicator("sub2");

    assert_eq!(sub1.last_seq().await.unwrap(), 1);
    // sub2 itself was written, but nothing below it
    assert_eq!(sub2.last_seq().await.unwrap(), 0);
    assert!(sub2.changes(0).await.unwrap().is_empty());

    let ok = store.rev(&path("sub1/1/ok")).await.unwrap();
    store
        .set(&path("sub1/1/ok"), &Tree::from_leaf(false).with_rev(ok))
        .await
        .unwrap();
    store.set(&path("sub2/1"), &Tree::from_leaf(1)).await.unwrap();

    let changes = sub1.changes(0).await.unwrap();
    let seqs: Vec<u64> = changes.iter().map(|change| change.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
    let touched: Vec<String> = changes[1].revs.iter().map(|(p, _)| p.join()).collect();
    assert_eq!(touched, vec!["1", "1/ok"]);

    assert_eq!(sub1.last_seq().await.unwrap(), 2);
    assert_eq!(sub2.last_seq().await.unwrap(), 3);
    assert_eq!(sub2.changes(2).await.unwrap()[0].revs[0].0, path("1"));
    assert!(sub1.changes(2).await.unwrap().is_empty());
    assert_eq!(store.last_seq_at(&path("")).await.unwrap(), 3);
}
