//! Contract tests run against whichever engine TEST_BACKEND selects.

use canopy::{
    backend::{Backend, BatchOp, KeyRange},
    sublevel::{Batch, Sublevel},
};

use crate::helpers::test_backend;

fn put(key: &str, value: &str) -> BatchOp {
    BatchOp::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn scan_orders_and_limits() {
    let backend = test_backend().await;
    backend
        .write(vec![put("b", "2"), put("a", "1"), put("c", "3"), put("d", "4")])
        .await
        .unwrap();

    let forward = backend
        .scan(&KeyRange::new(b"a".to_vec(), b"d".to_vec()))
        .await
        .unwrap();
    let keys: Vec<&[u8]> = forward.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![b"a".as_slice(), b"b", b"c"]);

    let backward = backend
        .scan(&KeyRange::new(b"a".to_vec(), b"z".to_vec()).reverse(true).limit(Some(2)))
        .await
        .unwrap();
    assert_eq!(backward[0].0, b"d".to_vec());
    assert_eq!(backward[1].0, b"c".to_vec());
}

#[tokio::test]
async fn batch_write_applies_in_order() {
    let backend = test_backend().await;
    backend
        .write(vec![
            put("k", "first"),
            BatchOp::Delete { key: b"k".to_vec() },
            put("k", "last"),
        ])
        .await
        .unwrap();
    assert_eq!(backend.get(b"k").await.unwrap(), Some(b"last".to_vec()));

    backend.delete(b"k").await.unwrap();
    backend.delete(b"missing").await.unwrap();
    assert_eq!(backend.get(b"k").await.unwrap(), None);
}

#[tokio::test]
async fn sublevels_commit_together() {
    let backend = test_backend().await;
    let docs = Sublevel::new(backend.clone(), "docs");
    let local = Sublevel::new(backend.clone(), "local");

    let mut batch = Batch::new();
    batch.put(&docs, "x", "doc");
    batch.put(&local, "x", "bookkeeping");
    batch.commit(backend.as_ref()).await.unwrap();

    assert_eq!(docs.get(b"x").await.unwrap(), Some(b"doc".to_vec()));
    assert_eq!(local.get(b"x").await.unwrap(), Some(b"bookkeeping".to_vec()));
    let all = docs
        .scan(&KeyRange::new(Vec::new(), vec![0xFF]))
        .await
        .unwrap();
    assert_eq!(all, vec![(b"x".to_vec(), b"doc".to_vec())]);
}

#[tokio::test]
async fn increment_counts_from_zero() {
    let backend = test_backend().await;
    assert_eq!(backend.increment(b"counter").await.unwrap(), 1);
    assert_eq!(backend.increment(b"counter").await.unwrap(), 2);
    assert_eq!(backend.get(b"counter").await.unwrap(), Some(b"2".to_vec()));

    // Counters and plain writes share the keyspace
    backend.put(b"counter", b"41").await.unwrap();
    assert_eq!(backend.increment(b"counter").await.unwrap(), 42);
    assert_eq!(backend.increment(b"other").await.unwrap(), 1);
}
