use canopy::{Leaf, Store, backend::database::Sqlite};

use crate::helpers::*;

#[tokio::test]
async fn file_database_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("canopy.db");

    let store = Store::open(Sqlite::open(&file).await.unwrap()).await.unwrap();
    store.set(&path(""), &fruits()).await.unwrap();
    let before = store.read(&path("fruits")).await.unwrap();
    drop(store);

    let store = Store::open(Sqlite::open(&file).await.unwrap()).await.unwrap();
    assert_eq!(store.read(&path("fruits")).await.unwrap(), before);
    assert_eq!(store.update_seq().await.unwrap(), 1);
}

#[tokio::test]
async fn in_memory_databases_are_isolated() {
    let first = Store::open(Sqlite::in_memory().await.unwrap()).await.unwrap();
    let second = Store::open(Sqlite::in_memory().await.unwrap()).await.unwrap();

    first.set(&path("only/here"), &canopy::Tree::from_leaf(true)).await.unwrap();
    assert_eq!(
        first.read(&path("only/here")).await.unwrap().leaf,
        Leaf::Bool(true)
    );
    assert!(second.read(&path("only/here")).await.unwrap_err().is_not_found());
}
