//! Optimistic concurrency against the in-memory backend.

use std::sync::Arc;
use strata_codec::Value;
use strata_schema::{Expand, Instance, Namespace};
use strata_storage::{
    Consistency, MemoryStorage, Storage, StorageError, StorageResult, Versioning,
};

fn storage() -> MemoryStorage {
    let ns = Namespace::from_yaml(
        r#"
Note:
  type: object
  properties:
    text: string
"#,
    )
    .unwrap();
    MemoryStorage::new(Arc::new(ns))
}

fn note(id: &str, version: i64, text: &str) -> Instance {
    Instance::reference(id)
        .with("version", Value::Integer(version))
        .with("text", text)
}

async fn create(storage: &dyn Storage, instance: Instance) -> StorageResult<()> {
    let mut tx = storage.write(Consistency::Atomic, Versioning::Checked);
    tx.create_object("Note", instance);
    tx.write().await
}

async fn update(
    storage: &dyn Storage,
    before: Option<Instance>,
    after: Instance,
    versioning: Versioning,
) -> StorageResult<()> {
    let id = after.id().unwrap_or_default().to_string();
    let mut tx = storage.write(Consistency::Atomic, versioning);
    tx.update_object("Note", id, before, after);
    tx.write().await
}

async fn delete(storage: &dyn Storage, id: &str, before: Option<Instance>) -> StorageResult<()> {
    let mut tx = storage.write(Consistency::Atomic, Versioning::Checked);
    tx.delete_object("Note", id, before);
    tx.write().await
}

async fn text(storage: &dyn Storage, id: &str) -> Option<Value> {
    storage
        .read_object(Consistency::Atomic, "Note", id, &Expand::empty())
        .await
        .unwrap()
        .and_then(|n| n.get("text").cloned())
}

#[tokio::test]
async fn create_twice_fails() {
    let storage = storage();
    create(&storage, note("x", 1, "a")).await.unwrap();
    let err = create(&storage, note("x", 1, "b")).await.unwrap_err();
    assert_eq!(err, StorageError::object_exists("Note", "x"));
    assert_eq!(text(&storage, "x").await, Some(Value::from("a")));
}

#[tokio::test]
async fn stale_update_fails_and_current_update_succeeds() {
    let storage = storage();
    create(&storage, note("x", 1, "a")).await.unwrap();
    update(&storage, Some(note("x", 1, "a")), note("x", 2, "b"), Versioning::Checked)
        .await
        .unwrap();

    let err = update(&storage, Some(note("x", 1, "a")), note("x", 2, "c"), Versioning::Checked)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::VersionMismatch {
            expected: Some(1),
            actual: Some(2),
            ..
        }
    ));
    assert_eq!(text(&storage, "x").await, Some(Value::from("b")));
}

#[tokio::test]
async fn blind_writes_skip_the_check() {
    let storage = storage();
    create(&storage, note("x", 1, "a")).await.unwrap();
    update(&storage, None, note("x", 7, "blind"), Versioning::Checked)
        .await
        .unwrap();
    assert_eq!(text(&storage, "x").await, Some(Value::from("blind")));
    delete(&storage, "x", None).await.unwrap();
    assert_eq!(text(&storage, "x").await, None);
}

#[tokio::test]
async fn unchecked_versioning_ignores_stale_before() {
    let storage = storage();
    create(&storage, note("x", 3, "a")).await.unwrap();
    update(&storage, Some(note("x", 1, "a")), note("x", 4, "b"), Versioning::Unchecked)
        .await
        .unwrap();
    assert_eq!(text(&storage, "x").await, Some(Value::from("b")));
}

#[tokio::test]
async fn stale_delete_fails() {
    let storage = storage();
    create(&storage, note("x", 2, "a")).await.unwrap();
    let err = delete(&storage, "x", Some(note("x", 1, "a"))).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionMismatch { .. }));
    delete(&storage, "x", Some(note("x", 2, "a"))).await.unwrap();
}

#[tokio::test]
async fn missing_objects() {
    let storage = storage();
    delete(&storage, "ghost", None).await.unwrap();
    assert!(matches!(
        delete(&storage, "ghost", Some(note("ghost", 1, ""))).await,
        Err(StorageError::ObjectMissing { .. })
    ));
    assert!(matches!(
        update(&storage, None, note("ghost", 1, ""), Versioning::Checked).await,
        Err(StorageError::ObjectMissing { .. })
    ));
}

#[tokio::test]
async fn readers_keep_their_snapshot_during_writes() {
    let storage = Arc::new(storage());
    for i in 0..20 {
        create(storage.as_ref(), note(&format!("n{i:02}"), 1, "v")).await.unwrap();
    }
    let writer = {
        let storage = Arc::clone(&storage);
        tokio::spawn(async move {
            for i in 0..20 {
                let id = format!("n{i:02}");
                update(storage.as_ref(), None, note(&id, 2, "w"), Versioning::Checked)
                    .await
                    .unwrap();
            }
        })
    };
    for i in 0..20 {
        assert!(text(storage.as_ref(), &format!("n{i:02}")).await.is_some());
    }
    writer.await.unwrap();
    assert_eq!(storage.count("Note"), 20);
}
