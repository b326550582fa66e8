//! A behavioural suite for storage backends.
//!
//! Every check starts from an empty backend built by the caller over
//! [`SUITE`]. Checks for capabilities a backend does not declare in its
//! [`StorageTraits`] are skipped and reported as such.
//!
//! ```rust,ignore
//! let report = conformance::run(|ns| Arc::new(MemoryStorage::new(ns)) as Arc<dyn Storage>).await;
//! assert!(report.skipped.is_empty());
//! ```

use std::sync::Arc;
use strata_codec::Value;
use strata_schema::{Consistency, Expand, Expression, Instance, Namespace, Sort};
use strata_storage::{
    with_id_tiebreak, ConcurrencyControl, Pager, RefKey, Storage, StorageError, StorageTraits,
    Versioning,
};

/// The namespace every check runs against.
pub const SUITE: &str = r#"
Note:
  type: object
  history:
    enabled: true
  properties:
    title: string
    rank: integer
Shape:
  type: object
  concrete: false
  properties:
    label: string
Circle:
  type: object
  extend: Shape
  properties:
    radius: number
"#;

/// Outcome of a suite run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    /// Checks that ran and passed.
    pub passed: Vec<&'static str>,
    /// Checks skipped because the backend does not declare the capability.
    pub skipped: Vec<&'static str>,
}

fn note(id: &str, version: i64, title: &str, rank: i64) -> Instance {
    Instance::reference(id)
        .with("version", version)
        .with("title", title)
        .with("rank", rank)
}

fn versioning(traits: &StorageTraits) -> Versioning {
    match traits.concurrency {
        ConcurrencyControl::Optimistic => Versioning::Checked,
        ConcurrencyControl::None => Versioning::Unchecked,
    }
}

async fn create(storage: &dyn Storage, schema: &str, instance: Instance) {
    let traits = storage.storage_traits(schema);
    let mut tx = storage.write(Consistency::Atomic, versioning(&traits));
    tx.create_object(schema, instance);
    tx.write().await.expect("Failed to create object");
}

async fn read(storage: &dyn Storage, schema: &str, id: &str) -> Option<Instance> {
    storage
        .read_object(Consistency::Atomic, schema, id, &Expand::empty())
        .await
        .expect("Failed to read object")
}

/// Created objects are readable, batched reads return only what exists.
pub async fn check_create_and_read(storage: &dyn Storage) {
    create(storage, "Note", note("a", 1, "alpha", 1)).await;
    create(storage, "Note", note("b", 1, "beta", 2)).await;
    assert_eq!(
        read(storage, "Note", "a").await.and_then(|n| n.get("title").cloned()),
        Some(Value::from("alpha"))
    );
    assert_eq!(read(storage, "Note", "zzz").await, None);

    let mut tx = storage.read(Consistency::Atomic);
    for id in ["a", "b", "missing"] {
        tx.read_object(RefKey::new("Note", id), Expand::empty());
    }
    let response = tx.read().await.expect("Failed to read batch");
    assert_eq!(response.len(), 2);
    assert!(response.object(&RefKey::new("Note", "b")).is_some());
    assert!(response.object(&RefKey::new("Note", "missing")).is_none());
}

/// Creating an existing id fails with `ObjectExists` and changes nothing.
pub async fn check_duplicate_create(storage: &dyn Storage) {
    create(storage, "Note", note("a", 1, "first", 1)).await;
    let traits = storage.storage_traits("Note");
    let mut tx = storage.write(Consistency::Atomic, versioning(&traits));
    tx.create_object("Note", note("a", 1, "second", 1));
    let err = tx.write().await.expect_err("Duplicate create succeeded");
    assert_eq!(err, StorageError::object_exists("Note", "a"));
    assert_eq!(
        read(storage, "Note", "a").await.and_then(|n| n.get("title").cloned()),
        Some(Value::from("first"))
    );
}

/// A stale `before` fails with `VersionMismatch`; a blind write succeeds.
pub async fn check_optimistic_updates(storage: &dyn Storage) {
    create(storage, "Note", note("a", 1, "v1", 1)).await;
    let mut tx = storage.write(Consistency::Atomic, Versioning::Checked);
    tx.update_object("Note", "a", Some(note("a", 1, "v1", 1)), note("a", 2, "v2", 1));
    tx.write().await.expect("Failed to update");

    let mut tx = storage.write(Consistency::Atomic, Versioning::Checked);
    tx.update_object("Note", "a", Some(note("a", 1, "v1", 1)), note("a", 2, "lost", 1));
    assert!(matches!(
        tx.write().await,
        Err(StorageError::VersionMismatch { .. })
    ));

    let mut tx = storage.write(Consistency::Atomic, Versioning::Checked);
    tx.update_object("Note", "a", None, note("a", 3, "blind", 1));
    tx.write().await.expect("Blind update failed");
    assert_eq!(
        read(storage, "Note", "a").await.and_then(|n| n.get("title").cloned()),
        Some(Value::from("blind"))
    );
}

/// A batch with one failing action applies none of its actions.
pub async fn check_atomic_batches(storage: &dyn Storage) {
    create(storage, "Note", note("a", 1, "a", 1)).await;
    let traits = storage.storage_traits("Note");
    let mut tx = storage.write(Consistency::Atomic, versioning(&traits));
    tx.create_object("Note", note("b", 1, "b", 2))
        .create_object("Note", note("a", 1, "again", 1));
    assert!(tx.write().await.is_err());
    assert_eq!(read(storage, "Note", "b").await, None);
}

/// Past versions stay readable after updates.
pub async fn check_history(storage: &dyn Storage) {
    create(storage, "Note", note("a", 1, "one", 1)).await;
    let traits = storage.storage_traits("Note");
    let mut tx = storage.write(Consistency::Atomic, versioning(&traits));
    tx.update_object("Note", "a", Some(note("a", 1, "one", 1)), note("a", 2, "two", 1));
    tx.write().await.expect("Failed to update");

    let old = storage
        .read_object_version(Consistency::Atomic, "Note", "a", 1, &Expand::empty())
        .await
        .expect("Failed to read version");
    assert_eq!(old.and_then(|n| n.get("title").cloned()), Some(Value::from("one")));
}

/// Subtype objects are readable and queryable through their base, tagged
/// with their concrete schema.
pub async fn check_polymorphism(storage: &dyn Storage) {
    let circle = Instance::reference("c1")
        .with("version", 1)
        .with("label", "round")
        .with("radius", 2.5);
    create(storage, "Circle", circle).await;

    let shape = read(storage, "Shape", "c1").await.expect("Subtype not readable via base");
    assert_eq!(shape.schema(), Some("Circle"));
    assert_eq!(shape.get("label"), Some(&Value::from("round")));

    let sources = storage
        .query(
            Consistency::Atomic,
            "Shape",
            &Expression::constant(true),
            &[],
            &Expand::empty(),
        )
        .await
        .expect("Failed to query base");
    let page = Pager::sorted(&with_id_tiebreak(&[]), sources, None)
        .page(10)
        .await
        .expect("Failed to page");
    assert_eq!(page.len(), 1);
}

/// Query sources honour the filter and sort and page without duplicates
/// or gaps.
pub async fn check_query_paging(storage: &dyn Storage) {
    for i in 0..25 {
        create(storage, "Note", note(&format!("n{i:02}"), 1, "t", i % 5)).await;
    }
    let sort = with_id_tiebreak(&[Sort::desc("rank")]);
    let filter = Expression::parse("rank >= 1").expect("Invalid filter");

    let mut seen = Vec::new();
    let mut paging = None;
    loop {
        let sources = storage
            .query(Consistency::Atomic, "Note", &filter, &sort, &Expand::empty())
            .await
            .expect("Failed to query");
        let (items, next) = Pager::sorted(&sort, sources, paging)
            .page(7)
            .await
            .expect("Failed to page")
            .into_parts();
        seen.extend(items);
        match next {
            Some(token) => paging = Some(token),
            None => break,
        }
    }
    assert_eq!(seen.len(), 20);
    let ranks: Vec<i64> = seen
        .iter()
        .filter_map(|n| n.get("rank").and_then(Value::as_integer))
        .collect();
    assert!(ranks.windows(2).all(|w| w[0] >= w[1]));
    let mut ids: Vec<&str> = seen.iter().filter_map(Instance::id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

/// Runs every check against fresh backends from `make`.
///
/// # Panics
///
/// Panics with the failing assertion of the first check that fails.
pub async fn run<F>(make: F) -> Report
where
    F: Fn(Arc<Namespace>) -> Arc<dyn Storage>,
{
    let namespace = Arc::new(Namespace::from_yaml(SUITE).expect("Failed to build suite namespace"));
    let fresh = || make(Arc::clone(&namespace));
    let mut report = Report::default();

    let probe = fresh();
    let note = probe.storage_traits("Note");
    let shape = probe.storage_traits("Shape");

    check_create_and_read(fresh().as_ref()).await;
    report.passed.push("create_and_read");
    check_duplicate_create(fresh().as_ref()).await;
    report.passed.push("duplicate_create");
    check_query_paging(fresh().as_ref()).await;
    report.passed.push("query_paging");

    if note.concurrency == ConcurrencyControl::Optimistic {
        check_optimistic_updates(fresh().as_ref()).await;
        report.passed.push("optimistic_updates");
    } else {
        report.skipped.push("optimistic_updates");
    }
    if note.multi_object {
        check_atomic_batches(fresh().as_ref()).await;
        report.passed.push("atomic_batches");
    } else {
        report.skipped.push("atomic_batches");
    }
    if note.history_consistency != Consistency::None {
        check_history(fresh().as_ref()).await;
        report.passed.push("history");
    } else {
        report.skipped.push("history");
    }
    if shape.polymorphic {
        check_polymorphism(fresh().as_ref()).await;
        report.passed.push("polymorphism");
    } else {
        report.skipped.push("polymorphism");
    }
    report
}
