//! Concurrent use of one database from many tasks.

use std::sync::Arc;
use strata_core::{Config, CoreError, Database, Expand, MemoryStorage, Namespace, Value};

const COUNTERS: &str = r#"
Counter:
  type: object
  properties:
    name: string
    hits: integer
    next: Counter
"#;

fn database() -> Arc<Database> {
    let ns = Arc::new(Namespace::from_yaml(COUNTERS).unwrap());
    let storage = Arc::new(MemoryStorage::new(Arc::clone(&ns)));
    Arc::new(Database::new(ns, storage, Config::default()))
}

fn hits(n: i64) -> Value {
    Value::map([("hits", Value::Integer(n))])
}

#[tokio::test]
async fn same_expected_version_lets_exactly_one_writer_win() {
    let db = database();
    db.create("Counter", &Value::map([("id", Value::from("c")), ("hits", Value::Integer(0))]))
        .await
        .unwrap();

    let tasks: Vec<_> = (1..=8)
        .map(|n| {
            let db = Arc::clone(&db);
            tokio::spawn(async move { db.update("Counter", "c", &hits(n), Some(1)).await })
        })
        .collect();
    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(updated) => {
                assert_eq!(updated.version(), Some(2));
                wins += 1;
            }
            Err(err) => assert!(err.is_conflict(), "{err}"),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn retrying_on_conflict_loses_no_increment() {
    let db = database();
    db.create("Counter", &Value::map([("id", Value::from("c")), ("hits", Value::Integer(0))]))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let db = Arc::clone(&db);
            tokio::spawn(async move {
                loop {
                    let current = db.read("Counter", "c", &Expand::empty()).await?.unwrap();
                    let n = current.get("hits").and_then(Value::as_integer).unwrap_or(0);
                    match db.update("Counter", "c", &hits(n + 1), current.version()).await {
                        Ok(_) => return Ok::<_, CoreError>(()),
                        Err(err) if err.is_conflict() => continue,
                        Err(err) => return Err(err),
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let counter = db.read("Counter", "c", &Expand::empty()).await.unwrap().unwrap();
    assert_eq!(counter.get("hits"), Some(&Value::Integer(10)));
    assert_eq!(counter.version(), Some(11));
}

#[tokio::test]
async fn expanding_reads_run_alongside_writes() {
    let db = database();
    for i in 0..10 {
        let next = if i == 0 { Value::Null } else { Value::from(format!("c{}", i - 1)) };
        db.create(
            "Counter",
            &Value::map([
                ("id", Value::from(format!("c{i}"))),
                ("hits", Value::Integer(0)),
                ("next", next),
            ]),
        )
        .await
        .unwrap();
    }

    let writer = {
        let db = Arc::clone(&db);
        tokio::spawn(async move {
            for i in 0..10 {
                db.update("Counter", &format!("c{i}"), &hits(1), None)
                    .await
                    .unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            tokio::spawn(async move {
                let expand = Expand::parse(["next.next.next"]);
                let head = db.read("Counter", "c9", &expand).await.unwrap().unwrap();
                head.get("next")
                    .and_then(|n| n.get_path(&["next", "next", "id"]))
                    .cloned()
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        assert_eq!(reader.await.unwrap(), Some(Value::from("c6")));
    }
}
