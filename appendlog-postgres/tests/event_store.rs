//! Integration tests for the `PostgreSQL` store.
//!
//! These tests require Docker to be running and will spin up a `PostgreSQL`
//! container using testcontainers.

use std::sync::Arc;

use appendlog_core::{
    condition::{Condition, WriteCondition},
    event::EventEnvelope,
    repository::{Repository, WriteError},
    store::{CompareAndAppend, ReadRange, VersionedStore},
};
use appendlog_postgres::Store;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Test helper to set up a `PostgreSQL` container and connection pool.
struct TestDb {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestDb {
    async fn new() -> Self {
        let container = Postgres::default().start().await.unwrap();
        let host = container.get_host().await.unwrap();
        let port = container.get_host_port_ipv4(5432).await.unwrap();

        let connection_string = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let pool = PgPool::connect(&connection_string).await.unwrap();

        Self {
            _container: container,
            pool,
        }
    }

    async fn store(&self) -> Store {
        let store = Store::new(self.pool.clone());
        store.migrate().await.unwrap();
        store
    }
}

fn stream_id() -> String {
    format!("stream-{}", Uuid::new_v4())
}

fn event(id: &str, payload: &str) -> EventEnvelope {
    EventEnvelope::new(id, payload.as_bytes().to_vec())
}

#[tokio::test]
async fn migrate_creates_tables() {
    let db = TestDb::new().await;
    db.store().await;

    let streams: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM appendlog_streams")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    let events: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM appendlog_events")
        .fetch_one(&db.pool)
        .await
        .unwrap();

    assert_eq!(streams.0, 0);
    assert_eq!(events.0, 0);
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let db = TestDb::new().await;
    let store = db.store().await;
    store.migrate().await.unwrap();
}

#[tokio::test]
async fn missing_stream_has_no_state() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();

    assert!(store.load_state(&id, ReadRange::all()).await.unwrap().is_none());
    assert_eq!(store.stream_version(&id).await.unwrap(), 0);
    assert!(!store.exists(&id).await.unwrap());
}

#[tokio::test]
async fn append_expecting_zero_creates_stream() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();

    let outcome = store
        .compare_and_append(&id, 0, &[event("a", "one"), event("b", "two")])
        .await
        .unwrap();
    assert_eq!(outcome, CompareAndAppend::Applied { version: 1 });

    let state = store.load_state(&id, ReadRange::all()).await.unwrap().unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.events, vec![event("a", "one"), event("b", "two")]);
    assert!(store.exists(&id).await.unwrap());
}

#[tokio::test]
async fn append_with_stale_version_conflicts() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();

    store.compare_and_append(&id, 0, &[event("a", "")]).await.unwrap();
    store.compare_and_append(&id, 1, &[event("b", "")]).await.unwrap();

    let outcome = store
        .compare_and_append(&id, 1, &[event("c", "")])
        .await
        .unwrap();
    assert_eq!(outcome, CompareAndAppend::Conflict { actual_version: 2 });

    let outcome = store
        .compare_and_append(&id, 0, &[event("c", "")])
        .await
        .unwrap();
    assert_eq!(outcome, CompareAndAppend::Conflict { actual_version: 2 });

    let state = store.load_state(&id, ReadRange::all()).await.unwrap().unwrap();
    assert_eq!(state.events.len(), 2);
}

#[tokio::test]
async fn append_to_missing_stream_with_nonzero_version_conflicts() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();

    let outcome = store
        .compare_and_append(&id, 5, &[event("a", "")])
        .await
        .unwrap();
    assert_eq!(outcome, CompareAndAppend::Conflict { actual_version: 0 });
    assert!(!store.exists(&id).await.unwrap());
}

#[tokio::test]
async fn empty_batch_bumps_version() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();

    store.compare_and_append(&id, 0, &[]).await.unwrap();
    let outcome = store
        .compare_and_append(&id, 1, &[event("a", "")])
        .await
        .unwrap();
    assert_eq!(outcome, CompareAndAppend::Applied { version: 2 });

    let state = store.load_state(&id, ReadRange::all()).await.unwrap().unwrap();
    assert_eq!(state.events, vec![event("a", "")]);
}

#[tokio::test]
async fn load_state_applies_skip_and_limit() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();

    store
        .compare_and_append(&id, 0, &[event("a", ""), event("b", "")])
        .await
        .unwrap();
    store
        .compare_and_append(&id, 1, &[event("c", ""), event("d", "")])
        .await
        .unwrap();

    let slice = store
        .load_state(&id, ReadRange::all().skip(1).limit(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slice.version, 2);
    let ids: Vec<_> = slice.events.iter().map(|e| e.id().as_str()).collect();
    assert_eq!(ids, ["b", "c"]);

    let past_end = store
        .load_state(&id, ReadRange::all().skip(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(past_end.version, 2);
    assert!(past_end.events.is_empty());

    let none = store
        .load_state(&id, ReadRange::all().limit(0))
        .await
        .unwrap()
        .unwrap();
    assert!(none.events.is_empty());
}

#[tokio::test]
async fn payload_bytes_round_trip_verbatim() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();
    let payload = vec![0_u8, 159, 146, 150, 255];

    store
        .compare_and_append(&id, 0, &[EventEnvelope::new("bin", payload.clone())])
        .await
        .unwrap();

    let state = store.load_state(&id, ReadRange::all()).await.unwrap().unwrap();
    assert_eq!(state.events[0].payload(), payload.as_slice());
}

#[tokio::test]
async fn repository_enforces_conditions() {
    let db = TestDb::new().await;
    let repo = Repository::new(db.store().await);
    let id = stream_id();

    repo.write(&id, &WriteCondition::stream_version_eq(0), &[event("a", "")])
        .await
        .unwrap();

    let err = repo
        .write(
            &id,
            &WriteCondition::stream_version(Condition::gte(2)),
            &[event("b", "")],
        )
        .await
        .unwrap_err();
    let rejected = err.as_rejected().unwrap();
    assert_eq!(rejected.stream_id, id);
    assert_eq!(rejected.actual_version, 1);

    let stream = repo.read_all(&id).await.unwrap();
    assert_eq!(stream.version(), 1);
    assert_eq!(stream.events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creators_have_a_single_winner() {
    let db = TestDb::new().await;
    let repo = Arc::new(Repository::new(db.store().await));
    let id = stream_id();

    let mut handles = Vec::new();
    for n in 0..8 {
        let repo = Arc::clone(&repo);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            repo.write(
                &id,
                &WriteCondition::stream_version_eq(0),
                &[event(&format!("e{n}"), "")],
            )
            .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                assert_eq!(result.version, 1);
                applied += 1;
            }
            Err(WriteError::Rejected(rejected)) => assert_eq!(rejected.actual_version, 1),
            Err(WriteError::Store(err)) => panic!("unexpected store error: {err}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(repo.read_all(&id).await.unwrap().events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unconditional_writes_all_land() {
    let db = TestDb::new().await;
    let repo = Arc::new(Repository::new(db.store().await));
    let id = stream_id();

    let mut handles = Vec::new();
    for n in 0..10 {
        let repo = Arc::clone(&repo);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            repo.write(&id, &WriteCondition::any(), &[event(&format!("e{n}"), "")])
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stream = repo.read_all(&id).await.unwrap();
    assert_eq!(stream.version(), 10);
    assert_eq!(stream.events().len(), 10);
}

#[tokio::test]
async fn events_table_has_only_stored_columns() {
    let db = TestDb::new().await;
    db.store().await;

    let columns: Vec<String> = sqlx::query_scalar(
        r"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_name = 'appendlog_events'
        ORDER BY ordinal_position
        ",
    )
    .fetch_all(&db.pool)
    .await
    .unwrap();

    assert_eq!(columns, ["stream_id", "seq", "event_id", "payload"]);
}

#[tokio::test]
async fn batch_larger_than_one_statement_is_written_whole() {
    let db = TestDb::new().await;
    let store = db.store().await;
    let id = stream_id();
    let events: Vec<_> = (0..20_000)
        .map(|n| EventEnvelope::new(format!("e{n}"), vec![(n % 251) as u8]))
        .collect();

    store.compare_and_append(&id, 0, &events[..1]).await.unwrap();
    let outcome = store
        .compare_and_append(&id, 1, &events[1..])
        .await
        .unwrap();
    assert_eq!(outcome, CompareAndAppend::Applied { version: 2 });

    let state = store.load_state(&id, ReadRange::all()).await.unwrap().unwrap();
    assert_eq!(state.version, 2);
    assert_eq!(state.events, events);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_never_mix_versions_and_events() {
    let db = TestDb::new().await;
    let repo = Arc::new(Repository::new(db.store().await));
    let id = stream_id();
    let writes = 200_u64;

    let writer = {
        let repo = Arc::clone(&repo);
        let id = id.clone();
        tokio::spawn(async move {
            for n in 0..writes {
                repo.write(&id, &WriteCondition::any(), &[event(&format!("e{n}"), "")])
                    .await
                    .unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..3 {
        let repo = Arc::clone(&repo);
        let id = id.clone();
        readers.push(tokio::spawn(async move {
            loop {
                let stream = repo.read_all(&id).await.unwrap();
                assert_eq!(stream.version() as usize, stream.events().len());
                if stream.version() == writes {
                    break;
                }
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
