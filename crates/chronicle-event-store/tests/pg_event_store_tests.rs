//! Integration tests for `PgEventStore`.
//!
//! Each test gets a fresh database from `sqlx::test`, which needs
//! `DATABASE_URL` to point at a PostgreSQL server.

use std::sync::Arc;

use chronicle_core::aggregate::AggregateRoot;
use chronicle_core::error::DomainError;
use chronicle_core::repository::EventStoreRepository;
use chronicle_core::store::{EventData, EventStoreConnection, ExpectedVersion, SliceReadStatus};
use chronicle_event_store::pg_event_store::PgEventStore;
use chronicle_test_support::{TestAggregate, test_repository};
use sqlx::PgPool;
use uuid::Uuid;

fn make_event_data(n: usize) -> EventData {
    EventData {
        event_id: Uuid::now_v7(),
        event_type: "NameUpdated".to_owned(),
        data: serde_json::json!({ "name": format!("name-{n}") }),
        metadata: serde_json::json!({ "EventTypeName": "NameUpdated" }),
    }
}

fn repository(pool: PgPool) -> EventStoreRepository {
    test_repository(Arc::new(PgEventStore::new(pool)))
}

// --- read_stream_events_forward ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_read_of_unknown_stream_is_not_found(pool: PgPool) {
    let store = PgEventStore::new(pool);

    let slice = store
        .read_stream_events_forward("testAggregate-missing", 0, 10)
        .await
        .unwrap();

    assert_eq!(slice.status, SliceReadStatus::StreamNotFound);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_and_read_pages(pool: PgPool) {
    // Arrange
    let store = PgEventStore::new(pool);
    let events: Vec<EventData> = (0..5).map(make_event_data).collect();
    let expected_ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();

    // Act
    let result = store
        .append_to_stream("s-1", ExpectedVersion::NoStream, events)
        .await
        .unwrap();
    let first = store.read_stream_events_forward("s-1", 0, 3).await.unwrap();
    let second = store
        .read_stream_events_forward("s-1", first.next_event_number, 3)
        .await
        .unwrap();

    // Assert
    assert_eq!(result.next_expected_version, 4);
    assert_eq!(first.events.len(), 3);
    assert!(!first.is_end_of_stream);
    assert_eq!(second.events.len(), 2);
    assert!(second.is_end_of_stream);
    assert_eq!(second.next_event_number, 5);
    let ids: Vec<Uuid> = first
        .events
        .iter()
        .chain(&second.events)
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, expected_ids);
    assert_eq!(first.events[0].metadata["EventTypeName"], "NameUpdated");
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_with_stale_version_conflicts(pool: PgPool) {
    let store = PgEventStore::new(pool);
    store
        .append_to_stream("s-1", ExpectedVersion::NoStream, vec![make_event_data(0)])
        .await
        .unwrap();

    let result = store
        .append_to_stream("s-1", ExpectedVersion::NoStream, vec![make_event_data(1)])
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict { actual, .. }) => assert_eq!(actual, Some(0)),
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

// --- transactions ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_transaction_commits_all_pages(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let mut transaction = store
        .start_transaction("s-1", ExpectedVersion::NoStream)
        .await
        .unwrap();

    transaction
        .write((0..3).map(make_event_data).collect())
        .await
        .unwrap();
    transaction
        .write((3..5).map(make_event_data).collect())
        .await
        .unwrap();
    let result = transaction.commit().await.unwrap();

    assert_eq!(result.next_expected_version, 4);
    let slice = store.read_stream_events_forward("s-1", 0, 10).await.unwrap();
    let numbers: Vec<i64> = slice.events.iter().map(|e| e.event_number).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_transaction_rollback_leaves_no_stream(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let mut transaction = store
        .start_transaction("s-1", ExpectedVersion::NoStream)
        .await
        .unwrap();
    transaction
        .write((0..3).map(make_event_data).collect())
        .await
        .unwrap();

    transaction.rollback().await.unwrap();

    let slice = store.read_stream_events_forward("s-1", 0, 10).await.unwrap();
    assert_eq!(slice.status, SliceReadStatus::StreamNotFound);
}

// --- tombstones ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_deleted_stream_reads_as_deleted_and_rejects_appends(pool: PgPool) {
    let store = PgEventStore::new(pool);
    store
        .append_to_stream("s-1", ExpectedVersion::NoStream, vec![make_event_data(0)])
        .await
        .unwrap();

    store
        .delete_stream("s-1", ExpectedVersion::Exact(0))
        .await
        .unwrap();

    let slice = store.read_stream_events_forward("s-1", 0, 10).await.unwrap();
    assert_eq!(slice.status, SliceReadStatus::StreamDeleted);
    let append = store
        .append_to_stream("s-1", ExpectedVersion::Any, vec![make_event_data(1)])
        .await;
    assert!(matches!(append, Err(DomainError::StreamDeleted(_))));
}

// --- repository over PostgreSQL ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_repository_round_trip(pool: PgPool) {
    // Arrange
    let repository = repository(pool);
    let id = Uuid::new_v4();
    let mut aggregate = TestAggregate::create(id, "test").unwrap();
    aggregate.change_name("two").unwrap();
    aggregate.change_name("three").unwrap();

    // Act
    repository.save(&mut aggregate, Uuid::new_v4()).await.unwrap();
    let loaded: TestAggregate = repository.get_by_id(id).await.unwrap();

    // Assert
    assert_eq!(loaded.version(), 3);
    assert_eq!(loaded.name(), "three");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_repository_save_spanning_pages(pool: PgPool) {
    let repository = repository(pool);
    let id = Uuid::new_v4();
    let mut aggregate = TestAggregate::create(id, "test").unwrap();
    for n in 1..1200 {
        aggregate.change_name(&format!("name-{n}")).unwrap();
    }

    repository.save(&mut aggregate, Uuid::new_v4()).await.unwrap();

    let loaded: TestAggregate = repository.get_by_id(id).await.unwrap();
    assert_eq!(loaded.version(), 1200);
    assert_eq!(loaded.name(), "name-1199");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_repository_concurrent_save_conflicts(pool: PgPool) {
    // Arrange
    let repository = repository(pool);
    let id = Uuid::new_v4();
    let mut aggregate = TestAggregate::create(id, "test").unwrap();
    repository.save(&mut aggregate, Uuid::new_v4()).await.unwrap();
    let mut first: TestAggregate = repository.get_by_id(id).await.unwrap();
    let mut second: TestAggregate = repository.get_by_id(id).await.unwrap();
    first.change_name("first").unwrap();
    second.change_name("second").unwrap();

    // Act
    repository.save(&mut first, Uuid::new_v4()).await.unwrap();
    let result = repository.save(&mut second, Uuid::new_v4()).await;

    // Assert
    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict { .. })
    ));
    let loaded: TestAggregate = repository.get_by_id(id).await.unwrap();
    assert_eq!(loaded.name(), "first");
}
