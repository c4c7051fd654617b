//! Shared helpers for repository integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chronicle_core::error::DomainError;
use chronicle_core::repository::EventStoreRepository;
use chronicle_core::store::{
    EventData, EventStoreConnection, EventStoreTransaction, ExpectedVersion, SliceReadStatus,
    StreamSlice, WriteResult,
};
use chronicle_test_support::{InMemoryEventStore, init_tracing, test_repository};
use tokio_util::sync::CancellationToken;

/// Fresh in-memory store plus a repository over a clone of it.
pub fn in_memory_repository() -> (InMemoryEventStore, EventStoreRepository) {
    init_tracing();
    let store = InMemoryEventStore::new();
    let repository = test_repository(Arc::new(store.clone()));
    (store, repository)
}

/// Store that cancels `token` as soon as the first transaction page has
/// been written, so the repository observes cancellation mid-save.
#[derive(Debug, Clone)]
pub struct CancelAfterFirstWrite {
    pub inner: InMemoryEventStore,
    pub token: CancellationToken,
}

#[async_trait]
impl EventStoreConnection for CancelAfterFirstWrite {
    async fn read_stream_events_forward(
        &self,
        stream: &str,
        start: i64,
        count: usize,
    ) -> Result<StreamSlice, DomainError> {
        self.inner.read_stream_events_forward(stream, start, count).await
    }

    async fn append_to_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        self.inner
            .append_to_stream(stream, expected_version, events)
            .await
    }

    async fn start_transaction(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        let inner = self.inner.start_transaction(stream, expected_version).await?;
        Ok(Box::new(CancellingTransaction {
            inner,
            token: self.token.clone(),
        }))
    }

    async fn delete_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        self.inner.delete_stream(stream, expected_version).await
    }
}

struct CancellingTransaction {
    inner: Box<dyn EventStoreTransaction>,
    token: CancellationToken,
}

#[async_trait]
impl EventStoreTransaction for CancellingTransaction {
    async fn write(&mut self, events: Vec<EventData>) -> Result<(), DomainError> {
        self.inner.write(events).await?;
        self.token.cancel();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<WriteResult, DomainError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.inner.rollback().await
    }
}

/// Store that makes each append durable, then waits `delay` before
/// acknowledging it.
#[derive(Debug, Clone)]
pub struct SlowAcknowledgement {
    pub inner: InMemoryEventStore,
    pub delay: Duration,
}

#[async_trait]
impl EventStoreConnection for SlowAcknowledgement {
    async fn read_stream_events_forward(
        &self,
        stream: &str,
        start: i64,
        count: usize,
    ) -> Result<StreamSlice, DomainError> {
        self.inner.read_stream_events_forward(stream, start, count).await
    }

    async fn append_to_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        let result = self
            .inner
            .append_to_stream(stream, expected_version, events)
            .await;
        tokio::time::sleep(self.delay).await;
        result
    }

    async fn start_transaction(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        self.inner.start_transaction(stream, expected_version).await
    }

    async fn delete_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        self.inner.delete_stream(stream, expected_version).await
    }
}

/// Store that reports every stream as existing but empty.
#[derive(Debug)]
pub struct EmptyStreamStore;

#[async_trait]
impl EventStoreConnection for EmptyStreamStore {
    async fn read_stream_events_forward(
        &self,
        _stream: &str,
        start: i64,
        _count: usize,
    ) -> Result<StreamSlice, DomainError> {
        Ok(StreamSlice {
            status: SliceReadStatus::Success,
            events: Vec::new(),
            next_event_number: start,
            is_end_of_stream: true,
        })
    }

    async fn append_to_stream(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
        _events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        Err(DomainError::InvalidOperation("read-only store".into()))
    }

    async fn start_transaction(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        Err(DomainError::InvalidOperation("read-only store".into()))
    }

    async fn delete_stream(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        Err(DomainError::InvalidOperation("read-only store".into()))
    }
}
