//! Event stores for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::error::DomainError;
use chronicle_core::store::{
    EventData, EventStoreConnection, EventStoreTransaction, ExpectedVersion, RecordedEvent,
    SliceReadStatus, StreamSlice, WriteResult,
};

/// Counters of the calls an [`InMemoryEventStore`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `read_stream_events_forward` calls.
    pub reads: usize,
    /// `append_to_stream` calls.
    pub appends: usize,
    /// `start_transaction` calls.
    pub transactions_started: usize,
    /// `write` calls across all transactions.
    pub transaction_writes: usize,
    /// Successful transaction commits.
    pub commits: usize,
    /// Transaction rollbacks.
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct Stream {
    events: Vec<RecordedEvent>,
    deleted: bool,
}

impl Stream {
    fn last_event_number(&self) -> Option<i64> {
        self.events.len().checked_sub(1).map(event_number)
    }
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, Stream>,
    stats: StoreStats,
}

fn event_number(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

/// Thread-safe in-memory event store with the same stream semantics as the
/// PostgreSQL store: 0-based event numbers, optimistic concurrency on append
/// and commit, tombstones, and transactions that stage writes until commit.
///
/// Clones share the same streams, so two repositories built over clones of
/// one store race exactly as two processes would against a database.
#[derive(Clone)]
pub struct InMemoryEventStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventStore {
    /// Creates an empty store stamping events with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store stamping events with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    /// Returns a snapshot of the call counters.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.lock().stats
    }

    /// Returns every event recorded in `stream`, including tombstoned ones.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn recorded_events(&self, stream: &str) -> Vec<RecordedEvent> {
        self.lock()
            .streams
            .get(stream)
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    /// Returns `true` if `stream` has been written or tombstoned.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn contains_stream(&self, stream: &str) -> bool {
        self.lock().streams.contains_key(stream)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("in-memory store lock poisoned")
    }

    fn append_checked(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        let mut inner = self.lock();
        let (deleted, current) = inner
            .streams
            .get(stream)
            .map_or((false, None), |s| (s.deleted, s.last_event_number()));
        if deleted {
            return Err(DomainError::StreamDeleted(stream.to_owned()));
        }
        expected_version.check(stream, current)?;
        if events.is_empty() {
            return Ok(WriteResult {
                next_expected_version: current.unwrap_or(-1),
            });
        }

        let created = self.clock.now();
        let target = inner.streams.entry(stream.to_owned()).or_default();
        for data in events {
            target.events.push(RecordedEvent {
                event_id: data.event_id,
                stream: stream.to_owned(),
                event_number: event_number(target.events.len()),
                event_type: data.event_type,
                data: data.data,
                metadata: data.metadata,
                created,
            });
        }
        Ok(WriteResult {
            next_expected_version: target.last_event_number().unwrap_or(-1),
        })
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventStoreConnection for InMemoryEventStore {
    async fn read_stream_events_forward(
        &self,
        stream: &str,
        start: i64,
        count: usize,
    ) -> Result<StreamSlice, DomainError> {
        let mut inner = self.lock();
        inner.stats.reads += 1;
        let Ok(skip) = usize::try_from(start) else {
            return Err(DomainError::InvalidArgument(format!(
                "cannot read {stream} from negative position {start}"
            )));
        };
        let slice = match inner.streams.get(stream) {
            None => StreamSlice::not_found(start),
            Some(s) if s.deleted => StreamSlice::deleted(start),
            Some(s) => {
                let events: Vec<RecordedEvent> =
                    s.events.iter().skip(skip).take(count).cloned().collect();
                let next_event_number = start + event_number(events.len());
                StreamSlice {
                    status: SliceReadStatus::Success,
                    is_end_of_stream: next_event_number >= event_number(s.events.len()),
                    next_event_number,
                    events,
                }
            }
        };
        Ok(slice)
    }

    async fn append_to_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        self.lock().stats.appends += 1;
        self.append_checked(stream, expected_version, events)
    }

    async fn start_transaction(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        self.lock().stats.transactions_started += 1;
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            stream: stream.to_owned(),
            expected_version,
            staged: Vec::new(),
        }))
    }

    async fn delete_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        let mut inner = self.lock();
        let (deleted, current) = inner
            .streams
            .get(stream)
            .map_or((false, None), |s| (s.deleted, s.last_event_number()));
        if deleted {
            return Err(DomainError::StreamDeleted(stream.to_owned()));
        }
        expected_version.check(stream, current)?;
        inner.streams.entry(stream.to_owned()).or_default().deleted = true;
        Ok(())
    }
}

/// Transaction that stages events and appends them in one step on commit.
struct InMemoryTransaction {
    store: InMemoryEventStore,
    stream: String,
    expected_version: ExpectedVersion,
    staged: Vec<EventData>,
}

#[async_trait]
impl EventStoreTransaction for InMemoryTransaction {
    async fn write(&mut self, events: Vec<EventData>) -> Result<(), DomainError> {
        self.store.lock().stats.transaction_writes += 1;
        self.staged.extend(events);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<WriteResult, DomainError> {
        let Self {
            store,
            stream,
            expected_version,
            staged,
        } = *self;
        let result = store.append_checked(&stream, expected_version, staged)?;
        store.lock().stats.commits += 1;
        Ok(result)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.store.lock().stats.rollbacks += 1;
        Ok(())
    }
}

/// A store that fails every call with an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStoreConnection for FailingEventStore {
    async fn read_stream_events_forward(
        &self,
        _stream: &str,
        _start: i64,
        _count: usize,
    ) -> Result<StreamSlice, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_to_stream(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
        _events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn start_transaction(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn delete_stream(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// A store whose calls never complete. Useful for testing cancellation.
#[derive(Debug)]
pub struct StalledEventStore;

#[async_trait]
impl EventStoreConnection for StalledEventStore {
    async fn read_stream_events_forward(
        &self,
        _stream: &str,
        _start: i64,
        _count: usize,
    ) -> Result<StreamSlice, DomainError> {
        std::future::pending().await
    }

    async fn append_to_stream(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
        _events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        std::future::pending().await
    }

    async fn start_transaction(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        std::future::pending().await
    }

    async fn delete_stream(
        &self,
        _stream: &str,
        _expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        std::future::pending().await
    }
}
