//! Event store connection contract.
//!
//! The repository talks to durable storage only through
//! [`EventStoreConnection`]: append-only named streams with 0-based event
//! numbers, forward paged reads, optimistic concurrency on append and
//! multi-page write transactions. `chronicle-event-store` provides the
//! PostgreSQL implementation; `chronicle-test-support` provides an in-memory
//! one.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// The version a writer expects a stream to be at before its append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectedVersion {
    /// Skip the concurrency check.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The last event in the stream must have this event number.
    Exact(i64),
}

impl ExpectedVersion {
    /// Recovers where a stream stood before an aggregate's uncommitted events
    /// were applied in memory.
    ///
    /// `version` counts every event applied to the aggregate, so the last
    /// persisted event number is `version - uncommitted - 1`. A negative prior
    /// position means nothing has been persisted yet.
    #[must_use]
    pub fn before_uncommitted(version: i64, uncommitted: i64) -> Self {
        let prior = version - uncommitted - 1;
        if prior < 0 {
            Self::NoStream
        } else {
            Self::Exact(prior)
        }
    }

    /// Checks this expectation against a stream's current last event number.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when the stream has moved.
    pub fn check(self, stream: &str, current: Option<i64>) -> Result<(), DomainError> {
        let matches = match self {
            Self::Any => true,
            Self::NoStream => current.is_none(),
            Self::Exact(expected) => current == Some(expected),
        };
        if matches {
            Ok(())
        } else {
            Err(DomainError::ConcurrencyConflict {
                stream: stream.to_owned(),
                expected: self,
                actual: current,
            })
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any version"),
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// An event ready to be appended to a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Event type identifier.
    pub event_type: String,
    /// Serialized event payload.
    pub data: serde_json::Value,
    /// Serialized headers (commit headers plus the event type header).
    pub metadata: serde_json::Value,
}

/// An event read back from a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub stream: String,
    /// 0-based position within the stream.
    pub event_number: i64,
    /// Event type identifier.
    pub event_type: String,
    /// Serialized event payload.
    pub data: serde_json::Value,
    /// Serialized headers.
    pub metadata: serde_json::Value,
    /// When the store recorded the event.
    pub created: DateTime<Utc>,
}

/// Outcome of a stream read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceReadStatus {
    /// The stream exists and the slice holds its events.
    Success,
    /// No stream with this name has ever been written.
    StreamNotFound,
    /// The stream has been tombstoned.
    StreamDeleted,
}

/// One page of a forward stream read.
#[derive(Debug, Clone)]
pub struct StreamSlice {
    /// Whether the stream could be read.
    pub status: SliceReadStatus,
    /// Events in ascending event number order.
    pub events: Vec<RecordedEvent>,
    /// Event number to start the next page from.
    pub next_event_number: i64,
    /// `true` when this page reached the last event of the stream.
    pub is_end_of_stream: bool,
}

impl StreamSlice {
    /// A slice for a stream that does not exist.
    #[must_use]
    pub fn not_found(start: i64) -> Self {
        Self::without_events(SliceReadStatus::StreamNotFound, start)
    }

    /// A slice for a stream that has been deleted.
    #[must_use]
    pub fn deleted(start: i64) -> Self {
        Self::without_events(SliceReadStatus::StreamDeleted, start)
    }

    fn without_events(status: SliceReadStatus, start: i64) -> Self {
        Self {
            status,
            events: Vec::new(),
            next_event_number: start,
            is_end_of_stream: true,
        }
    }
}

/// Result of a successful append or transaction commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// The expected version to pass for the next append to this stream.
    pub next_expected_version: i64,
}

/// A pluggable store connection over named, append-only streams.
#[async_trait]
pub trait EventStoreConnection: Send + Sync {
    /// Reads at most `count` events forward from `start` (inclusive).
    async fn read_stream_events_forward(
        &self,
        stream: &str,
        start: i64,
        count: usize,
    ) -> Result<StreamSlice, DomainError>;

    /// Appends `events` atomically if the stream is at `expected_version`.
    async fn append_to_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError>;

    /// Opens a write transaction scoped to `expected_version`. Events written
    /// through it become visible together on commit, or not at all.
    async fn start_transaction(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError>;

    /// Tombstones a stream. Later reads report it as deleted and appends fail.
    async fn delete_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<(), DomainError>;

    /// Releases the underlying connection resources.
    async fn close(&self) {}
}

/// A multi-page write transaction against one stream.
#[async_trait]
pub trait EventStoreTransaction: Send {
    /// Stages one page of events.
    async fn write(&mut self, events: Vec<EventData>) -> Result<(), DomainError>;

    /// Makes every staged event visible atomically.
    async fn commit(self: Box<Self>) -> Result<WriteResult, DomainError>;

    /// Discards every staged event.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
