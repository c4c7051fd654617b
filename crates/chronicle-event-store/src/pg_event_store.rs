//! `PostgreSQL` implementation of the `EventStoreConnection` trait.
//!
//! Each stream has a row in `event_streams` tracking its last event number
//! and tombstone flag. Writers lock that row with `SELECT ... FOR UPDATE`
//! before checking the expected version, so concurrent appends to one stream
//! serialize and the loser sees the moved position.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use chronicle_core::error::DomainError;
use chronicle_core::store::{
    EventData, EventStoreConnection, EventStoreTransaction, ExpectedVersion, RecordedEvent,
    SliceReadStatus, StreamSlice, WriteResult,
};

use crate::config::PgStoreConfig;

/// Rows per `INSERT`, keeping bind parameters under the protocol limit.
const MAX_ROWS_PER_INSERT: usize = 1000;

/// PostgreSQL-backed event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore` over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from `config`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the database is unreachable.
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(db_error)?;
        tracing::info!(
            max_connections = config.max_connections,
            "connected to event store"
        );
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct StreamRow {
    last_event_number: i64,
    deleted: bool,
}

#[derive(FromRow)]
struct EventRow {
    event_id: Uuid,
    stream_name: String,
    event_number: i64,
    event_type: String,
    data: serde_json::Value,
    metadata: serde_json::Value,
    created: DateTime<Utc>,
}

impl From<EventRow> for RecordedEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            stream: row.stream_name,
            event_number: row.event_number,
            event_type: row.event_type,
            data: row.data,
            metadata: row.metadata,
            created: row.created,
        }
    }
}

#[async_trait]
impl EventStoreConnection for PgEventStore {
    #[tracing::instrument(skip(self))]
    async fn read_stream_events_forward(
        &self,
        stream: &str,
        start: i64,
        count: usize,
    ) -> Result<StreamSlice, DomainError> {
        let row: Option<StreamRow> = sqlx::query_as(
            "SELECT last_event_number, deleted FROM event_streams WHERE stream_name = $1",
        )
        .bind(stream)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let last_event_number = match row {
            Some(StreamRow { deleted: true, .. }) => return Ok(StreamSlice::deleted(start)),
            Some(StreamRow {
                last_event_number, ..
            }) if last_event_number >= 0 => last_event_number,
            _ => return Ok(StreamSlice::not_found(start)),
        };

        let events: Vec<RecordedEvent> = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, stream_name, event_number, event_type, data, metadata, created \
             FROM stream_events \
             WHERE stream_name = $1 AND event_number >= $2 \
             ORDER BY event_number \
             LIMIT $3",
        )
        .bind(stream)
        .bind(start)
        .bind(i64::try_from(count).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(RecordedEvent::from)
        .collect();

        let next_event_number = events.last().map_or(start, |e| e.event_number + 1);
        Ok(StreamSlice {
            status: SliceReadStatus::Success,
            is_end_of_stream: next_event_number > last_event_number,
            next_event_number,
            events,
        })
    }

    #[tracing::instrument(skip(self, events), fields(%expected_version, events = events.len()))]
    async fn append_to_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let current = lock_stream(&mut tx, stream, expected_version).await?;
        if events.is_empty() {
            tx.rollback().await.map_err(db_error)?;
            return Ok(WriteResult {
                next_expected_version: current.unwrap_or(-1),
            });
        }

        let last = insert_events(&mut tx, stream, next_event_number(current), &events).await?;
        tx.commit().await.map_err(db_error)?;
        tracing::debug!(last, "appended events");
        Ok(WriteResult {
            next_expected_version: last,
        })
    }

    #[tracing::instrument(skip(self), fields(%expected_version))]
    async fn start_transaction(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<Box<dyn EventStoreTransaction>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let current = lock_stream(&mut tx, stream, expected_version).await?;
        Ok(Box::new(PgEventStoreTransaction {
            tx,
            stream: stream.to_owned(),
            last: current.unwrap_or(-1),
        }))
    }

    #[tracing::instrument(skip(self), fields(%expected_version))]
    async fn delete_stream(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        lock_stream(&mut tx, stream, expected_version).await?;
        sqlx::query("UPDATE event_streams SET deleted = TRUE WHERE stream_name = $1")
            .bind(stream)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        tracing::info!(stream, "stream tombstoned");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Write transaction holding the stream row lock until commit or rollback.
struct PgEventStoreTransaction {
    tx: Transaction<'static, Postgres>,
    stream: String,
    last: i64,
}

#[async_trait]
impl EventStoreTransaction for PgEventStoreTransaction {
    #[tracing::instrument(skip_all, fields(stream = %self.stream, events = events.len()))]
    async fn write(&mut self, events: Vec<EventData>) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        self.last = insert_events(&mut self.tx, &self.stream, self.last + 1, &events).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<WriteResult, DomainError> {
        let Self { tx, stream, last } = *self;
        tx.commit().await.map_err(db_error)?;
        tracing::debug!(stream, last, "committed transaction");
        Ok(WriteResult {
            next_expected_version: last,
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(db_error)
    }
}

/// Locks the stream's row, creating it if absent, and checks the writer's
/// expectation. Returns the last event number, `None` for an empty stream.
async fn lock_stream(
    conn: &mut PgConnection,
    stream: &str,
    expected_version: ExpectedVersion,
) -> Result<Option<i64>, DomainError> {
    sqlx::query(
        "INSERT INTO event_streams (stream_name) VALUES ($1) \
         ON CONFLICT (stream_name) DO NOTHING",
    )
    .bind(stream)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    let row: StreamRow = sqlx::query_as(
        "SELECT last_event_number, deleted FROM event_streams \
         WHERE stream_name = $1 FOR UPDATE",
    )
    .bind(stream)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error)?;

    if row.deleted {
        return Err(DomainError::StreamDeleted(stream.to_owned()));
    }
    let current = (row.last_event_number >= 0).then_some(row.last_event_number);
    expected_version.check(stream, current)?;
    Ok(current)
}

/// Inserts `events` numbered from `first` and advances the stream row.
/// Returns the new last event number.
async fn insert_events(
    conn: &mut PgConnection,
    stream: &str,
    first: i64,
    events: &[EventData],
) -> Result<i64, DomainError> {
    let mut number = first;
    for chunk in events.chunks(MAX_ROWS_PER_INSERT) {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO stream_events \
             (stream_name, event_number, event_id, event_type, data, metadata) ",
        );
        builder.push_values(chunk, |mut row, event| {
            row.push_bind(stream.to_owned())
                .push_bind(number)
                .push_bind(event.event_id)
                .push_bind(event.event_type.clone())
                .push_bind(event.data.clone())
                .push_bind(event.metadata.clone());
            number += 1;
        });
        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
    }

    let last = number - 1;
    sqlx::query("UPDATE event_streams SET last_event_number = $2 WHERE stream_name = $1")
        .bind(stream)
        .bind(last)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(last)
}

fn next_event_number(current: Option<i64>) -> i64 {
    current.map_or(0, |last| last + 1)
}

fn db_error(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}
