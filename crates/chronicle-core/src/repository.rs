//! Event store repository.
//!
//! Bridges in-memory aggregates and durable event streams. Loading replays a
//! stream page by page into a blank aggregate built by the
//! [`AggregateFactory`]; saving serializes the aggregate's uncommitted events
//! and appends them with an optimistic concurrency check, inside a
//! transaction when they span more than one write page.
//!
//! Nothing here retries. Conflicts and missing streams are returned to the
//! caller, whose command-handling layer owns any retry policy.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::codec::{self, EventTypeRegistry, Headers};
use crate::config::RepositoryConfig;
use crate::error::DomainError;
use crate::factory::AggregateFactory;
use crate::store::{
    EventData, EventStoreConnection, EventStoreTransaction, ExpectedVersion, SliceReadStatus,
    WriteResult,
};
use crate::stream::stream_name;

/// Requested version meaning "whatever the stream currently holds".
pub const LATEST_VERSION: i64 = i64::MAX;

/// Repository persisting aggregates as append-only event streams.
///
/// Holds configuration plus a shared store connection and is safe to use
/// concurrently for different aggregates. Concurrent saves of the same
/// aggregate race at the store; the loser gets
/// `DomainError::ConcurrencyConflict`.
pub struct EventStoreRepository {
    connection: Arc<dyn EventStoreConnection>,
    factory: AggregateFactory,
    event_types: EventTypeRegistry,
    config: RepositoryConfig,
}

impl EventStoreRepository {
    /// Creates a repository with the default page sizes.
    #[must_use]
    pub fn new(
        connection: Arc<dyn EventStoreConnection>,
        factory: AggregateFactory,
        event_types: EventTypeRegistry,
    ) -> Self {
        Self {
            connection,
            factory,
            event_types,
            config: RepositoryConfig::default(),
        }
    }

    /// Replaces the paging configuration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if a page size is zero.
    pub fn with_config(mut self, config: RepositoryConfig) -> Result<Self, DomainError> {
        config
            .validate()
            .map_err(|e| DomainError::InvalidArgument(e.to_string()))?;
        self.config = config;
        Ok(self)
    }

    /// The paging configuration in use.
    #[must_use]
    pub fn config(&self) -> RepositoryConfig {
        self.config
    }

    /// Loads the latest state of an aggregate.
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::load`].
    pub async fn get_by_id<A: AggregateRoot>(&self, id: Uuid) -> Result<A, DomainError> {
        self.load(id, LATEST_VERSION, &CancellationToken::new())
            .await
    }

    /// Loads an aggregate as it was after exactly `version` events.
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::load`].
    pub async fn get_by_id_at_version<A: AggregateRoot>(
        &self,
        id: Uuid,
        version: i64,
    ) -> Result<A, DomainError> {
        self.load(id, version, &CancellationToken::new()).await
    }

    /// Replays the aggregate's stream up to `version` events
    /// ([`LATEST_VERSION`] for all of them).
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidOperation` if `version <= 0`; the store is not
    ///   touched.
    /// - `DomainError::AggregateNotFound` / `DomainError::AggregateDeleted`
    ///   if the stream is missing, holds no events, or is tombstoned.
    /// - `DomainError::AggregateVersion` if the stream ends before `version`.
    /// - `DomainError::Cancelled` if `cancel` fires first.
    /// - Factory, decoding and routing errors as they occur.
    #[tracing::instrument(skip(self, cancel), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn load<A: AggregateRoot>(
        &self,
        id: Uuid,
        version: i64,
        cancel: &CancellationToken,
    ) -> Result<A, DomainError> {
        if version <= 0 {
            return Err(DomainError::InvalidOperation(format!(
                "cannot load {} {id} at version {version}: versions start at 1",
                A::AGGREGATE_TYPE
            )));
        }

        let stream = stream_name(A::AGGREGATE_TYPE, id);
        let mut aggregate: A = self.factory.build(id)?;
        let mut slice_start = 0_i64;

        loop {
            let slice_count = self.read_count(slice_start, version);
            let slice = cancellable(
                cancel,
                self.connection
                    .read_stream_events_forward(&stream, slice_start, slice_count),
            )
            .await?;

            match slice.status {
                SliceReadStatus::StreamNotFound => {
                    return Err(DomainError::AggregateNotFound {
                        aggregate_type: A::AGGREGATE_TYPE,
                        id,
                    });
                }
                SliceReadStatus::StreamDeleted => {
                    return Err(DomainError::AggregateDeleted {
                        aggregate_type: A::AGGREGATE_TYPE,
                        id,
                    });
                }
                SliceReadStatus::Success if slice_start == 0 && slice.events.is_empty() => {
                    return Err(DomainError::AggregateNotFound {
                        aggregate_type: A::AGGREGATE_TYPE,
                        id,
                    });
                }
                SliceReadStatus::Success => {}
            }

            tracing::debug!(
                stream = %stream,
                slice_start,
                events = slice.events.len(),
                "read stream page"
            );
            slice_start = slice.next_event_number;
            for recorded in &slice.events {
                let event = self.event_types.decode(recorded)?;
                aggregate.apply_event(event.as_ref())?;
            }

            if aggregate.version() >= version || slice.is_end_of_stream || slice.events.is_empty()
            {
                break;
            }
        }

        if version != LATEST_VERSION && aggregate.version() != version {
            return Err(DomainError::AggregateVersion {
                aggregate_type: A::AGGREGATE_TYPE,
                id,
                actual: aggregate.version(),
                requested: version,
            });
        }

        Ok(aggregate)
    }

    /// Number of events to request so a page never reads past `version`.
    fn read_count(&self, slice_start: i64, version: i64) -> usize {
        let remaining = version.saturating_sub(slice_start);
        usize::try_from(remaining)
            .map_or(self.config.read_page_size, |remaining| {
                remaining.min(self.config.read_page_size)
            })
            .max(1)
    }

    /// Persists the aggregate's uncommitted events under `commit_id`.
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::save_cancellable`].
    pub async fn save<A: AggregateRoot>(
        &self,
        aggregate: &mut A,
        commit_id: Uuid,
    ) -> Result<(), DomainError> {
        self.save_cancellable(aggregate, commit_id, |_| {}, &CancellationToken::new())
            .await
    }

    /// Persists the aggregate's uncommitted events, letting the caller add
    /// headers to the commit before it is written.
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::save_cancellable`].
    pub async fn save_with_headers<A, F>(
        &self,
        aggregate: &mut A,
        commit_id: Uuid,
        update_headers: F,
    ) -> Result<(), DomainError>
    where
        A: AggregateRoot,
        F: FnOnce(&mut Headers),
    {
        self.save_cancellable(aggregate, commit_id, update_headers, &CancellationToken::new())
            .await
    }

    /// Appends the aggregate's uncommitted events to its stream, expecting
    /// the stream to be where it was before those events were raised.
    ///
    /// Up to one write page goes out as a single append; more than that is
    /// written page by page inside one transaction. The uncommitted buffer is
    /// cleared only after the store accepts the whole batch, so a failed save
    /// can be inspected or retried from a fresh load.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidArgument` for a nil `commit_id`.
    /// - `DomainError::ConcurrencyConflict` if the stream has moved.
    /// - `DomainError::StreamDeleted` if the stream was tombstoned.
    /// - `DomainError::Cancelled` if `cancel` fires before a single append is
    ///   issued, or before a multi-page transaction commits; nothing is
    ///   written. An append already in flight runs to completion.
    /// - Serialization and store errors as they occur.
    #[tracing::instrument(
        skip(self, aggregate, update_headers, cancel),
        fields(aggregate_type = A::AGGREGATE_TYPE, aggregate_id = %aggregate.aggregate_id())
    )]
    pub async fn save_cancellable<A, F>(
        &self,
        aggregate: &mut A,
        commit_id: Uuid,
        update_headers: F,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>
    where
        A: AggregateRoot,
        F: FnOnce(&mut Headers),
    {
        if commit_id.is_nil() {
            return Err(DomainError::InvalidArgument(
                "commit id must not be nil".into(),
            ));
        }
        if aggregate.uncommitted_events().is_empty() {
            tracing::debug!("no uncommitted events, nothing to save");
            return Ok(());
        }

        let mut headers = codec::commit_headers(A::AGGREGATE_TYPE, commit_id);
        update_headers(&mut headers);

        let uncommitted = i64::try_from(aggregate.uncommitted_events().len())
            .map_err(|_| DomainError::InvalidOperation("too many uncommitted events".into()))?;
        let expected_version = ExpectedVersion::before_uncommitted(aggregate.version(), uncommitted);
        let events = aggregate
            .uncommitted_events()
            .iter()
            .map(|event| codec::to_event_data(Uuid::now_v7(), event.as_ref(), &headers))
            .collect::<Result<Vec<_>, _>>()?;

        let stream = stream_name(A::AGGREGATE_TYPE, aggregate.aggregate_id());
        let result = if events.len() <= self.config.write_page_size {
            // Once issued, a single append runs to completion.
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            self.connection
                .append_to_stream(&stream, expected_version, events)
                .await?
        } else {
            self.write_in_transaction(&stream, expected_version, events, cancel)
                .await?
        };

        tracing::debug!(
            stream = %stream,
            %commit_id,
            %expected_version,
            next_expected_version = result.next_expected_version,
            "committed events"
        );
        aggregate.clear_uncommitted_events();
        Ok(())
    }

    /// Writes `events` in write-page segments inside one transaction scoped
    /// to `expected_version`. Rolls back on any failure or cancellation.
    async fn write_in_transaction(
        &self,
        stream: &str,
        expected_version: ExpectedVersion,
        mut events: Vec<EventData>,
        cancel: &CancellationToken,
    ) -> Result<WriteResult, DomainError> {
        let mut transaction = cancellable(
            cancel,
            self.connection.start_transaction(stream, expected_version),
        )
        .await?;

        while !events.is_empty() {
            let rest = events.split_off(self.config.write_page_size.min(events.len()));
            let page = std::mem::replace(&mut events, rest);
            tracing::debug!(stream, events = page.len(), "writing transaction page");
            let written = cancellable(cancel, transaction.write(page)).await;
            if let Err(err) = written {
                rollback(transaction, stream).await;
                return Err(err);
            }
        }

        if cancel.is_cancelled() {
            rollback(transaction, stream).await;
            return Err(DomainError::Cancelled);
        }
        transaction.commit().await
    }

    /// Releases the store connection.
    pub async fn close(self) {
        self.connection.close().await;
    }
}

impl fmt::Debug for EventStoreRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStoreRepository")
            .field("factory", &self.factory)
            .field("event_types", &self.event_types)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn rollback(transaction: Box<dyn EventStoreTransaction>, stream: &str) {
    if let Err(err) = transaction.rollback().await {
        tracing::warn!(stream, error = %err, "transaction rollback failed");
    }
}

/// Runs `operation` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, DomainError>>,
) -> Result<T, DomainError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DomainError::Cancelled),
        result = operation => result,
    }
}
