//! Synchronous facade over [`EventStoreRepository`].
//!
//! Each call blocks the current thread on the async operation using a
//! private current-thread runtime. Must not be called from inside another
//! Tokio runtime.

use tokio::runtime::{Builder, Runtime};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::codec::Headers;
use crate::error::DomainError;
use crate::repository::EventStoreRepository;

/// Blocking wrapper that waits for each repository operation to finish.
#[derive(Debug)]
pub struct BlockingRepository {
    inner: EventStoreRepository,
    runtime: Runtime,
}

impl BlockingRepository {
    /// Wraps `inner` with its own runtime.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the runtime cannot be built.
    pub fn new(inner: EventStoreRepository) -> Result<Self, DomainError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DomainError::Infrastructure(format!("failed to build runtime: {e}")))?;
        Ok(Self { inner, runtime })
    }

    /// Blocking [`EventStoreRepository::get_by_id`].
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::load`].
    pub fn get_by_id<A: AggregateRoot>(&self, id: Uuid) -> Result<A, DomainError> {
        self.runtime.block_on(self.inner.get_by_id(id))
    }

    /// Blocking [`EventStoreRepository::get_by_id_at_version`].
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::load`].
    pub fn get_by_id_at_version<A: AggregateRoot>(
        &self,
        id: Uuid,
        version: i64,
    ) -> Result<A, DomainError> {
        self.runtime
            .block_on(self.inner.get_by_id_at_version(id, version))
    }

    /// Blocking [`EventStoreRepository::save`].
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::save_cancellable`].
    pub fn save<A: AggregateRoot>(&self, aggregate: &mut A, commit_id: Uuid) -> Result<(), DomainError> {
        self.runtime.block_on(self.inner.save(aggregate, commit_id))
    }

    /// Blocking [`EventStoreRepository::save_with_headers`].
    ///
    /// # Errors
    ///
    /// See [`EventStoreRepository::save_cancellable`].
    pub fn save_with_headers<A, F>(
        &self,
        aggregate: &mut A,
        commit_id: Uuid,
        update_headers: F,
    ) -> Result<(), DomainError>
    where
        A: AggregateRoot,
        F: FnOnce(&mut Headers),
    {
        self.runtime
            .block_on(self.inner.save_with_headers(aggregate, commit_id, update_headers))
    }

    /// Returns the wrapped async repository, dropping the runtime.
    #[must_use]
    pub fn into_inner(self) -> EventStoreRepository {
        self.inner
    }

    /// Releases the store connection.
    pub fn close(self) {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.close());
    }
}
