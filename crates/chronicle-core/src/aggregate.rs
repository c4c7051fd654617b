//! Aggregate root abstraction.
//!
//! An aggregate embeds an [`AggregateBase`] holding its identity, version,
//! uncommitted events and router, and implements [`AggregateRoot`] to expose
//! it. The trait's provided methods are the state machine: every event, live
//! or replayed, goes through [`AggregateRoot::apply_event`], which is the only
//! place the version advances.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{DomainEvent, Event};
use crate::router::{EventRouter, RoutingMode};

/// Version of an aggregate with no applied events.
pub const NEW_AGGREGATE_VERSION: i64 = 0;

/// State shared by every aggregate root.
///
/// Two bases are equal when identity and version match; hashing uses the
/// identity alone. Compare aggregates with `a.base() == b.base()` or
/// [`AggregateRoot::same_snapshot`].
pub struct AggregateBase<A> {
    id: Uuid,
    version: i64,
    uncommitted_events: Vec<Box<dyn DomainEvent>>,
    router: Arc<EventRouter<A>>,
}

impl<A: AggregateRoot> AggregateBase<A> {
    /// Creates the base for a new aggregate with strict routing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if `id` is nil, or any error
    /// raised while registering the aggregate's handlers.
    pub fn new(id: Uuid) -> Result<Self, DomainError> {
        Self::with_routing(id, RoutingMode::Strict)
    }

    /// Creates the base for a new aggregate with the given routing mode.
    ///
    /// # Errors
    ///
    /// See [`AggregateBase::new`].
    pub fn with_routing(id: Uuid, mode: RoutingMode) -> Result<Self, DomainError> {
        if id.is_nil() {
            return Err(DomainError::InvalidArgument(format!(
                "{} identity must not be nil",
                A::AGGREGATE_TYPE
            )));
        }
        Ok(Self {
            id,
            version: NEW_AGGREGATE_VERSION,
            uncommitted_events: Vec::new(),
            router: Arc::new(EventRouter::for_aggregate(mode)?),
        })
    }
}

impl<A> AggregateBase<A> {
    /// Returns the aggregate identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the number of events applied so far.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns `true` until the first event has been applied.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.version == NEW_AGGREGATE_VERSION
    }

    /// Returns the events raised since the last save.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[Box<dyn DomainEvent>] {
        &self.uncommitted_events
    }

    /// Returns this instance's router.
    #[must_use]
    pub fn router(&self) -> &EventRouter<A> {
        &self.router
    }
}

impl<A> PartialEq for AggregateBase<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl<A> Eq for AggregateBase<A> {}

impl<A> Hash for AggregateBase<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<A> fmt::Debug for AggregateBase<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateBase")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("uncommitted_events", &self.uncommitted_events)
            .field("router", &self.router)
            .finish()
    }
}

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Sized + Send + Sync + 'static {
    /// Type name used for stream names and the aggregate type header.
    const AGGREGATE_TYPE: &'static str;

    /// Declares this aggregate's event handlers. Called once per instance
    /// when its [`AggregateBase`] is built.
    ///
    /// # Errors
    ///
    /// Propagates `DomainError::DuplicateHandler` from the router.
    fn register_handlers(router: &mut EventRouter<Self>) -> Result<(), DomainError>;

    /// Returns the embedded base state.
    fn base(&self) -> &AggregateBase<Self>;

    /// Returns the embedded base state mutably.
    fn base_mut(&mut self) -> &mut AggregateBase<Self>;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid {
        self.base().id
    }

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64 {
        self.base().version
    }

    /// Returns `true` if both aggregates have the same identity and version.
    ///
    /// Equality and hashing live on [`AggregateBase`]; this compares two
    /// concrete aggregates through their bases.
    fn same_snapshot(&self, other: &Self) -> bool {
        self.base() == other.base()
    }

    /// Routes `event` to its handler, then advances the version by one.
    ///
    /// Used both for replay and, through [`AggregateRoot::raise_event`], for
    /// live changes. The version is left untouched if routing fails.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::HandlerNotFound` under strict routing when the
    /// event has no handler.
    fn apply_event(&mut self, event: &dyn DomainEvent) -> Result<(), DomainError> {
        let router = Arc::clone(&self.base().router);
        router.dispatch(self, event)?;
        self.base_mut().version += 1;
        Ok(())
    }

    /// Applies a new event and stages it for the next save.
    ///
    /// # Errors
    ///
    /// See [`AggregateRoot::apply_event`]. Nothing is staged on failure.
    fn raise_event<E: Event>(&mut self, event: E) -> Result<(), DomainError> {
        self.apply_event(&event)?;
        self.base_mut().uncommitted_events.push(Box::new(event));
        Ok(())
    }

    /// Returns uncommitted events produced by domain operations.
    fn uncommitted_events(&self) -> &[Box<dyn DomainEvent>] {
        &self.base().uncommitted_events
    }

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self) {
        self.base_mut().uncommitted_events.clear();
    }
}
