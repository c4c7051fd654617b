//! Test aggregate and the wiring a repository needs to persist it.

use std::sync::Arc;

use chronicle_core::aggregate::{AggregateBase, AggregateRoot};
use chronicle_core::codec::EventTypeRegistry;
use chronicle_core::error::DomainError;
use chronicle_core::event::Event;
use chronicle_core::factory::AggregateFactory;
use chronicle_core::repository::EventStoreRepository;
use chronicle_core::router::EventRouter;
use chronicle_core::store::EventStoreConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate type name of [`TestAggregate`].
pub const TEST_AGGREGATE_TYPE: &str = "TestAggregate";

/// First event of every [`TestAggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAggregateCreated {
    /// Identity of the created aggregate.
    pub id: Uuid,
    /// Initial name.
    pub name: String,
}

impl Event for TestAggregateCreated {
    const EVENT_TYPE: &'static str = "TestAggregateCreated";
}

/// The aggregate's name changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameUpdated {
    /// New name.
    pub name: String,
}

impl Event for NameUpdated {
    const EVENT_TYPE: &'static str = "NameUpdated";
}

/// Known to the event type registry but with no handler on [`TestAggregate`],
/// for exercising strict routing on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unrouted {
    /// Free text.
    pub note: String,
}

impl Event for Unrouted {
    const EVENT_TYPE: &'static str = "Unrouted";
}

/// Minimal aggregate with a name, used across repository tests.
#[derive(Debug)]
pub struct TestAggregate {
    base: AggregateBase<Self>,
    name: String,
}

impl TestAggregate {
    /// Identity-only constructor used by the factory.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` for a nil identity.
    pub fn new(id: Uuid) -> Result<Self, DomainError> {
        Ok(Self {
            base: AggregateBase::new(id)?,
            name: String::new(),
        })
    }

    /// Creates a new aggregate and raises its creation event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` for a nil identity.
    pub fn create(id: Uuid, name: &str) -> Result<Self, DomainError> {
        let mut aggregate = Self::new(id)?;
        aggregate.raise_event(TestAggregateCreated {
            id,
            name: name.to_owned(),
        })?;
        Ok(aggregate)
    }

    /// Renames the aggregate.
    ///
    /// # Errors
    ///
    /// Propagates routing errors from `raise_event`.
    pub fn change_name(&mut self, name: &str) -> Result<(), DomainError> {
        self.raise_event(NameUpdated {
            name: name.to_owned(),
        })
    }

    /// Raises an event the aggregate has no handler for.
    ///
    /// # Errors
    ///
    /// Always returns `DomainError::HandlerNotFound`.
    pub fn raise_unrouted(&mut self, note: &str) -> Result<(), DomainError> {
        self.raise_event(Unrouted {
            note: note.to_owned(),
        })
    }

    /// Returns the current name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn apply_created(&mut self, event: &TestAggregateCreated) {
        self.name.clone_from(&event.name);
    }

    fn apply_name_updated(&mut self, event: &NameUpdated) {
        self.name.clone_from(&event.name);
    }
}

impl AggregateRoot for TestAggregate {
    const AGGREGATE_TYPE: &'static str = TEST_AGGREGATE_TYPE;

    fn register_handlers(router: &mut EventRouter<Self>) -> Result<(), DomainError> {
        router
            .on::<TestAggregateCreated>(Self::apply_created)?
            .on::<NameUpdated>(Self::apply_name_updated)?;
        Ok(())
    }

    fn base(&self) -> &AggregateBase<Self> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<Self> {
        &mut self.base
    }
}

/// Registry holding every test event type, including [`Unrouted`].
///
/// # Panics
///
/// Panics if the test event types collide, which would be a fixture bug.
#[must_use]
pub fn test_event_types() -> EventTypeRegistry {
    let mut registry = EventTypeRegistry::new();
    registry
        .register::<TestAggregateCreated>()
        .and_then(|r| r.register::<NameUpdated>())
        .and_then(|r| r.register::<Unrouted>())
        .expect("test event types are distinct");
    registry
}

/// Factory that can build [`TestAggregate`].
#[must_use]
pub fn test_factory() -> AggregateFactory {
    let mut factory = AggregateFactory::new();
    factory.register::<TestAggregate>(TestAggregate::new);
    factory
}

/// Repository over `connection` wired for [`TestAggregate`].
#[must_use]
pub fn test_repository(connection: Arc<dyn EventStoreConnection>) -> EventStoreRepository {
    EventStoreRepository::new(connection, test_factory(), test_event_types())
}
