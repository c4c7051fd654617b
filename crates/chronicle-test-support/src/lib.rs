//! Shared test stores, fixtures and utilities for Chronicle.

mod clock;
mod fixtures;
mod store;
mod tracing;

pub use clock::FixedClock;
pub use fixtures::{
    NameUpdated, TEST_AGGREGATE_TYPE, TestAggregate, TestAggregateCreated, Unrouted,
    test_event_types, test_factory, test_repository,
};
pub use store::{FailingEventStore, InMemoryEventStore, StalledEventStore, StoreStats};
pub use tracing::init_tracing;
