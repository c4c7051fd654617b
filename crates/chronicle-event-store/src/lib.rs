//! Chronicle Event Store — PostgreSQL implementation of the event store
//! connection used by `chronicle-core`'s repository.

pub mod config;
pub mod pg_event_store;
pub mod schema;
