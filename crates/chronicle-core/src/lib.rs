//! Chronicle Core — event-sourced aggregate framework.
//!
//! Aggregates route events to their handlers through a per-instance
//! [`router::EventRouter`], track their version and uncommitted events in an
//! [`aggregate::AggregateBase`], and are loaded and saved as append-only
//! event streams by [`repository::EventStoreRepository`]. This crate
//! contains no database code; stores implement
//! [`store::EventStoreConnection`].

pub mod aggregate;
pub mod blocking;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod repository;
pub mod router;
pub mod store;
pub mod stream;
