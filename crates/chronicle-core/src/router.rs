//! Event routing.
//!
//! Each aggregate type declares its handlers once, in
//! [`AggregateRoot::register_handlers`], as an explicit event type → handler
//! table. Every aggregate instance owns the router built from that table.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::event::{DomainEvent, Event};

type Handler<A> = Box<dyn Fn(&mut A, &dyn DomainEvent) -> Result<(), DomainError> + Send + Sync>;

/// What a router does with an event it has no handler for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingMode {
    /// Fail with `DomainError::HandlerNotFound`.
    #[default]
    Strict,
    /// Ignore the event.
    Permissive,
}

/// Dispatch table mapping event type identifiers to state-mutating handlers.
pub struct EventRouter<A> {
    aggregate_type: &'static str,
    mode: RoutingMode,
    handlers: HashMap<&'static str, Handler<A>>,
}

impl<A: AggregateRoot> EventRouter<A> {
    /// Builds the router for `A` by running its handler registration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if `A` has an empty type name,
    /// or whatever error registration reports (e.g. `DuplicateHandler`).
    pub fn for_aggregate(mode: RoutingMode) -> Result<Self, DomainError> {
        if A::AGGREGATE_TYPE.is_empty() {
            return Err(DomainError::InvalidArgument(
                "aggregate type name must not be empty".into(),
            ));
        }
        let mut router = Self {
            aggregate_type: A::AGGREGATE_TYPE,
            mode,
            handlers: HashMap::new(),
        };
        A::register_handlers(&mut router)?;
        Ok(router)
    }

    /// Registers `handler` for events of type `E`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateHandler` if `E` already has a handler.
    pub fn on<E: Event>(&mut self, handler: fn(&mut A, &E)) -> Result<&mut Self, DomainError> {
        let aggregate_type = self.aggregate_type;
        match self.handlers.entry(E::EVENT_TYPE) {
            Entry::Occupied(_) => Err(DomainError::DuplicateHandler {
                aggregate_type,
                event_type: E::EVENT_TYPE,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(move |aggregate: &mut A, event: &dyn DomainEvent| {
                    // Another type claiming the same identifier has no handler here.
                    let event = event.as_any().downcast_ref::<E>().ok_or_else(|| {
                        DomainError::HandlerNotFound {
                            aggregate_type,
                            event_type: event.event_type().to_owned(),
                        }
                    })?;
                    handler(aggregate, event);
                    Ok(())
                }));
                Ok(self)
            }
        }
    }

    /// Routes `event` to its handler.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::HandlerNotFound` in strict mode if no handler is
    /// registered for the event's type.
    pub fn dispatch(&self, aggregate: &mut A, event: &dyn DomainEvent) -> Result<(), DomainError> {
        if let Some(handler) = self.handlers.get(event.event_type()) {
            return handler(aggregate, event);
        }
        match self.mode {
            RoutingMode::Strict => Err(DomainError::HandlerNotFound {
                aggregate_type: self.aggregate_type,
                event_type: event.event_type().to_owned(),
            }),
            RoutingMode::Permissive => {
                tracing::trace!(
                    aggregate_type = self.aggregate_type,
                    event_type = event.event_type(),
                    "no handler registered, event ignored"
                );
                Ok(())
            }
        }
    }
}

impl<A> EventRouter<A> {
    /// Returns `true` if a handler is registered for `event_type`.
    #[must_use]
    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The routing mode this router was built with.
    #[must_use]
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }
}

impl<A> fmt::Debug for EventRouter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut event_types: Vec<_> = self.handlers.keys().collect();
        event_types.sort_unstable();
        f.debug_struct("EventRouter")
            .field("aggregate_type", &self.aggregate_type)
            .field("mode", &self.mode)
            .field("event_types", &event_types)
            .finish()
    }
}
