//! Event serialization across the store boundary.
//!
//! On write, every event becomes an [`EventData`] whose metadata carries the
//! commit headers plus its own type identifier. On read, the type identifier
//! header selects a decoder from an [`EventTypeRegistry`] populated at
//! startup; unknown identifiers are rejected rather than resolved.

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{DomainEvent, Event};
use crate::store::{EventData, RecordedEvent};

/// Header holding the commit identifier.
pub const COMMIT_ID_HEADER: &str = "CommitId";
/// Header holding the aggregate type name.
pub const AGGREGATE_TYPE_HEADER: &str = "AggregateTypeName";
/// Header holding the event type identifier, used to pick a decoder on read.
pub const EVENT_TYPE_HEADER: &str = "EventTypeName";

/// Header map persisted as each event's metadata.
pub type Headers = serde_json::Map<String, serde_json::Value>;

type Decoder = fn(serde_json::Value) -> Result<Box<dyn DomainEvent>, DomainError>;

fn decode<E: Event>(payload: serde_json::Value) -> Result<Box<dyn DomainEvent>, DomainError> {
    let event: E = serde_json::from_value(payload).map_err(|e| {
        DomainError::Serialization(format!("failed to decode {}: {e}", E::EVENT_TYPE))
    })?;
    Ok(Box::new(event))
}

/// Explicit event type identifier → decoder table.
#[derive(Default)]
pub struct EventTypeRegistry {
    decoders: HashMap<&'static str, (TypeId, Decoder)>,
}

impl EventTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the decoder for `E` under `E::EVENT_TYPE`.
    ///
    /// Registering the same type twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateEventType` if another type already uses
    /// the identifier.
    pub fn register<E: Event>(&mut self) -> Result<&mut Self, DomainError> {
        match self.decoders.entry(E::EVENT_TYPE) {
            Entry::Occupied(existing) if existing.get().0 != TypeId::of::<E>() => {
                return Err(DomainError::DuplicateEventType(E::EVENT_TYPE));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert((TypeId::of::<E>(), decode::<E>));
            }
        }
        Ok(self)
    }

    /// Returns `true` if a decoder is registered for `event_type`.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Decodes a recorded event into its concrete type, resolved from the
    /// event type header.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the header is missing or the
    /// payload does not match, `DomainError::UnknownEventType` if no decoder
    /// is registered for the identifier.
    pub fn decode(&self, recorded: &RecordedEvent) -> Result<Box<dyn DomainEvent>, DomainError> {
        let event_type = event_type_header(&recorded.metadata).ok_or_else(|| {
            DomainError::Serialization(format!(
                "event {} in stream {} has no {EVENT_TYPE_HEADER} header",
                recorded.event_number, recorded.stream
            ))
        })?;
        let (_, decoder) = self
            .decoders
            .get(event_type)
            .ok_or_else(|| DomainError::UnknownEventType(event_type.to_owned()))?;
        decoder(recorded.data.clone())
    }
}

impl fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut event_types: Vec<_> = self.decoders.keys().collect();
        event_types.sort_unstable();
        f.debug_struct("EventTypeRegistry")
            .field("event_types", &event_types)
            .finish()
    }
}

fn event_type_header(metadata: &serde_json::Value) -> Option<&str> {
    metadata.get(EVENT_TYPE_HEADER)?.as_str()
}

/// Builds the headers shared by every event of one commit.
#[must_use]
pub fn commit_headers(aggregate_type: &str, commit_id: Uuid) -> Headers {
    let mut headers = Headers::new();
    headers.insert(COMMIT_ID_HEADER.to_owned(), commit_id.to_string().into());
    headers.insert(AGGREGATE_TYPE_HEADER.to_owned(), aggregate_type.into());
    headers
}

/// Serializes one event for appending, tagging its metadata with its own
/// type identifier on top of the commit headers.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the payload cannot be encoded.
pub fn to_event_data(
    event_id: Uuid,
    event: &dyn DomainEvent,
    commit_headers: &Headers,
) -> Result<EventData, DomainError> {
    let mut headers = commit_headers.clone();
    headers.insert(EVENT_TYPE_HEADER.to_owned(), event.event_type().into());
    Ok(EventData {
        event_id,
        event_type: event.event_type().to_owned(),
        data: event.to_payload()?,
        metadata: serde_json::Value::Object(headers),
    })
}
