//! Domain event abstractions.

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DomainError;

/// Object-safe view of a domain event.
///
/// A single stream holds events of many concrete types, so uncommitted
/// buffers and replay work with `dyn DomainEvent`. Implemented automatically
/// for every [`Event`].
pub trait DomainEvent: Send + Sync + fmt::Debug + 'static {
    /// Returns the event type identifier written to the event type header.
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// Returns `self` as `Any` so routers can recover the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Trait that all concrete event types implement.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct NameUpdated { name: String }
///
/// impl Event for NameUpdated {
///     const EVENT_TYPE: &'static str = "NameUpdated";
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Stable type identifier. Persisted with every event, so it must never
    /// change once events of this type have been written.
    const EVENT_TYPE: &'static str;
}

impl<E: Event> DomainEvent for E {
    fn event_type(&self) -> &'static str {
        E::EVENT_TYPE
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(self).map_err(|e| {
            DomainError::Serialization(format!("failed to encode {}: {e}", E::EVENT_TYPE))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
