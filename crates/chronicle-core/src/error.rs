//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::store::ExpectedVersion;

/// Top-level error type for the aggregate framework and its stores.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A nil identity, empty name or otherwise unusable argument was passed in.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation cannot be carried out with the given inputs.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An event was dispatched to an aggregate that has no handler for it.
    #[error("aggregate {aggregate_type} has no handler for event {event_type}")]
    HandlerNotFound {
        /// The aggregate the event was dispatched to.
        aggregate_type: &'static str,
        /// The unmatched event type identifier.
        event_type: String,
    },

    /// A second handler was registered for an event type.
    #[error("aggregate {aggregate_type} already has a handler for event {event_type}")]
    DuplicateHandler {
        /// The aggregate being registered.
        aggregate_type: &'static str,
        /// The event type that already has a handler.
        event_type: &'static str,
    },

    /// The factory has no constructor for the requested aggregate type.
    #[error("no constructor registered for aggregate {aggregate_type}")]
    MissingConstructor {
        /// The aggregate that could not be built.
        aggregate_type: &'static str,
    },

    /// Two different event types were registered under the same identifier.
    #[error("event type identifier {0} is already registered to a different type")]
    DuplicateEventType(&'static str),

    /// A stored event carries a type identifier no decoder is registered for.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The requested aggregate stream does not exist.
    #[error("aggregate not found: {aggregate_type} {id}")]
    AggregateNotFound {
        /// The aggregate type requested.
        aggregate_type: &'static str,
        /// The aggregate identity requested.
        id: Uuid,
    },

    /// The requested aggregate stream has been deleted.
    #[error("aggregate deleted: {aggregate_type} {id}")]
    AggregateDeleted {
        /// The aggregate type requested.
        aggregate_type: &'static str,
        /// The aggregate identity requested.
        id: Uuid,
    },

    /// Replay did not land on the exact version requested.
    #[error("aggregate {aggregate_type} {id} is at version {actual}, requested version {requested}")]
    AggregateVersion {
        /// The aggregate type requested.
        aggregate_type: &'static str,
        /// The aggregate identity requested.
        id: Uuid,
        /// The version reached by replay.
        actual: i64,
        /// The version the caller asked for.
        requested: i64,
    },

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on stream {stream}: expected {expected}, found {}", display_actual(.actual.as_ref()))]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream: String,
        /// The version the writer expected.
        expected: ExpectedVersion,
        /// The last event number actually in the stream, `None` if it does not exist.
        actual: Option<i64>,
    },

    /// A write targeted a stream that has been deleted.
    #[error("stream deleted: {0}")]
    StreamDeleted(String),

    /// An event payload or header could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for conditions a caller can act on (create instead of
    /// load, reload and retry), `false` for programming and configuration
    /// errors.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AggregateNotFound { .. }
                | Self::AggregateDeleted { .. }
                | Self::AggregateVersion { .. }
                | Self::ConcurrencyConflict { .. }
                | Self::StreamDeleted(_)
                | Self::Cancelled
                | Self::Infrastructure(_)
        )
    }
}

fn display_actual(actual: Option<&i64>) -> String {
    actual.map_or_else(|| "no stream".to_owned(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_conflict_message_names_both_versions() {
        let err = DomainError::ConcurrencyConflict {
            stream: "testAggregate-00".to_owned(),
            expected: ExpectedVersion::Exact(4),
            actual: Some(6),
        };

        let message = err.to_string();

        assert!(message.contains("testAggregate-00"));
        assert!(message.contains("expected 4"));
        assert!(message.contains("found 6"));
    }

    #[test]
    fn test_concurrency_conflict_message_for_missing_stream() {
        let err = DomainError::ConcurrencyConflict {
            stream: "testAggregate-00".to_owned(),
            expected: ExpectedVersion::Exact(1),
            actual: None,
        };

        assert!(err.to_string().ends_with("found no stream"));
    }

    #[test]
    fn test_programming_errors_are_not_recoverable() {
        assert!(!DomainError::InvalidArgument("nil id".into()).is_recoverable());
        assert!(
            !DomainError::HandlerNotFound {
                aggregate_type: "TestAggregate",
                event_type: "Unrouted".into(),
            }
            .is_recoverable()
        );
        assert!(
            !DomainError::MissingConstructor {
                aggregate_type: "TestAggregate",
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_store_conditions_are_recoverable() {
        let id = Uuid::new_v4();
        assert!(
            DomainError::AggregateNotFound {
                aggregate_type: "TestAggregate",
                id,
            }
            .is_recoverable()
        );
        assert!(
            DomainError::AggregateVersion {
                aggregate_type: "TestAggregate",
                id,
                actual: 2,
                requested: 3,
            }
            .is_recoverable()
        );
        assert!(
            DomainError::ConcurrencyConflict {
                stream: "s".into(),
                expected: ExpectedVersion::NoStream,
                actual: Some(0),
            }
            .is_recoverable()
        );
    }
}
