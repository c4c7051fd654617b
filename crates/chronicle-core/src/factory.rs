//! Aggregate factory.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;

/// Identity-only constructor for an aggregate type.
pub type Constructor<A> = fn(Uuid) -> Result<A, DomainError>;

/// Builds blank aggregate instances for the repository to replay into.
///
/// Constructors are registered at startup; asking for a type that was never
/// registered is a configuration error.
#[derive(Default)]
pub struct AggregateFactory {
    constructors: HashMap<TypeId, (&'static str, Box<dyn Any + Send + Sync>)>,
}

impl AggregateFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the identity-only constructor for `A`, replacing any
    /// previous one.
    pub fn register<A: AggregateRoot>(&mut self, constructor: Constructor<A>) -> &mut Self {
        self.constructors.insert(
            TypeId::of::<A>(),
            (A::AGGREGATE_TYPE, Box::new(constructor)),
        );
        self
    }

    /// Returns `true` if `A` can be built.
    #[must_use]
    pub fn contains<A: AggregateRoot>(&self) -> bool {
        self.constructors.contains_key(&TypeId::of::<A>())
    }

    /// Builds a blank `A` with the given identity.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` for a nil identity and
    /// `DomainError::MissingConstructor` if `A` was never registered.
    pub fn build<A: AggregateRoot>(&self, id: Uuid) -> Result<A, DomainError> {
        if id.is_nil() {
            return Err(DomainError::InvalidArgument(format!(
                "{} identity must not be nil",
                A::AGGREGATE_TYPE
            )));
        }
        let constructor = self
            .constructors
            .get(&TypeId::of::<A>())
            .and_then(|(_, constructor)| constructor.downcast_ref::<Constructor<A>>())
            .ok_or(DomainError::MissingConstructor {
                aggregate_type: A::AGGREGATE_TYPE,
            })?;
        constructor(id)
    }
}

impl fmt::Debug for AggregateFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut aggregate_types: Vec<_> = self.constructors.values().map(|(name, _)| name).collect();
        aggregate_types.sort_unstable();
        f.debug_struct("AggregateFactory")
            .field("aggregate_types", &aggregate_types)
            .finish()
    }
}
