//! Errors raised by world operations.

use crate::ecs::entity::Entity;

/// Errors returned by the entity store.
///
/// Component and tag names are carried as `&'static str` from [`std::any::type_name`] so they
/// can be reported without holding onto registry state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The handle's generation no longer matches the live slot, or the index was never allocated.
    #[error("entity {0} is stale or was never allocated")]
    StaleOrInvalidEntity(Entity),

    /// A component was read or removed from an entity that does not carry it.
    #[error("entity {entity} has no {component} component")]
    ComponentNotFound {
        entity: Entity,
        component: &'static str,
    },

    /// A tag was removed from an entity that does not carry it.
    #[error("entity {entity} is not tagged {tag}")]
    TagNotFound { entity: Entity, tag: &'static str },

    /// A component was added to an entity that already carries it.
    #[error("entity {entity} already has a {component} component")]
    ComponentAlreadyPresent {
        entity: Entity,
        component: &'static str,
    },

    /// A tag was added to an entity that already carries it.
    #[error("entity {entity} is already tagged {tag}")]
    TagAlreadyPresent { entity: Entity, tag: &'static str },

    /// An update runner found an entity lacking one of the declared argument components.
    #[error("entity {entity} cannot update {component}: missing argument {missing}")]
    MissingDependencyAtUpdateTime {
        entity: Entity,
        component: &'static str,
        missing: &'static str,
    },

    /// A structural change was attempted while a cursor holds the world in an iteration epoch.
    #[error("cannot {operation} while an iteration is in progress")]
    IterationInProgress { operation: &'static str },

    /// More sparse component types were registered than the per-entity mask can describe.
    #[error("sparse component capacity of {capacity} types exceeded")]
    SparseCapacityExceeded { capacity: usize },

    /// A type was used both as a component and as a tag.
    #[error("{name} is registered with a different kind (component vs tag)")]
    KindMismatch { name: &'static str },

    /// A type-erased value did not match the type registered for its id.
    #[error("value does not match the registered type {expected}")]
    TypeMismatch { expected: &'static str },

    /// An update runner needs a uniform value the world does not hold.
    #[error("world has no uniform of type {uniform}")]
    UniformNotFound { uniform: &'static str },

    /// The query handle was compiled by a different world.
    #[error("query was built by a different world")]
    ForeignQuery,

    /// An internal invariant was violated. The world should be considered corrupt.
    #[error("invalid world state: {0}")]
    InvalidState(String),
}

/// Result alias for world operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
