//! Component and tag types.
//!
//! - [`Component`]: data attached to an entity. Stored in archetype columns by default, or in the
//!   sparse store when the type declares [`StorageKind::Sparse`].
//! - [`Tag`]: a data-less marker. Tags are part of an archetype's identity, so tagging an entity
//!   moves it to another archetype.
//! - [`TypeRegistry`]: the process wide mapping from Rust types to dense [`TypeId`]s shared by
//!   every world.
//! - [`Spec`]: a sorted set of type ids describing an archetype's shape.
//! - [`Set`]: a bundle of component values applied to a new entity.
//!
//! ```ignore
//! use rusty_ecs::ecs::{Component, Tag};
//!
//! #[derive(Component)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! #[component(sparse)]
//! struct Stunned { remaining: f32 }
//!
//! #[derive(Tag)]
//! struct Enemy;
//! ```

mod registry;
mod set;
mod spec;

pub use registry::{SparseBit, TypeEntry, TypeId, TypeInfo, TypeKind, TypeRegistry};
pub use set::{Set, Target};
pub use spec::Spec;

/// Where a component type's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// One contiguous column per archetype. Adding or removing migrates the entity.
    Archetype,
    /// A per-type sparse set keyed by entity index. Adding or removing never migrates.
    Sparse,
}

/// A component attached to an entity.
///
/// Usually derived with `#[derive(Component)]`; add `#[component(sparse)]` to opt into sparse
/// storage.
pub trait Component: Send + Sync + Sized + 'static {
    /// Storage used for this component type.
    const STORAGE: StorageKind = StorageKind::Archetype;
}

/// A data-less marker that participates in archetype identity.
pub trait Tag: Send + Sync + 'static {}
