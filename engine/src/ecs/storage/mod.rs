//! Storage for entity data: archetype tables, the archetype graph and the sparse store.

pub mod archetype;
pub mod column;
mod edge;
pub mod graph;
pub(crate) mod index;
mod location;
pub mod sparse;

pub use archetype::Archetype;
pub use column::{Column, TypedColumn};
pub use edge::EdgeKind;
pub use graph::Archetypes;
pub use location::Location;
pub use sparse::{SparseColumn, SparseMask, SparseSet, SparseStore};
