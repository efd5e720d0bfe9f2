//! An archetype based entity component store.
//!
//! Entities are grouped by the exact set of archetype-stored component types and tags they
//! carry. Each group (an archetype) keeps one contiguous buffer per component type, so queries
//! walk dense memory. Components that churn often can opt into a sparse store instead, which
//! never moves the entity between archetypes.
//!
//! The crate is split in two top level modules:
//!
//! - [`ecs`]: entities, components, archetype storage, queries, iteration and update runners.
//! - [`tasks`]: the worker pool used by the parallel runners.

// Allows the derive macros to refer to `::rusty_ecs` from inside this crate.
extern crate self as rusty_ecs;

pub mod ecs;
pub mod tasks;
