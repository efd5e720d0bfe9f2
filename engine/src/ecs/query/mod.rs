//! Queries over a world's entities.
//!
//! A query is a list of rules over an archetype's shape (`with`, `without`, `tagged`,
//! `untagged`, custom predicates) plus include/exclude masks for sparse components. Building a
//! query compiles it against the world once: the world caches the compiled state under a hash of
//! the rule list, so building the same rules again returns the same [`Query`]. Compiled queries
//! stay live; archetypes created later are offered to every cached query and appended when they
//! match.
//!
//! ```ignore
//! let movers = QueryBuilder::new()
//!     .with::<Position>()
//!     .with::<Velocity>()
//!     .untagged::<Frozen>()
//!     .build(&mut world)?;
//!
//! world.for_each_entity::<Position>(&movers, |entity, position| { /* ... */ })?;
//! ```
//!
//! Rules that can never be satisfied (requiring and excluding the same type) are not an error;
//! the query simply never matches.

mod chunk;
mod cursor;
pub(crate) mod parallel;
mod state;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub(crate) use chunk::{SlotFilter, chunk_len, matching_runs};
pub use cursor::Cursor;
pub(crate) use state::{QueryCache, QueryState};

use crate::ecs::{
    Component, Tag,
    component::{SparseBit, TypeId, TypeKind, TypeRegistry},
    error::{Error, Result},
    storage::Archetype,
    world::{self, World},
};

/// A compiled query handle. Cheap to copy; only valid for the world that built it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Query {
    world: world::Id,
    index: u32,
}

impl Query {
    pub(crate) fn new(world: world::Id, index: usize) -> Self {
        Self {
            world,
            index: u32::try_from(index).expect("query id space exhausted"),
        }
    }

    /// The world this query was built by.
    #[inline]
    pub fn world_id(&self) -> world::Id {
        self.world
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }
}

/// A custom archetype filter. Two predicates are the same rule only if they share the same
/// allocation, so clone a predicate to reuse its cached query.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&Archetype) -> bool + Send + Sync>);

impl Predicate {
    pub fn new(f: impl Fn(&Archetype) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for Predicate {}

impl Hash for Predicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({:#x})", self.address())
    }
}

/// One filter of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Rule {
    With(TypeId),
    Without(TypeId),
    Tagged(TypeId),
    Untagged(TypeId),
    WithSparse(SparseBit),
    WithoutSparse(SparseBit),
    Matching(Predicate),
}

impl Rule {
    /// Whether an archetype's shape satisfies the rule. Sparse rules are decided per entity.
    fn accepts(&self, archetype: &Archetype) -> bool {
        match self {
            Rule::With(id) => archetype.has_component(*id),
            Rule::Without(id) => !archetype.has_component(*id),
            Rule::Tagged(id) => archetype.has_tag(*id),
            Rule::Untagged(id) => !archetype.has_tag(*id),
            Rule::WithSparse(_) | Rule::WithoutSparse(_) => true,
            Rule::Matching(predicate) => (predicate.0)(archetype),
        }
    }
}

/// Fluent construction of a [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    rules: Vec<Rule>,
    error: Option<Error>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`.
    pub fn with<T: Component>(self) -> Self {
        let entry = TypeRegistry::global().register_component::<T>();
        self.push(entry.map(|entry| match entry.kind {
            TypeKind::Sparse(bit) => Rule::WithSparse(bit),
            _ => Rule::With(entry.id),
        }))
    }

    /// Exclude entities carrying component `T`.
    pub fn without<T: Component>(self) -> Self {
        let entry = TypeRegistry::global().register_component::<T>();
        self.push(entry.map(|entry| match entry.kind {
            TypeKind::Sparse(bit) => Rule::WithoutSparse(bit),
            _ => Rule::Without(entry.id),
        }))
    }

    /// Require tag `G`.
    pub fn tagged<G: Tag>(self) -> Self {
        let entry = TypeRegistry::global().register_tag::<G>();
        self.push(entry.map(|entry| Rule::Tagged(entry.id)))
    }

    /// Exclude entities tagged `G`.
    pub fn untagged<G: Tag>(self) -> Self {
        let entry = TypeRegistry::global().register_tag::<G>();
        self.push(entry.map(|entry| Rule::Untagged(entry.id)))
    }

    /// Keep only archetypes accepted by `predicate`.
    pub fn matching(self, predicate: Predicate) -> Self {
        self.push(Ok(Rule::Matching(predicate)))
    }

    /// Append every rule of `other`.
    pub fn and(mut self, other: QueryBuilder) -> Self {
        self.rules.extend(other.rules);
        if self.error.is_none() {
            self.error = other.error;
        }
        self
    }

    /// Compile the rules against `world`, reusing a cached query when the same rules were built
    /// before.
    pub fn build(self, world: &mut World) -> Result<Query> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(world.compile_query(self.rules))
    }

    fn push(mut self, rule: Result<Rule>) -> Self {
        match rule {
            Ok(rule) => self.rules.push(rule),
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }
}
