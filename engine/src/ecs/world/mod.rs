//! The world: the container owning every entity, component and compiled query.
//!
//! A `World` ties together the entity table (handles to locations), the archetype graph (dense
//! component tables), the sparse store, the query cache and the world uniforms. All structural
//! changes go through it so that every entity's recorded location always names the archetype
//! row actually holding it.
//!
//! ```ignore
//! use rusty_ecs::ecs::{Component, QueryBuilder, World};
//!
//! let mut world = World::new();
//! let entity = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))?;
//!
//! let moving = QueryBuilder::new().with::<Position>().with::<Velocity>().build(&mut world)?;
//! world.for_each::<Position>(&moving, |position| position.x += 1.0)?;
//!
//! world.despawn(entity)?;
//! ```
//!
//! Worlds are `!Send`: they are driven from one thread and hand work to their own worker pool
//! for the parallel runners.

mod check;
mod dynamic;
mod epoch;
mod iter;
mod uniform;
mod update;

#[cfg(test)]
mod tests;

use std::any::type_name;
use std::cell::OnceCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    ecs::{
        Component, Tag,
        component::{Set, Spec, Target, TypeEntry, TypeKind, TypeRegistry},
        config::WorldConfig,
        entity::{Entities, Entity},
        error::{Error, Result},
        query::{Cursor, Query, QueryCache, QueryState, Rule},
        storage::{Archetype, Archetypes, EdgeKind, Location, SparseMask, SparseStore, archetype},
    },
    tasks::Executor,
};

use epoch::Epoch;
use uniform::Uniforms;

static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(0);

/// A world identifier, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    fn next() -> Self {
        Id(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world {}", self.0)
    }
}

/// The container for all entities, components and their relationships.
pub struct World {
    id: Id,
    config: WorldConfig,
    entities: Entities,
    graph: Archetypes,
    sparse: SparseStore,
    queries: QueryCache,
    uniforms: Uniforms,
    epoch: Epoch,
    /// Archetypes holding staged rows for the open epoch.
    staged: Vec<archetype::Id>,
    pool: OnceCell<Executor>,
    /// Marker to make World !Send. World must stay on the thread that drives it.
    _not_send: PhantomData<*mut ()>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let id = Id::next();
        log::debug!("creating {id} with {config:?}");
        Self {
            id,
            config,
            entities: Entities::new(),
            graph: Archetypes::new(config.initial_capacity),
            sparse: SparseStore::new(config.sparse_block_size),
            queries: QueryCache::default(),
            uniforms: Uniforms::new(),
            epoch: Epoch::default(),
            staged: Vec::new(),
            pool: OnceCell::new(),
            _not_send: PhantomData,
        }
    }

    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The number of live entities, including ones staged during iteration.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Where the entity's row currently lives.
    #[inline]
    pub fn location(&self, entity: Entity) -> Result<Location> {
        self.entities.resolve(entity)
    }

    /// Every archetype, including the empty one.
    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.graph
    }

    #[inline]
    pub fn archetype(&self, id: archetype::Id) -> Option<&Archetype> {
        self.graph.get(id)
    }

    /// Whether a cursor currently holds the world in an iteration epoch.
    #[inline]
    pub fn is_iterating(&self) -> bool {
        self.epoch.is_open()
    }

    /// Create an entity from a set of components.
    ///
    /// While iterating, the entity is staged: it is alive and readable by handle, but no cursor
    /// sees it until the outermost iteration ends.
    pub fn spawn<S: Set>(&mut self, values: S) -> Result<Entity> {
        let (archetype, staged) = self.prepare_spawn::<S>(1)?;
        self.spawn_into(archetype, staged, values)
    }

    /// Create one entity per set, all sharing the set type's archetype.
    pub fn spawn_many<S: Set>(&mut self, values: impl IntoIterator<Item = S>) -> Result<Vec<Entity>> {
        let values = values.into_iter();
        let (archetype, staged) = self.prepare_spawn::<S>(values.size_hint().0)?;
        values
            .map(|values| self.spawn_into(archetype, staged, values))
            .collect()
    }

    /// Create an entity with no components.
    #[inline]
    pub fn spawn_empty(&mut self) -> Result<Entity> {
        self.spawn(())
    }

    /// Destroy an entity and drop all of its components. The handle becomes stale.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        let location = self.entities.resolve(entity)?;
        self.ensure_not_iterating("despawn an entity")?;

        let archetype = self.archetype_mut(location.archetype())?;
        let mask = archetype.sparse_mask(location.slot(), false);
        if let Some(moved) = archetype.swap_remove(location.slot()) {
            self.entities.set_location(moved, location);
        }
        self.sparse.remove_all(entity.index(), &mask);
        self.entities.recycle(entity)?;
        log::trace!("despawned {entity}");
        Ok(())
    }

    /// Attach a component. Archetype components move the entity to the archetype including `T`;
    /// sparse components never move it.
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        let entry = TypeRegistry::global().register_component::<T>()?;
        let location = self.entities.resolve(entity)?;
        let already_present = || Error::ComponentAlreadyPresent {
            entity,
            component: type_name::<T>(),
        };

        if let TypeKind::Sparse(bit) = entry.kind {
            let mask = self.sparse_mask_mut(location)?;
            if mask.contains(bit) {
                return Err(already_present());
            }
            mask.insert(bit);
            self.sparse.get_or_create::<T>(bit).insert(entity, value);
            return Ok(());
        }

        if self.archetype_ref(location.archetype())?.has_component(entry.id) {
            return Err(already_present());
        }
        self.ensure_not_iterating("add a component")?;

        let target = self.adjacent(location.archetype(), EdgeKind::AddComponent, entry)?;
        let location = self.migrate(entity, location, target, None)?;
        let archetype = self.archetype_mut(target)?;
        archetype.push_component(entry.id, value, false);
        debug_assert_eq!(location.slot() + 1, archetype.len());
        debug_assert_eq!(archetype.check(), Ok(()));
        Ok(())
    }

    /// Detach component `T` and hand it back.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Result<T> {
        let entry = TypeRegistry::global().register_component::<T>()?;
        let location = self.entities.resolve(entity)?;
        let not_found = || Error::ComponentNotFound {
            entity,
            component: type_name::<T>(),
        };

        if let TypeKind::Sparse(bit) = entry.kind {
            let mask = self.sparse_mask_mut(location)?;
            if !mask.contains(bit) {
                return Err(not_found());
            }
            mask.remove(bit);
            return self
                .sparse
                .get_mut::<T>(bit)
                .and_then(|set| set.remove(entity.index()))
                .ok_or_else(|| {
                    Error::InvalidState(format!(
                        "{entity} is marked with {} but holds no value",
                        type_name::<T>()
                    ))
                });
        }

        if !self.archetype_ref(location.archetype())?.has_component(entry.id) {
            return Err(not_found());
        }
        self.ensure_not_iterating("remove a component")?;

        let target = self.adjacent(location.archetype(), EdgeKind::RemoveComponent, entry)?;
        let (column, value) = self
            .archetype_mut(location.archetype())?
            .take_value::<T>(entry.id, location.slot())
            .ok_or_else(not_found)?;
        self.migrate(entity, location, target, Some(column))?;
        Ok(value)
    }

    /// Write component `T`, adding it when the entity does not carry it yet.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        match self.get_mut::<T>(entity) {
            Ok(current) => {
                *current = value;
                Ok(())
            }
            Err(Error::ComponentNotFound { .. }) => self.add(entity, value),
            Err(error) => Err(error),
        }
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T> {
        let location = self.entities.resolve(entity)?;
        self.read_at(entity, location)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        let location = self.entities.resolve(entity)?;
        self.write_at(entity, location)
    }

    /// Like [`World::get`], folding every failure into `None`.
    #[inline]
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.get(entity).ok()
    }

    /// Whether a live entity carries component `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.get::<T>(entity).is_ok()
    }

    /// Tag an entity, moving it to the archetype including `G`.
    pub fn add_tag<G: Tag>(&mut self, entity: Entity) -> Result<()> {
        let entry = TypeRegistry::global().register_tag::<G>()?;
        let location = self.entities.resolve(entity)?;
        if self.archetype_ref(location.archetype())?.has_tag(entry.id) {
            return Err(Error::TagAlreadyPresent {
                entity,
                tag: type_name::<G>(),
            });
        }
        self.ensure_not_iterating("add a tag")?;

        let target = self.adjacent(location.archetype(), EdgeKind::AddTag, entry)?;
        self.migrate(entity, location, target, None)?;
        Ok(())
    }

    /// Untag an entity, moving it to the archetype excluding `G`.
    pub fn remove_tag<G: Tag>(&mut self, entity: Entity) -> Result<()> {
        let entry = TypeRegistry::global().register_tag::<G>()?;
        let location = self.entities.resolve(entity)?;
        if !self.archetype_ref(location.archetype())?.has_tag(entry.id) {
            return Err(Error::TagNotFound {
                entity,
                tag: type_name::<G>(),
            });
        }
        self.ensure_not_iterating("remove a tag")?;

        let target = self.adjacent(location.archetype(), EdgeKind::RemoveTag, entry)?;
        self.migrate(entity, location, target, None)?;
        Ok(())
    }

    pub fn has_tag<G: Tag>(&self, entity: Entity) -> bool {
        let Some(entry) = TypeRegistry::global().entry_of(std::any::TypeId::of::<G>()) else {
            return false;
        };
        self.entities
            .resolve(entity)
            .ok()
            .and_then(|location| self.graph.get(location.archetype()))
            .is_some_and(|archetype| archetype.has_tag(entry.id))
    }

    /// Strip every component and tag, leaving the entity alive in the empty archetype.
    pub fn detach(&mut self, entity: Entity) -> Result<()> {
        let location = self.entities.resolve(entity)?;
        self.ensure_not_iterating("detach an entity")?;

        let mask = std::mem::take(self.sparse_mask_mut(location)?);
        self.sparse.remove_all(entity.index(), &mask);
        if location.archetype() != archetype::Id::EMPTY {
            self.migrate(entity, location, archetype::Id::EMPTY, None)?;
        }
        Ok(())
    }

    /// Set a world uniform, returning the previous value of the same type.
    pub fn set_uniform<U: Send + Sync + 'static>(&mut self, value: U) -> Option<U> {
        self.uniforms.insert(value)
    }

    pub fn uniform<U: Send + Sync + 'static>(&self) -> Option<&U> {
        self.uniforms.get()
    }

    pub fn uniform_mut<U: Send + Sync + 'static>(&mut self) -> Option<&mut U> {
        self.uniforms.get_mut()
    }

    /// Remove a uniform. The unit uniform `()` cannot be removed.
    pub fn remove_uniform<U: Send + Sync + 'static>(&mut self) -> Option<U> {
        self.uniforms.remove()
    }

    /// Open a cursor over the query's results.
    pub fn cursor(&mut self, query: &Query) -> Result<Cursor<'_>> {
        Cursor::new(self, query)
    }

    pub(crate) fn compile_query(&mut self, rules: Vec<Rule>) -> Query {
        let (index, created) = self.queries.get_or_insert(rules, &self.graph);
        if created {
            log::debug!(
                "{} compiled query {index} matching {} archetypes",
                self.id,
                self.queries.get(index).map_or(0, |state| state.archetypes().len())
            );
        }
        Query::new(self.id, index)
    }

    pub(crate) fn query_state(&self, query: &Query) -> Result<&QueryState> {
        query_state(&self.queries, self.id, query)
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.epoch.begin();
    }

    /// Close an iteration epoch, merging staged rows when the outermost one closes.
    pub(crate) fn end_iteration(&mut self) {
        if !self.epoch.end() {
            return;
        }
        for id in std::mem::take(&mut self.staged) {
            let Some((base, merged)) = self.graph.get_mut(id).and_then(Archetype::merge_staged)
            else {
                continue;
            };
            log::debug!("merged {} staged entities into {id}", merged.len());
            for (offset, entity) in merged.into_iter().enumerate() {
                self.entities.set_location(entity, Location::new(id, base + offset));
            }
        }
    }

    /// Read component `T` of `entity`, known to live at `location`.
    pub(crate) fn read_at<T: Component>(&self, entity: Entity, location: Location) -> Result<&T> {
        let not_found = || Error::ComponentNotFound {
            entity,
            component: type_name::<T>(),
        };
        let entry = registered::<T>().ok_or_else(not_found)?;
        let value = match entry.kind {
            TypeKind::Sparse(bit) => self
                .sparse
                .get::<T>(bit)
                .and_then(|set| set.get(entity.index())),
            _ => self.archetype_ref(location.archetype())?.get::<T>(
                entry.id,
                location.slot(),
                location.is_pending(),
            ),
        };
        value.ok_or_else(not_found)
    }

    /// Write component `T` of `entity`, known to live at `location`.
    pub(crate) fn write_at<T: Component>(
        &mut self,
        entity: Entity,
        location: Location,
    ) -> Result<&mut T> {
        let not_found = || Error::ComponentNotFound {
            entity,
            component: type_name::<T>(),
        };
        let entry = registered::<T>().ok_or_else(not_found)?;
        let value = match entry.kind {
            TypeKind::Sparse(bit) => self
                .sparse
                .get_mut::<T>(bit)
                .and_then(|set| set.get_mut(entity.index())),
            _ => self.archetype_mut(location.archetype())?.get_mut::<T>(
                entry.id,
                location.slot(),
                location.is_pending(),
            ),
        };
        value.ok_or_else(not_found)
    }

    fn ensure_not_iterating(&self, operation: &'static str) -> Result<()> {
        if self.epoch.is_open() {
            return Err(Error::IterationInProgress { operation });
        }
        Ok(())
    }

    /// Pick the archetype for a new row of set `S`, opening its staging buffer when iterating.
    fn prepare_spawn<S: Set>(&mut self, additional: usize) -> Result<(archetype::Id, bool)> {
        let registry = TypeRegistry::global();
        let components: Vec<_> = S::validated_entries(registry)?
            .into_iter()
            .filter(|entry| entry.kind == TypeKind::Component)
            .map(|entry| entry.id)
            .collect();
        let (id, created) = self.graph.get_or_create(Spec::new(components), Spec::EMPTY, registry)?;
        if created {
            self.archetype_created(id);
        }

        let staged = self.epoch.is_open();
        let epoch = self.epoch.current();
        let archetype = self.archetype_mut(id)?;
        if !staged {
            archetype.reserve(additional);
        } else if archetype.begin_staging(epoch) {
            self.staged.push(id);
        }
        Ok((id, staged))
    }

    fn spawn_into<S: Set>(&mut self, id: archetype::Id, staged: bool, values: S) -> Result<Entity> {
        let archetype = self
            .graph
            .get_mut(id)
            .ok_or_else(|| Error::InvalidState(format!("{id} does not exist")))?;
        if !staged {
            archetype.reserve(1);
        }
        let slot = archetype.next_slot(staged);
        let location = if staged {
            Location::pending(id, slot)
        } else {
            Location::new(id, slot)
        };
        let entity = self.entities.allocate(location);

        let mut row = Row {
            archetype: &mut *archetype,
            sparse: &mut self.sparse,
            entity,
            mask: SparseMask::EMPTY,
            staged,
        };
        values.apply(TypeRegistry::global(), &mut row)?;
        let mask = row.mask;
        archetype.push_entity(entity, mask, staged);
        Ok(entity)
    }

    /// Follow (or create) the graph edge for one structural change.
    fn adjacent(
        &mut self,
        from: archetype::Id,
        kind: EdgeKind,
        entry: TypeEntry,
    ) -> Result<archetype::Id> {
        let (target, created) = self
            .graph
            .adjacent(from, kind, entry.id, TypeRegistry::global())?;
        if created {
            self.archetype_created(target);
        }
        Ok(target)
    }

    /// Move an entity's row to `target`, keeping every affected location current.
    fn migrate(
        &mut self,
        entity: Entity,
        location: Location,
        target: archetype::Id,
        skip: Option<usize>,
    ) -> Result<Location> {
        debug_assert!(!location.is_pending(), "staged rows never migrate");
        if target.index() >= self.graph.len() {
            return Err(Error::InvalidState(format!("{target} does not exist")));
        }
        self.archetype_ref(location.archetype())?;

        let (source, destination) = self.graph.pair_mut(location.archetype(), target);
        let (slot, moved) = source.migrate_to(location.slot(), destination, skip);
        if let Some(moved) = moved {
            self.entities.set_location(moved, location);
        }
        let moved_to = Location::new(target, slot);
        self.entities.set_location(entity, moved_to);
        log::trace!("moved {entity} from {} to {target}", location.archetype());
        Ok(moved_to)
    }

    fn archetype_created(&mut self, id: archetype::Id) {
        if let Some(archetype) = self.graph.get(id) {
            self.queries.offer(archetype);
        }
    }

    fn sparse_mask_mut(&mut self, location: Location) -> Result<&mut SparseMask> {
        self.archetype_mut(location.archetype())?
            .sparse_mask_mut(location.slot(), location.is_pending())
            .ok_or_else(|| Error::InvalidState(format!("{location:?} has no row")))
    }

    fn archetype_ref(&self, id: archetype::Id) -> Result<&Archetype> {
        self.graph
            .get(id)
            .ok_or_else(|| Error::InvalidState(format!("{id} does not exist")))
    }

    fn archetype_mut(&mut self, id: archetype::Id) -> Result<&mut Archetype> {
        self.graph
            .get_mut(id)
            .ok_or_else(|| Error::InvalidState(format!("{id} does not exist")))
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &self.entities.len())
            .field("archetypes", &self.graph.len())
            .field("queries", &self.queries.len())
            .field("iterating", &self.epoch.is_open())
            .finish()
    }
}

/// The destination of a spawned row: archetype columns for dense components, the sparse store
/// (plus a mask bit) for sparse ones.
struct Row<'a> {
    archetype: &'a mut Archetype,
    sparse: &'a mut SparseStore,
    entity: Entity,
    mask: SparseMask,
    staged: bool,
}

impl Target for Row<'_> {
    fn push<C: Component>(&mut self, entry: TypeEntry, value: C) {
        match entry.kind {
            TypeKind::Sparse(bit) => {
                self.sparse.get_or_create::<C>(bit).insert(self.entity, value);
                self.mask.insert(bit);
            }
            _ => self.archetype.push_component(entry.id, value, self.staged),
        }
    }
}

#[inline]
fn registered<T: Component>() -> Option<TypeEntry> {
    TypeRegistry::global().entry_of(std::any::TypeId::of::<T>())
}

fn query_state<'q>(queries: &'q QueryCache, world: Id, query: &Query) -> Result<&'q QueryState> {
    if query.world_id() != world {
        return Err(Error::ForeignQuery);
    }
    queries
        .get(query.index())
        .ok_or_else(|| Error::InvalidState(format!("query {} was never compiled", query.index())))
}

fn executor<'a>(pool: &'a OnceCell<Executor>, config: &WorldConfig) -> &'a Executor {
    pool.get_or_init(|| {
        log::debug!("starting worker pool with {} threads", config.workers);
        Executor::new(config.workers.max(1))
    })
}
