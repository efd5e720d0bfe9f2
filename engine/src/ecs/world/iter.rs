use crate::ecs::{
    Component,
    component::{TypeKind, TypeRegistry},
    entity::{Entities, Entity},
    error::Result,
    query::{Query, QueryState, SlotFilter, chunk_len, matching_runs, parallel::run_chunks},
    storage::Archetypes,
    world::{World, executor, query_state},
};

impl World {
    /// Every entity matching the query, in archetype order. Staged entities are not included.
    pub fn query_entities(&self, query: &Query) -> Result<Vec<Entity>> {
        let state = self.query_state(query)?;
        let mut matched = Vec::new();
        for &id in state.archetypes() {
            let Some(archetype) = self.graph.get(id) else {
                continue;
            };
            let filter = SlotFilter::masks(archetype.sparse_masks(), state.include(), state.exclude());
            matched.extend(
                archetype
                    .entities()
                    .iter()
                    .enumerate()
                    .filter(|(slot, _)| filter.accepts(*slot))
                    .map(|(_, entity)| *entity),
            );
        }
        Ok(matched)
    }

    /// The number of entities matching the query.
    pub fn query_len(&self, query: &Query) -> Result<usize> {
        let state = self.query_state(query)?;
        let archetypes = state.archetypes().iter().filter_map(|id| self.graph.get(*id));
        if state.is_dense() {
            return Ok(archetypes.map(|archetype| archetype.len()).sum());
        }
        Ok(archetypes
            .flat_map(|archetype| archetype.sparse_masks())
            .filter(|mask| state.admits(mask))
            .count())
    }

    /// Whether a live entity is a result of the query. Entities staged during iteration are not
    /// results until the iteration ends.
    pub fn matches(&self, query: &Query, entity: Entity) -> Result<bool> {
        let state = self.query_state(query)?;
        let location = self.entities.resolve(entity)?;
        if location.is_pending() || !state.contains(location.archetype()) {
            return Ok(false);
        }
        let mask = self
            .archetype_ref(location.archetype())?
            .sparse_mask(location.slot(), false);
        Ok(state.admits(&mask))
    }

    /// Call `f` with component `T` of every matching entity that carries it.
    pub fn for_each<T: Component>(&mut self, query: &Query, mut f: impl FnMut(&mut T)) -> Result<()> {
        self.for_each_entity(query, |_, value: &mut T| f(value))
    }

    /// Call `f` with every matching entity carrying component `T` and its value.
    pub fn for_each_entity<T: Component>(
        &mut self,
        query: &Query,
        mut f: impl FnMut(Entity, &mut T),
    ) -> Result<()> {
        let entry = TypeRegistry::global().register_component::<T>()?;
        let state = query_state(&self.queries, self.id, query)?;

        if let TypeKind::Sparse(bit) = entry.kind {
            let Some(set) = self.sparse.get_mut::<T>(bit) else {
                return Ok(());
            };
            let (entities, values) = set.split_mut();
            let flags = sparse_flags(&self.entities, &self.graph, state, entities)?;
            for (slot, (entity, value)) in entities.iter().zip(values).enumerate() {
                if flags[slot] {
                    f(*entity, value);
                }
            }
            return Ok(());
        }

        for &id in state.archetypes() {
            let Some((entities, masks, values)) =
                self.graph.get_mut(id).and_then(|archetype| archetype.rows_mut::<T>(entry.id))
            else {
                continue;
            };
            let filter = SlotFilter::masks(masks, state.include(), state.exclude());
            for (slot, (entity, value)) in entities.iter().zip(values).enumerate() {
                if filter.accepts(slot) {
                    f(*entity, value);
                }
            }
        }
        Ok(())
    }

    /// Call `f` with contiguous runs of matching rows, each at most `max_len` long.
    ///
    /// Runs never span archetypes, and rows skipped by sparse filters split runs, so every slice
    /// handed to `f` holds only results.
    pub fn for_each_chunk<T: Component>(
        &mut self,
        query: &Query,
        max_len: usize,
        mut f: impl FnMut(&[Entity], &mut [T]),
    ) -> Result<()> {
        let entry = TypeRegistry::global().register_component::<T>()?;
        let state = query_state(&self.queries, self.id, query)?;

        if let TypeKind::Sparse(bit) = entry.kind {
            let Some(set) = self.sparse.get_mut::<T>(bit) else {
                return Ok(());
            };
            let (entities, values) = set.split_mut();
            let flags = sparse_flags(&self.entities, &self.graph, state, entities)?;
            for run in matching_runs(entities.len(), SlotFilter::Flags(&flags), max_len) {
                f(&entities[run.clone()], &mut values[run]);
            }
            return Ok(());
        }

        for &id in state.archetypes() {
            let Some((entities, masks, values)) =
                self.graph.get_mut(id).and_then(|archetype| archetype.rows_mut::<T>(entry.id))
            else {
                continue;
            };
            let filter = SlotFilter::masks(masks, state.include(), state.exclude());
            for run in matching_runs(entities.len(), filter, max_len) {
                f(&entities[run.clone()], &mut values[run]);
            }
        }
        Ok(())
    }

    /// Parallel [`World::for_each`] on the world's worker pool.
    pub fn par_for_each<T: Component>(
        &mut self,
        query: &Query,
        f: impl Fn(&mut T) + Sync,
    ) -> Result<()> {
        self.par_for_each_entity(query, |_, value: &mut T| f(value))
    }

    /// Parallel [`World::for_each_entity`] on the world's worker pool.
    ///
    /// Each archetype's rows are split into one chunk per worker (never shorter than the
    /// configured minimum); the last chunk runs on the calling thread. Returns after every chunk
    /// has finished. A panic in `f` is re-raised here.
    pub fn par_for_each_entity<T: Component>(
        &mut self,
        query: &Query,
        f: impl Fn(Entity, &mut T) + Sync,
    ) -> Result<()> {
        let entry = TypeRegistry::global().register_component::<T>()?;
        let state = query_state(&self.queries, self.id, query)?;
        let executor = executor(&self.pool, &self.config);
        let (workers, min_chunk_len) = (self.config.workers, self.config.min_chunk_len);

        let visit = |filter: &SlotFilter<'_>, offset: usize, entities: &[Entity], values: &mut [T]| {
            for (row, (entity, value)) in entities.iter().zip(values).enumerate() {
                if filter.accepts(offset + row) {
                    f(*entity, value);
                }
            }
        };

        if let TypeKind::Sparse(bit) = entry.kind {
            let Some(set) = self.sparse.get_mut::<T>(bit) else {
                return Ok(());
            };
            let (entities, values) = set.split_mut();
            let flags = sparse_flags(&self.entities, &self.graph, state, entities)?;
            let filter = SlotFilter::Flags(&flags);
            let len = chunk_len(values.len(), workers, min_chunk_len);
            run_chunks(executor, entities, values, len, |offset, entities, values| {
                visit(&filter, offset, entities, values)
            });
            return Ok(());
        }

        for &id in state.archetypes() {
            let Some((entities, masks, values)) =
                self.graph.get_mut(id).and_then(|archetype| archetype.rows_mut::<T>(entry.id))
            else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            let filter = SlotFilter::masks(masks, state.include(), state.exclude());
            let len = chunk_len(values.len(), workers, min_chunk_len);
            run_chunks(executor, entities, values, len, |offset, entities, values| {
                visit(&filter, offset, entities, values)
            });
        }
        Ok(())
    }
}

/// For each entity of a sparse set, whether it is a result of the query.
fn sparse_flags(
    entities: &Entities,
    graph: &Archetypes,
    state: &QueryState,
    holders: &[Entity],
) -> Result<Vec<bool>> {
    holders
        .iter()
        .map(|entity| {
            let location = entities.resolve(*entity)?;
            if location.is_pending() || !state.contains(location.archetype()) {
                return Ok(false);
            }
            Ok(graph.get(location.archetype()).is_some_and(|archetype| {
                state.admits(&archetype.sparse_mask(location.slot(), false))
            }))
        })
        .collect()
}
