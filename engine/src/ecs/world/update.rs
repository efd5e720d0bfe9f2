use std::any::type_name;
use std::sync::OnceLock;

use crate::ecs::{
    component::{SparseBit, TypeId, TypeKind, TypeRegistry},
    entity::Entity,
    error::{Error, Result},
    query::{QueryBuilder, chunk_len, parallel::run_chunks},
    storage::archetype,
    update::{Args, Rows, Update},
    world::{World, executor},
};

impl World {
    /// Run [`Update::update`] on every instance of `T`, one entity at a time.
    ///
    /// Fails with [`Error::IterationInProgress`] while a cursor is open: staged entities are not
    /// visible to any pass until the iteration ends.
    pub fn update<T: Update>(&mut self) -> Result<()> {
        self.run_update::<T>(false)
    }

    /// Run [`Update::update`] on every instance of `T` using the worker pool.
    ///
    /// Archetype-stored components are split into one chunk per worker, with the last chunk run
    /// on the calling thread. Sparse components are updated sequentially.
    pub fn par_update<T: Update>(&mut self) -> Result<()> {
        self.run_update::<T>(true)
    }

    fn run_update<T: Update>(&mut self, parallel: bool) -> Result<()> {
        self.ensure_not_iterating("run an update pass")?;
        let registry = TypeRegistry::global();
        let entry = registry.register_component::<T>()?;
        let mut arguments = Vec::new();
        <T::Args as Args>::register(registry, &mut arguments)?;
        if arguments.contains(&entry.id) {
            return Err(Error::InvalidState(format!(
                "{} cannot read itself as an update argument",
                type_name::<T>()
            )));
        }
        if self.uniforms.get::<T::Uniform>().is_none() {
            return Err(Error::UniformNotFound {
                uniform: type_name::<T::Uniform>(),
            });
        }

        match entry.kind {
            TypeKind::Sparse(bit) => {
                if parallel {
                    log::warn!("updating sparse {} sequentially", type_name::<T>());
                }
                self.update_sparse::<T>(bit)
            }
            _ => self.update_archetypes::<T>(entry.id, parallel),
        }
    }

    fn update_archetypes<T: Update>(&mut self, id: TypeId, parallel: bool) -> Result<()> {
        let query = QueryBuilder::new().with::<T>().build(self)?;
        let archetypes: Vec<archetype::Id> = self.query_state(&query)?.archetypes().to_vec();
        let uniform = self
            .uniforms
            .get::<T::Uniform>()
            .ok_or(Error::UniformNotFound {
                uniform: type_name::<T::Uniform>(),
            })?;
        let executor = parallel.then(|| executor(&self.pool, &self.config));
        let (workers, min_chunk_len) = (self.config.workers, self.config.min_chunk_len);

        for archetype_id in archetypes {
            let Some(archetype) = self.graph.get_mut(archetype_id) else {
                continue;
            };
            let Some(column) = archetype.column_index(id) else {
                continue;
            };
            if archetype.is_empty() {
                continue;
            }

            // The updated column is taken out so the rest of the archetype can be read freely.
            let mut values = archetype.take_column(column);
            let result = match values.downcast_mut::<T>() {
                Some(values) => {
                    let rows = Rows::main(archetype);
                    let state = <T::Args as Args>::prepare(rows, &self.sparse);
                    let entities = rows.archetype.entities();
                    let values = values.as_mut_slice();
                    match executor {
                        Some(executor) => {
                            let failure = OnceLock::new();
                            let len = chunk_len(values.len(), workers, min_chunk_len);
                            run_chunks(executor, entities, values, len, |offset, entities, values| {
                                if let Err(error) =
                                    update_rows::<T>(&state, uniform, offset, entities, values)
                                {
                                    let _ = failure.set(error);
                                }
                            });
                            failure.into_inner().map_or(Ok(()), Err)
                        }
                        None => update_rows::<T>(&state, uniform, 0, entities, values),
                    }
                }
                None => Err(Error::InvalidState(format!(
                    "{archetype_id} column {column} does not hold {}",
                    type_name::<T>()
                ))),
            };
            archetype.restore_column(column, values);
            result?;
        }
        Ok(())
    }

    fn update_sparse<T: Update>(&mut self, bit: SparseBit) -> Result<()> {
        let Some(mut set) = self.sparse.take(bit) else {
            return Ok(());
        };
        let result = (|| -> Result<()> {
            let set = set.downcast_mut::<T>().ok_or_else(|| {
                Error::InvalidState(format!("sparse bit {} does not hold {}", bit.index(), type_name::<T>()))
            })?;
            let uniform = self
                .uniforms
                .get::<T::Uniform>()
                .ok_or(Error::UniformNotFound {
                    uniform: type_name::<T::Uniform>(),
                })?;

            let (entities, values) = set.split_mut();
            let mut prepared: Option<((archetype::Id, bool), <T::Args as Args>::State<'_>)> = None;
            for (entity, value) in entities.iter().zip(values) {
                let location = self.entities.resolve(*entity)?;
                let key = (location.archetype(), location.is_pending());
                // Argument lookups are shared by consecutive holders in the same archetype.
                let state = match prepared.take() {
                    Some((prepared_key, state)) if prepared_key == key => state,
                    _ => {
                        let archetype = self.graph.get(location.archetype()).ok_or_else(|| {
                            Error::InvalidState(format!("{} does not exist", location.archetype()))
                        })?;
                        let rows = Rows {
                            archetype,
                            staged: location.is_pending(),
                        };
                        <T::Args as Args>::prepare(rows, &self.sparse)
                    }
                };
                let args = <T::Args as Args>::fetch(&state, location.slot(), *entity)
                    .map_err(|missing| missing_argument::<T>(*entity, missing))?;
                value.update(*entity, args, uniform);
                prepared = Some((key, state));
            }
            Ok(())
        })();
        self.sparse.restore(bit, set);
        result
    }
}

fn update_rows<T: Update>(
    state: &<T::Args as Args>::State<'_>,
    uniform: &T::Uniform,
    offset: usize,
    entities: &[Entity],
    values: &mut [T],
) -> Result<()> {
    for (row, (entity, value)) in entities.iter().zip(values).enumerate() {
        let args = <T::Args as Args>::fetch(state, offset + row, *entity)
            .map_err(|missing| missing_argument::<T>(*entity, missing))?;
        value.update(*entity, args, uniform);
    }
    Ok(())
}

fn missing_argument<T>(entity: Entity, missing: &'static str) -> Error {
    Error::MissingDependencyAtUpdateTime {
        entity,
        component: type_name::<T>(),
        missing,
    }
}
