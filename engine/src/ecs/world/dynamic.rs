//! Type-erased access used by serializers and editors.

use std::any::Any;

use crate::ecs::{
    component::{Spec, TypeId, TypeKind, TypeRegistry},
    entity::Entity,
    error::{Error, Result},
    storage::{Location, SparseMask},
    world::World,
};

impl World {
    /// The archetype-stored components of an entity, in type id order.
    pub fn components_any(&self, entity: Entity) -> Result<Vec<(TypeId, &dyn Any)>> {
        let location = self.settled_location(entity)?;
        let archetype = self.archetype_ref(location.archetype())?;
        archetype
            .components()
            .ids()
            .iter()
            .map(|id| {
                archetype
                    .component_any(*id, location.slot())
                    .map(|value| (*id, value))
                    .ok_or_else(|| Error::InvalidState(format!("{entity} has no row for {id}")))
            })
            .collect()
    }

    /// The sparse components of an entity, in sparse bit order.
    pub fn sparse_components(&self, entity: Entity) -> Result<Vec<(TypeId, &dyn Any)>> {
        let location = self.entities.resolve(entity)?;
        let mask = self
            .archetype_ref(location.archetype())?
            .sparse_mask(location.slot(), location.is_pending());
        let registry = TypeRegistry::global();

        mask.iter()
            .map(|bit| {
                let info = registry.sparse_info(bit).ok_or_else(|| {
                    Error::InvalidState(format!("sparse bit {} is not assigned", bit.index()))
                })?;
                let value = self
                    .sparse
                    .erased(bit)
                    .and_then(|set| set.get_any(entity.index()))
                    .ok_or_else(|| {
                        Error::InvalidState(format!("{entity} is marked with {} but holds no value", info.name()))
                    })?;
                Ok((info.id(), value))
            })
            .collect()
    }

    /// The tags of an entity, in type id order.
    pub fn tags_of(&self, entity: Entity) -> Result<&[TypeId]> {
        let location = self.entities.resolve(entity)?;
        Ok(self.archetype_ref(location.archetype())?.tags().ids())
    }

    /// Create an entity from type-erased component values and tag ids.
    ///
    /// Every id must already be registered. All values are checked against their registered
    /// types before anything is written, so a mismatch leaves the world untouched.
    pub fn spawn_dynamic(
        &mut self,
        values: Vec<(TypeId, Box<dyn Any + Send>)>,
        tags: &[TypeId],
    ) -> Result<Entity> {
        self.ensure_not_iterating("spawn from type-erased values")?;
        let registry = TypeRegistry::global();
        let info = |id: TypeId| {
            registry
                .info(id)
                .ok_or_else(|| Error::InvalidState(format!("type {id} is not registered")))
        };

        let mut components = Vec::new();
        let mut seen = Vec::with_capacity(values.len());
        for (id, _) in &values {
            let info = info(*id)?;
            match info.kind() {
                TypeKind::Component => components.push(*id),
                TypeKind::Sparse(_) => {}
                TypeKind::Tag => return Err(Error::KindMismatch { name: info.name() }),
            }
            if seen.contains(id) {
                return Err(Error::InvalidState(format!(
                    "component {} appears twice in one set",
                    info.name()
                )));
            }
            seen.push(*id);
        }
        for id in tags {
            let info = info(*id)?;
            if info.kind() != TypeKind::Tag {
                return Err(Error::KindMismatch { name: info.name() });
            }
        }

        let (archetype_id, created) =
            self.graph
                .get_or_create(Spec::new(components), Spec::new(tags), registry)?;
        if created {
            self.archetype_created(archetype_id);
        }

        for (id, value) in &values {
            let info = info(*id)?;
            let accepted = match info.kind() {
                TypeKind::Sparse(bit) => self
                    .sparse
                    .erased_or_create(bit, registry, *id)
                    .is_some_and(|set| set.accepts(&**value)),
                _ => self.archetype_ref(archetype_id)?.accepts(*id, &**value),
            };
            if !accepted {
                return Err(Error::TypeMismatch {
                    expected: info.name(),
                });
            }
        }

        let archetype = self.archetype_mut(archetype_id)?;
        archetype.reserve(1);
        let slot = archetype.next_slot(false);
        let entity = self.entities.allocate(Location::new(archetype_id, slot));
        let archetype = self
            .graph
            .get_mut(archetype_id)
            .ok_or_else(|| Error::InvalidState(format!("{archetype_id} does not exist")))?;

        let mut mask = SparseMask::EMPTY;
        for (id, value) in values {
            let rejected = |_| Error::InvalidState(format!("value for {id} changed type"));
            match info(id)?.kind() {
                TypeKind::Sparse(bit) => {
                    self.sparse
                        .erased_or_create(bit, registry, id)
                        .ok_or_else(|| Error::InvalidState(format!("{id} has no sparse set")))?
                        .insert_any(entity, value)
                        .map_err(rejected)?;
                    mask.insert(bit);
                }
                _ => archetype.push_component_any(id, value).map_err(rejected)?,
            }
        }
        archetype.push_entity(entity, mask, false);
        log::trace!("spawned {entity} from {} type-erased values", seen.len());
        Ok(entity)
    }

    fn settled_location(&self, entity: Entity) -> Result<Location> {
        let location = self.entities.resolve(entity)?;
        if location.is_pending() {
            return Err(Error::IterationInProgress {
                operation: "read type-erased values of a staged entity",
            });
        }
        Ok(location)
    }
}
