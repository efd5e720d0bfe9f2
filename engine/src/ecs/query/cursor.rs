use crate::ecs::{
    Component,
    component::Set,
    entity::Entity,
    error::{Error, Result},
    query::Query,
    storage::{Location, SparseMask, archetype},
    world::World,
};

/// A resumable walk over a query's results with exclusive access to the world.
///
/// Opening a cursor opens an iteration epoch: until the cursor is dropped, structural changes
/// that would move rows (despawning, adding or removing archetype components and tags) are
/// rejected with [`Error::IterationInProgress`], while spawning is allowed and staged. Staged
/// entities are invisible to the cursor and become regular rows when the outermost epoch ends.
///
/// ```ignore
/// let mut cursor = world.cursor(&query)?;
/// while cursor.advance() {
///     let health = cursor.get_mut::<Health>()?;
///     health.0 -= 1;
///     if health.0 == 0 {
///         cursor.spawn((Corpse,))?;
///     }
/// }
/// ```
pub struct Cursor<'w> {
    world: &'w mut World,
    archetypes: Vec<archetype::Id>,
    include: SparseMask,
    exclude: SparseMask,
    position: usize,
    slot: usize,
    end: Option<usize>,
    current: Option<(Entity, Location)>,
}

impl<'w> Cursor<'w> {
    pub(crate) fn new(world: &'w mut World, query: &Query) -> Result<Self> {
        let state = world.query_state(query)?;
        let archetypes = state.archetypes().to_vec();
        let include = *state.include();
        let exclude = *state.exclude();
        world.begin_iteration();
        Ok(Self {
            world,
            archetypes,
            include,
            exclude,
            position: 0,
            slot: 0,
            end: None,
            current: None,
        })
    }

    /// Move to the next result. Returns `false` once the results are exhausted.
    pub fn advance(&mut self) -> bool {
        while let Some(&id) = self.archetypes.get(self.position) {
            let Some(archetype) = self.world.archetype(id) else {
                self.position += 1;
                continue;
            };
            // Rows present when the archetype is entered; staged spawns never extend it.
            let end = *self.end.get_or_insert(archetype.len());
            while self.slot < end {
                let slot = self.slot;
                self.slot += 1;
                if archetype.sparse_masks()[slot].matches(&self.include, &self.exclude) {
                    let entity = archetype.entities()[slot];
                    self.current = Some((entity, Location::new(id, slot)));
                    return true;
                }
            }
            self.position += 1;
            self.slot = 0;
            self.end = None;
        }
        self.current = None;
        false
    }

    /// The current entity, or `None` before the first [`Cursor::advance`] and after the last.
    #[inline]
    pub fn entity(&self) -> Option<Entity> {
        self.current.map(|(entity, _)| entity)
    }

    /// A component of the current entity.
    pub fn get<T: Component>(&self) -> Result<&T> {
        let (entity, location) = self.position()?;
        self.world.read_at::<T>(entity, location)
    }

    /// A mutable component of the current entity.
    pub fn get_mut<T: Component>(&mut self) -> Result<&mut T> {
        let (entity, location) = self.position()?;
        self.world.write_at::<T>(entity, location)
    }

    /// Whether the current entity carries component `T`.
    pub fn has<T: Component>(&self) -> bool {
        self.get::<T>().is_ok()
    }

    /// Spawn an entity. It is staged until the cursor is dropped.
    pub fn spawn<S: Set>(&mut self, values: S) -> Result<Entity> {
        self.world.spawn(values)
    }

    /// The world being iterated.
    #[inline]
    pub fn world(&self) -> &World {
        self.world
    }

    /// Mutable access to the world being iterated; structural changes remain restricted.
    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    fn position(&self) -> Result<(Entity, Location)> {
        self.current.ok_or_else(|| {
            Error::InvalidState("cursor is not positioned on an entity".to_string())
        })
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.world.end_iteration();
    }
}
