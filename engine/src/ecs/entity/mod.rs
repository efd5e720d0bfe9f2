//! Entity identity for the store.
//!
//! An [`Entity`] is a lightweight handle combining an [`Id`] (a slot in the identity table) and a
//! [`Generation`] (how many times that slot has been recycled). The [`Entities`] table maps each
//! live id to the [`Location`] where the entity's data is stored, and rejects handles whose
//! generation no longer matches the slot:
//!
//! ```rust,ignore
//! let entity = entities.allocate(location); // Entity { id: 0, generation: 0 }
//! entities.recycle(entity)?;
//! let reused = entities.allocate(location); // Entity { id: 0, generation: 1 }
//! assert!(entities.resolve(entity).is_err());
//! ```
//!
//! Free ids are reused in FIFO order so a recycled slot is not handed out again until every
//! older free slot has been, which keeps stale handles from aliasing new entities quickly.
//! Generations wrap after `u32::MAX` recycles of the same slot; a handle kept across a full wrap
//! would resolve again.

use std::collections::VecDeque;
use std::fmt;

use crate::ecs::{
    error::{Error, Result},
    storage::Location,
};

/// The generation of an entity, used to track whether a handle refers to the live occupant of
/// its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The first generation of an entity.
    pub const FIRST: Self = Self(0);

    /// Get the next generation from the current, wrapping at `u32::MAX`.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// The raw generation value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// An entity identifier: the index of the entity's slot in the identity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl From<u32> for Id {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Id {
    /// Get the index of this id for indexable storage.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A handle to an entity in a world.
///
/// A world holds at most one live entity per [`Id`]; the [`Generation`] tells whether this
/// handle still refers to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    id: Id,
    generation: Generation,
}

impl Entity {
    /// Construct an entity with the first generation. Used by tests.
    #[inline]
    #[cfg(test)]
    pub(crate) fn new(id: u32) -> Self {
        Self::new_with_generation(Id(id), Generation::FIRST)
    }

    /// Construct an entity from an id and a known generation.
    #[inline]
    pub(crate) const fn new_with_generation(id: Id, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Get the id of this entity.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the generation of this entity.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Get the index of this entity if it were to live in indexable storage (e.g. Vec)
    #[inline]
    pub fn index(&self) -> usize {
        self.id.index()
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.generation.cmp(&other.generation))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id.0, self.generation.0)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: Generation,
    location: Option<Location>,
}

/// The identity and location table.
///
/// Every allocated id maps to exactly one live [`Location`]. Recycling clears the location,
/// advances the generation and queues the id for reuse.
#[derive(Debug, Default)]
pub struct Entities {
    slots: Vec<Slot>,
    free: VecDeque<Id>,
    alive: usize,
}

impl Entities {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an entity stored at `location`, reusing the oldest free id first.
    pub fn allocate(&mut self, location: Location) -> Entity {
        self.alive += 1;
        if let Some(id) = self.free.pop_front() {
            let slot = &mut self.slots[id.index()];
            debug_assert!(slot.location.is_none(), "free list held a live slot");
            slot.location = Some(location);
            return Entity::new_with_generation(id, slot.generation);
        }

        let id = Id(u32::try_from(self.slots.len()).expect("entity id space exhausted"));
        self.slots.push(Slot {
            generation: Generation::FIRST,
            location: Some(location),
        });
        Entity::new_with_generation(id, Generation::FIRST)
    }

    /// Resolve a handle to its current location.
    #[inline]
    pub fn resolve(&self, entity: Entity) -> Result<Location> {
        self.slots
            .get(entity.index())
            .filter(|slot| slot.generation == entity.generation)
            .and_then(|slot| slot.location)
            .ok_or(Error::StaleOrInvalidEntity(entity))
    }

    /// Whether the handle refers to a live entity.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.resolve(entity).is_ok()
    }

    /// Update the location of a live entity after its row moved.
    #[inline]
    pub fn set_location(&mut self, entity: Entity, location: Location) {
        let slot = &mut self.slots[entity.index()];
        debug_assert!(
            slot.generation == entity.generation && slot.location.is_some(),
            "relocating dead entity {entity}"
        );
        slot.location = Some(location);
    }

    /// Release a live entity, returning the location it occupied.
    pub fn recycle(&mut self, entity: Entity) -> Result<Location> {
        let location = self.resolve(entity)?;
        let slot = &mut self.slots[entity.index()];
        slot.location = None;
        slot.generation = slot.generation.next();
        self.free.push_back(entity.id);
        self.alive -= 1;
        Ok(location)
    }

    /// The number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Whether there are no live entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Iterate every live entity with its location, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, Location)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.location.map(|location| {
                (
                    Entity::new_with_generation(Id(index as u32), slot.generation),
                    location,
                )
            })
        })
    }
}
