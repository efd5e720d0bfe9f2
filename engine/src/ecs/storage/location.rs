use crate::ecs::storage::archetype;

/// Where an entity's data lives: its archetype and slot within that archetype.
///
/// A pending location refers to the archetype's deferred-creation buffer rather than its main
/// storage. Pending entities are moved into main storage when the outermost iteration ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    archetype: archetype::Id,
    slot: u32,
    pending: bool,
}

impl Location {
    /// A location in the archetype's main storage.
    #[inline]
    pub fn new(archetype: archetype::Id, slot: usize) -> Self {
        Self {
            archetype,
            slot: Self::narrow(slot),
            pending: false,
        }
    }

    /// A location in the archetype's deferred-creation buffer.
    #[inline]
    pub fn pending(archetype: archetype::Id, slot: usize) -> Self {
        Self {
            archetype,
            slot: Self::narrow(slot),
            pending: true,
        }
    }

    #[inline]
    fn narrow(slot: usize) -> u32 {
        u32::try_from(slot).expect("archetype slot space exhausted")
    }

    /// Get the archetype ID for this location.
    #[inline]
    pub fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// Get the slot for this location.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Whether the entity is still in a deferred-creation buffer.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
