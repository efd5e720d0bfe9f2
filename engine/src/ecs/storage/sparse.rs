//! Sparse component storage.
//!
//! Sparse components are kept outside archetype tables in one [`SparseSet`] per type. Adding or
//! removing one never migrates the entity; instead a bit in the entity's [`SparseMask`] (stored
//! next to the entity in its archetype) records which sparse components it carries, so queries
//! can filter on them without touching the sets.

use std::any::{Any, type_name};

use crate::ecs::{
    component::{Component, SparseBit, TypeRegistry},
    entity::Entity,
    storage::index::DynamicIndex,
};

/// A fixed-width bitset with one bit per sparse component type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SparseMask([u64; 4]);

impl SparseMask {
    /// A mask with no bits set.
    pub const EMPTY: Self = Self([0; 4]);

    #[inline]
    pub fn insert(&mut self, bit: SparseBit) {
        self.0[bit.index() / 64] |= 1 << (bit.index() % 64);
    }

    #[inline]
    pub fn remove(&mut self, bit: SparseBit) {
        self.0[bit.index() / 64] &= !(1 << (bit.index() % 64));
    }

    #[inline]
    pub fn contains(&self, bit: SparseBit) -> bool {
        self.0[bit.index() / 64] & (1 << (bit.index() % 64)) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Whether every bit of `other` is set in `self`.
    #[inline]
    pub fn contains_all(&self, other: &SparseMask) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == *b)
    }

    /// Whether any bit of `other` is set in `self`.
    #[inline]
    pub fn intersects(&self, other: &SparseMask) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    /// Whether the mask includes everything in `include` and nothing in `exclude`.
    #[inline]
    pub fn matches(&self, include: &SparseMask, exclude: &SparseMask) -> bool {
        self.contains_all(include) && !self.intersects(exclude)
    }

    /// Iterate the set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = SparseBit> + '_ {
        self.0.iter().enumerate().flat_map(|(word_index, word)| {
            let mut word = *word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(SparseBit::new((word_index * 64 + bit) as u8))
            })
        })
    }
}

/// Type-erased operations on a [`SparseSet`].
pub trait SparseColumn: Any + Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entity index has a value.
    fn contains(&self, index: usize) -> bool;

    /// Remove and drop the value for an entity index. Returns whether one was present.
    fn remove_drop(&mut self, index: usize) -> bool;

    /// A type-erased reference to the value for an entity index.
    fn get_any(&self, index: usize) -> Option<&dyn Any>;

    /// Whether `value` holds this set's element type.
    fn accepts(&self, value: &dyn Any) -> bool;

    /// Insert a type-erased value, handing it back if the type does not match.
    fn insert_any(
        &mut self,
        entity: Entity,
        value: Box<dyn Any + Send>,
    ) -> Result<(), Box<dyn Any + Send>>;

    /// The entities holding a value, in dense order.
    fn entities(&self) -> &[Entity];

    /// The element type name.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn SparseColumn + 'a {
    #[inline]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&SparseSet<T>> {
        self.as_any().downcast_ref()
    }

    #[inline]
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut SparseSet<T>> {
        self.as_any_mut().downcast_mut()
    }
}

/// Build an empty sparse set for `T`. Stored as a factory in the type registry.
pub fn new_sparse_set<T: Component>(block_size: usize) -> Box<dyn SparseColumn> {
    Box::new(SparseSet::<T>::new(block_size))
}

/// Values of one sparse component type, packed densely and indexed by entity index.
///
/// Removal swaps the last value into the hole, so only the moved element's index entry changes.
#[derive(Debug)]
pub struct SparseSet<T> {
    values: Vec<T>,
    entities: Vec<Entity>,
    index: DynamicIndex,
}

impl<T> SparseSet<T> {
    pub fn new(block_size: usize) -> Self {
        Self {
            values: Vec::new(),
            entities: Vec::new(),
            index: DynamicIndex::new_with_block_size(block_size),
        }
    }

    /// Store `value` for `entity`, overwriting any existing value. Returns the dense slot.
    pub fn insert(&mut self, entity: Entity, value: T) -> usize {
        if let Some(slot) = self.index.get(entity.index()) {
            self.values[slot] = value;
            self.entities[slot] = entity;
            return slot;
        }
        let slot = self.values.len();
        self.values.push(value);
        self.entities.push(entity);
        self.index.insert(entity.index(), slot);
        slot
    }

    /// Remove the value for an entity index.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let slot = self.index.remove(index)?;
        let value = self.values.swap_remove(slot);
        self.entities.swap_remove(slot);
        if let Some(moved) = self.entities.get(slot) {
            self.index.insert(moved.index(), slot);
        }
        Some(value)
    }

    /// The dense slot for an entity index.
    #[inline]
    pub fn slot_of(&self, index: usize) -> Option<usize> {
        self.index.get(index)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slot_of(index).map(|slot| &self.values[slot])
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slot_of(index).map(|slot| &mut self.values[slot])
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The dense entity array and mutable values, for iteration.
    #[inline]
    pub fn split_mut(&mut self) -> (&[Entity], &mut [T]) {
        (&self.entities, &mut self.values)
    }
}

impl<T: Send + Sync + 'static> SparseColumn for SparseSet<T> {
    #[inline]
    fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    fn contains(&self, index: usize) -> bool {
        self.index.contains(index)
    }

    fn remove_drop(&mut self, index: usize) -> bool {
        self.remove(index).is_some()
    }

    fn get_any(&self, index: usize) -> Option<&dyn Any> {
        self.get(index).map(|value| value as &dyn Any)
    }

    fn accepts(&self, value: &dyn Any) -> bool {
        value.is::<T>()
    }

    fn insert_any(
        &mut self,
        entity: Entity,
        value: Box<dyn Any + Send>,
    ) -> Result<(), Box<dyn Any + Send>> {
        let value = value.downcast::<T>()?;
        self.insert(entity, *value);
        Ok(())
    }

    fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Every sparse set of a world, indexed by sparse bit. Sets are created on first insert.
pub struct SparseStore {
    sets: Vec<Option<Box<dyn SparseColumn>>>,
    block_size: usize,
}

impl SparseStore {
    pub fn new(block_size: usize) -> Self {
        Self {
            sets: Vec::new(),
            block_size,
        }
    }

    /// The typed set for a bit, if one has been created.
    #[inline]
    pub fn get<T: Component>(&self, bit: SparseBit) -> Option<&SparseSet<T>> {
        self.erased(bit)?.downcast_ref()
    }

    /// The typed set for a bit, if one has been created.
    #[inline]
    pub fn get_mut<T: Component>(&mut self, bit: SparseBit) -> Option<&mut SparseSet<T>> {
        self.sets.get_mut(bit.index())?.as_deref_mut()?.downcast_mut()
    }

    /// The typed set for a bit, creating it if needed.
    pub fn get_or_create<T: Component>(&mut self, bit: SparseBit) -> &mut SparseSet<T> {
        let block_size = self.block_size;
        self.slot(bit)
            .get_or_insert_with(|| new_sparse_set::<T>(block_size))
            .downcast_mut()
            .expect("sparse bit assigned to a different type")
    }

    /// The erased set for a bit, if one has been created.
    #[inline]
    pub fn erased(&self, bit: SparseBit) -> Option<&dyn SparseColumn> {
        self.sets.get(bit.index())?.as_deref()
    }

    /// The erased set for a bit, creating it through the registry's factory if needed.
    pub fn erased_or_create(
        &mut self,
        bit: SparseBit,
        registry: &TypeRegistry,
        id: crate::ecs::component::TypeId,
    ) -> Option<&mut dyn SparseColumn> {
        let block_size = self.block_size;
        let slot = self.slot(bit);
        if slot.is_none() {
            *slot = registry.info(id)?.new_sparse_set(block_size);
        }
        slot.as_deref_mut()
    }

    /// Every created set with its bit.
    pub fn iter(&self) -> impl Iterator<Item = (SparseBit, &dyn SparseColumn)> {
        self.sets.iter().enumerate().filter_map(|(bit, set)| {
            set.as_deref().map(|set| (SparseBit::new(bit as u8), set))
        })
    }

    /// Remove every sparse value recorded in `mask` for an entity index.
    pub fn remove_all(&mut self, index: usize, mask: &SparseMask) {
        for bit in mask.iter() {
            if let Some(Some(set)) = self.sets.get_mut(bit.index()) {
                set.remove_drop(index);
            }
        }
    }

    /// Take a set out of the store so it can be mutated while the rest of the store is read.
    pub(crate) fn take(&mut self, bit: SparseBit) -> Option<Box<dyn SparseColumn>> {
        self.sets.get_mut(bit.index())?.take()
    }

    /// Put back a set taken with [`SparseStore::take`].
    pub(crate) fn restore(&mut self, bit: SparseBit, set: Box<dyn SparseColumn>) {
        *self.slot(bit) = Some(set);
    }

    fn slot(&mut self, bit: SparseBit) -> &mut Option<Box<dyn SparseColumn>> {
        if bit.index() >= self.sets.len() {
            self.sets.resize_with(bit.index() + 1, || None);
        }
        &mut self.sets[bit.index()]
    }
}
