//! Archetype tables.
//!
//! An [`Archetype`] stores every entity sharing one exact set of archetype-stored components and
//! tags. Rows are kept dense: each column, the entity array and the sparse mask array always have
//! the same length, and removal swaps the last row into the hole.
//!
//! Each archetype also owns a byte lookup table indexed by [`TypeId`]: `0` means absent,
//! [`Archetype::TAG`] means the tag is present, and `n + 1` means the component lives in
//! column `n`. Ids past the end of the table are absent.

use std::any::Any;
use std::fmt;

use crate::ecs::{
    component::{Component, Spec, TypeId},
    entity::Entity,
    error::{Error, Result},
    storage::{Column, SparseMask, column::TypedColumn, edge::Edges},
};

/// The identifier of an archetype within its world.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// The archetype with no components and no tags. Always present.
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archetype {}", self.0)
    }
}

/// Rows created while an iteration epoch is open. They share the archetype's shape but are not
/// visible to cursors until merged.
struct Staged {
    epoch: u64,
    entities: Vec<Entity>,
    masks: Vec<SparseMask>,
    columns: Vec<Box<dyn Column>>,
}

/// A dense table of entities sharing one shape.
pub struct Archetype {
    id: Id,
    components: Spec,
    tags: Spec,
    lookup: Vec<u8>,
    entities: Vec<Entity>,
    masks: Vec<SparseMask>,
    columns: Vec<Box<dyn Column>>,
    capacity: usize,
    min_capacity: usize,
    staged: Option<Staged>,
    pub(crate) edges: Edges,
}

impl Archetype {
    /// Lookup value marking a present tag.
    pub const TAG: u8 = u8::MAX;

    /// Columns addressable through the byte lookup table.
    pub const MAX_COLUMNS: usize = (u8::MAX - 1) as usize;

    /// Create an archetype from its shape and one column per component, in `components` order.
    pub fn new(
        id: Id,
        components: Spec,
        tags: Spec,
        columns: Vec<Box<dyn Column>>,
        min_capacity: usize,
    ) -> Result<Self> {
        if columns.len() != components.len() {
            return Err(Error::InvalidState(format!(
                "{id} has {} columns for {} components",
                columns.len(),
                components.len()
            )));
        }
        if columns.len() > Self::MAX_COLUMNS {
            return Err(Error::InvalidState(format!(
                "{id} exceeds {} component columns",
                Self::MAX_COLUMNS
            )));
        }

        let mut lookup = vec![0u8; components.bound().max(tags.bound())];
        for (column, id) in components.ids().iter().enumerate() {
            lookup[id.index()] = column as u8 + 1;
        }
        for id in tags.ids() {
            lookup[id.index()] = Self::TAG;
        }

        Ok(Self {
            id,
            components,
            tags,
            lookup,
            entities: Vec::new(),
            masks: Vec::new(),
            columns,
            capacity: 0,
            min_capacity: min_capacity.max(1),
            staged: None,
            edges: Edges::default(),
        })
    }

    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// The archetype-stored component types, sorted by id.
    #[inline]
    pub fn components(&self) -> &Spec {
        &self.components
    }

    /// The tags, sorted by id.
    #[inline]
    pub fn tags(&self) -> &Spec {
        &self.tags
    }

    /// Number of rows in main storage.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Allocated row capacity of main storage.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entities in main storage, in slot order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Sparse masks in main storage, in slot order.
    #[inline]
    pub fn sparse_masks(&self) -> &[SparseMask] {
        &self.masks
    }

    /// Number of rows waiting in the deferred-creation buffer.
    #[inline]
    pub fn staged_len(&self) -> usize {
        self.staged.as_ref().map_or(0, |staged| staged.entities.len())
    }

    /// Entities waiting in the deferred-creation buffer, in staged slot order.
    #[inline]
    pub fn staged_entities(&self) -> &[Entity] {
        match &self.staged {
            Some(staged) => &staged.entities,
            None => &[],
        }
    }

    #[inline]
    fn lookup(&self, id: TypeId) -> u8 {
        self.lookup.get(id.index()).copied().unwrap_or(0)
    }

    /// The column holding component `id`.
    #[inline]
    pub fn column_index(&self, id: TypeId) -> Option<usize> {
        match self.lookup(id) {
            0 | Self::TAG => None,
            n => Some(n as usize - 1),
        }
    }

    #[inline]
    pub fn has_component(&self, id: TypeId) -> bool {
        self.column_index(id).is_some()
    }

    #[inline]
    pub fn has_tag(&self, id: TypeId) -> bool {
        self.lookup(id) == Self::TAG
    }

    /// The values of component `id` in main storage.
    #[inline]
    pub fn column<T: Component>(&self, id: TypeId) -> Option<&[T]> {
        let column = self.column_index(id)?;
        Some(self.columns[column].downcast_ref::<T>()?.as_slice())
    }

    /// The values of component `id` in main storage.
    #[inline]
    pub fn column_mut<T: Component>(&mut self, id: TypeId) -> Option<&mut [T]> {
        let column = self.column_index(id)?;
        Some(self.columns[column].downcast_mut::<T>()?.as_mut_slice())
    }

    /// The main-storage rows of component `id`: entities, sparse masks and mutable values, all
    /// indexed by slot.
    pub fn rows_mut<T: Component>(
        &mut self,
        id: TypeId,
    ) -> Option<(&[Entity], &[SparseMask], &mut [T])> {
        let column = self.column_index(id)?;
        let values = self.columns[column].downcast_mut::<T>()?.as_mut_slice();
        Some((&self.entities, &self.masks, values))
    }

    /// The values of component `id` in either main or staged storage.
    pub fn column_in<T: Component>(&self, id: TypeId, staged: bool) -> Option<&[T]> {
        if !staged {
            return self.column(id);
        }
        let column = self.column_index(id)?;
        let staged = self.staged.as_ref()?;
        Some(staged.columns[column].downcast_ref::<T>()?.as_slice())
    }

    /// A component of the entity at `slot`.
    #[inline]
    pub fn get<T: Component>(&self, id: TypeId, slot: usize, staged: bool) -> Option<&T> {
        self.column_in::<T>(id, staged)?.get(slot)
    }

    /// A component of the entity at `slot`.
    pub fn get_mut<T: Component>(&mut self, id: TypeId, slot: usize, staged: bool) -> Option<&mut T> {
        let column = self.column_index(id)?;
        let column = if staged {
            &mut self.staged.as_mut()?.columns[column]
        } else {
            &mut self.columns[column]
        };
        column.downcast_mut::<T>()?.as_mut_slice().get_mut(slot)
    }

    /// A type-erased component of the entity at `slot` in main storage.
    pub fn component_any(&self, id: TypeId, slot: usize) -> Option<&dyn Any> {
        self.columns[self.column_index(id)?].get_any(slot)
    }

    /// The sparse mask of the entity at `slot`.
    pub fn sparse_mask(&self, slot: usize, staged: bool) -> SparseMask {
        if staged {
            self.staged
                .as_ref()
                .and_then(|staged| staged.masks.get(slot))
                .copied()
                .unwrap_or_default()
        } else {
            self.masks.get(slot).copied().unwrap_or_default()
        }
    }

    /// The sparse mask of the entity at `slot`.
    pub fn sparse_mask_mut(&mut self, slot: usize, staged: bool) -> Option<&mut SparseMask> {
        if staged {
            self.staged.as_mut()?.masks.get_mut(slot)
        } else {
            self.masks.get_mut(slot)
        }
    }

    /// Ensure main storage can hold `additional` more rows, doubling capacity as needed.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.entities.len() + additional;
        if needed <= self.capacity {
            return;
        }
        let mut capacity = self.capacity.max(self.min_capacity);
        while capacity < needed {
            capacity *= 2;
        }

        let extra = capacity - self.entities.len();
        self.entities.reserve_exact(extra);
        self.masks.reserve_exact(extra);
        for column in &mut self.columns {
            column.reserve_exact(capacity - column.len());
        }
        self.capacity = capacity;
    }

    /// The slot the next pushed row will occupy.
    #[inline]
    pub fn next_slot(&self, staged: bool) -> usize {
        if staged {
            self.staged_len()
        } else {
            self.len()
        }
    }

    /// Open the deferred-creation buffer for `epoch`. Returns true if it was newly opened.
    pub fn begin_staging(&mut self, epoch: u64) -> bool {
        if let Some(staged) = &self.staged {
            debug_assert_eq!(staged.epoch, epoch, "{} staged rows outlived their epoch", self.id);
            return false;
        }
        self.staged = Some(Staged {
            epoch,
            entities: Vec::new(),
            masks: Vec::new(),
            columns: self.columns.iter().map(|column| column.empty_like(0)).collect(),
        });
        true
    }

    /// Push one component value of a row being built.
    ///
    /// # Panics
    /// Panics if the archetype has no column for `id`; callers pick the archetype from the
    /// row's shape.
    pub fn push_component<T: Component>(&mut self, id: TypeId, value: T, staged: bool) {
        let column = self
            .column_index(id)
            .expect("row pushed into an archetype of a different shape");
        let column = match (&mut self.staged, staged) {
            (Some(staged), true) => &mut staged.columns[column],
            (None, true) => panic!("staged row pushed without an open epoch"),
            (_, false) => &mut self.columns[column],
        };
        column
            .downcast_mut::<T>()
            .expect("column type does not match its id")
            .push(value);
    }

    /// Push a type-erased component value of a row being built into main storage.
    pub(crate) fn push_component_any(
        &mut self,
        id: TypeId,
        value: Box<dyn Any + Send>,
    ) -> std::result::Result<(), Box<dyn Any + Send>> {
        match self.column_index(id) {
            Some(column) => self.columns[column].push_any(value),
            None => Err(value),
        }
    }

    /// Whether `value` matches the column type of component `id`.
    pub(crate) fn accepts(&self, id: TypeId, value: &dyn Any) -> bool {
        self.column_index(id)
            .is_some_and(|column| self.columns[column].accepts(value))
    }

    /// Finish a row after every component was pushed. Returns the row's slot.
    pub fn push_entity(&mut self, entity: Entity, mask: SparseMask, staged: bool) -> usize {
        let slot = if staged {
            let staged = self
                .staged
                .as_mut()
                .expect("staged row pushed without an open epoch");
            staged.entities.push(entity);
            staged.masks.push(mask);
            staged.entities.len() - 1
        } else {
            self.entities.push(entity);
            self.masks.push(mask);
            self.entities.len() - 1
        };

        #[cfg(debug_assertions)]
        self.verify_invariants();

        slot
    }

    /// Remove the row at `slot`, dropping its components. Returns the entity moved into `slot`,
    /// if any.
    pub fn swap_remove(&mut self, slot: usize) -> Option<Entity> {
        debug_assert!(slot < self.entities.len(), "slot out of bounds");

        for column in &mut self.columns {
            column.swap_remove_drop(slot);
        }
        self.entities.swap_remove(slot);
        self.masks.swap_remove(slot);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        self.entities.get(slot).copied()
    }

    /// Move the row at `slot` into `dst`.
    ///
    /// Components present in both archetypes are moved, components missing from `dst` are
    /// dropped, and the column at `skip` (already removed by the caller) is left alone. Columns
    /// only `dst` has must be pushed by the caller afterwards. Returns the row's slot in `dst`
    /// and the entity moved into `slot` here, if any.
    pub fn migrate_to(
        &mut self,
        slot: usize,
        dst: &mut Archetype,
        skip: Option<usize>,
    ) -> (usize, Option<Entity>) {
        debug_assert!(slot < self.entities.len(), "slot out of bounds");
        dst.reserve(1);

        for (index, column) in self.columns.iter_mut().enumerate() {
            if skip == Some(index) {
                continue;
            }
            let id = self.components.ids()[index];
            match dst.column_index(id) {
                Some(target) => column.swap_remove_into(slot, dst.columns[target].as_mut()),
                None => column.swap_remove_drop(slot),
            }
        }

        let entity = self.entities.swap_remove(slot);
        let mask = self.masks.swap_remove(slot);
        dst.entities.push(entity);
        dst.masks.push(mask);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        (dst.entities.len() - 1, self.entities.get(slot).copied())
    }

    /// Take the values of component `T` at `slot` out of its column with swap-remove semantics,
    /// in preparation for [`Archetype::migrate_to`] with `skip` set to the returned column.
    pub(crate) fn take_value<T: Component>(&mut self, id: TypeId, slot: usize) -> Option<(usize, T)> {
        let column = self.column_index(id)?;
        let typed: &mut TypedColumn<T> = self.columns[column].downcast_mut()?;
        Some((column, typed.swap_remove(slot)))
    }

    /// Move every staged row into main storage. Returns the first merged slot and the merged
    /// entities in slot order.
    pub fn merge_staged(&mut self) -> Option<(usize, Vec<Entity>)> {
        let mut staged = self.staged.take()?;
        let base = self.entities.len();
        self.reserve(staged.entities.len());

        for (column, staged_column) in self.columns.iter_mut().zip(staged.columns.iter_mut()) {
            column.append(staged_column.as_mut());
        }
        self.masks.append(&mut staged.masks);
        let merged = std::mem::take(&mut staged.entities);
        self.entities.extend_from_slice(&merged);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        Some((base, merged))
    }

    /// Take a column out so it can be mutated while the rest of the archetype is read.
    /// Must be returned with [`Archetype::restore_column`] before the next structural change.
    pub(crate) fn take_column(&mut self, column: usize) -> Box<dyn Column> {
        let placeholder = self.columns[column].empty_like(0);
        std::mem::replace(&mut self.columns[column], placeholder)
    }

    pub(crate) fn restore_column(&mut self, column: usize, values: Box<dyn Column>) {
        debug_assert_eq!(values.len(), self.entities.len());
        self.columns[column] = values;
    }

    /// Check the row invariants, returning a description of the first violation.
    pub fn check(&self) -> std::result::Result<(), String> {
        let len = self.entities.len();
        if self.masks.len() != len {
            return Err(format!("{} has {} masks for {len} entities", self.id, self.masks.len()));
        }
        for (column, values) in self.columns.iter().enumerate() {
            if values.len() != len {
                return Err(format!(
                    "{} column {column} ({}) has {} rows for {len} entities",
                    self.id,
                    values.type_name(),
                    values.len()
                ));
            }
        }
        if let Some(staged) = &self.staged {
            let len = staged.entities.len();
            if staged.masks.len() != len || staged.columns.iter().any(|c| c.len() != len) {
                return Err(format!("{} staged rows are out of step", self.id));
            }
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        if let Err(violation) = self.check() {
            panic!("{violation}");
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.components)
            .field("tags", &self.tags)
            .field("len", &self.len())
            .field("staged", &self.staged_len())
            .finish()
    }
}
