use std::{
    any::TypeId as StdTypeId,
    fmt,
    sync::{LazyLock, Mutex, PoisonError, RwLock},
};

use dashmap::DashMap;

use crate::ecs::{
    component::{Component, StorageKind, Tag},
    error::{Error, Result},
    storage::{Column, SparseColumn, column, sparse},
};

/// The process wide registry shared by every world.
static GLOBAL: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::new);

/// A dense identifier for a registered component or tag type.
///
/// Ids are handed out in registration order, starting at zero, and never reused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// Construct a new Id from a raw u32 value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the index of this id for use in indexable storage.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The bit a sparse component type occupies in an entity's sparse mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SparseBit(u8);

impl SparseBit {
    #[inline]
    pub const fn new(bit: u8) -> Self {
        Self(bit)
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// What a registered type is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// An archetype column component.
    Component,
    /// A sparse component and its mask bit.
    Sparse(SparseBit),
    /// A data-less tag.
    Tag,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Component => write!(f, "component"),
            TypeKind::Sparse(bit) => write!(f, "sparse component (bit {})", bit.0),
            TypeKind::Tag => write!(f, "tag"),
        }
    }
}

/// The hot-path view of a registration: its id and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeEntry {
    pub id: TypeId,
    pub kind: TypeKind,
}

impl TypeEntry {
    /// The sparse mask bit, if the entry describes a sparse component.
    #[inline]
    pub fn sparse_bit(&self) -> Option<SparseBit> {
        match self.kind {
            TypeKind::Sparse(bit) => Some(bit),
            _ => None,
        }
    }
}

/// Full metadata for a registered type, including the storage factories used to build
/// type-erased columns.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    entry: TypeEntry,
    type_id: StdTypeId,
    name: &'static str,
    column: Option<fn(usize) -> Box<dyn Column>>,
    sparse: Option<fn(usize) -> Box<dyn SparseColumn>>,
}

impl TypeInfo {
    #[inline]
    pub fn id(&self) -> TypeId {
        self.entry.id
    }

    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.entry.kind
    }

    #[inline]
    pub fn entry(&self) -> TypeEntry {
        self.entry
    }

    /// The Rust type id this registration was made for.
    #[inline]
    pub fn type_id(&self) -> StdTypeId {
        self.type_id
    }

    /// The Rust type name, as reported by [`std::any::type_name`].
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build an empty archetype column for this type with the given capacity.
    pub fn new_column(&self, capacity: usize) -> Option<Box<dyn Column>> {
        self.column.map(|factory| factory(capacity))
    }

    /// Build an empty sparse set for this type with the given index block size.
    pub fn new_sparse_set(&self, block_size: usize) -> Option<Box<dyn SparseColumn>> {
        self.sparse.map(|factory| factory(block_size))
    }
}

/// A thread-safe registry of component and tag types.
///
/// Reads go through a `DashMap` without a global lock. First-time registration takes a single
/// coarse lock that assigns the id (and the sparse bit, for sparse components), so two threads
/// racing to register the same type agree on one id.
///
/// Every world uses [`TypeRegistry::global`], so ids are stable across worlds within a process.
pub struct TypeRegistry {
    type_map: DashMap<StdTypeId, TypeEntry>,
    types: RwLock<Vec<TypeInfo>>,
    /// Guards registration and holds the next free sparse bit.
    registration: Mutex<usize>,
    sparse_capacity: usize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// The number of sparse component types a world can describe per entity.
    pub const SPARSE_CAPACITY: usize = 256;

    /// Create an empty registry. Worlds always use [`TypeRegistry::global`].
    pub fn new() -> Self {
        Self::with_sparse_capacity(Self::SPARSE_CAPACITY)
    }

    pub(crate) fn with_sparse_capacity(sparse_capacity: usize) -> Self {
        debug_assert!(sparse_capacity <= Self::SPARSE_CAPACITY);
        Self {
            type_map: DashMap::new(),
            types: RwLock::new(Vec::new()),
            registration: Mutex::new(0),
            sparse_capacity,
        }
    }

    /// The registry shared by every world in the process.
    #[inline]
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Register a component type, returning its entry. Idempotent.
    pub fn register_component<C: Component>(&self) -> Result<TypeEntry> {
        let type_id = StdTypeId::of::<C>();
        let name = std::any::type_name::<C>();
        let wanted = match C::STORAGE {
            StorageKind::Archetype => Wanted::Component,
            StorageKind::Sparse => Wanted::Sparse,
        };

        // Fast path: lock-free read.
        if let Some(entry) = self.type_map.get(&type_id) {
            return wanted.check(*entry, name);
        }

        self.register_slow(type_id, name, wanted, |entry| TypeInfo {
            entry,
            type_id,
            name,
            column: match C::STORAGE {
                StorageKind::Archetype => Some(column::new_column::<C>),
                StorageKind::Sparse => None,
            },
            sparse: match C::STORAGE {
                StorageKind::Archetype => None,
                StorageKind::Sparse => Some(sparse::new_sparse_set::<C>),
            },
        })
    }

    /// Register a tag type, returning its entry. Idempotent.
    pub fn register_tag<G: Tag>(&self) -> Result<TypeEntry> {
        let type_id = StdTypeId::of::<G>();
        let name = std::any::type_name::<G>();

        if let Some(entry) = self.type_map.get(&type_id) {
            return Wanted::Tag.check(*entry, name);
        }

        self.register_slow(type_id, name, Wanted::Tag, |entry| TypeInfo {
            entry,
            type_id,
            name,
            column: None,
            sparse: None,
        })
    }

    /// Get the entry for a Rust type if it has been registered.
    #[inline]
    pub fn entry_of(&self, type_id: StdTypeId) -> Option<TypeEntry> {
        self.type_map.get(&type_id).map(|entry| *entry.value())
    }

    /// Get the full metadata for a registered id.
    #[inline]
    pub fn info(&self, id: TypeId) -> Option<TypeInfo> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        types.get(id.index()).copied()
    }

    /// Get the metadata of the sparse component assigned `bit`.
    pub fn sparse_info(&self, bit: SparseBit) -> Option<TypeInfo> {
        let types = self.types.read().unwrap_or_else(PoisonError::into_inner);
        types
            .iter()
            .find(|info| info.kind() == TypeKind::Sparse(bit))
            .copied()
    }

    /// The number of registered types.
    pub fn len(&self) -> usize {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register_slow(
        &self,
        type_id: StdTypeId,
        name: &'static str,
        wanted: Wanted,
        build: impl FnOnce(TypeEntry) -> TypeInfo,
    ) -> Result<TypeEntry> {
        let mut next_sparse = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another thread may have won the race while we waited for the lock.
        if let Some(entry) = self.type_map.get(&type_id) {
            return wanted.check(*entry, name);
        }

        let kind = match wanted {
            Wanted::Component => TypeKind::Component,
            Wanted::Tag => TypeKind::Tag,
            Wanted::Sparse => {
                if *next_sparse >= self.sparse_capacity {
                    return Err(Error::SparseCapacityExceeded {
                        capacity: self.sparse_capacity,
                    });
                }
                let bit = SparseBit(*next_sparse as u8);
                *next_sparse += 1;
                TypeKind::Sparse(bit)
            }
        };

        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        let id = TypeId(u32::try_from(types.len()).expect("type id space exhausted"));
        let entry = TypeEntry { id, kind };
        types.push(build(entry));
        self.type_map.insert(type_id, entry);

        Ok(entry)
    }
}

#[derive(Debug, Clone, Copy)]
enum Wanted {
    Component,
    Sparse,
    Tag,
}

impl Wanted {
    fn check(self, entry: TypeEntry, name: &'static str) -> Result<TypeEntry> {
        match (self, entry.kind) {
            (Wanted::Component, TypeKind::Component)
            | (Wanted::Sparse, TypeKind::Sparse(_))
            | (Wanted::Tag, TypeKind::Tag) => Ok(entry),
            _ => Err(Error::KindMismatch { name }),
        }
    }
}
