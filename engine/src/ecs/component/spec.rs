use std::fmt;

use crate::ecs::component::TypeId;

/// A sorted, de-duplicated set of type ids.
///
/// Archetypes are identified by a pair of specs (components and tags), so two specs built from
/// the same ids in any order compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Spec {
    ids: Vec<TypeId>,
}

impl Spec {
    /// An empty specification.
    pub const EMPTY: Self = Spec { ids: Vec::new() };

    /// Construct a new Spec from the given ids.
    #[inline]
    pub fn new(ids: impl Into<Vec<TypeId>>) -> Self {
        let mut ids = ids.into();
        ids.sort();
        ids.dedup();
        ids.shrink_to_fit();

        Self { ids }
    }

    /// The ids in ascending order.
    #[inline]
    pub fn ids(&self) -> &[TypeId] {
        &self.ids
    }

    /// Determine if this specification contains the given id.
    #[inline]
    pub fn contains(&self, id: TypeId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// The position of `id` within the sorted ids.
    #[inline]
    pub fn position(&self, id: TypeId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// A copy of this spec with `id` added.
    pub fn with(&self, id: TypeId) -> Self {
        match self.ids.binary_search(&id) {
            Ok(_) => self.clone(),
            Err(at) => {
                let mut ids = Vec::with_capacity(self.ids.len() + 1);
                ids.extend_from_slice(&self.ids[..at]);
                ids.push(id);
                ids.extend_from_slice(&self.ids[at..]);
                Self { ids }
            }
        }
    }

    /// A copy of this spec with `id` removed.
    pub fn without(&self, id: TypeId) -> Self {
        let ids = self.ids.iter().copied().filter(|other| *other != id).collect();
        Self { ids } // Already sorted
    }

    /// The largest id index plus one, or zero when empty.
    #[inline]
    pub fn bound(&self) -> usize {
        self.ids.last().map_or(0, |id| id.index() + 1)
    }

    /// Returns true if this spec is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the number of ids in this spec.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl From<Vec<TypeId>> for Spec {
    #[inline]
    fn from(value: Vec<TypeId>) -> Self {
        Spec::new(value)
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")
    }
}
