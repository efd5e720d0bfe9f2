use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::ecs::{
    component::{Spec, TypeId, TypeKind, TypeRegistry},
    error::{Error, Result},
    storage::{Archetype, EdgeKind, archetype},
};

/// Every archetype of a world, addressed by id and by shape, plus the cached transitions
/// between them.
///
/// Archetypes are content addressed: the same pair of component and tag sets always maps to the
/// same archetype. Archetypes are never removed, so ids stay valid for the world's lifetime.
#[derive(Debug)]
pub struct Archetypes {
    archetypes: Vec<Archetype>,
    by_shape: HashMap<u64, Vec<archetype::Id>>,
    initial_capacity: usize,
}

impl Archetypes {
    /// Create the graph holding only the empty archetype.
    pub fn new(initial_capacity: usize) -> Self {
        let empty = Archetype::new(
            archetype::Id::EMPTY,
            Spec::EMPTY,
            Spec::EMPTY,
            Vec::new(),
            initial_capacity,
        )
        .expect("the empty archetype is always valid");

        let mut by_shape = HashMap::new();
        by_shape.insert(Self::shape_hash(&Spec::EMPTY, &Spec::EMPTY), vec![empty.id()]);

        Self {
            archetypes: vec![empty],
            by_shape,
            initial_capacity,
        }
    }

    #[inline]
    pub fn get(&self, id: archetype::Id) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: archetype::Id) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    /// Mutable access to two distinct archetypes at once.
    pub(crate) fn pair_mut(
        &mut self,
        a: archetype::Id,
        b: archetype::Id,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "pair_mut needs two distinct archetypes");
        if a.index() < b.index() {
            let (low, high) = self.archetypes.split_at_mut(b.index());
            (&mut low[a.index()], &mut high[0])
        } else {
            let (low, high) = self.archetypes.split_at_mut(a.index());
            (&mut high[0], &mut low[b.index()])
        }
    }

    /// Number of archetypes, including the empty one.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Find the archetype with exactly this shape.
    pub fn find(&self, components: &Spec, tags: &Spec) -> Option<archetype::Id> {
        self.by_shape
            .get(&Self::shape_hash(components, tags))?
            .iter()
            .copied()
            .find(|id| {
                let archetype = &self.archetypes[id.index()];
                archetype.components() == components && archetype.tags() == tags
            })
    }

    /// Find or create the archetype with exactly this shape. The flag is true when the archetype
    /// was created by this call.
    pub fn get_or_create(
        &mut self,
        components: Spec,
        tags: Spec,
        registry: &TypeRegistry,
    ) -> Result<(archetype::Id, bool)> {
        if let Some(id) = self.find(&components, &tags) {
            return Ok((id, false));
        }

        // Build the type-specific storage first; only the id assignment below mutates the graph.
        let mut columns = Vec::with_capacity(components.len());
        for id in components.ids() {
            let info = registry
                .info(*id)
                .ok_or_else(|| Error::InvalidState(format!("type {id} is not registered")))?;
            let column = info.new_column(0).ok_or_else(|| {
                Error::InvalidState(format!("{} is not an archetype component", info.name()))
            })?;
            columns.push(column);
        }
        for id in tags.ids() {
            match registry.info(*id).map(|info| info.kind()) {
                Some(TypeKind::Tag) => {}
                _ => return Err(Error::InvalidState(format!("type {id} is not a tag"))),
            }
        }

        let id = archetype::Id::new(u32::try_from(self.archetypes.len()).map_err(|_| {
            Error::InvalidState("archetype id space exhausted".to_string())
        })?);
        let hash = Self::shape_hash(&components, &tags);
        log::debug!("creating {id} with components {components} and tags {tags}");

        let archetype = Archetype::new(id, components, tags, columns, self.initial_capacity)?;
        self.archetypes.push(archetype);
        self.by_shape.entry(hash).or_default().push(id);

        Ok((id, true))
    }

    /// The archetype reached from `from` by applying one structural change. Both directions of
    /// the edge are cached. The flag is true when the target archetype was created by this call.
    pub fn adjacent(
        &mut self,
        from: archetype::Id,
        kind: EdgeKind,
        ty: TypeId,
        registry: &TypeRegistry,
    ) -> Result<(archetype::Id, bool)> {
        let source = self
            .archetypes
            .get_mut(from.index())
            .ok_or_else(|| Error::InvalidState(format!("{from} does not exist")))?;
        if let Some(target) = source.edges.get(kind, ty) {
            return Ok((target, false));
        }

        let (components, tags) = match kind {
            EdgeKind::AddComponent => (source.components().with(ty), source.tags().clone()),
            EdgeKind::RemoveComponent => (source.components().without(ty), source.tags().clone()),
            EdgeKind::AddTag => (source.components().clone(), source.tags().with(ty)),
            EdgeKind::RemoveTag => (source.components().clone(), source.tags().without(ty)),
        };

        let (target, created) = self.get_or_create(components, tags, registry)?;
        self.archetypes[from.index()].edges.insert(kind, ty, target);
        if target != from {
            self.archetypes[target.index()]
                .edges
                .insert(kind.inverse(), ty, from);
        }

        Ok((target, created))
    }

    fn shape_hash(components: &Spec, tags: &Spec) -> u64 {
        let mut hasher = DefaultHasher::new();
        components.hash(&mut hasher);
        tags.hash(&mut hasher);
        hasher.finish()
    }
}
