use std::collections::HashMap;

use crate::ecs::{component::TypeId, storage::archetype};

/// The structural change an archetype edge describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    AddComponent,
    RemoveComponent,
    AddTag,
    RemoveTag,
}

impl EdgeKind {
    /// The edge leading back to the source archetype.
    #[inline]
    pub fn inverse(self) -> Self {
        match self {
            EdgeKind::AddComponent => EdgeKind::RemoveComponent,
            EdgeKind::RemoveComponent => EdgeKind::AddComponent,
            EdgeKind::AddTag => EdgeKind::RemoveTag,
            EdgeKind::RemoveTag => EdgeKind::AddTag,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    kind: EdgeKind,
    ty: TypeId,
    target: archetype::Id,
}

/// Cached transitions out of one archetype.
///
/// Lookups first scan a few most-recently-used entries (hot loops usually toggle the same one or
/// two types) and fall back to a map holding every edge ever resolved.
#[derive(Debug, Default)]
pub(crate) struct Edges {
    recent: [Option<Edge>; Edges::RECENT],
    all: HashMap<(EdgeKind, TypeId), archetype::Id>,
}

impl Edges {
    const RECENT: usize = 4;

    pub fn get(&mut self, kind: EdgeKind, ty: TypeId) -> Option<archetype::Id> {
        if let Some(position) = self
            .recent
            .iter()
            .position(|edge| matches!(edge, Some(edge) if edge.kind == kind && edge.ty == ty))
        {
            let edge = self.recent[position];
            self.recent[..=position].rotate_right(1);
            debug_assert!(edge.is_some());
            return edge.map(|edge| edge.target);
        }

        let target = *self.all.get(&(kind, ty))?;
        self.promote(Edge { kind, ty, target });
        Some(target)
    }

    pub fn insert(&mut self, kind: EdgeKind, ty: TypeId, target: archetype::Id) {
        self.all.insert((kind, ty), target);
        self.promote(Edge { kind, ty, target });
    }

    fn promote(&mut self, edge: Edge) {
        self.recent.rotate_right(1);
        self.recent[0] = Some(edge);
    }
}
