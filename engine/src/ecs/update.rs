//! Per-component update routines.
//!
//! A component implementing [`Update`] declares the other components it reads (its [`Args`]) and
//! a world uniform it consults. [`World::update`](crate::ecs::World::update) and
//! [`World::par_update`](crate::ecs::World::par_update) then call
//! [`Update::update`] on every instance of the component, resolving the arguments from the
//! entity's own components.
//!
//! ```ignore
//! #[derive(Component)]
//! struct Position(f32, f32);
//!
//! #[derive(Component)]
//! struct Velocity(f32, f32);
//!
//! struct Tick { dt: f32 }
//!
//! impl Update for Position {
//!     type Args = (Velocity,);
//!     type Uniform = Tick;
//!
//!     fn update(&mut self, _: Entity, (velocity,): (&Velocity,), tick: &Tick) {
//!         self.0 += velocity.0 * tick.dt;
//!         self.1 += velocity.1 * tick.dt;
//!     }
//! }
//!
//! world.set_uniform(Tick { dt: 0.016 });
//! world.par_update::<Position>()?;
//! ```

use std::any::{TypeId as StdTypeId, type_name};

use crate::all_tuples;
use crate::ecs::{
    Component,
    component::{TypeId, TypeKind, TypeRegistry},
    entity::Entity,
    error::Result,
    storage::{Archetype, SparseSet, SparseStore},
};

/// A component with an update routine run by the world's update runners.
pub trait Update: Component {
    /// The components read alongside `Self`: `()`, a component, or a tuple of them.
    type Args: Args;

    /// A world uniform handed to every call. Use `()` when none is needed.
    type Uniform: Send + Sync + 'static;

    fn update(
        &mut self,
        entity: Entity,
        args: <Self::Args as Args>::Item<'_>,
        uniform: &Self::Uniform,
    );
}

/// Rows an update argument is read from: an archetype's main storage, or its staging buffer.
#[derive(Clone, Copy)]
pub struct Rows<'a> {
    pub archetype: &'a Archetype,
    pub staged: bool,
}

impl<'a> Rows<'a> {
    #[inline]
    pub fn main(archetype: &'a Archetype) -> Self {
        Self {
            archetype,
            staged: false,
        }
    }
}

/// Read-only component arguments of an update routine.
///
/// Resolution happens in two steps: [`Args::prepare`] looks the argument columns up once per
/// archetype, then [`Args::fetch`] reads one entity's values from the prepared state.
pub trait Args: 'static {
    /// Per-archetype lookup state. Shared across worker threads during parallel updates.
    type State<'a>: Send + Sync;

    /// The values handed to [`Update::update`].
    type Item<'a>;

    /// Register the argument types, appending their ids to `out`.
    fn register(registry: &TypeRegistry, out: &mut Vec<TypeId>) -> Result<()>;

    fn prepare<'a>(rows: Rows<'a>, sparse: &'a SparseStore) -> Self::State<'a>;

    /// Read the arguments of the entity at `slot`. On failure returns the missing type's name.
    fn fetch<'a>(
        state: &Self::State<'a>,
        slot: usize,
        entity: Entity,
    ) -> std::result::Result<Self::Item<'a>, &'static str>;
}

/// Where a single component argument is read from.
pub enum ArgState<'a, C> {
    Column(&'a [C]),
    Sparse(&'a SparseSet<C>),
    Missing,
}

impl<C: Component> Args for C {
    type State<'a> = ArgState<'a, C>;
    type Item<'a> = &'a C;

    fn register(registry: &TypeRegistry, out: &mut Vec<TypeId>) -> Result<()> {
        out.push(registry.register_component::<C>()?.id);
        Ok(())
    }

    fn prepare<'a>(rows: Rows<'a>, sparse: &'a SparseStore) -> Self::State<'a> {
        let Some(entry) = TypeRegistry::global().entry_of(StdTypeId::of::<C>()) else {
            return ArgState::Missing;
        };
        let state = match entry.kind {
            TypeKind::Sparse(bit) => sparse.get::<C>(bit).map(ArgState::Sparse),
            _ => rows
                .archetype
                .column_in::<C>(entry.id, rows.staged)
                .map(ArgState::Column),
        };
        state.unwrap_or(ArgState::Missing)
    }

    fn fetch<'a>(
        state: &Self::State<'a>,
        slot: usize,
        entity: Entity,
    ) -> std::result::Result<Self::Item<'a>, &'static str> {
        let value = match *state {
            ArgState::Column(values) => values.get(slot),
            ArgState::Sparse(set) => set.get(entity.index()),
            ArgState::Missing => None,
        };
        value.ok_or(type_name::<C>())
    }
}

impl Args for () {
    type State<'a> = ();
    type Item<'a> = ();

    fn register(_: &TypeRegistry, _: &mut Vec<TypeId>) -> Result<()> {
        Ok(())
    }

    fn prepare<'a>(_: Rows<'a>, _: &'a SparseStore) -> Self::State<'a> {}

    fn fetch<'a>(
        _: &Self::State<'a>,
        _: usize,
        _: Entity,
    ) -> std::result::Result<Self::Item<'a>, &'static str> {
        Ok(())
    }
}

macro_rules! tuple_args {
    ($($name: ident),*) => {
        impl<$($name: Args),*> Args for ($($name,)*) {
            type State<'a> = ($(<$name as Args>::State<'a>,)*);
            type Item<'a> = ($(<$name as Args>::Item<'a>,)*);

            fn register(registry: &TypeRegistry, out: &mut Vec<TypeId>) -> Result<()> {
                $(<$name as Args>::register(registry, out)?;)*
                Ok(())
            }

            fn prepare<'a>(rows: Rows<'a>, sparse: &'a SparseStore) -> Self::State<'a> {
                ($(<$name as Args>::prepare(rows, sparse),)*)
            }

            #[allow(non_snake_case)]
            fn fetch<'a>(
                state: &Self::State<'a>,
                slot: usize,
                entity: Entity,
            ) -> std::result::Result<Self::Item<'a>, &'static str> {
                let ($($name,)*) = state;
                Ok(($(<$name as Args>::fetch($name, slot, entity)?,)*))
            }
        }
    }
}

all_tuples!(tuple_args);
