use crate::{
    all_tuples,
    ecs::{
        component::{Component, TypeEntry, TypeRegistry},
        error::{Error, Result},
    },
};

/// A destination for the values of a [`Set`].
pub trait Target {
    fn push<C: Component>(&mut self, entry: TypeEntry, value: C);
}

/// A bundle of component values used to create an entity: a single component, `()`, or a tuple
/// of sets.
pub trait Set: Sized + 'static {
    /// Register the types in this set, appending their entries in declaration order.
    fn entries(registry: &TypeRegistry, out: &mut Vec<TypeEntry>) -> Result<()>;

    /// Move the values in this set into the target.
    fn apply<T: Target>(self, registry: &TypeRegistry, target: &mut T) -> Result<()>;

    /// Register the set's types and reject sets naming a type twice.
    fn validated_entries(registry: &TypeRegistry) -> Result<Vec<TypeEntry>> {
        let mut entries = Vec::new();
        Self::entries(registry, &mut entries)?;
        let mut ids: Vec<_> = entries.iter().map(|entry| entry.id).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            let name = registry
                .info(pair[0])
                .map_or("<unregistered>", |info| info.name());
            return Err(Error::InvalidState(format!(
                "component {name} appears twice in one set"
            )));
        }
        Ok(entries)
    }
}

impl<C: Component> Set for C {
    fn entries(registry: &TypeRegistry, out: &mut Vec<TypeEntry>) -> Result<()> {
        out.push(registry.register_component::<C>()?);
        Ok(())
    }

    fn apply<T: Target>(self, registry: &TypeRegistry, target: &mut T) -> Result<()> {
        target.push::<C>(registry.register_component::<C>()?, self);
        Ok(())
    }
}

impl Set for () {
    fn entries(_registry: &TypeRegistry, _out: &mut Vec<TypeEntry>) -> Result<()> {
        Ok(())
    }

    fn apply<T: Target>(self, _registry: &TypeRegistry, _target: &mut T) -> Result<()> {
        Ok(())
    }
}

macro_rules! tuple_set {
    ($($name: ident),*) => {
        impl<$($name: Set),*> Set for ($($name,)*) {
            fn entries(registry: &TypeRegistry, out: &mut Vec<TypeEntry>) -> Result<()> {
                $(<$name as Set>::entries(registry, out)?;)*
                Ok(())
            }

            #[allow(non_snake_case)]
            fn apply<CT: Target>(self, registry: &TypeRegistry, target: &mut CT) -> Result<()> {
                let ( $($name,)* ) = self;
                $(<$name as Set>::apply($name, registry, target)?;)*
                Ok(())
            }
        }
    }
}

// Implement the tuple Set for all tuples up to 26 elements.
all_tuples!(tuple_set);
