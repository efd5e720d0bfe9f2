use std::any::{Any, TypeId};
use std::collections::HashMap;

/// World-wide values keyed by type, read by update routines.
#[derive(Debug)]
pub(crate) struct Uniforms {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Uniforms {
    /// A store holding only the unit uniform, which every world provides.
    pub fn new() -> Self {
        let mut uniforms = Self {
            values: HashMap::new(),
        };
        uniforms.insert(());
        uniforms
    }

    /// Store `value`, returning the previous value of the same type.
    pub fn insert<U: Send + Sync + 'static>(&mut self, value: U) -> Option<U> {
        self.values
            .insert(TypeId::of::<U>(), Box::new(value))
            .and_then(|previous| previous.downcast().ok())
            .map(|previous| *previous)
    }

    pub fn get<U: Send + Sync + 'static>(&self) -> Option<&U> {
        self.values.get(&TypeId::of::<U>())?.downcast_ref()
    }

    pub fn get_mut<U: Send + Sync + 'static>(&mut self) -> Option<&mut U> {
        self.values.get_mut(&TypeId::of::<U>())?.downcast_mut()
    }

    pub fn remove<U: Send + Sync + 'static>(&mut self) -> Option<U> {
        if TypeId::of::<U>() == TypeId::of::<()>() {
            return None;
        }
        let value = self.values.remove(&TypeId::of::<U>())?;
        value.downcast().ok().map(|value| *value)
    }
}
