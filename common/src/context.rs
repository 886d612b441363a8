use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use anyhow::{Context as AnyContext, Result};

/// Request-scoped bag of values threaded through repository calls.
///
/// The main tenant is the unit-of-work transaction handle: storing it here
/// keeps every repository signature stable while still making the ambient
/// transaction reachable from any call issued inside the unit-of-work.
pub struct Context {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn store<T: Send + Sync + 'static>(&mut self, data: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(data));
    }

    pub fn remove<T: 'static>(&mut self) {
        self.values.remove(&TypeId::of::<T>());
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn get_optional<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref())
    }

    pub fn get<T: 'static>(&self) -> Result<&T> {
        self.get_optional().context("Requested type not found")
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
