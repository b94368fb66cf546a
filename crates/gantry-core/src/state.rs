//! Application-scoped state.
//!
//! [`State`] is the opaque application object handed to response containers.
//! It is a cheaply cloneable, type-keyed map: one value per type, shared by
//! every clone.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Clone, Default)]
pub struct State {
    inner: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.inner.write().insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Returns the stored value of type `T`, if any.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.inner.read().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .write()
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Templates(&'static str);

    #[test]
    fn test_clones_share_values() {
        let state = State::new();
        let clone = state.clone();
        state.insert(Templates("templates/"));

        assert_eq!(
            clone.get::<Templates>().as_deref(),
            Some(&Templates("templates/"))
        );
        assert!(clone.contains::<Templates>());
        assert!(clone.get::<String>().is_none());
    }

    #[test]
    fn test_remove_takes_value_out() {
        let state = State::new().with(7_u32);
        assert_eq!(state.remove::<u32>().as_deref(), Some(&7));
        assert!(state.is_empty());
    }
}
