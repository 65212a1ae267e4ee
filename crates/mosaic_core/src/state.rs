//! Pass-scoped global state.
//!
//! One [`GlobalState`] is shared by every component rendered in a pass.
//! Clones share the same storage. Each call is atomic on its own; handlers
//! that need read-modify-write on a key use [`GlobalState::update`].

use crate::error::BusinessError;
use crate::protocol::Container;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;

/// Reserved key a handler sets to report a business error
pub const GLOBAL_ERROR_KEY: &str = "_error_";

/// Shared key/value store for one render pass
#[derive(Clone, Default)]
pub struct GlobalState {
    inner: Arc<RwLock<Container>>,
}

impl GlobalState {
    /// Create an empty global state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from existing entries
    #[must_use]
    pub fn from_container(entries: Container) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entries)),
        }
    }

    /// Get a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Set a value, returning the previous one
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.write().insert(key.into(), value)
    }

    /// Remove a value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().shift_remove(key)
    }

    /// Check whether a key is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Read-modify-write a key under one lock
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.inner.write();
        let slot = guard.entry(key.to_string()).or_insert(Value::Null);
        f(slot)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of all entries
    #[must_use]
    pub fn snapshot(&self) -> Container {
        self.inner.read().clone()
    }

    /// Report a business error for this pass
    pub fn set_error(&self, error: &BusinessError) {
        self.set(GLOBAL_ERROR_KEY, error.to_value());
    }

    /// Business error reported in this pass, if any
    #[must_use]
    pub fn error(&self) -> Option<BusinessError> {
        self.inner
            .read()
            .get(GLOBAL_ERROR_KEY)
            .and_then(BusinessError::from_value)
    }

    /// Drop a business error left over from a previous pass
    pub fn clear_error(&self) -> Option<Value> {
        self.remove(GLOBAL_ERROR_KEY)
    }

    /// Whether two handles share storage
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for GlobalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.inner.read().iter()).finish()
    }
}

impl PartialEq for GlobalState {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.inner.read() == *other.inner.read()
    }
}

impl Serialize for GlobalState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GlobalState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Container::deserialize(deserializer).map(Self::from_container)
    }
}
