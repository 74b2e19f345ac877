//! Shared key-value store seen by every tab of one browser profile.
//!
//! `localStorage` in the browser; [`MemoryStore`] natively and in tests, where
//! clones share one map to stand in for several tabs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;

/// Synchronous, last-write-wins key-value store.
pub trait SharedStore {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend rejects the write.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend rejects the removal.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.map().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.clone();
        tab_a.set("k", "v").expect("set");
        assert_eq!(tab_b.get("k").as_deref(), Some("v"));
        tab_b.remove("k").expect("remove");
        assert!(tab_a.is_empty());
    }
}
