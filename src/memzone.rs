//! Named shared blocks.
//!
//! A [`NamedZones`] table stands in for the platform's named shared memory:
//! a block is reserved under a unique name and any holder of the table can
//! find it again by recomputing that name.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;

use axerrno::{AxResult, ax_err};
use spin::RwLock;

/// Table of named shared blocks of type `T`.
pub struct NamedZones<T> {
    zones: RwLock<BTreeMap<String, Arc<T>>>,
}

impl<T> NamedZones<T> {
    pub const fn new() -> Self {
        Self {
            zones: RwLock::new(BTreeMap::new()),
        }
    }

    /// Reserves `name` for `value` and returns the shared block.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if `name` is taken.
    pub fn reserve(&self, name: &str, value: T) -> AxResult<Arc<T>> {
        let mut zones = self.zones.write();
        if zones.contains_key(name) {
            return ax_err!(AlreadyExists, "memzone name in use");
        }
        let block = Arc::new(value);
        zones.insert(String::from(name), block.clone());
        Ok(block)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<T>> {
        self.zones.read().get(name).cloned()
    }

    /// Releases the block reserved under `name`.
    ///
    /// Holders of the block keep it alive; the name becomes free at once.
    pub fn free(&self, name: &str) -> AxResult {
        match self.zones.write().remove(name) {
            Some(_) => Ok(()),
            None => ax_err!(NotFound, "memzone not found"),
        }
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }
}

impl<T> Default for NamedZones<T> {
    fn default() -> Self {
        Self::new()
    }
}
