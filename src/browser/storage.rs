//! Persistent key/value storage.
//!
//! The tracker only ever reads one key (`plausible_ignore`), but storage is
//! a full `localStorage`-like seam so embedders can back it with whatever
//! the host provides.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

// ============================================================================
// Storage
// ============================================================================

/// `localStorage`-like string storage.
///
/// Reads may fail (storage disabled, quota, privacy mode); callers decide
/// how to degrade.
pub trait Storage: Send + Sync {
    /// Gets a value.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Sets a value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes a key.
    fn remove_item(&self, key: &str) -> Result<()>;
}

// ============================================================================
// MemoryStorage
// ============================================================================

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<FxHashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// UnavailableStorage
// ============================================================================

/// Storage whose every access fails, like `localStorage` with cookies
/// blocked.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl Storage for UnavailableStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::storage_unavailable("access denied"))
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::storage_unavailable("access denied"))
    }

    fn remove_item(&self, _key: &str) -> Result<()> {
        Err(Error::storage_unavailable("access denied"))
    }
}

// ============================================================================
// Tests
// ============================================================================
