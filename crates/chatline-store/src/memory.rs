//! In-memory key/value backend.
//!
//! Used by tests and by front ends that do not want anything on disk. The
//! optional quota makes it a faithful stand-in for a full browser store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::keys::entry_size;
use crate::{ensure_capacity, KeyValueStore};

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryKv {
    /// Create an unbounded in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that rejects writes beyond `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: RwLock::default(),
            quota: Some(quota),
        }
    }

    /// Write a raw record without quota checks.
    ///
    /// Handy for seeding corrupted data in tests.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn total(entries: &BTreeMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| entry_size(k, v)).sum()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let existing = entries.get(key).map_or(0, |v| entry_size(key, v));
        ensure_capacity(self.quota, Self::total(&entries), existing, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn used_bytes(&self) -> Result<usize> {
        Ok(Self::total(&self.entries.read()))
    }

    fn quota(&self) -> Option<usize> {
        self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key() {
        let kv = MemoryKv::new();
        assert!(kv.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn put_get_remove() {
        let kv = MemoryKv::new();
        kv.put("chat-store", "{}").unwrap();
        assert_eq!(kv.get("chat-store").unwrap().as_deref(), Some("{}"));
        assert_eq!(kv.keys().unwrap(), vec!["chat-store".to_string()]);

        kv.remove("chat-store").unwrap();
        assert!(kv.get("chat-store").unwrap().is_none());
        // Removing again is fine.
        kv.remove("chat-store").unwrap();
    }

    #[test]
    fn used_bytes_counts_keys_and_values() {
        let kv = MemoryKv::new();
        kv.put("ab", "cde").unwrap();
        kv.put("f", "g").unwrap();
        assert_eq!(kv.used_bytes().unwrap(), 7);
    }

    #[test]
    fn quota_rejects_oversized_write() {
        let kv = MemoryKv::with_quota(16);
        kv.put("k", "0123456789").unwrap();

        let err = kv.put("other", "0123456789").unwrap_err();
        assert!(err.is_quota());
        // The rejected write left nothing behind.
        assert!(kv.get("other").unwrap().is_none());
        assert_eq!(kv.used_bytes().unwrap(), 11);
    }

    #[test]
    fn quota_allows_replacing_existing_entry() {
        let kv = MemoryKv::with_quota(12);
        kv.put("k", "0123456789").unwrap();
        kv.put("k", "abcdefghijk").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("abcdefghijk"));
    }

    #[test]
    fn concurrent_writes() {
        use std::sync::Arc;
        use std::thread;

        let kv = Arc::new(MemoryKv::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let kv = Arc::clone(&kv);
                thread::spawn(move || {
                    for j in 0..10 {
                        kv.put(&format!("key-{i}-{j}"), "v").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread panicked");
        }
        assert_eq!(kv.keys().unwrap().len(), 80);
    }
}
