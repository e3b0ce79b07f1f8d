//! Backends for exercising failure paths.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, StoreError};
use crate::memory::MemoryKv;
use crate::KeyValueStore;

/// Wraps a [`MemoryKv`] and fails a set number of upcoming reads.
#[derive(Debug, Default)]
pub(crate) struct UnreadableKv {
    inner: MemoryKv,
    failing_reads: AtomicUsize,
}

impl UnreadableKv {
    pub(crate) fn fail_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }
}

impl KeyValueStore for UnreadableKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let pending = self.failing_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_reads.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Io(std::io::Error::other(format!(
                "read of {key} interrupted"
            ))));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.inner.put(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    fn used_bytes(&self) -> Result<usize> {
        self.inner.used_bytes()
    }

    fn quota(&self) -> Option<usize> {
        self.inner.quota()
    }
}
