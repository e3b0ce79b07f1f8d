//! Session store and durable persistence for chatline.
//!
//! This crate owns all chat state at runtime and mirrors a storage-safe
//! projection of it into a size-bounded key/value store.
//!
//! # Architecture
//!
//! - [`ChatStore`]: in-memory sessions, messages, model selection and the
//!   transient loading/streaming flags
//! - [`SettingsStore`]: user preferences
//! - [`Persistence`]: projection, sanitization, quota degradation and
//!   corruption recovery on top of a [`KeyValueStore`]
//! - Backends: [`MemoryKv`], [`FileKv`] and, with the `rocksdb` feature,
//!   `RocksKv`
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chatline_core::NewMessage;
//! use chatline_store::{ChatStore, MemoryKv, Persistence};
//!
//! let persistence = Persistence::new(Arc::new(MemoryKv::new()));
//! let mut store = ChatStore::with_persistence(persistence.clone());
//!
//! let session_id = store.create_session(Some("Hello"));
//! store.add_message(&session_id, NewMessage::user("hi", None));
//!
//! // A second store over the same backend sees the mirrored state.
//! let reloaded = ChatStore::with_persistence(persistence);
//! assert_eq!(reloaded.current_session().unwrap().messages.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod chat;
pub mod error;
pub mod file;
pub mod keys;
pub mod memory;
pub mod persist;
#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod settings;
#[cfg(test)]
mod testing;

pub use chat::{ChatState, ChatStore};
pub use error::{Result, StoreError};
pub use file::FileKv;
pub use memory::MemoryKv;
pub use persist::{Persistence, PersistedChat, SaveOutcome, StorageUsage};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksKv;
pub use settings::SettingsStore;

/// Default byte budget, matching a browser's local-storage allowance.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// A string-keyed store of string records with an optional byte budget.
///
/// Implementations count `key.len() + value.len()` for every entry against
/// the quota and reject writes that would exceed it with
/// [`StoreError::QuotaExceeded`].
pub trait KeyValueStore: Send + Sync {
    /// Read a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::QuotaExceeded` if the write does not fit.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a record. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// List all keys currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn keys(&self) -> Result<Vec<String>>;

    /// Bytes currently counted against the quota.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn used_bytes(&self) -> Result<usize>;

    /// The configured byte budget, if any.
    fn quota(&self) -> Option<usize>;
}

/// Check that replacing `key` with `value` keeps the store within `quota`.
///
/// `used` is the current total including any existing entry for `key`,
/// whose size is `existing`.
pub(crate) fn ensure_capacity(
    quota: Option<usize>,
    used: usize,
    existing: usize,
    key: &str,
    value: &str,
) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let needed = used.saturating_sub(existing) + keys::entry_size(key, value);
    if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
    }
    Ok(())
}
