//! `RocksDB` key/value backend.
//!
//! Records live in a single `records` column family. Quota accounting is the
//! same `key.len() + value.len()` sum the other backends use.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};

use crate::error::{Result, StoreError};
use crate::keys::entry_size;
use crate::{ensure_capacity, KeyValueStore};

const RECORDS_CF: &str = "records";

/// RocksDB-backed storage implementation.
pub struct RocksKv {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    quota: Option<usize>,
    write_lock: Mutex<()>,
}

impl RocksKv {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P, quota: Option<usize>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(RECORDS_CF, Options::default())];

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            quota,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(RECORDS_CF)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {RECORDS_CF}")))
    }

    fn decode(key: &str, bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap_or_else(|e| {
            tracing::warn!(key, "Record is not valid UTF-8");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        })
    }
}

impl KeyValueStore for RocksKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let cf = self.cf()?;
        Ok(self
            .db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|bytes| Self::decode(key, bytes)))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let existing = self.get(key)?.map_or(0, |v| entry_size(key, &v));
        ensure_capacity(self.quota, self.used_bytes()?, existing, key, value)?;

        let cf = self.cf()?;
        self.db
            .put_cf(&cf, key.as_bytes(), value.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf()?;
        self.db
            .delete_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let cf = self.cf()?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    fn used_bytes(&self) -> Result<usize> {
        let cf = self.cf()?;
        let mut used = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            used += key.len() + value.len();
        }
        Ok(used)
    }

    fn quota(&self) -> Option<usize> {
        self.quota
    }
}
