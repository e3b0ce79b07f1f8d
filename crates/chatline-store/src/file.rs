//! File-based key/value backend.
//!
//! Each key lives in its own `<key>.json` file under the data directory.
//! Writes go to a temporary file first and are renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::keys::entry_size;
use crate::{ensure_capacity, KeyValueStore, DEFAULT_QUOTA_BYTES};

const EXTENSION: &str = "json";

/// File-backed storage with atomic writes and a byte budget.
#[derive(Debug)]
pub struct FileKv {
    dir: PathBuf,
    quota: Option<usize>,
    write_lock: Mutex<()>,
}

impl FileKv {
    /// Open a store rooted at `dir` with the default 5 MiB budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::with_quota(dir, Some(DEFAULT_QUOTA_BYTES))
    }

    /// Open a store rooted at `dir` with an explicit budget (`None` for
    /// unbounded).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_quota<P: AsRef<Path>>(dir: P, quota: Option<usize>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), ?quota, "Opened file store");
        Ok(Self {
            dir,
            quota,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StoreError::Database(format!("invalid key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }

    fn read(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // Non-UTF-8 bytes are returned as a lossy string so the caller's
            // decode step can reject and discard the record.
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                let bytes = fs::read(path)?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn entries(&self) -> Result<Vec<(String, u64)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            // Only .json records count; in-flight .tmp files are skipped
            if !path.extension().is_some_and(|e| e == EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push((key.to_string(), entry.metadata()?.len()));
        }
        entries.sort();
        Ok(entries)
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Self::read(&self.path_for(key)?)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();

        let existing = Self::read(&path)?.map_or(0, |v| entry_size(key, &v));
        ensure_capacity(self.quota, self.used_bytes()?, existing, key, value)?;

        let temp = path.with_extension("tmp");
        fs::write(&temp, value)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(key, _)| key).collect())
    }

    fn used_bytes(&self) -> Result<usize> {
        self.entries()?.into_iter().try_fold(0usize, |acc, (key, len)| {
            let len = usize::try_from(len)
                .map_err(|_| StoreError::Database(format!("record too large: {key}")))?;
            Ok(acc + key.len() + len)
        })
    }

    fn quota(&self) -> Option<usize> {
        self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(quota: Option<usize>) -> (FileKv, TempDir) {
        let dir = TempDir::new().unwrap();
        let kv = FileKv::with_quota(dir.path(), quota).unwrap();
        (kv, dir)
    }

    #[test]
    fn put_get_remove() {
        let (kv, _dir) = create_test_store(None);

        assert!(kv.get("chat-store").unwrap().is_none());
        kv.put("chat-store", r#"{"state":{}}"#).unwrap();
        assert_eq!(
            kv.get("chat-store").unwrap().as_deref(),
            Some(r#"{"state":{}}"#)
        );

        kv.remove("chat-store").unwrap();
        assert!(kv.get("chat-store").unwrap().is_none());
        kv.remove("chat-store").unwrap();
    }

    #[test]
    fn writes_leave_no_temp_files() {
        let (kv, dir) = create_test_store(None);
        kv.put("settings-store", "{}").unwrap();
        kv.put("settings-store", "{\"a\":1}").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["settings-store.json".to_string()]);
    }

    #[test]
    fn keys_and_usage() {
        let (kv, _dir) = create_test_store(None);
        kv.put("b", "22").unwrap();
        kv.put("a", "1").unwrap();

        assert_eq!(kv.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(kv.used_bytes().unwrap(), 5);
    }

    #[test]
    fn quota_enforced() {
        let (kv, _dir) = create_test_store(Some(20));
        kv.put("k", "0123456789").unwrap();

        let err = kv.put("j", "0123456789").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { needed: 22, quota: 20 }));
        assert!(kv.get("j").unwrap().is_none());
    }

    #[test]
    fn default_quota_is_five_mib() {
        let dir = TempDir::new().unwrap();
        let kv = FileKv::open(dir.path()).unwrap();
        assert_eq!(kv.quota(), Some(5 * 1024 * 1024));
    }

    #[test]
    fn rejects_path_like_keys() {
        let (kv, _dir) = create_test_store(None);
        assert!(kv.put("../escape", "x").is_err());
        assert!(kv.get("").is_err());
    }

    #[test]
    fn non_utf8_record_is_readable() {
        let (kv, dir) = create_test_store(None);
        fs::write(dir.path().join("chat-store.json"), [0xff, 0xfe, b'{']).unwrap();
        let value = kv.get("chat-store").unwrap().unwrap();
        assert!(value.ends_with('{'));
    }

    #[test]
    fn reopen_sees_existing_records() {
        let dir = TempDir::new().unwrap();
        {
            let kv = FileKv::with_quota(dir.path(), None).unwrap();
            kv.put("chat-store", "persisted").unwrap();
        }
        let kv = FileKv::with_quota(dir.path(), None).unwrap();
        assert_eq!(kv.get("chat-store").unwrap().as_deref(), Some("persisted"));
    }
}
