//! Device-local persistence: a synchronous string-keyed store and the typed
//! progress records kept in it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::repository::StorageError;

mod progress;

pub use progress::{
    BOOKMARKS_KEY, COMPLETED_TESTS_KEY, LAST_VIEWED_KEY, LocalProgressStore,
    SECTION_COMPLETION_KEY, VIEWED_NOTIFICATIONS_KEY,
};

/// String-keyed, string-valued storage that survives restarts.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object on disk, rewritten on every change.
#[derive(Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileKeyValueStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Where an unreadable state file is moved before it is replaced.
    #[must_use]
    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    fn load_for_write(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.load() {
            Err(StorageError::Serialization(reason)) => {
                let backup = self.corrupt_path();
                fs::rename(&self.path, &backup)?;
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    %reason,
                    "unreadable local state moved aside"
                );
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn store(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(values)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut values = self.load_for_write()?;
        values.insert(key.to_owned(), value);
        self.store(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut values = self.load_for_write()?;
        if values.remove(key).is_some() {
            self.store(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mcq-kv-{}-{name}", std::process::id()))
            .join("state.json")
    }

    #[test]
    fn memory_store_get_set_remove() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v".into()).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);
        FileKeyValueStore::new(&path).set("a", "[1]".into()).unwrap();

        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("[1]"));
        reopened.remove("a").unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_kept_aside_then_replaced_on_write() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        let store = FileKeyValueStore::new(&path);
        let backup = store.corrupt_path();
        let _ = fs::remove_file(&backup);
        assert!(matches!(store.get("a"), Err(StorageError::Serialization(_))));
        store.set("a", "x".into()).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("x"));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "{not json");
        assert!(backup.to_string_lossy().ends_with("state.json.corrupt"));
    }
}
