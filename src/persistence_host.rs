//! Configuration storage for host (development) builds.
//!
//! Each namespace is one JSON object in a file, by default
//! `~/.aquanode-esp32/<namespace>.json`. Strings are stored as JSON strings
//! and ports as JSON numbers, so a type mismatch is detected the same way NVS
//! detects it.
//!
//! # Usage
//!
//! ```ignore
//! use aquanode_esp32::config::{ConfigStore, CONFIG_NAMESPACE};
//! use aquanode_esp32::persistence_host::FileStore;
//!
//! let kv = FileStore::open_default(CONFIG_NAMESPACE)?;
//! let store = ConfigStore::load(kv);
//! ```

use crate::config::{KvStore, StoreError};
use log::{debug, info};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default file path for a namespace.
///
/// Returns `~/.aquanode-esp32/<namespace>.json`
pub fn default_store_path(namespace: &str) -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".aquanode-esp32")
        .join(format!("{}.json", namespace)))
}

/// A key-value namespace persisted as a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let entries = match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(StoreError::Corrupted(format!(
                        "{:?} does not hold a JSON object",
                        path
                    )))
                }
                Err(e) => return Err(StoreError::Corrupted(format!("{:?}: {}", path, e))),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store file at {:?}", path);
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Open the store for `namespace` at the default location.
    pub fn open_default(namespace: &str) -> Result<Self, StoreError> {
        let path = default_store_path(namespace)?;
        Self::open(&path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole namespace, then read it back to verify.
    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        fs::write(&self.path, &text)?;

        let read_back = fs::read_to_string(&self.path)?;
        if read_back != text {
            return Err(StoreError::Corrupted(format!(
                "verification failed: wrote {} bytes, read {} bytes",
                text.len(),
                read_back.len()
            )));
        }

        debug!("Store saved to {:?}", self.path);
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::TypeMismatch(key.to_string())),
        }
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), Value::String(value.to_string()));
        self.flush()
    }

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u16::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| StoreError::Corrupted(format!("{} is not a u16: {}", key, n))),
            Some(_) => Err(StoreError::TypeMismatch(key.to_string())),
        }
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), Value::from(value));
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            info!("Removed {} from {:?}", key, self.path);
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, DeviceConfig, KEY_HOST, KEY_PORT};
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir()
            .join(format!("aquanode-test-{}-{}", pid, id))
            .join("cfg.json")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let path = unique_store_path();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_str("name").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let path = unique_store_path();
        {
            let mut store = FileStore::open(&path).unwrap();
            store.set_str(KEY_HOST, "api.example.com").unwrap();
            store.set_u16(KEY_PORT, 8443).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(
            store.get_str(KEY_HOST).unwrap().as_deref(),
            Some("api.example.com")
        );
        assert_eq!(store.get_u16(KEY_PORT).unwrap(), Some(8443));

        cleanup(&path);
    }

    #[test]
    fn test_remove_persists() {
        let path = unique_store_path();
        let mut store = FileStore::open(&path).unwrap();
        store.set_str("name", "Reef").unwrap();
        store.remove("name").unwrap();
        store.remove("never-set").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_str("name").unwrap(), None);

        cleanup(&path);
    }

    #[test]
    fn test_type_mismatch() {
        let path = unique_store_path();
        let mut store = FileStore::open(&path).unwrap();
        store.set_u16(KEY_PORT, 1).unwrap();
        assert!(matches!(
            store.get_str(KEY_PORT),
            Err(StoreError::TypeMismatch(_))
        ));

        cleanup(&path);
    }

    #[test]
    fn test_corrupted_file_is_reported() {
        let path = unique_store_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Corrupted(_))
        ));

        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Corrupted(_))
        ));

        cleanup(&path);
    }

    #[test]
    fn test_out_of_range_port_is_corrupted() {
        let path = unique_store_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"wsport": 70000}"#).unwrap();
        let store = FileStore::open(&path).unwrap();
        assert!(matches!(
            store.get_u16(KEY_PORT),
            Err(StoreError::Corrupted(_))
        ));

        // The config layer falls back to the default port
        let config = ConfigStore::load(store);
        assert_eq!(config.config().endpoint_port, DeviceConfig::default().endpoint_port);

        cleanup(&path);
    }
}
