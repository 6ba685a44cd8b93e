//! Typed access to the persistent configuration.
//!
//! The persistent key-value map itself is a platform collaborator behind the
//! [`KvStore`] trait: NVS on the ESP32, a JSON file on the host, a plain map in
//! tests. [`ConfigStore`] owns the canonical [`DeviceConfig`] and writes every
//! accepted mutation through to the backend field by field.

use super::device::{DeviceConfig, DEFAULT_PORT};
use crate::ble::sanitize_credential;
use log::{info, warn};
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroize;

/// Namespace holding the six configuration keys.
pub const CONFIG_NAMESPACE: &str = "cfg";

/// Namespace holding bookkeeping that must survive a configuration wipe.
pub const SYSTEM_NAMESPACE: &str = "sys";

/// Key under [`SYSTEM_NAMESPACE`] recording the last build that booted.
pub const BUILD_ID_KEY: &str = "build_id";

pub const KEY_NAME: &str = "name";
pub const KEY_CREDENTIAL: &str = "token";
pub const KEY_SSID: &str = "ssid";
pub const KEY_PASSPHRASE: &str = "pass";
pub const KEY_HOST: &str = "wshost";
pub const KEY_PORT: &str = "wsport";

/// Every key owned by the configuration namespace.
pub const CONFIG_KEYS: [&str; 6] = [
    KEY_NAME,
    KEY_CREDENTIAL,
    KEY_SSID,
    KEY_PASSPHRASE,
    KEY_HOST,
    KEY_PORT,
];

/// Minimal persistent key-value interface.
pub trait KvStore {
    /// Read a string value. `Ok(None)` when the key does not exist.
    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a string value.
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read an unsigned 16-bit value. `Ok(None)` when the key does not exist.
    fn get_u16(&self, key: &str) -> Result<Option<u16>, StoreError>;

    /// Write an unsigned 16-bit value.
    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Errors reported by a key-value backend.
#[derive(Debug)]
pub enum StoreError {
    /// Stored value has a different type than requested.
    TypeMismatch(String),
    /// Stored data could not be decoded.
    Corrupted(String),
    /// Underlying I/O failure (host file store).
    Io(std::io::Error),
    /// Backend-specific failure (e.g. an ESP-IDF error code).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch(key) => write!(f, "type mismatch for key {}", key),
            Self::Corrupted(msg) => write!(f, "corrupted store: {}", msg),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Backend(msg) => write!(f, "storage backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A value held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Str(String),
    U16(u16),
}

/// In-memory key-value store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, StoredValue>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(StoredValue::Str(s)) => Ok(Some(s.clone())),
            Some(StoredValue::U16(_)) => Err(StoreError::TypeMismatch(key.to_string())),
        }
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), StoredValue::Str(value.to_string()));
        Ok(())
    }

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(StoredValue::U16(v)) => Ok(Some(*v)),
            Some(StoredValue::Str(_)) => Err(StoreError::TypeMismatch(key.to_string())),
        }
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), StoredValue::U16(value));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Read a string key, falling back to `default` on absence or error.
fn load_str<S: KvStore>(kv: &S, key: &str, default: &str) -> String {
    match kv.get_str(key) {
        Ok(Some(v)) => v,
        Ok(None) => default.to_string(),
        Err(e) => {
            warn!("Failed to read {} from store: {}", key, e);
            default.to_string()
        }
    }
}

/// Owner of the canonical configuration and its persistent backing.
pub struct ConfigStore<S: KvStore> {
    kv: S,
    config: DeviceConfig,
}

impl<S: KvStore> ConfigStore<S> {
    /// Load the configuration, falling back to defaults for every missing or
    /// unreadable key.
    pub fn load(kv: S) -> Self {
        let defaults = DeviceConfig::default();

        let port = match kv.get_u16(KEY_PORT) {
            Ok(Some(p)) if p != 0 => p,
            Ok(_) => DEFAULT_PORT,
            Err(e) => {
                warn!("Failed to read {} from store: {}", KEY_PORT, e);
                DEFAULT_PORT
            }
        };

        let mut raw_credential = load_str(&kv, KEY_CREDENTIAL, &defaults.credential);
        let credential = sanitize_credential(raw_credential.as_bytes());
        raw_credential.zeroize();

        let config = DeviceConfig {
            name: load_str(&kv, KEY_NAME, &defaults.name),
            credential,
            ssid: load_str(&kv, KEY_SSID, &defaults.ssid),
            passphrase: load_str(&kv, KEY_PASSPHRASE, &defaults.passphrase),
            endpoint_host: load_str(&kv, KEY_HOST, &defaults.endpoint_host),
            endpoint_port: port,
        };

        info!(
            "Config loaded: name={} host={}:{}",
            config.name, config.endpoint_host, config.endpoint_port
        );

        Self { kv, config }
    }

    /// Current configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Backing store.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn set_name(&mut self, name: String) -> Result<(), StoreError> {
        self.config.name = name;
        self.kv.set_str(KEY_NAME, &self.config.name)
    }

    /// Replace the credential. The previous value is zeroed in memory.
    pub fn set_credential(&mut self, credential: String) -> Result<(), StoreError> {
        self.config.credential.zeroize();
        self.config.credential = credential;
        self.kv.set_str(KEY_CREDENTIAL, &self.config.credential)
    }

    pub fn set_ssid(&mut self, ssid: String) -> Result<(), StoreError> {
        self.config.ssid = ssid;
        self.kv.set_str(KEY_SSID, &self.config.ssid)
    }

    /// Replace the passphrase. The previous value is zeroed in memory.
    pub fn set_passphrase(&mut self, passphrase: String) -> Result<(), StoreError> {
        self.config.passphrase.zeroize();
        self.config.passphrase = passphrase;
        self.kv.set_str(KEY_PASSPHRASE, &self.config.passphrase)
    }

    /// Replace the endpoint host. Callers must pass a bare host.
    pub fn set_endpoint_host(&mut self, host: String) -> Result<(), StoreError> {
        self.config.endpoint_host = host;
        self.kv.set_str(KEY_HOST, &self.config.endpoint_host)
    }

    pub fn set_endpoint_port(&mut self, port: u16) -> Result<(), StoreError> {
        self.config.endpoint_port = port;
        self.kv.set_u16(KEY_PORT, port)
    }

    /// Remove every configuration key and return to defaults.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.config.credential.zeroize();
        self.config.passphrase.zeroize();
        self.config = DeviceConfig::default();
        clear_config_keys(&mut self.kv)
    }
}

/// Remove all configuration keys from a store.
pub fn clear_config_keys<S: KvStore>(kv: &mut S) -> Result<(), StoreError> {
    for key in CONFIG_KEYS {
        kv.remove(key)?;
    }
    Ok(())
}

/// Wipe the configuration once when a different build boots.
///
/// `sys` holds the last recorded build identity, `cfg` the configuration.
/// Returns `true` if the configuration was cleared.
pub fn reset_if_new_build<Y: KvStore, C: KvStore>(
    sys: &mut Y,
    cfg: &mut C,
    build_id: &str,
) -> Result<bool, StoreError> {
    let last = sys.get_str(BUILD_ID_KEY)?.unwrap_or_default();
    if last == build_id {
        return Ok(false);
    }

    warn!("New firmware build detected, clearing stored configuration");
    clear_config_keys(cfg)?;
    sys.set_str(BUILD_ID_KEY, build_id)?;
    info!("Configuration cleared for build {}", build_id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UNSET;

    fn populated_store() -> MemoryStore {
        let mut kv = MemoryStore::new();
        kv.set_str(KEY_NAME, "Tank-7").unwrap();
        kv.set_str(KEY_CREDENTIAL, " eyJhbGciOi.eyJzdWIi.c2lnbmF0dXJl\n")
            .unwrap();
        kv.set_str(KEY_SSID, "ReefNet").unwrap();
        kv.set_str(KEY_PASSPHRASE, "coral-reef-42").unwrap();
        kv.set_str(KEY_HOST, "api.example.com").unwrap();
        kv.set_u16(KEY_PORT, 8443).unwrap();
        kv
    }

    // ==================== MemoryStore Tests ====================

    #[test]
    fn test_memory_store_roundtrip() {
        let mut kv = MemoryStore::new();
        assert_eq!(kv.get_str("a").unwrap(), None);
        kv.set_str("a", "b").unwrap();
        kv.set_u16("p", 42).unwrap();
        assert_eq!(kv.get_str("a").unwrap().as_deref(), Some("b"));
        assert_eq!(kv.get_u16("p").unwrap(), Some(42));
        kv.remove("a").unwrap();
        kv.remove("missing").unwrap();
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_memory_store_type_mismatch() {
        let mut kv = MemoryStore::new();
        kv.set_u16("p", 1).unwrap();
        assert!(matches!(kv.get_str("p"), Err(StoreError::TypeMismatch(_))));
    }

    // ==================== ConfigStore Tests ====================

    #[test]
    fn test_load_empty_store_uses_defaults() {
        let store = ConfigStore::load(MemoryStore::new());
        assert_eq!(store.config(), &DeviceConfig::default());
    }

    #[test]
    fn test_load_populated_store() {
        let store = ConfigStore::load(populated_store());
        let config = store.config();
        assert_eq!(config.name, "Tank-7");
        assert_eq!(config.ssid, "ReefNet");
        assert_eq!(config.passphrase, "coral-reef-42");
        assert_eq!(config.endpoint_host, "api.example.com");
        assert_eq!(config.endpoint_port, 8443);
    }

    #[test]
    fn test_load_sanitizes_credential() {
        let store = ConfigStore::load(populated_store());
        assert_eq!(
            store.config().credential,
            "eyJhbGciOi.eyJzdWIi.c2lnbmF0dXJl"
        );
    }

    #[test]
    fn test_load_zero_port_falls_back() {
        let mut kv = MemoryStore::new();
        kv.set_u16(KEY_PORT, 0).unwrap();
        let store = ConfigStore::load(kv);
        assert_eq!(store.config().endpoint_port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_unreadable_key_falls_back() {
        let mut kv = MemoryStore::new();
        kv.set_u16(KEY_NAME, 7).unwrap();
        kv.set_str(KEY_PORT, "8080").unwrap();
        let store = ConfigStore::load(kv);
        assert_eq!(store.config().name, "ESP32");
        assert_eq!(store.config().endpoint_port, DEFAULT_PORT);
    }

    #[test]
    fn test_setters_persist_each_field() {
        let mut store = ConfigStore::load(MemoryStore::new());
        store.set_name("Sump".into()).unwrap();
        store.set_credential("a.b.c".into()).unwrap();
        store.set_ssid("Net".into()).unwrap();
        store.set_passphrase("secret-pass".into()).unwrap();
        store.set_endpoint_host("10.0.0.2".into()).unwrap();
        store.set_endpoint_port(9000).unwrap();

        let kv = store.kv();
        assert_eq!(kv.get_str(KEY_NAME).unwrap().as_deref(), Some("Sump"));
        assert_eq!(kv.get_str(KEY_CREDENTIAL).unwrap().as_deref(), Some("a.b.c"));
        assert_eq!(kv.get_str(KEY_SSID).unwrap().as_deref(), Some("Net"));
        assert_eq!(
            kv.get_str(KEY_PASSPHRASE).unwrap().as_deref(),
            Some("secret-pass")
        );
        assert_eq!(kv.get_str(KEY_HOST).unwrap().as_deref(), Some("10.0.0.2"));
        assert_eq!(kv.get_u16(KEY_PORT).unwrap(), Some(9000));

        // A fresh load sees the same values
        let reloaded = ConfigStore::load(kv.clone());
        assert_eq!(reloaded.config(), store.config());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut store = ConfigStore::load(populated_store());
        store.reset().unwrap();
        assert_eq!(store.config(), &DeviceConfig::default());
        assert!(store.kv().is_empty());
        assert_eq!(store.config().endpoint_host, UNSET);
    }

    // ==================== Build Migration Tests ====================

    #[test]
    fn test_first_boot_clears_and_records() {
        let mut sys = MemoryStore::new();
        let mut cfg = populated_store();

        assert!(reset_if_new_build(&mut sys, &mut cfg, "build-a").unwrap());
        assert!(cfg.is_empty());
        assert_eq!(
            sys.get_str(BUILD_ID_KEY).unwrap().as_deref(),
            Some("build-a")
        );
    }

    #[test]
    fn test_same_build_keeps_config() {
        let mut sys = MemoryStore::new();
        sys.set_str(BUILD_ID_KEY, "build-a").unwrap();
        let mut cfg = populated_store();

        assert!(!reset_if_new_build(&mut sys, &mut cfg, "build-a").unwrap());
        assert_eq!(cfg.len(), CONFIG_KEYS.len());
    }

    #[test]
    fn test_new_build_clears_once() {
        let mut sys = MemoryStore::new();
        sys.set_str(BUILD_ID_KEY, "build-a").unwrap();
        let mut cfg = populated_store();

        assert!(reset_if_new_build(&mut sys, &mut cfg, "build-b").unwrap());
        cfg.set_str(KEY_NAME, "after-flash").unwrap();
        assert!(!reset_if_new_build(&mut sys, &mut cfg, "build-b").unwrap());
        assert_eq!(cfg.get_str(KEY_NAME).unwrap().as_deref(), Some("after-flash"));
    }
}
