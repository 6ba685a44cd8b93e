//! NVS-backed configuration storage.
//!
//! Each namespace (`cfg`, `sys`) gets its own [`NvsStore`]. All stores share
//! one handle to the default NVS partition; the WiFi driver borrows the same
//! handle for its calibration data.
//!
//! # Security
//!
//! Development builds do not encrypt NVS. The WiFi passphrase and the backend
//! credential are stored in plaintext flash unless NVS encryption is enabled
//! in the partition table.

use crate::config::{KvStore, StoreError};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, info};
use std::sync::Mutex;

static NVS_PARTITION: Mutex<Option<EspDefaultNvsPartition>> = Mutex::new(None);

impl From<EspError> for StoreError {
    fn from(e: EspError) -> Self {
        Self::Backend(format!("{:?}", e))
    }
}

/// Shared handle to the default NVS partition.
///
/// `EspDefaultNvsPartition::take()` may only succeed once per boot, so the
/// first handle is cached and cloned for later callers.
pub fn nvs_partition() -> Result<EspDefaultNvsPartition, EspError> {
    let mut cached = NVS_PARTITION
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(partition) = cached.as_ref() {
        return Ok(partition.clone());
    }
    let partition = EspDefaultNvsPartition::take()?;
    *cached = Some(partition.clone());
    Ok(partition)
}

/// One NVS namespace.
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
    namespace: &'static str,
}

impl NvsStore {
    /// Open (creating if needed) a namespace on the default partition.
    pub fn open(namespace: &'static str) -> Result<Self, StoreError> {
        let nvs = EspNvs::new(nvs_partition()?, namespace, true)?;
        debug!("NVS namespace {} opened", namespace);
        Ok(Self { nvs, namespace })
    }
}

impl KvStore for NvsStore {
    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(len) = self.nvs.str_len(key)? else {
            return Ok(None);
        };
        let mut buf = vec![0u8; len + 1];
        Ok(self.nvs.get_str(key, &mut buf)?.map(str::to_string))
    }

    /// Write with read-back verification to catch silent flash failures.
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.nvs.set_str(key, value)?;

        match self.get_str(key)? {
            Some(stored) if stored == value => Ok(()),
            Some(stored) => Err(StoreError::Corrupted(format!(
                "{}/{}: wrote {} bytes, read back {}",
                self.namespace,
                key,
                value.len(),
                stored.len()
            ))),
            None => Err(StoreError::Corrupted(format!(
                "{}/{}: missing after write",
                self.namespace, key
            ))),
        }
    }

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StoreError> {
        Ok(self.nvs.get_u16(key)?)
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StoreError> {
        self.nvs.set_u16(key, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.nvs.remove(key)?;
        Ok(())
    }
}

/// Identity of the running firmware image.
///
/// Derived from the application descriptor embedded by ESP-IDF: the version
/// string plus the leading bytes of the ELF SHA-256. Changes with every build.
pub fn build_id() -> String {
    // SAFETY: esp_app_get_description returns a pointer to a static descriptor
    // that lives for the whole program and is never written after boot.
    let desc = unsafe { &*esp_idf_sys::esp_app_get_description() };

    let version: String = desc
        .version
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8 as char)
        .collect();
    let sha: String = desc
        .app_elf_sha256
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect();

    let id = format!("{}-{}", version, sha);
    info!("Firmware build: {}", id);
    id
}
