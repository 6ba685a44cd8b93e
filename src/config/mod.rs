//! Device configuration management.
//!
//! # Components
//!
//! - [`device`] - configuration values, defaults and value-level validation
//! - [`host`] - backend host normalization
//! - [`store`] - typed persistence over a key-value backend
//! - [`dispatch`] - applying control-channel writes

mod device;
mod dispatch;
mod host;
mod store;

pub use device::{
    is_unset, parse_port, ConfigError, ControlCommand, DeviceConfig, DEFAULT_NAME, DEFAULT_PORT,
    UNSET,
};
pub use dispatch::{ConfigField, ConfigWriteDispatcher, Intent, WriteEvent, WriteOutcome};
pub use host::{infer_transport_security, is_valid_bare_host, is_valid_host, strip_scheme_and_suffix};
pub use store::{
    clear_config_keys, reset_if_new_build, ConfigStore, KvStore, MemoryStore, StoreError,
    StoredValue, BUILD_ID_KEY, CONFIG_KEYS, CONFIG_NAMESPACE, KEY_CREDENTIAL, KEY_HOST, KEY_NAME,
    KEY_PASSPHRASE, KEY_PORT, KEY_SSID, SYSTEM_NAMESPACE,
};
