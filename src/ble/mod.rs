//! BLE control channel.
//!
//! The configuration attributes are exposed over a GATT server. This module
//! holds the platform-independent parts: credential reassembly for chunked
//! writes and the [`ControlChannel`] seam the control loop talks to. The NimBLE
//! binding lives in `service` and only builds for the ESP32.

mod token;

#[cfg(feature = "esp32")]
mod service;

use crate::config::DeviceConfig;

pub use token::{
    credential_brief, is_well_formed_credential, sanitize_credential, TokenAssembler,
    CHUNK_CEILING, IDLE_RESET_MS,
};

#[cfg(feature = "esp32")]
pub use service::ConfigService;

/// Prefix of the advertised device name.
pub const ADVERTISED_PREFIX: &str = "ESP32-";

/// Advertised name for a station MAC such as `AA:BB:CC:DD:EE:FF`.
pub fn advertised_name(mac: &str) -> String {
    let compact: String = mac.chars().filter(|c| *c != ':').collect();
    format!("{}{}", ADVERTISED_PREFIX, compact)
}

/// Outbound half of the control channel.
///
/// Inbound writes never go through this trait: the transport enqueues them as
/// [`crate::config::WriteEvent`]s for the control loop to drain.
pub trait ControlChannel {
    /// Whether a client is subscribed to status notifications.
    fn has_subscriber(&self) -> bool;

    /// Replace the value returned by a direct status read.
    fn set_status(&mut self, status_json: &str);

    /// Replace the status value and notify subscribers.
    fn publish_status(&mut self, status_json: &str);

    /// Mirror the configuration into the readable attributes.
    fn sync_readable(&mut self, config: &DeviceConfig);
}
