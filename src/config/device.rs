//! Device configuration data structures.
//!
//! This module contains platform-independent types describing the device
//! identity, the WiFi network and the backend endpoint. Everything here can be
//! tested on the host machine.
//!
//! # Example
//!
//! ```
//! use aquanode_esp32::config::{parse_port, ControlCommand, DeviceConfig, DEFAULT_PORT};
//!
//! let config = DeviceConfig::default();
//! assert_eq!(config.endpoint_port, DEFAULT_PORT);
//! assert!(!config.has_network());
//!
//! assert_eq!(parse_port("8443").unwrap(), 8443);
//! let cmd: ControlCommand = "REBOOT".parse().unwrap();
//! assert_eq!(cmd, ControlCommand::Reboot);
//! ```

use std::fmt;

/// Sentinel stored in string fields that have never been configured.
pub const UNSET: &str = "None";

/// Display name used until one is written.
pub const DEFAULT_NAME: &str = "ESP32";

/// Backend port used until one is written (and when a write is out of range).
pub const DEFAULT_PORT: u16 = 3000;

/// Check whether a stored string still holds the "unset" sentinel.
pub fn is_unset(value: &str) -> bool {
    value.is_empty() || value == UNSET
}

/// The canonical in-memory configuration.
///
/// `endpoint_host` always holds a bare host (no scheme, path or port); the
/// normalization happens when it is written, never when it is read.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Display name, also used as the WiFi hostname.
    pub name: String,
    /// Bearer token presented to the backend.
    pub credential: String,
    /// WiFi network SSID.
    pub ssid: String,
    /// WiFi network passphrase.
    pub passphrase: String,
    /// Bare backend host.
    pub endpoint_host: String,
    /// Backend port (1-65535).
    pub endpoint_port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            credential: UNSET.to_string(),
            ssid: UNSET.to_string(),
            passphrase: UNSET.to_string(),
            endpoint_host: UNSET.to_string(),
            endpoint_port: DEFAULT_PORT,
        }
    }
}

impl DeviceConfig {
    /// Check if a WiFi network has been configured.
    pub fn has_network(&self) -> bool {
        !is_unset(&self.ssid)
    }

    /// Check if a backend host has been configured.
    pub fn has_endpoint(&self) -> bool {
        !is_unset(&self.endpoint_host)
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("name", &self.name)
            .field("credential_len", &self.credential.len())
            .field("ssid", &self.ssid)
            .field("endpoint_host", &self.endpoint_host)
            .field("endpoint_port", &self.endpoint_port)
            .finish_non_exhaustive()
    }
}

/// Parse a port written as decimal text.
///
/// Anything that is not an integer in 1-65535 is rejected.
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(p) if (1..=i64::from(u16::MAX)).contains(&p) => Ok(p as u16),
        _ => Err(ConfigError::PortOutOfRange(trimmed.to_string())),
    }
}

/// Commands accepted on the command attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Restart the device after a short grace delay.
    Reboot,
}

impl ControlCommand {
    /// Convert command to its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
        }
    }
}

impl std::str::FromStr for ControlCommand {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reboot" => Ok(Self::Reboot),
            _ => Err(ConfigError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value-level validation failures.
///
/// These are logged and recovered from by falling back to a default; they are
/// never reported back over the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Host contains characters outside `[A-Za-z0-9.-]` or is empty.
    InvalidHost(String),
    /// Port is not an integer in 1-65535.
    PortOutOfRange(String),
    /// Unknown command string.
    UnknownCommand(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHost(h) => write!(f, "invalid host: {:?}", h),
            Self::PortOutOfRange(p) => write!(f, "port out of range: {:?}", p),
            Self::UnknownCommand(cmd) => write!(f, "unknown command: {}", cmd),
        }
    }
}

impl std::error::Error for ConfigError {}
