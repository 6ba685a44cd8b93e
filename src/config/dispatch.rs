//! Routing of control-channel writes into the configuration.
//!
//! GATT write callbacks run on the BLE host task, outside the control loop.
//! They only wrap the received bytes in a [`WriteEvent`] and enqueue it; the
//! loop drains the queue and applies each event here, so a mutation is always
//! observed atomically by the iteration that applies it.

use super::device::{parse_port, ConfigError, ControlCommand, DEFAULT_PORT, UNSET};
use super::host::{is_valid_bare_host, strip_scheme_and_suffix};
use super::store::{ConfigStore, KvStore, StoreError};
use crate::ble::{credential_brief, TokenAssembler};
use log::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Writable attributes of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Name,
    Credential,
    Command,
    Ssid,
    Passphrase,
    EndpointHost,
    EndpointPort,
}

impl ConfigField {
    /// Short name used in logs and by the host console.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Credential => "token",
            Self::Command => "cmd",
            Self::Ssid => "ssid",
            Self::Passphrase => "pass",
            Self::EndpointHost => "host",
            Self::EndpointPort => "port",
        }
    }
}

impl std::str::FromStr for ConfigField {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "token" => Ok(Self::Credential),
            "cmd" => Ok(Self::Command),
            "ssid" => Ok(Self::Ssid),
            "pass" => Ok(Self::Passphrase),
            "host" => Ok(Self::EndpointHost),
            "port" => Ok(Self::EndpointPort),
            _ => Err(ConfigError::UnknownCommand(s.to_string())),
        }
    }
}

/// One raw write received on the control channel.
///
/// The payload is zeroed when the event is dropped since it may carry the
/// passphrase or a credential fragment.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct WriteEvent {
    #[zeroize(skip)]
    field: ConfigField,
    data: Vec<u8>,
    received_ms: u64,
}

impl WriteEvent {
    /// Wrap received bytes, stamped with the uptime at arrival.
    pub fn new(field: ConfigField, data: &[u8], received_ms: u64) -> Self {
        Self {
            field,
            data: data.to_vec(),
            received_ms,
        }
    }

    pub fn field(&self) -> ConfigField {
        self.field
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn received_ms(&self) -> u64 {
        self.received_ms
    }

    /// Payload as trimmed text (invalid UTF-8 replaced).
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).trim().to_string()
    }
}

/// Deferred work raised by an applied write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// WiFi credentials changed: rejoin the network.
    RetryNetworkJoin,
    /// Credential or endpoint changed: tear the stream down and reopen it.
    ReconfigureStream {
        /// A new credential lifts any authorization backoff.
        lift_auth_block: bool,
    },
    /// Restart the device.
    Restart,
}

/// Result of applying one write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The configuration changed (or was reset to a default).
    pub mutated: bool,
    /// Work for the connectivity manager or the control loop.
    pub intent: Option<Intent>,
}

impl WriteOutcome {
    fn mutated(intent: Option<Intent>) -> Self {
        Self {
            mutated: true,
            intent,
        }
    }

    fn ignored() -> Self {
        Self::default()
    }
}

fn log_persist_failure(field: ConfigField, result: Result<(), StoreError>) {
    if let Err(e) = result {
        warn!("Failed to persist {}: {}", field.as_str(), e);
    }
}

/// Applies control-channel writes to the configuration store.
#[derive(Debug, Default)]
pub struct ConfigWriteDispatcher {
    assembler: TokenAssembler,
}

impl ConfigWriteDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of a credential still being reassembled.
    pub fn pending_credential_len(&self) -> usize {
        self.assembler.pending_len()
    }

    /// Apply one write to the store.
    ///
    /// Validation failures are logged and replaced by defaults; they are never
    /// returned to the caller.
    pub fn apply<S: KvStore>(&mut self, store: &mut ConfigStore<S>, event: &WriteEvent) -> WriteOutcome {
        let field = event.field();
        match field {
            ConfigField::Ssid => {
                let ssid = event.text();
                info!("SSID set: {}", ssid);
                log_persist_failure(field, store.set_ssid(ssid));
                WriteOutcome::mutated(Some(Intent::RetryNetworkJoin))
            }

            ConfigField::Passphrase => {
                let passphrase = event.text();
                info!("Passphrase set ({} bytes)", passphrase.len());
                log_persist_failure(field, store.set_passphrase(passphrase));
                WriteOutcome::mutated(Some(Intent::RetryNetworkJoin))
            }

            ConfigField::Name => {
                let name = event.text();
                info!("Name set: {}", name);
                log_persist_failure(field, store.set_name(name));
                WriteOutcome::mutated(None)
            }

            ConfigField::Credential => {
                match self
                    .assembler
                    .on_fragment(event.data(), event.received_ms())
                {
                    Some(credential) => {
                        info!("Credential assembled: {}", credential_brief(&credential));
                        log_persist_failure(field, store.set_credential(credential));
                        WriteOutcome::mutated(Some(Intent::ReconfigureStream {
                            lift_auth_block: true,
                        }))
                    }
                    None => WriteOutcome::ignored(),
                }
            }

            ConfigField::Command => match event.text().parse::<ControlCommand>() {
                Ok(ControlCommand::Reboot) => {
                    info!("Command: reboot");
                    WriteOutcome {
                        mutated: false,
                        intent: Some(Intent::Restart),
                    }
                }
                Err(e) => {
                    debug!("Ignoring command write: {}", e);
                    WriteOutcome::ignored()
                }
            },

            ConfigField::EndpointHost => {
                let raw = event.text();
                let (bare, tls_hinted) = strip_scheme_and_suffix(&raw);
                if is_valid_bare_host(&bare) {
                    info!(
                        "Endpoint host set: {}{}",
                        bare,
                        if tls_hinted { " (tls-hint)" } else { "" }
                    );
                    log_persist_failure(field, store.set_endpoint_host(bare));
                } else {
                    warn!("Ignoring endpoint host: {}", ConfigError::InvalidHost(raw));
                    log_persist_failure(field, store.set_endpoint_host(UNSET.to_string()));
                }
                WriteOutcome::mutated(Some(Intent::ReconfigureStream {
                    lift_auth_block: false,
                }))
            }

            ConfigField::EndpointPort => {
                let port = match parse_port(&event.text()) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Ignoring endpoint port: {}", e);
                        DEFAULT_PORT
                    }
                };
                info!("Endpoint port set: {}", port);
                log_persist_failure(field, store.set_endpoint_port(port));
                WriteOutcome::mutated(Some(Intent::ReconfigureStream {
                    lift_auth_block: false,
                }))
            }
        }
    }
}
