//! Status snapshot for the control channel.
//!
//! The snapshot deliberately carries the passphrase and credential in
//! cleartext: the control channel is the provisioning interface and the
//! companion app shows the stored values back to the user.

use crate::config::DeviceConfig;
use crate::link::{ConnectivityManager, NetworkLink, StreamTransport};
use serde::Serialize;

/// Interval between status pushes while a client is subscribed.
pub const STATUS_PUSH_INTERVAL_MS: u64 = 2_000;

/// Point-in-time view of the device, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// `"connected"` or `"disconnected"`.
    pub wifi: &'static str,
    pub ip: String,
    /// 0 while disconnected.
    pub rssi: i32,
    pub name: String,
    pub mac: String,
    pub ws_host: String,
    pub ws_port: u16,
    pub ws_state: &'static str,
    /// Empty after a successful connect.
    pub ws_last_error: String,
    pub ssid: String,
    pub pass: String,
    pub token: String,
}

impl StatusSnapshot {
    pub fn capture<L: NetworkLink, T: StreamTransport>(
        config: &DeviceConfig,
        manager: &ConnectivityManager<L, T>,
    ) -> Self {
        let link = manager.link();
        let associated = link.is_associated();

        Self {
            wifi: if associated { "connected" } else { "disconnected" },
            ip: link
                .ip_addr()
                .filter(|_| associated)
                .map(|ip| ip.to_string())
                .unwrap_or_default(),
            rssi: link
                .rssi()
                .filter(|_| associated)
                .map(i32::from)
                .unwrap_or(0),
            name: config.name.clone(),
            mac: link.mac_address(),
            ws_host: config.endpoint_host.clone(),
            ws_port: config.endpoint_port,
            ws_state: manager.state().as_str(),
            ws_last_error: manager.last_error().to_string(),
            ssid: config.ssid.clone(),
            pass: config.passphrase.clone(),
            token: config.credential.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Decides when the periodic status push is due.
#[derive(Debug, Default)]
pub struct StatusReporter {
    last_push_ms: Option<u64>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_push_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= STATUS_PUSH_INTERVAL_MS)
    }

    pub fn mark_pushed(&mut self, now_ms: u64) {
        self.last_push_ms = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::StreamEvent;
    use crate::sim::{SimLink, SimStream, SIM_MAC};
    use serde_json::Value;

    fn config() -> DeviceConfig {
        DeviceConfig {
            name: "Reef".to_string(),
            ssid: "ReefNet".to_string(),
            passphrase: "coral-reef-42".to_string(),
            credential: "aaa.bbb.ccc".to_string(),
            endpoint_host: "api.example.com".to_string(),
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_snapshot_while_disconnected() {
        let manager = ConnectivityManager::new(SimLink::new(), SimStream::new());
        let snapshot = StatusSnapshot::capture(&config(), &manager);

        assert_eq!(snapshot.wifi, "disconnected");
        assert_eq!(snapshot.ip, "");
        assert_eq!(snapshot.rssi, 0);
        assert_eq!(snapshot.mac, SIM_MAC);
        assert_eq!(snapshot.ws_state, "idle");
        assert_eq!(snapshot.ws_port, 3000);
    }

    #[test]
    fn test_snapshot_while_open() {
        let config = config();
        let mut manager = ConnectivityManager::new(SimLink::new(), SimStream::new());
        manager.start(&config);
        manager.link_mut().set_associated(true);
        manager.tick(&config, 0);
        manager.on_stream_event(StreamEvent::Connected, 0);

        let snapshot = StatusSnapshot::capture(&config, &manager);
        assert_eq!(snapshot.wifi, "connected");
        assert_eq!(snapshot.ip, "192.168.4.20");
        assert!(snapshot.rssi < 0);
        assert_eq!(snapshot.ws_state, "open");
        assert_eq!(snapshot.ws_last_error, "");
    }

    #[test]
    fn test_json_carries_every_field() {
        let manager = ConnectivityManager::new(SimLink::new(), SimStream::new());
        let json = StatusSnapshot::capture(&config(), &manager).to_json();
        let value: Value = serde_json::from_str(&json).unwrap();

        for key in [
            "wifi",
            "ip",
            "rssi",
            "name",
            "mac",
            "ws_host",
            "ws_port",
            "ws_state",
            "ws_last_error",
            "ssid",
            "pass",
            "token",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["pass"], "coral-reef-42");
        assert_eq!(value["token"], "aaa.bbb.ccc");
    }

    #[test]
    fn test_reporter_cadence() {
        let mut reporter = StatusReporter::new();
        assert!(reporter.is_due(0));
        reporter.mark_pushed(100);
        assert!(!reporter.is_due(2_099));
        assert!(reporter.is_due(2_100));
    }
}
