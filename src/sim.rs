//! Simulated collaborators.
//!
//! In-memory stand-ins for the WiFi link, the backend stream and the BLE
//! control channel. The host simulator drives the real control loop with
//! them, and the unit tests use them as fakes.

use crate::ble::ControlChannel;
use crate::config::DeviceConfig;
use crate::link::{
    LinkError, LinkEvent, NetworkLink, StreamError, StreamEvent, StreamTarget, StreamTransport,
};
use log::{debug, info};
use std::net::Ipv4Addr;
use std::sync::mpsc::Sender;

/// MAC reported by [`SimLink::new`].
pub const SIM_MAC: &str = "02:00:00:AA:4E:01";

/// Address handed out when the simulated link comes up.
pub const SIM_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 20);

/// A join request seen by [`SimLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub ssid: String,
    pub hostname: String,
}

/// Simulated WiFi station. Association is toggled by the caller.
#[derive(Debug)]
pub struct SimLink {
    mac: String,
    associated: bool,
    rssi: i8,
    joins: Vec<JoinRequest>,
    disconnects: usize,
    events: Option<Sender<LinkEvent>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self {
            mac: SIM_MAC.to_string(),
            associated: false,
            rssi: -58,
            joins: Vec::new(),
            disconnects: 0,
            events: None,
        }
    }

    /// Report association changes on `events` as well.
    pub fn with_events(mut self, events: Sender<LinkEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: LinkEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Bring the link up or down.
    pub fn set_associated(&mut self, associated: bool) {
        if self.associated == associated {
            return;
        }
        self.associated = associated;
        if associated {
            self.emit(LinkEvent::Associated);
            self.emit(LinkEvent::AddressAssigned(SIM_IP));
        } else {
            self.emit(LinkEvent::Disassociated);
        }
    }

    /// Join requests issued so far.
    pub fn joins(&self) -> &[JoinRequest] {
        &self.joins
    }

    /// Number of `disconnect` calls.
    pub fn disconnects(&self) -> usize {
        self.disconnects
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink for SimLink {
    fn begin_join(
        &mut self,
        ssid: &str,
        _passphrase: &str,
        hostname: &str,
    ) -> Result<(), LinkError> {
        info!("[sim] join requested: ssid={} hostname={}", ssid, hostname);
        self.joins.push(JoinRequest {
            ssid: ssid.to_string(),
            hostname: hostname.to_string(),
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.set_associated(false);
    }

    fn is_associated(&self) -> bool {
        self.associated
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.associated.then_some(SIM_IP)
    }

    fn rssi(&self) -> Option<i8> {
        self.associated.then_some(self.rssi)
    }

    fn mac_address(&self) -> String {
        self.mac.clone()
    }
}

/// Simulated backend stream that records targets and outbound frames.
#[derive(Debug, Default)]
pub struct SimStream {
    targets: Vec<StreamTarget>,
    sent: Vec<String>,
    open: bool,
    closes: usize,
    refuse_open: bool,
    events: Option<Sender<StreamEvent>>,
}

impl SimStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report connects and disconnects on `events`, connecting immediately
    /// on every open.
    pub fn with_events(mut self, events: Sender<StreamEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Make every following `open` fail.
    pub fn refuse_open(&mut self, refuse: bool) {
        self.refuse_open = refuse;
    }

    /// Targets passed to `open`, oldest first.
    pub fn targets(&self) -> &[StreamTarget] {
        &self.targets
    }

    /// Frames sent so far.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Take the frames sent so far.
    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of `close` calls on an open stream.
    pub fn closes(&self) -> usize {
        self.closes
    }
}

impl StreamTransport for SimStream {
    fn open(&mut self, target: &StreamTarget) -> Result<(), StreamError> {
        if self.refuse_open {
            return Err(StreamError::Transport("simulated refusal".to_string()));
        }
        debug!("[sim] stream open: {}", target.uri());
        self.targets.push(target.clone());
        self.open = true;
        if let Some(tx) = &self.events {
            let _ = tx.send(StreamEvent::Connected);
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.closes += 1;
        if let Some(tx) = &self.events {
            let _ = tx.send(StreamEvent::Disconnected);
        }
    }

    fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        if !self.open {
            return Err(StreamError::NotConnected);
        }
        self.sent.push(text.to_string());
        Ok(())
    }
}

/// Simulated control channel.
#[derive(Debug, Default)]
pub struct SimChannel {
    subscribed: bool,
    status: Option<String>,
    notifications: Vec<String>,
    readable: Option<DeviceConfig>,
}

impl SimChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed;
    }

    /// Value a direct status read would return.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Status notifications delivered to the subscriber.
    pub fn notifications(&self) -> &[String] {
        &self.notifications
    }

    /// Configuration last mirrored into the readable attributes.
    pub fn readable(&self) -> Option<&DeviceConfig> {
        self.readable.as_ref()
    }
}

impl ControlChannel for SimChannel {
    fn has_subscriber(&self) -> bool {
        self.subscribed
    }

    fn set_status(&mut self, status_json: &str) {
        self.status = Some(status_json.to_string());
    }

    fn publish_status(&mut self, status_json: &str) {
        self.status = Some(status_json.to_string());
        if self.subscribed {
            self.notifications.push(status_json.to_string());
        }
    }

    fn sync_readable(&mut self, config: &DeviceConfig) {
        self.readable = Some(config.clone());
    }
}
