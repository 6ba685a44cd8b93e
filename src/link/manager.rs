//! Connection state machine.
//!
//! # State Machine
//!
//! ```text
//!          start / rejoin
//!   Idle ─────────────────> AwaitingLink <──────────────┐
//!                             │      ^                  │ deadline elapsed
//!        associated + valid   │      │ disassociated    │
//!        endpoint             v      │ / reconfigure    │
//!                             Open ──┘                  │
//!                             │                         │
//!                             │ auth error              │
//!                             v                         │
//!                           AuthBlocked(until, reason) ─┘
//! ```
//!
//! A reconfigure request returns any state to `AwaitingLink`. Every method
//! returns immediately; progress happens on the next [`ConnectivityManager::tick`].

use super::message::{classify_inbound, InboundMessage};
use super::{LinkEvent, NetworkLink, StreamError, StreamEvent, StreamTarget, StreamTransport};
use crate::ble::is_well_formed_credential;
use crate::config::{infer_transport_security, is_valid_bare_host, DeviceConfig};
use log::{debug, info, warn};
use serde_json::Value;

/// How long the stream stays closed after the backend rejects the credential.
pub const AUTH_BLOCK_MS: u64 = 30_000;

/// Cadence at which a pending network join request is acted upon.
pub const JOIN_CHECK_INTERVAL_MS: u64 = 1_000;

/// Delay before retrying after the transport refused to open.
pub const OPEN_RETRY_MS: u64 = 3_000;

/// Stream connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started.
    Idle,
    /// Waiting for the link and a usable endpoint.
    AwaitingLink,
    /// Stream started; the transport reconnects on its own.
    Open,
    /// The backend rejected the credential; no attempt before `until_ms`.
    AuthBlocked { until_ms: u64, reason: String },
}

impl ConnectionState {
    /// Short name used in the status snapshot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingLink => "awaiting_link",
            Self::Open => "open",
            Self::AuthBlocked { .. } => "auth_blocked",
        }
    }
}

/// Owns the link and the stream and decides when the stream is (re)opened.
pub struct ConnectivityManager<L: NetworkLink, T: StreamTransport> {
    link: L,
    stream: T,
    state: ConnectionState,
    /// Reason of the last stream failure; cleared on connect.
    last_error: String,
    /// The transport reported an established connection.
    stream_connected: bool,
    join_requested: bool,
    reconfigure_requested: bool,
    last_join_check_ms: Option<u64>,
    next_open_ms: u64,
}

impl<L: NetworkLink, T: StreamTransport> ConnectivityManager<L, T> {
    pub fn new(link: L, stream: T) -> Self {
        Self {
            link,
            stream,
            state: ConnectionState::Idle,
            last_error: String::new(),
            stream_connected: false,
            join_requested: false,
            reconfigure_requested: false,
            last_join_check_ms: None,
            next_open_ms: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Whether frames can be sent right now.
    pub fn is_stream_connected(&self) -> bool {
        self.state == ConnectionState::Open && self.stream_connected
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn stream(&self) -> &T {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    /// Leave `Idle` and issue the first join request.
    pub fn start(&mut self, config: &DeviceConfig) {
        if self.state != ConnectionState::Idle {
            return;
        }
        self.state = ConnectionState::AwaitingLink;
        self.begin_join(config);
    }

    /// Rejoin the network on the next join check (SSID or passphrase changed).
    pub fn request_network_join(&mut self) {
        self.join_requested = true;
    }

    /// Tear the stream down and reopen it on the next tick.
    ///
    /// `lift_auth_block` also forgets the last rejection reason (a new
    /// credential was written).
    pub fn request_reconfigure(&mut self, lift_auth_block: bool) {
        self.reconfigure_requested = true;
        if lift_auth_block {
            self.last_error.clear();
        }
    }

    pub fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Associated => info!("WiFi associated"),
            LinkEvent::AddressAssigned(ip) => info!("WiFi got IP: {}", ip),
            LinkEvent::Disassociated => {
                info!("WiFi disassociated");
                if self.state == ConnectionState::Open {
                    self.teardown();
                    self.state = ConnectionState::AwaitingLink;
                }
            }
        }
    }

    /// Handle one transport event. Returns a request for the RPC handler.
    pub fn on_stream_event(&mut self, event: StreamEvent, now_ms: u64) -> Option<Value> {
        match event {
            StreamEvent::Connected => {
                info!("Stream connected");
                self.stream_connected = true;
                self.last_error.clear();
                None
            }
            StreamEvent::Disconnected => {
                if self.stream_connected {
                    info!("Stream disconnected");
                }
                self.stream_connected = false;
                None
            }
            StreamEvent::Text(text) => match classify_inbound(&text) {
                InboundMessage::AuthError { reason } => {
                    self.block(reason, now_ms);
                    None
                }
                InboundMessage::Request(request) if self.is_stream_connected() => Some(request),
                InboundMessage::Request(_) => {
                    debug!("Dropping request received while not open");
                    None
                }
                InboundMessage::Ignored => {
                    debug!("Ignoring stream message ({} bytes)", text.len());
                    None
                }
            },
        }
    }

    /// One state check per control loop iteration.
    pub fn tick(&mut self, config: &DeviceConfig, now_ms: u64) {
        let join_check_due = self
            .last_join_check_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= JOIN_CHECK_INTERVAL_MS);
        if join_check_due {
            self.last_join_check_ms = Some(now_ms);
            if self.join_requested {
                self.join_requested = false;
                self.rejoin(config);
            }
        }

        if self.reconfigure_requested {
            self.reconfigure_requested = false;
            info!(
                "Stream reconfigure -> {}:{}",
                config.endpoint_host, config.endpoint_port
            );
            self.teardown();
            if self.state != ConnectionState::Idle {
                self.state = ConnectionState::AwaitingLink;
            }
            self.next_open_ms = now_ms;
        }

        if let ConnectionState::AuthBlocked { until_ms, .. } = self.state {
            if now_ms < until_ms {
                return;
            }
            info!("Auth block elapsed, retrying");
            self.state = ConnectionState::AwaitingLink;
            self.next_open_ms = now_ms;
        }

        if self.state == ConnectionState::AwaitingLink
            && now_ms >= self.next_open_ms
            && self.can_open(config)
        {
            self.open(config, now_ms);
        }
    }

    /// Send one frame over the open stream.
    pub fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        if !self.is_stream_connected() {
            return Err(StreamError::NotConnected);
        }
        self.stream.send_text(text)
    }

    /// Stream preconditions: link up, usable host, non-zero port.
    pub fn can_open(&self, config: &DeviceConfig) -> bool {
        self.link.is_associated()
            && config.has_endpoint()
            && is_valid_bare_host(&config.endpoint_host)
            && config.endpoint_port != 0
    }

    fn begin_join(&mut self, config: &DeviceConfig) {
        if !config.has_network() {
            info!("No WiFi network configured");
            return;
        }
        info!("Connecting WiFi: {}", config.ssid);
        if let Err(e) = self
            .link
            .begin_join(&config.ssid, &config.passphrase, &config.name)
        {
            warn!("WiFi join request failed: {}", e);
        }
    }

    fn rejoin(&mut self, config: &DeviceConfig) {
        self.link.disconnect();
        if self.state == ConnectionState::Open {
            self.teardown();
            self.state = ConnectionState::AwaitingLink;
        }
        self.begin_join(config);
    }

    fn open(&mut self, config: &DeviceConfig, now_ms: u64) {
        if !is_well_formed_credential(&config.credential) {
            warn!(
                "Credential looks malformed (len={}), connecting anyway",
                config.credential.len()
            );
        }

        let secure = infer_transport_security(&config.endpoint_host, config.endpoint_port);
        let target = StreamTarget::device(
            &config.endpoint_host,
            config.endpoint_port,
            secure,
            &config.credential,
            &self.link.mac_address(),
        );

        match self.stream.open(&target) {
            Ok(()) => {
                info!(
                    "Stream begin -> {}://{}:{}/device",
                    if secure { "wss" } else { "ws" },
                    target.host,
                    target.port
                );
                self.state = ConnectionState::Open;
            }
            Err(e) => {
                warn!("Stream open failed: {}", e);
                self.last_error = e.to_string();
                self.next_open_ms = now_ms.saturating_add(OPEN_RETRY_MS);
            }
        }
    }

    fn block(&mut self, reason: String, now_ms: u64) {
        warn!("Stream auth error, blocked for {} ms: {}", AUTH_BLOCK_MS, reason);
        self.teardown();
        self.last_error = reason.clone();
        self.state = ConnectionState::AuthBlocked {
            until_ms: now_ms.saturating_add(AUTH_BLOCK_MS),
            reason,
        };
    }

    fn teardown(&mut self) {
        self.stream.close();
        self.stream_connected = false;
    }
}
