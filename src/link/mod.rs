//! Network link and backend stream.
//!
//! The WiFi station and the WebSocket client are platform collaborators; the
//! control loop only sees them through [`NetworkLink`] and [`StreamTransport`].
//! Both report asynchronous happenings as events ([`LinkEvent`],
//! [`StreamEvent`]) over channels drained once per loop iteration.
//!
//! # Components
//!
//! - [`manager`] - connection state machine with retry and auth backoff
//! - [`message`] - classification of inbound stream messages

mod manager;
mod message;

pub use manager::{
    ConnectionState, ConnectivityManager, AUTH_BLOCK_MS, JOIN_CHECK_INTERVAL_MS, OPEN_RETRY_MS,
};
pub use message::{classify_inbound, InboundMessage};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Characters left unescaped in query values (RFC 3986 unreserved).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Interval between WebSocket pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Time to wait for a pong before counting it as missed.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(3);

/// Missed pongs tolerated before the transport drops the connection.
pub const MISSED_PONG_LIMIT: u32 = 2;

/// Delay between transport-level reconnect attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Events reported by the network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Associated with the access point.
    Associated,
    /// DHCP lease obtained.
    AddressAssigned(Ipv4Addr),
    /// Association lost.
    Disassociated,
}

/// Events reported by the stream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    /// One inbound text frame.
    Text(String),
}

/// Station side of the WiFi link.
pub trait NetworkLink {
    /// Start joining a network. Completion is reported as [`LinkEvent`]s.
    fn begin_join(&mut self, ssid: &str, passphrase: &str, hostname: &str)
        -> Result<(), LinkError>;

    /// Leave the current network, if any.
    fn disconnect(&mut self);

    /// Whether the station is associated and has an address.
    fn is_associated(&self) -> bool;

    /// Current IPv4 address.
    fn ip_addr(&self) -> Option<Ipv4Addr>;

    /// Signal strength of the current association.
    fn rssi(&self) -> Option<i8>;

    /// Station MAC as `AA:BB:CC:DD:EE:FF`.
    fn mac_address(&self) -> String;
}

/// Client side of the backend stream.
pub trait StreamTransport {
    /// Start connecting. Completion is reported as [`StreamEvent::Connected`].
    fn open(&mut self, target: &StreamTarget) -> Result<(), StreamError>;

    /// Drop the connection, if any. Never fails.
    fn close(&mut self);

    /// Queue one text frame.
    fn send_text(&mut self, text: &str) -> Result<(), StreamError>;
}

/// Everything the transport needs to open the backend stream.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub host: String,
    pub port: u16,
    /// Use `wss://`.
    pub secure: bool,
    /// Request path including the query string.
    pub path: String,
}

impl StreamTarget {
    /// Build the target for the device endpoint.
    pub fn device(host: &str, port: u16, secure: bool, credential: &str, mac: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            secure,
            path: device_path(credential, mac),
        }
    }

    /// Full URI, e.g. `wss://api.example.com:443/device?token=...`.
    pub fn uri(&self) -> String {
        format!(
            "{}://{}:{}{}",
            if self.secure { "wss" } else { "ws" },
            self.host,
            self.port,
            self.path
        )
    }
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Request path carrying the credential and device id as query parameters.
pub fn device_path(credential: &str, mac: &str) -> String {
    format!(
        "/device?token={}&mac={}",
        utf8_percent_encode(credential, QUERY_VALUE),
        utf8_percent_encode(mac, QUERY_VALUE)
    )
}

/// Network join failures.
#[derive(Debug)]
pub enum LinkError {
    /// SSID or passphrase does not fit the driver's limits.
    InvalidCredentials,
    /// The driver refused the request.
    Driver(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid network credentials"),
            Self::Driver(msg) => write!(f, "WiFi driver error: {}", msg),
        }
    }
}

impl std::error::Error for LinkError {}

/// Stream open and send failures.
#[derive(Debug)]
pub enum StreamError {
    /// The stream is not open.
    NotConnected,
    /// The URI could not be handed to the client.
    InvalidTarget(String),
    /// The client refused the request.
    Transport(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "stream not connected"),
            Self::InvalidTarget(uri) => write!(f, "invalid stream target: {}", uri),
            Self::Transport(msg) => write!(f, "stream transport error: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Path Tests ====================

    #[test]
    fn test_device_path_plain_values() {
        assert_eq!(
            device_path("aaa.bbb-ccc_ddd", "AA:BB:CC:DD:EE:FF"),
            "/device?token=aaa.bbb-ccc_ddd&mac=AA%3ABB%3ACC%3ADD%3AEE%3AFF"
        );
    }

    #[test]
    fn test_device_path_escapes_reserved() {
        assert_eq!(device_path("a b&c=d", "~x"), "/device?token=a%20b%26c%3Dd&mac=~x");
    }

    #[test]
    fn test_device_path_escapes_utf8_bytes() {
        assert_eq!(device_path("\u{e9}", ""), "/device?token=%C3%A9&mac=");
    }

    // ==================== Target Tests ====================

    #[test]
    fn test_uri_scheme_follows_security() {
        let plain = StreamTarget::device("10.0.0.2", 3000, false, "t.o.k", "m");
        assert_eq!(plain.uri(), "ws://10.0.0.2:3000/device?token=t.o.k&mac=m");

        let secure = StreamTarget::device("api.example.com", 443, true, "t.o.k", "m");
        assert!(secure.uri().starts_with("wss://api.example.com:443/device?"));
    }

    #[test]
    fn test_target_debug_hides_path() {
        let target = StreamTarget::device("h", 1, false, "secret.token.value", "m");
        assert!(!format!("{:?}", target).contains("secret"));
    }
}
