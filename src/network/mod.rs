//! Backend stream transport (ESP32 only).
//!
//! [`WsStream`] implements [`crate::link::StreamTransport`] with the ESP-IDF
//! WebSocket client. Keep-alive and reconnect timing come from
//! [`crate::link`]; the client reconnects on its own after a drop, so the
//! control loop only reopens the stream when the target changes.

#[cfg(feature = "esp32")]
mod websocket;

#[cfg(feature = "esp32")]
pub use websocket::WsStream;
