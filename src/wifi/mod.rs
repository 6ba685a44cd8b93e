//! WiFi station driver (ESP32 only).
//!
//! [`WifiLink`] implements [`crate::link::NetworkLink`] on top of the ESP-IDF
//! driver. Association and DHCP happenings are reported as
//! [`crate::link::LinkEvent`]s from system event loop subscriptions.

#[cfg(feature = "esp32")]
mod connection;

#[cfg(feature = "esp32")]
pub use connection::WifiLink;
