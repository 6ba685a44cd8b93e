//! Aquanode ESP32 firmware library.
//!
//! A water-quality sensor node: provisioned over BLE, joined to WiFi, and
//! answering reading requests from a backend over a WebSocket stream.
//!
//! Everything except the ESP-IDF adapters ([`persistence`], [`wifi`],
//! [`network`] and the GATT service in [`ble`]) is platform-independent and
//! tested on the host. The [`sim`] collaborators let the full control loop run
//! without hardware (see the `host-node` binary).

pub mod ble;
pub mod clock;
pub mod config;
pub mod console;
pub mod link;
pub mod network;
pub mod node;
#[cfg(feature = "esp32")]
pub mod persistence;
pub mod persistence_host;
pub mod rpc;
pub mod sensor;
pub mod sim;
pub mod status;
pub mod wifi;

// Re-export commonly used items
pub use ble::{ControlChannel, TokenAssembler};
pub use config::{ConfigStore, ConfigWriteDispatcher, DeviceConfig, KvStore, WriteEvent};
pub use link::{ConnectionState, ConnectivityManager, NetworkLink, StreamTransport};
pub use node::{Node, NodeAction, NodeInputs};
pub use rpc::RpcHandler;
pub use sensor::{SensorSample, SensorSource, SyntheticSensors};
pub use status::StatusSnapshot;
