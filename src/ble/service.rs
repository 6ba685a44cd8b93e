//! NimBLE GATT binding for the control channel.
//!
//! # GATT Layout
//!
//! ```text
//! Service A100: Identity
//! ├── A101 Status     (Read, Notify) - JSON snapshot
//! ├── A104 Name       (Write)
//! ├── A105 Token      (Read, Write)  - chunked, 180 bytes per write
//! └── A106 Command    (Write)        - "reboot"
//! Service A200: Network
//! ├── A201 SSID       (Write)
//! ├── A202 Passphrase (Write)
//! ├── A203 Host       (Read, Write)
//! └── A204 Port       (Read, Write)  - decimal text
//! ```
//!
//! Write callbacks run on the NimBLE host task. They copy the payload into a
//! [`WriteEvent`] and send it to the control loop; nothing else happens there.

use super::{advertised_name, ControlChannel};
use crate::clock::Uptime;
use crate::config::{ConfigField, DeviceConfig, WriteEvent};
use esp32_nimble::utilities::mutex::Mutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEError, BLEService, NimbleProperties,
};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

const IDENTITY_SERVICE_UUID: BleUuid = BleUuid::from_uuid16(0xA100);
const STATUS_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA101);
const NAME_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA104);
const TOKEN_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA105);
const COMMAND_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA106);

const NETWORK_SERVICE_UUID: BleUuid = BleUuid::from_uuid16(0xA200);
const SSID_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA201);
const PASSPHRASE_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA202);
const HOST_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA203);
const PORT_CHAR_UUID: BleUuid = BleUuid::from_uuid16(0xA204);

/// Preferred ATT MTU; leaves room for a 180-byte token chunk.
const PREFERRED_MTU: u16 = 185;

type Characteristic = Arc<Mutex<BLECharacteristic>>;

/// The control channel GATT server.
pub struct ConfigService {
    status: Characteristic,
    token: Characteristic,
    host: Characteristic,
    port: Characteristic,
    subscribed: Arc<AtomicBool>,
}

/// Register a characteristic whose writes are forwarded as `field` events.
fn forward_writes(
    service: &Arc<Mutex<BLEService>>,
    uuid: BleUuid,
    properties: NimbleProperties,
    field: ConfigField,
    events: &Sender<WriteEvent>,
    uptime: Uptime,
) -> Characteristic {
    let characteristic = service.lock().create_characteristic(uuid, properties);
    let events = events.clone();
    characteristic.lock().on_write(move |args| {
        let event = WriteEvent::new(field, args.recv_data(), uptime.now_ms());
        if events.send(event).is_err() {
            warn!("Control loop gone, dropping {} write", field.as_str());
        }
    });
    characteristic
}

impl ConfigService {
    /// Create both GATT services and start advertising as `ESP32-<mac>`.
    pub fn start(
        mac: &str,
        events: Sender<WriteEvent>,
        uptime: Uptime,
    ) -> Result<Self, BLEError> {
        let device = BLEDevice::take();
        let name = advertised_name(mac);
        BLEDevice::set_device_name(&name)?;
        device.set_preferred_mtu(PREFERRED_MTU)?;

        let server = device.get_server();
        let subscribed = Arc::new(AtomicBool::new(false));

        server.on_connect(|_server, desc| {
            info!("Control client connected: {:?}", desc.address());
        });
        let subscribed_on_disconnect = subscribed.clone();
        server.on_disconnect(move |_desc, reason| {
            info!("Control client disconnected ({:?})", reason);
            subscribed_on_disconnect.store(false, Ordering::Relaxed);
        });
        server.advertise_on_disconnect(true);

        let identity = server.create_service(IDENTITY_SERVICE_UUID);
        let rw = NimbleProperties::READ | NimbleProperties::WRITE;

        let status = identity.lock().create_characteristic(
            STATUS_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::NOTIFY,
        );
        let subscribed_flag = subscribed.clone();
        status.lock().on_subscribe(move |_char, _desc, sub| {
            let active = !sub.is_empty();
            debug!("Status subscription: {}", active);
            subscribed_flag.store(active, Ordering::Relaxed);
        });

        let write_only = NimbleProperties::WRITE;
        for (uuid, field) in [
            (NAME_CHAR_UUID, ConfigField::Name),
            (COMMAND_CHAR_UUID, ConfigField::Command),
        ] {
            forward_writes(&identity, uuid, write_only, field, &events, uptime);
        }
        let token = forward_writes(
            &identity,
            TOKEN_CHAR_UUID,
            rw,
            ConfigField::Credential,
            &events,
            uptime,
        );

        let network = server.create_service(NETWORK_SERVICE_UUID);
        for (uuid, field) in [
            (SSID_CHAR_UUID, ConfigField::Ssid),
            (PASSPHRASE_CHAR_UUID, ConfigField::Passphrase),
        ] {
            forward_writes(&network, uuid, write_only, field, &events, uptime);
        }
        let host = forward_writes(
            &network,
            HOST_CHAR_UUID,
            rw,
            ConfigField::EndpointHost,
            &events,
            uptime,
        );
        let port = forward_writes(
            &network,
            PORT_CHAR_UUID,
            rw,
            ConfigField::EndpointPort,
            &events,
            uptime,
        );

        let advertising = device.get_advertising();
        advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(&name)
                .add_service_uuid(IDENTITY_SERVICE_UUID),
        )?;
        advertising.lock().start()?;
        info!("BLE advertising as {}", name);

        Ok(Self {
            status,
            token,
            host,
            port,
            subscribed,
        })
    }
}

impl ControlChannel for ConfigService {
    fn has_subscriber(&self) -> bool {
        self.subscribed.load(Ordering::Relaxed)
    }

    fn set_status(&mut self, status_json: &str) {
        self.status.lock().set_value(status_json.as_bytes());
    }

    fn publish_status(&mut self, status_json: &str) {
        self.status.lock().set_value(status_json.as_bytes()).notify();
    }

    fn sync_readable(&mut self, config: &DeviceConfig) {
        self.token.lock().set_value(config.credential.as_bytes());
        self.host.lock().set_value(config.endpoint_host.as_bytes());
        self.port
            .lock()
            .set_value(config.endpoint_port.to_string().as_bytes());
    }
}
