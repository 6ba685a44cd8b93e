//! Aquanode ESP32 firmware binary.
//!
//! Flash with `cargo espflash flash --bin aquanode --features esp32 --release`.

#[cfg(feature = "esp32")]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    use aquanode_esp32::ble::ConfigService;
    use aquanode_esp32::clock::Uptime;
    use aquanode_esp32::config::{ConfigStore, CONFIG_NAMESPACE};
    use aquanode_esp32::link::{ConnectivityManager, NetworkLink};
    use aquanode_esp32::network::WsStream;
    use aquanode_esp32::node::{Node, NodeAction, NodeInputs};
    use aquanode_esp32::persistence::{nvs_partition, NvsStore};
    use aquanode_esp32::sensor::SyntheticSensors;
    use aquanode_esp32::wifi::WifiLink;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::info;
    use std::sync::mpsc;
    use std::time::Duration;

    let uptime = Uptime::new();
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    #[cfg_attr(not(feature = "reset-config-on-new-build"), allow(unused_mut))]
    let mut cfg_kv = NvsStore::open(CONFIG_NAMESPACE)?;

    #[cfg(feature = "reset-config-on-new-build")]
    {
        use aquanode_esp32::config::{reset_if_new_build, SYSTEM_NAMESPACE};
        use aquanode_esp32::persistence::build_id;

        let mut sys_kv = NvsStore::open(SYSTEM_NAMESPACE)?;
        reset_if_new_build(&mut sys_kv, &mut cfg_kv, &build_id())?;
    }

    let store = ConfigStore::load(cfg_kv);

    let (write_tx, write_rx) = mpsc::channel();
    let (link_tx, link_rx) = mpsc::channel();
    let (stream_tx, stream_rx) = mpsc::channel();

    let link = WifiLink::new(
        peripherals.modem,
        sysloop,
        Some(nvs_partition()?),
        link_tx,
    )?;
    let mac = link.mac_address();
    info!("Station MAC: {}", mac);

    let channel = ConfigService::start(&mac, write_tx, uptime)
        .map_err(|e| format!("BLE init failed: {:?}", e))?;

    let mut node = Node::new(
        store,
        ConnectivityManager::new(link, WsStream::new(stream_tx)),
        SyntheticSensors::from_mac(&mac),
        channel,
        NodeInputs::new(write_rx, link_rx, stream_rx),
    );

    node.start(uptime.now_ms());
    info!("Entering control loop");

    loop {
        if let Some(NodeAction::Restart) = node.poll(uptime.now_ms()) {
            esp_idf_hal::reset::restart();
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== Aquanode ESP32 starting ===");

    if let Err(e) = run() {
        log::error!("Fatal: {}", e);
        std::thread::sleep(std::time::Duration::from_secs(5));
        esp_idf_hal::reset::restart();
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-node' to run the simulator on the host.");
}
