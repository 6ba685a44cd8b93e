//! ESP-IDF WiFi station wrapper.

use crate::link::{LinkError, LinkEvent, NetworkLink};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use esp_idf_sys::{esp, EspError};
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

impl From<EspError> for LinkError {
    fn from(e: EspError) -> Self {
        Self::Driver(format!("{:?}", e))
    }
}

/// WiFi station with driver-level reconnect.
///
/// After a successful [`NetworkLink::begin_join`] the station keeps
/// reassociating on its own until [`NetworkLink::disconnect`] is called.
pub struct WifiLink<'a> {
    wifi: EspWifi<'a>,
    keep_associated: Arc<AtomicBool>,
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

impl<'a> WifiLink<'a> {
    /// Create the driver and subscribe to its events.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        events: Sender<LinkEvent>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let keep_associated = Arc::new(AtomicBool::new(false));

        let wifi_tx = events.clone();
        let reconnect = keep_associated.clone();
        let wifi_events = sysloop.subscribe::<WifiEvent, _>(move |event| match event {
            WifiEvent::StaConnected(_) => {
                let _ = wifi_tx.send(LinkEvent::Associated);
            }
            WifiEvent::StaDisconnected(_) => {
                let _ = wifi_tx.send(LinkEvent::Disassociated);
                if reconnect.load(Ordering::SeqCst) {
                    debug!("Station dropped, reassociating");
                    // SAFETY: the driver is started while `keep_associated` is set
                    if let Err(e) = esp!(unsafe { esp_idf_sys::esp_wifi_connect() }) {
                        warn!("Reassociation request failed: {:?}", e);
                    }
                }
            }
            _ => {}
        })?;

        let ip_events = sysloop.subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(assignment) = event {
                let ip = Ipv4Addr::from(assignment.ip().octets());
                let _ = events.send(LinkEvent::AddressAssigned(ip));
            }
        })?;

        Ok(Self {
            wifi,
            keep_associated,
            _wifi_events: wifi_events,
            _ip_events: ip_events,
        })
    }
}

impl<'a> NetworkLink for WifiLink<'a> {
    fn begin_join(&mut self, ssid: &str, passphrase: &str, hostname: &str) -> Result<(), LinkError> {
        info!("Joining WiFi: {}", ssid);

        let auth_method = if passphrase.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| LinkError::InvalidCredentials)?,
            password: passphrase
                .try_into()
                .map_err(|_| LinkError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });

        self.keep_associated.store(false, Ordering::SeqCst);
        if self.wifi.is_started()? {
            let _ = self.wifi.disconnect();
        }

        self.wifi.set_configuration(&config)?;
        if let Err(e) = self.wifi.sta_netif_mut().set_hostname(hostname) {
            warn!("Failed to set hostname {}: {:?}", hostname, e);
        }
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }

        self.keep_associated.store(true, Ordering::SeqCst);
        self.wifi.connect()?;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.keep_associated.store(false, Ordering::SeqCst);
        if let Err(e) = self.wifi.disconnect() {
            debug!("WiFi disconnect: {:?}", e);
        }
    }

    fn is_associated(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.ip_addr().is_some()
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        let ip = Ipv4Addr::from(info.ip.octets());
        (!ip.is_unspecified()).then_some(ip)
    }

    fn rssi(&self) -> Option<i8> {
        let mut record = esp_idf_sys::wifi_ap_record_t::default();
        // SAFETY: `record` is a valid out-parameter for the duration of the call
        esp!(unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut record) }).ok()?;
        Some(record.rssi)
    }

    fn mac_address(&self) -> String {
        match self.wifi.sta_netif().get_mac() {
            Ok(mac) => mac
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(":"),
            Err(e) => {
                warn!("Failed to read station MAC: {:?}", e);
                String::from("00:00:00:00:00:00")
            }
        }
    }
}
