//! ESP-IDF WebSocket client wrapper.

use crate::link::{
    StreamError, StreamEvent, StreamTarget, StreamTransport, MISSED_PONG_LIMIT, PING_INTERVAL,
    PONG_TIMEOUT, RECONNECT_INTERVAL,
};
use esp_idf_svc::ws::client::{
    EspWebSocketClient, EspWebSocketClientConfig, WebSocketEvent, WebSocketEventType,
};
use esp_idf_svc::ws::FrameType;
use log::{debug, info, warn};
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Timeout for handing a frame to the client task.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket stream to the backend.
pub struct WsStream {
    client: Option<EspWebSocketClient<'static>>,
    events: Sender<StreamEvent>,
}

impl WsStream {
    pub fn new(events: Sender<StreamEvent>) -> Self {
        Self {
            client: None,
            events,
        }
    }
}

impl StreamTransport for WsStream {
    fn open(&mut self, target: &StreamTarget) -> Result<(), StreamError> {
        self.close();

        let config = EspWebSocketClientConfig {
            ping_interval_sec: PING_INTERVAL,
            pingpong_timeout_sec: PONG_TIMEOUT * MISSED_PONG_LIMIT,
            reconnect_timeout_ms: RECONNECT_INTERVAL,
            crt_bundle_attach: if target.secure {
                Some(esp_idf_sys::esp_crt_bundle_attach)
            } else {
                None
            },
            ..Default::default()
        };

        let tx = self.events.clone();
        let uri = target.uri();
        let client = EspWebSocketClient::new(&uri, &config, SEND_TIMEOUT, move |event| {
            forward_event(&tx, event)
        })
        .map_err(|e| StreamError::Transport(format!("{:?}", e)))?;

        info!(
            "Stream opening to {}:{} (tls={})",
            target.host, target.port, target.secure
        );
        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Stream client closed");
        }
    }

    fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        let client = self.client.as_mut().ok_or(StreamError::NotConnected)?;
        if !client.is_connected() {
            return Err(StreamError::NotConnected);
        }
        client
            .send(FrameType::Text(false), text.as_bytes())
            .map_err(|e| StreamError::Transport(format!("{:?}", e)))
    }
}

fn forward_event<E: std::fmt::Debug>(
    tx: &Sender<StreamEvent>,
    event: &Result<WebSocketEvent<'_>, E>,
) {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            warn!("Stream error: {:?}", e);
            return;
        }
    };

    let forwarded = match &event.event_type {
        WebSocketEventType::Connected => Some(StreamEvent::Connected),
        WebSocketEventType::Disconnected | WebSocketEventType::Closed => {
            Some(StreamEvent::Disconnected)
        }
        WebSocketEventType::Text(text) => Some(StreamEvent::Text(text.to_string())),
        WebSocketEventType::Binary(data) => {
            debug!("Ignoring {} byte binary frame", data.len());
            None
        }
        _ => None,
    };

    if let Some(ev) = forwarded {
        let _ = tx.send(ev);
    }
}
