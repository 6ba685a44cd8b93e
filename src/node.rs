//! The device control loop.
//!
//! [`Node`] is the single owner of every piece of mutable state: the
//! configuration, the connection state machine, the RPC handler and the
//! status cadence. Platform callbacks never touch it directly; they send
//! events over channels that [`Node::poll`] drains once per iteration.
//!
//! # Iteration Order
//!
//! 1. Control-channel writes (each applied atomically, status pushed per mutation)
//! 2. Link events
//! 3. Stream events (auth classification, RPC dispatch)
//! 4. Connectivity tick (join retry, stream state machine)
//! 5. Periodic status push
//! 6. Pending restart
//!
//! # Example
//!
//! ```
//! use aquanode_esp32::config::{ConfigField, ConfigStore, MemoryStore, WriteEvent};
//! use aquanode_esp32::link::ConnectivityManager;
//! use aquanode_esp32::node::{Node, NodeInputs};
//! use aquanode_esp32::sensor::SyntheticSensors;
//! use aquanode_esp32::sim::{SimChannel, SimLink, SimStream, SIM_MAC};
//!
//! let (write_tx, inputs) = NodeInputs::channels();
//! let manager = ConnectivityManager::new(SimLink::new(), SimStream::new());
//! let mut node = Node::new(
//!     ConfigStore::load(MemoryStore::new()),
//!     manager,
//!     SyntheticSensors::from_mac(SIM_MAC),
//!     SimChannel::new(),
//!     inputs,
//! );
//!
//! node.start(0);
//! write_tx.send(WriteEvent::new(ConfigField::Name, b"Reef", 5)).unwrap();
//! assert!(node.poll(10).is_none());
//! assert_eq!(node.config().name, "Reef");
//! ```

use crate::ble::ControlChannel;
use crate::config::{
    ConfigStore, ConfigWriteDispatcher, DeviceConfig, Intent, KvStore, WriteEvent,
};
use crate::link::{ConnectivityManager, LinkEvent, NetworkLink, StreamEvent, StreamTransport};
use crate::rpc::RpcHandler;
use crate::sensor::SensorSource;
use crate::status::{StatusReporter, StatusSnapshot};
use log::{info, warn};
use std::sync::mpsc::{self, Receiver, Sender};

/// Delay between a restart command and the restart itself.
pub const RESTART_GRACE_MS: u64 = 300;

/// Work the control loop must carry out on behalf of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    /// Restart the device now.
    Restart,
}

/// Receiving ends of the event channels feeding a [`Node`].
pub struct NodeInputs {
    pub writes: Receiver<WriteEvent>,
    pub link: Receiver<LinkEvent>,
    pub stream: Receiver<StreamEvent>,
}

impl NodeInputs {
    /// Create a write channel; link and stream channels are left unconnected.
    ///
    /// Use [`NodeInputs::new`] when the link and stream adapters report events.
    pub fn channels() -> (Sender<WriteEvent>, Self) {
        let (write_tx, writes) = mpsc::channel();
        let (_, link) = mpsc::channel();
        let (_, stream) = mpsc::channel();
        (
            write_tx,
            Self {
                writes,
                link,
                stream,
            },
        )
    }

    pub fn new(
        writes: Receiver<WriteEvent>,
        link: Receiver<LinkEvent>,
        stream: Receiver<StreamEvent>,
    ) -> Self {
        Self {
            writes,
            link,
            stream,
        }
    }
}

/// The control loop context.
pub struct Node<K, L, T, C, S>
where
    K: KvStore,
    L: NetworkLink,
    T: StreamTransport,
    C: ControlChannel,
    S: SensorSource,
{
    store: ConfigStore<K>,
    dispatcher: ConfigWriteDispatcher,
    manager: ConnectivityManager<L, T>,
    rpc: RpcHandler<S>,
    reporter: StatusReporter,
    channel: C,
    inputs: NodeInputs,
    restart_at: Option<u64>,
}

impl<K, L, T, C, S> Node<K, L, T, C, S>
where
    K: KvStore,
    L: NetworkLink,
    T: StreamTransport,
    C: ControlChannel,
    S: SensorSource,
{
    pub fn new(
        store: ConfigStore<K>,
        manager: ConnectivityManager<L, T>,
        sensors: S,
        channel: C,
        inputs: NodeInputs,
    ) -> Self {
        Self {
            store,
            dispatcher: ConfigWriteDispatcher::new(),
            manager,
            rpc: RpcHandler::new(sensors),
            reporter: StatusReporter::new(),
            channel,
            inputs,
            restart_at: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        self.store.config()
    }

    pub fn store(&self) -> &ConfigStore<K> {
        &self.store
    }

    pub fn manager(&self) -> &ConnectivityManager<L, T> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectivityManager<L, T> {
        &mut self.manager
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Current status snapshot as JSON.
    pub fn status_json(&self) -> String {
        StatusSnapshot::capture(self.store.config(), &self.manager).to_json()
    }

    /// Issue the first network join and fill the readable attributes.
    pub fn start(&mut self, now_ms: u64) {
        info!("Node starting: {:?}", self.store.config());
        self.manager.start(self.store.config());
        self.channel.sync_readable(self.store.config());
        let status = self.status_json();
        self.channel.set_status(&status);
        self.reporter.mark_pushed(now_ms);
    }

    /// Run one control loop iteration.
    pub fn poll(&mut self, now_ms: u64) -> Option<NodeAction> {
        while let Ok(event) = self.inputs.writes.try_recv() {
            self.apply_write(&event, now_ms);
        }

        while let Ok(event) = self.inputs.link.try_recv() {
            self.manager.on_link_event(event);
        }

        while let Ok(event) = self.inputs.stream.try_recv() {
            self.handle_stream_event(event, now_ms);
        }

        self.manager.tick(self.store.config(), now_ms);

        if self.reporter.is_due(now_ms) {
            let status = self.status_json();
            if self.channel.has_subscriber() {
                self.channel.publish_status(&status);
            } else {
                self.channel.set_status(&status);
            }
            self.reporter.mark_pushed(now_ms);
        }

        match self.restart_at {
            Some(at) if now_ms >= at => {
                info!("Restarting");
                self.restart_at = None;
                Some(NodeAction::Restart)
            }
            _ => None,
        }
    }

    fn apply_write(&mut self, event: &WriteEvent, now_ms: u64) {
        let outcome = self.dispatcher.apply(&mut self.store, event);

        match outcome.intent {
            Some(Intent::RetryNetworkJoin) => self.manager.request_network_join(),
            Some(Intent::ReconfigureStream { lift_auth_block }) => {
                self.manager.request_reconfigure(lift_auth_block)
            }
            Some(Intent::Restart) => {
                if self.restart_at.is_none() {
                    info!("Restart in {} ms", RESTART_GRACE_MS);
                    self.restart_at = Some(now_ms.saturating_add(RESTART_GRACE_MS));
                }
            }
            None => {}
        }

        if outcome.mutated {
            self.channel.sync_readable(self.store.config());
            let status = self.status_json();
            self.channel.publish_status(&status);
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent, now_ms: u64) {
        let Some(request) = self.manager.on_stream_event(event, now_ms) else {
            return;
        };
        for frame in self.rpc.handle(&request, now_ms) {
            if let Err(e) = self.manager.send_text(&frame) {
                warn!("Dropping RPC reply: {}", e);
                break;
            }
        }
    }
}
