//! Host simulator for the aquanode control loop.
//!
//! Runs the real [`Node`] against simulated WiFi, stream and BLE
//! collaborators, with configuration persisted under `~/.aquanode-esp32/`.
//!
//! ```text
//! cargo run --bin host-node
//! ```
//!
//! Type `help` for commands. Frames the device would send to the backend are
//! printed with a `<<` prefix.

use aquanode_esp32::clock::Uptime;
use aquanode_esp32::config::{ConfigStore, StoreError, WriteEvent, CONFIG_NAMESPACE};
use aquanode_esp32::console::{ConsoleCommand, HELP_TEXT};
use aquanode_esp32::link::{ConnectivityManager, StreamEvent};
use aquanode_esp32::node::{Node, NodeAction, NodeInputs};
use aquanode_esp32::persistence_host::FileStore;
use aquanode_esp32::sensor::SyntheticSensors;
use aquanode_esp32::sim::{SimChannel, SimLink, SimStream, SIM_MAC};
use log::{debug, error, info};
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Sender};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Control loop period.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type SimNode = Node<FileStore, SimLink, SimStream, SimChannel, SyntheticSensors>;

/// A node together with the senders the console feeds.
struct Device {
    node: SimNode,
    writes: Sender<WriteEvent>,
    stream: Sender<StreamEvent>,
    notifications_seen: usize,
}

/// Open the persisted configuration and build a freshly booted node.
fn boot(uptime: Uptime) -> Result<Device, StoreError> {
    #[cfg_attr(not(feature = "reset-config-on-new-build"), allow(unused_mut))]
    let mut cfg_kv = FileStore::open_default(CONFIG_NAMESPACE)?;
    info!("Config file: {:?}", cfg_kv.path());

    #[cfg(feature = "reset-config-on-new-build")]
    {
        use aquanode_esp32::config::{reset_if_new_build, SYSTEM_NAMESPACE};

        let mut sys_kv = FileStore::open_default(SYSTEM_NAMESPACE)?;
        reset_if_new_build(&mut sys_kv, &mut cfg_kv, env!("CARGO_PKG_VERSION"))?;
    }

    let (writes, write_rx) = mpsc::channel();
    let (link_tx, link_rx) = mpsc::channel();
    let (stream, stream_rx) = mpsc::channel();

    let manager = ConnectivityManager::new(
        SimLink::new().with_events(link_tx),
        SimStream::new().with_events(stream.clone()),
    );

    let mut channel = SimChannel::new();
    channel.set_subscribed(true);

    let mut node = Node::new(
        ConfigStore::load(cfg_kv),
        manager,
        SyntheticSensors::from_mac(SIM_MAC),
        channel,
        NodeInputs::new(write_rx, link_rx, stream_rx),
    );
    node.start(uptime.now_ms());

    Ok(Device {
        node,
        writes,
        stream,
        notifications_seen: 0,
    })
}

/// Print a line for the console user.
fn print_line(msg: &str) {
    println!("{}", msg);
    let _ = std::io::stdout().flush();
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Apply one console command. Returns `false` when the user quits.
fn handle_command(device: &mut Device, cmd: ConsoleCommand, uptime: Uptime) -> bool {
    match cmd {
        ConsoleCommand::Write { field, value } => {
            let event = WriteEvent::new(field, value.as_bytes(), uptime.now_ms());
            let _ = device.writes.send(event);
        }
        ConsoleCommand::Link(up) => {
            device.node.manager_mut().link_mut().set_associated(up);
        }
        ConsoleCommand::Subscribe(on) => {
            device.node.channel_mut().set_subscribed(on);
        }
        ConsoleCommand::Recv(text) => {
            let _ = device.stream.send(StreamEvent::Text(text));
        }
        ConsoleCommand::Status => print_line(&device.node.status_json()),
        ConsoleCommand::Help => print_line(HELP_TEXT),
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Unknown(msg) => {
            if !msg.is_empty() {
                print_line(&msg);
            }
        }
    }
    true
}

/// Print what the device sent since the last call.
fn drain_output(device: &mut Device) {
    for frame in device.node.manager_mut().stream_mut().take_sent() {
        print_line(&format!("<< {}", frame));
    }

    let notifications = device.node.channel().notifications();
    for status in &notifications[device.notifications_seen..] {
        debug!("status notify: {}", status);
    }
    device.notifications_seen = notifications.len();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Aquanode host simulator starting ===");

    let mut uptime = Uptime::new();
    let mut device = match boot(uptime) {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to open configuration: {}", e);
            return;
        }
    };

    let cancel = CancellationToken::new();
    let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::unbounded_channel();

    let stdin_cancel = cancel.clone();
    let _stdin_task = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();

        while !stdin_cancel.is_cancelled() {
            match lines.next() {
                Some(Ok(line)) => {
                    if cmd_tx.send(ConsoleCommand::parse(&line)).is_err() {
                        break;
                    }
                }
                Some(Err(_)) | None => {
                    let _ = cmd_tx.send(ConsoleCommand::Quit);
                    break;
                }
            }
        }
    });

    print_line(HELP_TEXT);
    print_prompt();

    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                print_line("\nShutting down...");
                break;
            }
            Some(cmd) = cmd_rx.recv() => {
                if !handle_command(&mut device, cmd, uptime) {
                    break;
                }
                print_prompt();
            }
            _ = ticker.tick() => {
                let action = device.node.poll(uptime.now_ms());
                drain_output(&mut device);

                if let Some(NodeAction::Restart) = action {
                    print_line("Restarting...");
                    uptime = Uptime::new();
                    device = match boot(uptime) {
                        Ok(device) => device,
                        Err(e) => {
                            error!("Failed to reload configuration: {}", e);
                            break;
                        }
                    };
                }
            }
        }
    }

    cancel.cancel();
    info!("Simulator stopped");
    // The stdin reader may still be blocked on a read
    std::process::exit(0);
}
