//! Line commands for the host simulator.
//!
//! The console stands in for the phone app and the backend: `set` performs a
//! control-channel write, `recv` injects a frame as if the backend sent it,
//! and `link` toggles the simulated WiFi association.

use crate::config::ConfigField;

/// Parsed console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Write `value` to a control-channel attribute.
    Write { field: ConfigField, value: String },
    /// Associate (`true`) or drop (`false`) the simulated network.
    Link(bool),
    /// Toggle the status subscription of the simulated central.
    Subscribe(bool),
    /// Deliver a text frame on the stream.
    Recv(String),
    /// Print the current status snapshot.
    Status,
    /// Show help.
    Help,
    /// Leave the simulator.
    Quit,
    /// Unknown or invalid command.
    Unknown(String),
}

fn parse_switch(arg: &str) -> Option<bool> {
    match arg.to_lowercase().as_str() {
        "up" | "on" | "1" => Some(true),
        "down" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ConsoleCommand {
    /// Parse a command from an input line.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return ConsoleCommand::Unknown(String::new());
        }

        let mut parts = input.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim();

        match cmd.to_lowercase().as_str() {
            "set" | "w" => {
                let mut set_parts = args.splitn(2, ' ');
                let field = set_parts.next().unwrap_or("");
                // Values keep inner spaces (SSIDs may contain them)
                let value = set_parts.next().unwrap_or("").to_string();
                match field.parse::<ConfigField>() {
                    Ok(field) => ConsoleCommand::Write { field, value },
                    Err(_) => ConsoleCommand::Unknown(
                        "Usage: set <name|token|ssid|pass|host|port|cmd> <value>".to_string(),
                    ),
                }
            }
            "link" => match parse_switch(args) {
                Some(up) => ConsoleCommand::Link(up),
                None => ConsoleCommand::Unknown("Usage: link <up|down>".to_string()),
            },
            "sub" | "subscribe" => match parse_switch(args) {
                Some(on) => ConsoleCommand::Subscribe(on),
                None => ConsoleCommand::Unknown("Usage: sub <on|off>".to_string()),
            },
            "recv" | "r" => {
                if args.is_empty() {
                    ConsoleCommand::Unknown("Usage: recv <json>".to_string())
                } else {
                    ConsoleCommand::Recv(args.to_string())
                }
            }
            "status" | "stat" | "s" => ConsoleCommand::Status,
            "help" | "h" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(format!(
                "Unknown command: {}. Type 'help' for commands.",
                cmd
            )),
        }
    }
}

/// Help text for available commands.
pub const HELP_TEXT: &str = r#"
Available commands:
  set <field> <value>  Control-channel write (name, token, ssid, pass, host, port, cmd)
  link <up|down>       Associate or drop the simulated WiFi network
  sub <on|off>         Subscribe the simulated central to status notifications
  recv <json>          Deliver a frame as if sent by the backend
  status               Show the status snapshot
  help                 Show this help
  quit                 Exit

Shortcuts: w=set, r=recv, s=status, h=help, q=quit

Examples:
  set ssid Reef Lab
  set host wss://api.example.com/
  recv {"id":"1","method":"get_last_n","params":{"n":3}}
  recv {"type":"auth_error","reason":"expired"}
  set cmd reboot
"#;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Write Tests ====================

    #[test]
    fn test_parse_set() {
        match ConsoleCommand::parse("set host api.example.com") {
            ConsoleCommand::Write { field, value } => {
                assert_eq!(field, ConfigField::EndpointHost);
                assert_eq!(value, "api.example.com");
            }
            other => panic!("Expected Write, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_keeps_spaces_in_value() {
        assert_eq!(
            ConsoleCommand::parse("w ssid Reef Lab 5G"),
            ConsoleCommand::Write {
                field: ConfigField::Ssid,
                value: "Reef Lab 5G".to_string()
            }
        );
    }

    #[test]
    fn test_parse_set_empty_value() {
        assert_eq!(
            ConsoleCommand::parse("set pass"),
            ConsoleCommand::Write {
                field: ConfigField::Passphrase,
                value: String::new()
            }
        );
    }

    #[test]
    fn test_parse_set_unknown_field() {
        assert!(matches!(
            ConsoleCommand::parse("set colour blue"),
            ConsoleCommand::Unknown(_)
        ));
        assert!(matches!(
            ConsoleCommand::parse("set"),
            ConsoleCommand::Unknown(_)
        ));
    }

    // ==================== Simulation Control Tests ====================

    #[test]
    fn test_parse_link() {
        assert_eq!(ConsoleCommand::parse("link up"), ConsoleCommand::Link(true));
        assert_eq!(ConsoleCommand::parse("LINK Down"), ConsoleCommand::Link(false));
        assert!(matches!(
            ConsoleCommand::parse("link sideways"),
            ConsoleCommand::Unknown(_)
        ));
    }

    #[test]
    fn test_parse_subscribe() {
        assert_eq!(ConsoleCommand::parse("sub on"), ConsoleCommand::Subscribe(true));
        assert_eq!(
            ConsoleCommand::parse("subscribe off"),
            ConsoleCommand::Subscribe(false)
        );
    }

    #[test]
    fn test_parse_recv() {
        assert_eq!(
            ConsoleCommand::parse(r#"recv {"id":"1", "method":"get_latest"}"#),
            ConsoleCommand::Recv(r#"{"id":"1", "method":"get_latest"}"#.to_string())
        );
        assert!(matches!(
            ConsoleCommand::parse("recv"),
            ConsoleCommand::Unknown(_)
        ));
    }

    // ==================== Misc Tests ====================

    #[test]
    fn test_parse_shortcuts() {
        assert_eq!(ConsoleCommand::parse("s"), ConsoleCommand::Status);
        assert_eq!(ConsoleCommand::parse("?"), ConsoleCommand::Help);
        assert_eq!(ConsoleCommand::parse("q"), ConsoleCommand::Quit);
    }

    #[test]
    fn test_parse_unknown() {
        match ConsoleCommand::parse("launch") {
            ConsoleCommand::Unknown(msg) => assert!(msg.contains("launch")),
            other => panic!("Expected Unknown, got {:?}", other),
        }
        assert_eq!(
            ConsoleCommand::parse("   "),
            ConsoleCommand::Unknown(String::new())
        );
    }
}
