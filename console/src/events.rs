//! Websocket frames exchanged with the daemon.
//!
//! Every frame is `{"event": <name>, "args": [<string>...]}` in both
//! directions.

use serde::{Deserialize, Serialize};

pub const AUTH_SUCCESS: &str = "auth success";
pub const TOKEN_EXPIRING: &str = "token expiring";
pub const TOKEN_EXPIRED: &str = "token expired";
pub const JWT_ERROR: &str = "jwt error";

/// Events the daemon pushes that UI handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    ConsoleOutput,
    InstallOutput,
    DaemonMessage,
    DaemonError,
    Stats,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Status,
        EventKind::ConsoleOutput,
        EventKind::InstallOutput,
        EventKind::DaemonMessage,
        EventKind::DaemonError,
        EventKind::Stats,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::ConsoleOutput => "console output",
            EventKind::InstallOutput => "install output",
            EventKind::DaemonMessage => "daemon message",
            EventKind::DaemonError => "daemon error",
            EventKind::Stats => "stats",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketFrame {
    pub event: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl SocketFrame {
    pub fn new(event: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_wire(&self.event)
    }

    /// Payload of single-argument events, empty when there is none.
    pub fn first_arg(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

/// Commands sent from the console to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Auth(String),
    SendLogs,
    SendStats,
    SendCommand(String),
}

impl Outbound {
    pub fn event(&self) -> &'static str {
        match self {
            Outbound::Auth(_) => "auth",
            Outbound::SendLogs => "send logs",
            Outbound::SendStats => "send stats",
            Outbound::SendCommand(_) => "send command",
        }
    }

    pub fn to_frame(&self) -> SocketFrame {
        let args = match self {
            Outbound::Auth(value) | Outbound::SendCommand(value) => vec![value.clone()],
            Outbound::SendLogs | Outbound::SendStats => Vec::new(),
        };
        SocketFrame::new(self.event(), args)
    }

    pub fn encode(&self) -> String {
        // A struct of strings always serializes.
        serde_json::to_string(&self.to_frame()).unwrap_or_default()
    }
}

/// Resource usage carried by a `stats` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub memory_bytes: u64,
    pub cpu_absolute: f64,
    pub disk_bytes: u64,
}

impl StatsSnapshot {
    /// `None` for payloads that are not a stats object.
    pub fn parse(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}
