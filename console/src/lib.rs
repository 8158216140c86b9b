//! Realtime console and stats bridge for a server's daemon websocket.

pub mod bridge;
pub mod error;
pub mod events;
pub mod history;
pub mod socket;
pub mod view;

pub use bridge::{ConsoleBridge, SharedBridge};
pub use error::{BridgeError, HistoryError, SessionError};
pub use events::{EventKind, Outbound, SocketFrame, StatsSnapshot};
pub use history::{CommandHistory, HistoryCommand};
pub use view::{ConsoleView, StdoutTerminal, Terminal};
