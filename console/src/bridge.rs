use crate::error::BridgeError;
use crate::events::{EventKind, Outbound, SocketFrame};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

pub type Handler = Box<dyn FnMut(&str) + Send>;
pub type ConnectionListener = Box<dyn FnMut(bool) + Send>;

/// Bridge shared between the socket task and whatever reads user input.
pub type SharedBridge = Arc<Mutex<ConsoleBridge>>;

/// Routes daemon events to one handler per kind and carries console input
/// back out while a connection is up.
#[derive(Default)]
pub struct ConsoleBridge {
    handlers: HashMap<EventKind, Handler>,
    listener: Option<ConnectionListener>,
    outbound: Option<UnboundedSender<Outbound>>,
}

impl ConsoleBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedBridge {
        Arc::new(Mutex::new(self))
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    /// Returns whether a handler was removed.
    pub fn off(&mut self, kind: EventKind) -> bool {
        self.handlers.remove(&kind).is_some()
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Called with `true` on connect and `false` on disconnect.
    pub fn on_connection<F>(&mut self, listener: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn connected(&mut self, sender: UnboundedSender<Outbound>) -> Result<(), BridgeError> {
        self.outbound = Some(sender);
        if let Some(listener) = self.listener.as_mut() {
            listener(true);
        }
        self.send(Outbound::SendLogs)?;
        self.send(Outbound::SendStats)
    }

    /// Drops the outbound channel. Anything not yet written is lost.
    pub fn disconnected(&mut self) {
        if self.outbound.take().is_some() {
            if let Some(listener) = self.listener.as_mut() {
                listener(false);
            }
        }
    }

    pub fn send_command(&self, command: &str) -> Result<(), BridgeError> {
        self.send(Outbound::SendCommand(command.to_string()))
    }

    fn send(&self, message: Outbound) -> Result<(), BridgeError> {
        let sender = self.outbound.as_ref().ok_or(BridgeError::Disconnected)?;
        sender.send(message).map_err(|_| BridgeError::Disconnected)
    }

    /// Returns whether a handler ran.
    pub fn dispatch(&mut self, frame: &SocketFrame) -> bool {
        let Some(kind) = frame.kind() else {
            tracing::debug!(event = %frame.event, "ignoring unknown console event");
            return false;
        };

        match self.handlers.get_mut(&kind) {
            Some(handler) => {
                handler(frame.first_arg());
                true
            }
            None => false,
        }
    }
}

pub fn lock(bridge: &SharedBridge) -> MutexGuard<'_, ConsoleBridge> {
    bridge.lock().unwrap_or_else(|e| e.into_inner())
}
