//! Renders daemon events into a terminal.

use crate::bridge::ConsoleBridge;
use crate::events::{EventKind, StatsSnapshot};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const PRELUDE: &str = "\x1b[1m\x1b[33mcontainer@pterodactyl~ \x1b[0m";
const ERROR_STYLE: &str = "\x1b[1m\x1b[41m";
const RESET: &str = "\x1b[0m";

pub trait Terminal: Send {
    fn write_line(&mut self, line: &str);
    fn clear(&mut self);
}

pub struct StdoutTerminal;

impl Terminal for StdoutTerminal {
    fn write_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
    }

    fn clear(&mut self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\x1b[2J\x1b[H");
        let _ = out.flush();
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
}

pub fn format_output(line: &str) -> String {
    format!("{}{}", strip_line_ending(line), RESET)
}

pub fn format_daemon_message(line: &str) -> String {
    format!("{}{}{}", PRELUDE, strip_line_ending(line), RESET)
}

pub fn format_daemon_error(line: &str) -> String {
    format!("{}{}{}{}", PRELUDE, ERROR_STYLE, strip_line_ending(line), RESET)
}

pub fn format_status(state: &str) -> String {
    format!("{}Server marked as {}...{}", PRELUDE, state, RESET)
}

/// Terminal state shared by the event handlers registered on a bridge.
pub struct ConsoleView<T> {
    terminal: Arc<Mutex<T>>,
    stats: Arc<Mutex<Option<StatsSnapshot>>>,
    input_enabled: Arc<AtomicBool>,
}

impl<T> Clone for ConsoleView<T> {
    fn clone(&self) -> Self {
        Self {
            terminal: self.terminal.clone(),
            stats: self.stats.clone(),
            input_enabled: self.input_enabled.clone(),
        }
    }
}

fn guard<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: Terminal + 'static> ConsoleView<T> {
    pub fn new(terminal: T) -> Self {
        Self {
            terminal: Arc::new(Mutex::new(terminal)),
            stats: Arc::new(Mutex::new(None)),
            input_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn writer(&self, format: fn(&str) -> String) -> impl FnMut(&str) + Send + 'static {
        let terminal = self.terminal.clone();
        move |line: &str| guard(&terminal).write_line(&format(line))
    }

    pub fn attach(&self, bridge: &mut ConsoleBridge) {
        bridge.on(EventKind::Status, self.writer(format_status));
        bridge.on(EventKind::ConsoleOutput, self.writer(format_output));
        bridge.on(EventKind::InstallOutput, self.writer(format_output));
        bridge.on(EventKind::DaemonMessage, self.writer(format_daemon_message));
        bridge.on(EventKind::DaemonError, self.writer(format_daemon_error));

        let stats = self.stats.clone();
        bridge.on(EventKind::Stats, move |payload| match StatsSnapshot::parse(payload) {
            Some(snapshot) => *guard(&stats) = Some(snapshot),
            None => tracing::debug!(payload, "ignoring malformed stats"),
        });

        let terminal = self.terminal.clone();
        let input_enabled = self.input_enabled.clone();
        bridge.on_connection(move |connected| {
            if connected {
                guard(&terminal).clear();
            }
            input_enabled.store(connected, Ordering::SeqCst);
        });
    }

    pub fn detach(&self, bridge: &mut ConsoleBridge) {
        for kind in EventKind::ALL {
            bridge.off(kind);
        }
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        *guard(&self.stats)
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled.load(Ordering::SeqCst)
    }

    pub fn terminal(&self) -> MutexGuard<'_, T> {
        guard(&self.terminal)
    }
}
