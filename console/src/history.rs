use crate::error::HistoryError;
use std::path::{Path, PathBuf};

pub const HISTORY_LIMIT: usize = 32;

/// Line commands the console reads instead of sending them to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCommand {
    List,
    Up,
    Down,
    /// Send the entry currently selected with up/down.
    Repeat,
}

impl HistoryCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            ":history" => Some(Self::List),
            ":up" => Some(Self::Up),
            ":down" => Some(Self::Down),
            ":!" => Some(Self::Repeat),
            _ => None,
        }
    }
}

/// Recently sent console commands, most recent first.
///
/// `index` is `-1` while the user is typing fresh input; `up` walks towards
/// older entries and `down` back towards fresh input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHistory {
    entries: Vec<String>,
    index: isize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: -1,
        }
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(mut entries: Vec<String>) -> Self {
        entries.truncate(HISTORY_LIMIT);
        Self { entries, index: -1 }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn index(&self) -> isize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a sent command and returns to fresh input.
    pub fn push(&mut self, command: &str) {
        if command.is_empty() {
            return;
        }
        self.entries.insert(0, command.to_string());
        self.entries.truncate(HISTORY_LIMIT);
        self.index = -1;
    }

    /// The entry to show in the input, empty for fresh input.
    pub fn current(&self) -> &str {
        usize::try_from(self.index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn up(&mut self) -> &str {
        let last = self.entries.len() as isize - 1;
        self.index = (self.index + 1).min(last);
        self.current()
    }

    pub fn down(&mut self) -> &str {
        self.index = (self.index - 1).max(-1);
        self.current()
    }

    pub fn path(dir: &Path, server: &str) -> PathBuf {
        dir.join(format!("{}.history.json", server))
    }

    /// A missing file is an empty history.
    pub async fn load(dir: &Path, server: &str) -> Result<Self, HistoryError> {
        match tokio::fs::read(Self::path(dir, server)).await {
            Ok(bytes) => Ok(Self::from_entries(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, dir: &Path, server: &str) -> Result<(), HistoryError> {
        tokio::fs::create_dir_all(dir).await?;
        let json = serde_json::to_vec(&self.entries)?;
        tokio::fs::write(Self::path(dir, server), json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(commands: &[&str]) -> CommandHistory {
        let mut history = CommandHistory::new();
        for command in commands {
            history.push(command);
        }
        history
    }

    #[test]
    fn newest_first_and_capped() {
        let mut history = CommandHistory::new();
        for i in 0..40 {
            history.push(&format!("cmd {}", i));
        }
        history.push("");

        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.entries()[0], "cmd 39");
        assert_eq!(history.entries()[HISTORY_LIMIT - 1], "cmd 8");
    }

    #[test]
    fn navigation_stops_at_both_ends() {
        let mut history = history(&["first", "second"]);
        assert_eq!(history.index(), -1);

        assert_eq!(history.up(), "second");
        assert_eq!(history.up(), "first");
        assert_eq!(history.up(), "first");
        assert_eq!(history.index(), 1);

        assert_eq!(history.down(), "second");
        assert_eq!(history.down(), "");
        assert_eq!(history.down(), "");
        assert_eq!(history.index(), -1);
    }

    #[test]
    fn pushing_resets_navigation() {
        let mut history = history(&["first"]);
        history.up();
        history.push("second");

        assert_eq!(history.index(), -1);
        assert_eq!(history.up(), "second");
    }

    #[test]
    fn empty_history_stays_on_fresh_input() {
        let mut history = CommandHistory::new();
        assert_eq!(history.up(), "");
        assert_eq!(history.index(), -1);
    }

    #[test]
    fn console_lines_map_to_history_commands() {
        assert_eq!(HistoryCommand::parse(":history"), Some(HistoryCommand::List));
        assert_eq!(HistoryCommand::parse(":up"), Some(HistoryCommand::Up));
        assert_eq!(HistoryCommand::parse(":down"), Some(HistoryCommand::Down));
        assert_eq!(HistoryCommand::parse(":!"), Some(HistoryCommand::Repeat));
        assert_eq!(HistoryCommand::parse("say :up"), None);
        assert_eq!(HistoryCommand::parse("list"), None);
    }

    #[test]
    fn repeat_uses_the_selected_entry() {
        let mut history = history(&["first", "second"]);
        assert_eq!(history.current(), "");

        history.up();
        history.up();
        assert_eq!(history.current(), "first");

        let selected = history.current().to_string();
        history.push(&selected);
        assert_eq!(history.entries()[0], "first");
        assert_eq!(history.current(), "");
    }

    #[tokio::test]
    async fn persists_per_server() {
        let dir = std::env::temp_dir().join(format!("panel-console-history-{}", std::process::id()));
        let saved = history(&["op admin", "list"]);

        saved.save(&dir, "1a2b3c4d").await.unwrap();
        let loaded = CommandHistory::load(&dir, "1a2b3c4d").await.unwrap();
        let other = CommandHistory::load(&dir, "ffffffff").await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(loaded.entries(), saved.entries());
        assert!(other.is_empty());
        assert!(CommandHistory::path(&dir, "1a2b3c4d").ends_with("1a2b3c4d.history.json"));
    }
}
