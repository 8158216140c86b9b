use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonFailure {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("daemon responded with HTTP {0}")]
    Status(StatusCode),
}

/// A request to the daemon did not complete. `fatal` tells the caller whether
/// the failure should abort the larger operation it was part of.
#[derive(Debug, Error)]
#[error("could not communicate with the daemon on node {node}: {failure} (fatal: {fatal})")]
pub struct DaemonConnectionError {
    node: String,
    fatal: bool,
    #[source]
    failure: DaemonFailure,
}

impl DaemonConnectionError {
    pub fn new(node: impl Into<String>, fatal: bool, failure: DaemonFailure) -> Self {
        Self {
            node: node.into(),
            fatal,
            failure,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn failure(&self) -> &DaemonFailure {
        &self.failure
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.failure {
            DaemonFailure::Status(status) => Some(*status),
            DaemonFailure::Transport(err) => err.status(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Marks the failure as tolerated by the caller.
    pub fn downgrade(mut self) -> Self {
        self.fatal = false;
        self
    }
}
