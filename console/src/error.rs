use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("console is not connected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("daemon rejected the token: {0}")]
    AuthRejected(String),

    #[error("token expired")]
    TokenExpired,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl SessionError {
    /// A new token is needed before reconnecting makes sense.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::AuthRejected(_) | SessionError::TokenExpired)
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}
