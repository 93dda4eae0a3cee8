use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the session facade.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("display name must not be blank")]
    InvalidIdentity,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection attempt cancelled by disconnect")]
    Cancelled,

    #[error("session is already connecting or connected")]
    AlreadyActive,

    #[error("session task is no longer running")]
    Closed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors related to endpoint configuration and the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An inbound body that could not be turned into a chat message.
#[derive(Debug, Error)]
#[error("malformed envelope: {reason}")]
pub struct MalformedEnvelope {
    pub reason: String,
}

impl MalformedEnvelope {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors from the STOMP frame parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("frame ended before the header block was terminated")]
    UnterminatedHeaders,

    #[error("malformed header line '{0}'")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header '{0}'")]
    InvalidEscape(String),

    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),

    #[error("frame body is not terminated by NUL")]
    MissingNul,
}

/// Errors from the WebSocket/STOMP transport. Internal to the session; callers
/// only ever see them folded into [`SessionError::ConnectionFailed`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("broker rejected the connection: {0}")]
    Rejected(String),

    #[error("unexpected {0} frame during handshake")]
    UnexpectedFrame(String),

    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection closed by peer")]
    Closed,
}
