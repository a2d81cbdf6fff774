//! Error handling for the alert channel.

use std::{str::Utf8Error, time::Duration};

use thiserror::Error;

/// The main result type used throughout the alert channel.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Error type for every channel, codec and REST operation.
///
/// Errors are `Clone` because the outcome of a single connection attempt is
/// delivered to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// WebSocket transport errors
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// STOMP `ERROR` frame or handshake violation
    #[error("STOMP protocol error: {message}")]
    Protocol { message: String },

    /// Connection closed by the peer or the network
    #[error("Connection closed: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ConnectionClosed { reason: Option<String> },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Malformed STOMP frame
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// HTTP client errors from the REST collaborator
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// API error response
    #[error("API error: status={status}, body={body}")]
    Api { status: u16, body: String },

    /// A pending connect was abandoned by `disconnect()`
    #[error("Connect attempt cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<Utf8Error> for ChannelError {
    fn from(e: Utf8Error) -> Self {
        Self::Frame {
            message: format!("invalid UTF-8: {e}"),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::connection_closed(None),
            other => Self::WebSocket {
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http {
            message: e.to_string(),
        }
    }
}

impl ChannelError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a STOMP protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a frame error.
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a connection-closed error.
    pub fn connection_closed(reason: Option<String>) -> Self {
        Self::ConnectionClosed { reason }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an API error.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Whether the reconnection policy should treat this as a plain close
    /// rather than an error.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::WebSocket { .. }
            | Self::ConnectionClosed { .. }
            | Self::Timeout { .. }
            | Self::Protocol { .. }
            | Self::Http { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Config { .. }
            | Self::Serialization { .. }
            | Self::Frame { .. }
            | Self::Cancelled => false,
        }
    }
}
