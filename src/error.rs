//! Error types for the realtime client.

use thiserror::Error;

/// Errors produced by the realtime connection client.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// No auth token available at connect time
    #[error("No auth token available; authenticate before connecting")]
    MissingToken,

    /// Server rejected the connection or session for authorization reasons
    #[error("Authorization rejected: {0}")]
    AuthRejected(String),

    /// Initial connection failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Unexpected connection close
    #[error("Connection closed: code {code}, reason: {reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// Configured retry budget spent without a successful open
    #[error("Gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// JSON encode/decode failure
    #[error("Failed to parse message: {0}")]
    MessageParseError(String),

    /// WebSocket protocol error
    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    /// Not connected
    #[error("Not connected to realtime server")]
    NotConnected,

    /// Internal channel closed
    #[error("Internal channel closed")]
    ChannelClosed,

    /// Invalid URL
    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(String),

    /// Handshake did not complete within the configured window
    #[error("Connect timed out")]
    Timeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl RealtimeError {
    /// Whether this failure class must not be retried automatically.
    ///
    /// Fatal failures are surfaced to the caller; the client stays in
    /// `Failed` until `connect()` is called again explicitly.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RealtimeError::MissingToken | RealtimeError::AuthRejected(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match err {
            Error::ConnectionClosed => RealtimeError::ConnectionClosed {
                code: 1000,
                reason: "Connection closed normally".to_string(),
            },
            Error::AlreadyClosed => RealtimeError::NotConnected,
            Error::Io(e) => RealtimeError::Io(e.to_string()),
            Error::Protocol(e) => RealtimeError::Protocol(e.to_string()),
            Error::Url(e) => RealtimeError::InvalidUrl(e.to_string()),
            Error::Http(resp) => {
                let status = resp.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    RealtimeError::AuthRejected(format!("HTTP {}", status))
                } else {
                    RealtimeError::ConnectionFailed(format!("HTTP error: {:?}", status))
                }
            }
            Error::HttpFormat(e) => RealtimeError::ConnectionFailed(e.to_string()),
            other => RealtimeError::Protocol(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::MessageParseError(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RealtimeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RealtimeError::ChannelClosed
    }
}

/// Result type alias for realtime operations
pub type RtResult<T> = Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RealtimeError::MissingToken.is_fatal());
        assert!(RealtimeError::AuthRejected("bad token".to_string()).is_fatal());
        assert!(!RealtimeError::Timeout.is_fatal());
        assert!(!RealtimeError::ConnectionFailed("refused".to_string()).is_fatal());
        assert!(!RealtimeError::ConnectionClosed {
            code: 1006,
            reason: "abnormal".to_string()
        }
        .is_fatal());
    }
}
