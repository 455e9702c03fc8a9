use thiserror::Error;

/// Error type returned by user event handlers.
///
/// Any error implementing [`std::error::Error`] converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A convenience `Result` alias using [`RtmError`].
pub type RtmResult<T> = Result<T, RtmError>;

/// Top-level error type for the rtmbot client.
#[derive(Error, Debug)]
pub enum RtmError {
    /// HTTP or connection-level failure: the handshake request could not be
    /// sent, the dial failed, the certificate check failed, or a write failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The handshake reported `ok = false` or returned a malformed body.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A registered event handler reported failure.
    #[error("{event} handler failed: {source}")]
    Callback {
        /// Type tag of the event being handled.
        event: &'static str,
        /// The error returned by the handler.
        #[source]
        source: BoxError,
    },

    /// Disconnect was requested on a session that is already disconnected.
    #[error("Session is already disconnected")]
    AlreadyDisconnected,

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_callback_error_keeps_source() {
        let inner: BoxError = "boom".into();
        let err = RtmError::Callback {
            event: "message",
            source: inner,
        };
        assert_eq!(err.to_string(), "message handler failed: boom");
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn test_protocol_error_message() {
        let err = RtmError::Protocol("invalid_auth".into());
        assert_eq!(err.to_string(), "Protocol error: invalid_auth");
    }
}
