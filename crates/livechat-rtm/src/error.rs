use livechat_core::ProtocolError;

/// Errors raised by the RTM session client.
#[derive(Debug, thiserror::Error)]
pub enum RtmError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to encode `{action}` request: {source}")]
    Encoding {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to decode frame: {0}")]
    Decoding(#[source] serde_json::Error),
    #[error("Request `{action}` failed: {message}")]
    ProtocolFailure {
        action: String,
        request_id: Option<String>,
        message: String,
    },
    #[error("Timed out waiting for a response to request {0}")]
    Timeout(String),
    #[error("Session is closed")]
    SessionClosed,
    #[error("Connection closed by server")]
    ConnectionClosed,
    #[error("Token provider error: {0}")]
    Token(String),
}

impl RtmError {
    /// Whether the error ends the session (as opposed to failing a single call).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RtmError::Transport(_) | RtmError::ConnectionClosed | RtmError::SessionClosed
        )
    }

    /// Whether a supervisor may dial again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RtmError::Transport(_) | RtmError::ConnectionClosed)
    }
}

impl From<ProtocolError> for RtmError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Encoding { action, source } => RtmError::Encoding { action, source },
            ProtocolError::Decoding(source) => RtmError::Decoding(source),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RtmError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RtmError::Transport(err.to_string())
    }
}
