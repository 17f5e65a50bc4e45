use thiserror::Error;

/// All errors generated in `dashboard-sync`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SyncError {
    #[error("SocketError: {0}")]
    Socket(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP error status: {0}")]
    HttpStatus(u16),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),
}

impl SyncError {
    /// Determine if an error only warrants a retry on the next connection or poll cycle.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Socket(_) | SyncError::Http(_) => true,
            SyncError::HttpStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::HttpStatus(status.as_u16()),
            None => Self::Http(value.to_string()),
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(value: url::ParseError) -> Self {
        Self::Endpoint(value.to_string())
    }
}

/// Errors produced while decoding an inbound push-channel frame.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(String),

    #[error("frame is not a message envelope (missing string `type`)")]
    MissingType,

    #[error("`{kind}` payload has the wrong shape: {reason}")]
    Payload { kind: String, reason: String },
}

impl From<serde_json::Error> for DecodeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value.to_string())
    }
}
