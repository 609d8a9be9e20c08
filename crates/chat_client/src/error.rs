use chat_shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing, rejected, or expired credential. The session is over.
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    /// Input rejected before any network round-trip.
    #[error("{0}")]
    Validation(String),
    #[error("transport is not connected")]
    TransportNotReady,
    /// The gateway answered `success: false`; the message is shown as-is.
    #[error("{0}")]
    Remote(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid gateway response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthFailure(_) => ErrorCode::AuthFailure,
            Self::Validation(_) => ErrorCode::Validation,
            Self::TransportNotReady => ErrorCode::TransportNotReady,
            Self::Remote(_) => ErrorCode::Remote,
            Self::Http(_) | Self::Decode(_) | Self::InvalidUrl(_) => ErrorCode::Network,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<&ClientError> for ApiError {
    fn from(value: &ClientError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}
