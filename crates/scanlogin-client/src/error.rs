//! Client error types

use scanlogin_core::OAuth2Error;
use thiserror::Error;

/// Errors from remote collaborators
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid authorize request: {0}")]
    InvalidRequest(String),

    #[error("Relay connection failed: {0}")]
    RelayConnect(String),

    #[error("Relay connection closed")]
    RelayClosed,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OAuth2 error: {0}")]
    OAuth2(#[from] OAuth2Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Build a status error from a non-success response, keeping its body as
    /// the message
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ClientError::Status { status, message }
    }
}
