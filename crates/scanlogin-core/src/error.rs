//! Error types shared across scanlogin crates

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured OAuth2 error, as returned by the provider or relayed by the
/// responding device
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}", display_message(.error, .error_description))]
pub struct OAuth2Error {
    /// OAuth2 error code, e.g. `access_denied`
    pub error: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Correlation state supplied by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

fn display_message(error: &str, description: &Option<String>) -> String {
    match description {
        Some(description) => format!("{} ({})", error, description),
        None => error.to_string(),
    }
}

impl OAuth2Error {
    pub fn new(
        error: impl Into<String>,
        error_description: Option<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error: error.into(),
            error_description,
            state,
        }
    }
}
