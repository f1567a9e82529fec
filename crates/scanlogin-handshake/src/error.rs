//! Handshake error types

use scanlogin_client::ClientError;
use scanlogin_core::OAuth2Error;
use scanlogin_crypto::CryptoError;
use thiserror::Error;

/// Who ended a cancelled login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOrigin {
    /// The local caller cancelled
    Caller,
    /// The responding device cancelled; carries `access_denied` and the
    /// caller's state
    Remote(OAuth2Error),
}

/// Handshake errors
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Session store, relay or token endpoint failure
    #[error("Transport error: {0}")]
    Transport(ClientError),

    /// The provider rejected the login
    #[error("OAuth2 error: {0}")]
    OAuth2(OAuth2Error),

    #[error("Login cancelled")]
    Cancelled { origin: CancelOrigin },

    #[error("QR login is not enabled for client {0}")]
    QrNotEnabled(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Crypto unavailable: {0}")]
    Crypto(#[from] CryptoError),

    /// The handshake went away without settling
    #[error("Handshake ended without a result")]
    Abandoned,
}

impl HandshakeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HandshakeError::Cancelled { .. })
    }
}

impl From<ClientError> for HandshakeError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::OAuth2(error) => HandshakeError::OAuth2(error),
            other => HandshakeError::Transport(other),
        }
    }
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_split_by_kind() {
        let oauth = OAuth2Error::new("invalid_grant", None, Some("xyz".to_string()));
        assert!(matches!(
            HandshakeError::from(ClientError::OAuth2(oauth)),
            HandshakeError::OAuth2(OAuth2Error { ref error, .. }) if error == "invalid_grant"
        ));
        assert!(matches!(
            HandshakeError::from(ClientError::RelayClosed),
            HandshakeError::Transport(ClientError::RelayClosed)
        ));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let cancelled = HandshakeError::Cancelled {
            origin: CancelOrigin::Caller,
        };
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.to_string(), "Login cancelled");
        assert!(!HandshakeError::OAuth2(OAuth2Error::new("access_denied", None, None)).is_cancelled());
    }
}
