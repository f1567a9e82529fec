//! Crypto error types

use thiserror::Error;

/// Errors raised while generating keys or sealing messages.
///
/// Failing to *open* a frame is not an error: frames addressed to other
/// relay clients are expected and simply skipped.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Cryptographic primitive unavailable: {0}")]
    Unavailable(String),

    #[error("Key encoding error: {0}")]
    KeyEncoding(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Message of {size} bytes exceeds the {max} byte limit for this key")]
    MessageTooLarge { size: usize, max: usize },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
