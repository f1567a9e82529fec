//! Session identity and key management
//!
//! Generates the per-session RSA key pairs backing each QR code and handles
//! SPKI export/import of the public half.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use scanlogin_core::config::DEFAULT_KEY_BITS;
use scanlogin_core::RSA_OAEP;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID (32 lowercase hex characters)
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// RSA-OAEP key pair. The private half never leaves this process.
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair with public exponent 65537
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::Unavailable(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Algorithm identifier published alongside the public key
    pub fn algorithm(&self) -> &'static str {
        RSA_OAEP
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// One published `{id, key pair}` pairing, i.e. one QR code generation
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    key_pair: Arc<KeyPair>,
}

impl Session {
    /// Generate a session synchronously. Prefer [`KeyManager::generate_session`]
    /// from async code.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        Ok(Self {
            id: SessionId::new(),
            key_pair: Arc::new(KeyPair::generate(bits)?),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// Mints sessions off the async executor
#[derive(Debug, Clone)]
pub struct KeyManager {
    bits: usize,
}

impl KeyManager {
    pub fn new(bits: usize) -> Self {
        Self { bits }
    }

    /// Create a new session with a fresh key pair.
    ///
    /// Key generation runs on the blocking pool.
    pub async fn generate_session(&self) -> CryptoResult<Session> {
        let bits = self.bits;
        let session = tokio::task::spawn_blocking(move || Session::generate(bits))
            .await
            .map_err(|e| CryptoError::Unavailable(format!("key generation task failed: {}", e)))??;

        debug!("Generated session {}", session.id);
        Ok(session)
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_BITS)
    }
}

/// Serialize the session's public key as SPKI DER
pub fn export_public_key(session: &Session) -> CryptoResult<Vec<u8>> {
    let document = session
        .key_pair
        .public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
    Ok(document.as_bytes().to_vec())
}

/// Serialize the session's public key as base64 SPKI DER, the form published
/// in session records
pub fn export_public_key_base64(session: &Session) -> CryptoResult<String> {
    Ok(BASE64.encode(export_public_key(session)?))
}

/// Parse a base64 SPKI DER public key from a session record
pub fn import_public_key_base64(input: &str) -> CryptoResult<RsaPublicKey> {
    let der = BASE64.decode(input)?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}
