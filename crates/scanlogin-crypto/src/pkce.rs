//! PKCE (RFC 7636) verifier/challenge generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The only challenge method we generate
pub const S256: &str = "S256";

/// PKCE material. The verifier stays on the initiating device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pkce {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Pkce {
    /// Generate a random verifier and its S256 challenge
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 32] = rng.gen();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Derive the S256 challenge for an existing verifier
    pub fn from_verifier(code_verifier: String) -> Self {
        Self {
            code_challenge: challenge_for(&code_verifier),
            code_verifier,
            code_challenge_method: S256.to_string(),
        }
    }
}

/// `BASE64URL(SHA256(verifier))` without padding
pub fn challenge_for(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
