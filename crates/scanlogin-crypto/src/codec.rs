//! Message sealing and trial decryption
//!
//! Outbound messages are JSON, encrypted with RSA-OAEP (SHA-512) under the
//! recipient's public key and base64 encoded. Inbound relay frames carry no
//! addressing: the relay is shared, so a frame is opened by trying each
//! candidate session in turn. A frame no candidate can open belonged to
//! someone else and is dropped without comment.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Session;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use scanlogin_core::{Message, RelayEnvelope};
use sha2::Sha512;
use tracing::debug;

/// OAEP overhead for a SHA-512 digest: two hashes plus two bytes
const OAEP_SHA512_OVERHEAD: usize = 2 * 64 + 2;

/// Largest plaintext `key` can seal in a single OAEP block
pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_SHA512_OVERHEAD)
}

/// Encrypt `message` for the holder of `key`, returning base64 ciphertext
pub fn encrypt_message(key: &RsaPublicKey, message: &Message) -> CryptoResult<String> {
    let plaintext = serde_json::to_vec(message)?;
    let max = max_plaintext_len(key);
    if plaintext.len() > max {
        return Err(CryptoError::MessageTooLarge {
            size: plaintext.len(),
            max,
        });
    }

    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Oaep::new::<Sha512>(), &plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(BASE64.encode(ciphertext))
}

/// Seal `message` and wrap it in a direct-message envelope for the relay
pub fn seal_direct_message(
    key: &RsaPublicKey,
    recipient_client_id: &str,
    message: &Message,
) -> CryptoResult<RelayEnvelope> {
    Ok(RelayEnvelope::DirectMessage {
        recipient_client_id: recipient_client_id.to_string(),
        message: encrypt_message(key, message)?,
    })
}

/// Try to open `frame` with each candidate in order; the first session whose
/// key decrypts it wins.
///
/// Returns `None` when the frame is not base64 or no candidate can decrypt
/// it. Both are normal on a shared relay.
pub fn open<'a, I>(candidates: I, frame: &str) -> Option<(&'a Session, Vec<u8>)>
where
    I: IntoIterator<Item = &'a Session>,
{
    let ciphertext = BASE64.decode(frame.trim()).ok()?;

    let mut rng = rand::thread_rng();
    candidates.into_iter().find_map(|session| {
        session
            .key_pair()
            .private_key()
            .decrypt_blinded(&mut rng, Oaep::new::<Sha512>(), &ciphertext)
            .ok()
            .map(|plaintext| (session, plaintext))
    })
}

/// [`open`] on the blocking pool. Each candidate costs one private-key
/// operation, so this is the variant to use from async code.
pub async fn open_async(
    candidates: Vec<Session>,
    frame: String,
) -> CryptoResult<Option<(Session, Vec<u8>)>> {
    tokio::task::spawn_blocking(move || {
        open(&candidates, &frame).map(|(session, plaintext)| (session.clone(), plaintext))
    })
    .await
    .map_err(|e| CryptoError::Unavailable(format!("decryption task failed: {}", e)))
}

/// Classify a decrypted payload.
///
/// Unknown discriminants and malformed payloads yield `None` so newer
/// responders can add message types without breaking older initiators.
pub fn decode_message(plaintext: &[u8]) -> Option<Message> {
    let value: serde_json::Value = match serde_json::from_slice(plaintext) {
        Ok(value) => value,
        Err(e) => {
            debug!("Ignoring non-JSON payload: {}", e);
            return None;
        }
    };

    let kind = value.get("type").and_then(|t| t.as_str())?.to_string();
    if !Message::is_known_type(&kind) {
        debug!("Ignoring message with unknown type {}", kind);
        return None;
    }

    match serde_json::from_value(value) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("Ignoring malformed {} message: {}", kind, e);
            None
        }
    }
}
