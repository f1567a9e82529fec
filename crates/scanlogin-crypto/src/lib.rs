//! scanlogin Crypto - Session keys and end-to-end message sealing
//!
//! Every displayed QR code is backed by a [`Session`]: a random identifier and
//! a fresh RSA-OAEP (SHA-512) key pair whose public half is published to the
//! session store. The responding device seals its messages with that public
//! key; the initiating device trial-decrypts every relay frame against the
//! sessions it still considers live.
//!
//! # Example
//!
//! ```no_run
//! use scanlogin_core::Message;
//! use scanlogin_crypto::{codec, KeyManager};
//!
//! async fn example() {
//!     let keys = KeyManager::default();
//!     let session = keys.generate_session().await.unwrap();
//!
//!     let frame = codec::encrypt_message(session.key_pair().public_key(), &Message::Cancel).unwrap();
//!     let (opened, plaintext) = codec::open([&session], &frame).unwrap();
//!     assert_eq!(opened.id(), session.id());
//!     assert_eq!(codec::decode_message(&plaintext), Some(Message::Cancel));
//! }
//! ```

pub mod codec;
pub mod error;
pub mod keys;
pub mod pkce;

pub use error::{CryptoError, CryptoResult};
pub use keys::{
    export_public_key, export_public_key_base64, import_public_key_base64, KeyManager, KeyPair,
    Session, SessionId,
};
pub use pkce::Pkce;
pub use rsa::RsaPublicKey;
