//! scanlogin Core - Shared types and protocol definitions
//!
//! This crate provides the configuration, error and wire types shared by the
//! crypto, client and handshake crates.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{ClientConfig, HandshakeConfig, ResponseType};
pub use error::OAuth2Error;
pub use protocol::{Message, RelayEnvelope, SessionAction, SessionRecord, RSA_OAEP};
