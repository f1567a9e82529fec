//! scanlogin Handshake - Log in by scanning a rotating QR code
//!
//! The initiating device shows a QR code that points at a freshly published
//! session record. Every refresh interval a new session (and key pair)
//! replaces it, while the last few stay valid. The scanning device
//! ([`Responder`]) reports back over a shared relay with messages sealed under
//! the scanned session's key:
//!
//! 1. `ACK` - the code was scanned; rotation stops on the acknowledged session
//! 2. `OAUTH2_CODE` - the authorization code, exchanged here using PKCE
//! 3. `OAUTH2_ERROR` / `CANCEL` - the login ends
//!
//! [`QrAuthorizer`] wires provider metadata, the relay and the session store
//! into a [`Handshake`] and hands back its [`HandshakeHandle`].

pub mod authorizer;
pub mod display;
pub mod error;
pub mod handshake;
pub mod history;
pub mod responder;
pub mod scheduler;
pub mod state;

pub use authorizer::{AuthorizeOptions, QrAuthorizer};
pub use display::{ChannelDisplay, DisplayEvent, QrDisplay, QrPayload};
pub use error::{CancelOrigin, HandshakeError, HandshakeResult};
pub use handshake::{Canceller, Collaborators, Handshake, HandshakeHandle, HandshakeParams};
pub use history::SessionHistory;
pub use responder::Responder;
pub use scheduler::{RefreshScheduler, SessionMinter};
pub use state::HandshakeState;

pub use scanlogin_client::AuthorizeResponse;
pub use scanlogin_core::{ClientConfig, HandshakeConfig, ResponseType};
