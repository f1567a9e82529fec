//! scanlogin Client - Remote collaborators of the QR handshake
//!
//! - [`session_store`]: publishes session records the scanning device fetches
//! - [`relay`]: websocket connection to the hub that carries sealed messages
//! - [`metadata`]: provider OpenID and QR configuration discovery
//! - [`oauth2`]: authorize URL construction and the authorization-code exchange
//!
//! Each collaborator the handshake depends on is a trait with an HTTP/websocket
//! implementation and an in-process one.

pub mod error;
pub mod metadata;
pub mod oauth2;
pub mod relay;
pub mod session_store;

#[cfg(test)]
mod test_util;

pub use error::{ClientError, ClientResult};
pub use metadata::{MetadataClient, OpenIdConfiguration, QrClientSettings, QrConfiguration};
pub use oauth2::{
    build_authorize_url, AuthorizeParams, AuthorizeResponse, ExchangeRequest, OAuth2Client,
    TokenExchange,
};
pub use relay::{
    generate_client_id, Listeners, LocalHub, LocalRelay, Relay, RelayEvent, Subscription,
    Unsubscribe, WebSocketRelay,
};
pub use session_store::{MemorySessionStore, SessionApi, SessionStore};
