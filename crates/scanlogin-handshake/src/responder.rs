//! The scanning-device side of a QR login
//!
//! The responder fetches the record behind a scanned QR code, opens the
//! authorize URL it names, and reports back to the initiating device with
//! messages sealed under the session's published key.

use crate::error::HandshakeResult;
use scanlogin_client::{ClientError, Relay, SessionStore};
use scanlogin_core::{Message, SessionRecord};
use scanlogin_crypto::{codec, import_public_key_base64, RsaPublicKey};
use std::sync::Arc;
use tracing::debug;

/// Sends sealed messages for one scanned session
pub struct Responder {
    session_id: String,
    record: SessionRecord,
    key: RsaPublicKey,
    relay: Arc<dyn Relay>,
}

impl Responder {
    /// Fetch the record for `session_id` from the store
    pub async fn fetch(
        store: &dyn SessionStore,
        session_id: &str,
        relay: Arc<dyn Relay>,
    ) -> HandshakeResult<Self> {
        let record = store
            .get(session_id)
            .await?
            .ok_or_else(|| ClientError::SessionNotFound(session_id.to_string()))?;
        Self::from_record(session_id, record, relay)
    }

    /// Build a responder from an already fetched record
    pub fn from_record(
        session_id: impl Into<String>,
        record: SessionRecord,
        relay: Arc<dyn Relay>,
    ) -> HandshakeResult<Self> {
        let key = import_public_key_base64(&record.public_key)?;
        Ok(Self {
            session_id: session_id.into(),
            record,
            key,
            relay,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// Authorize URL to open on this device
    pub fn authorize_url(&self) -> &str {
        &self.record.action.authorize
    }

    /// Tell the initiator the code was scanned
    pub async fn acknowledge(&self) -> HandshakeResult<()> {
        self.send(Message::Ack {
            sending_client_id: self.relay.client_id().to_string(),
        })
        .await
    }

    /// Hand over the authorization code
    pub async fn send_code(&self, code: impl Into<String>) -> HandshakeResult<()> {
        self.send(Message::Code { code: code.into() }).await
    }

    /// Relay an error returned by the provider
    pub async fn send_error(
        &self,
        error: impl Into<String>,
        error_description: Option<String>,
    ) -> HandshakeResult<()> {
        self.send(Message::ProtocolError {
            error: error.into(),
            error_description,
        })
        .await
    }

    /// Abort the login
    pub async fn cancel(&self) -> HandshakeResult<()> {
        self.send(Message::Cancel).await
    }

    async fn send(&self, message: Message) -> HandshakeResult<()> {
        let envelope = codec::seal_direct_message(&self.key, &self.record.initiator_id, &message)?;
        self.relay.send(&envelope).await?;
        debug!("Sent {} for session {}", message.kind(), self.session_id);
        Ok(())
    }
}
