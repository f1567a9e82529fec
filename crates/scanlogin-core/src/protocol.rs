//! Relay and session-store wire types

use serde::{Deserialize, Serialize};

/// Algorithm identifier published with every session record
pub const RSA_OAEP: &str = "RSA-OAEP";

/// Decrypted messages exchanged between the responding and initiating device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// The QR code has been engaged by a human
    #[serde(rename = "ACK")]
    Ack {
        #[serde(rename = "sendingClientId")]
        sending_client_id: String,
    },
    /// Login was cancelled on the responding side
    #[serde(rename = "CANCEL")]
    Cancel,
    /// Authorization code issued to the responder
    #[serde(rename = "OAUTH2_CODE")]
    Code { code: String },
    /// Provider returned an error to the responder
    #[serde(rename = "OAUTH2_ERROR")]
    ProtocolError {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    },
}

impl Message {
    /// Discriminants this version understands
    pub const KNOWN_TYPES: [&'static str; 4] = ["ACK", "CANCEL", "OAUTH2_CODE", "OAUTH2_ERROR"];

    /// Wire discriminant of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ack { .. } => "ACK",
            Message::Cancel => "CANCEL",
            Message::Code { .. } => "OAUTH2_CODE",
            Message::ProtocolError { .. } => "OAUTH2_ERROR",
        }
    }

    pub fn is_known_type(kind: &str) -> bool {
        Self::KNOWN_TYPES.contains(&kind)
    }
}

/// Frames sent to the relay hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayEnvelope {
    /// Deliver `message` (base64 ciphertext) to a single relay client
    #[serde(rename = "DM")]
    DirectMessage {
        #[serde(rename = "recipientClientId")]
        recipient_client_id: String,
        message: String,
    },
}

/// Action the responding device should perform after fetching the record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAction {
    /// Authorization URL to open on the responding device
    pub authorize: String,
}

/// Record published to the session store for every minted session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Encryption algorithm, always [`RSA_OAEP`]
    #[serde(rename = "csdc_algo")]
    pub algorithm: String,
    /// Relay client id of the initiating device
    #[serde(rename = "csdc_initiator_id")]
    pub initiator_id: String,
    /// Relay address both devices connect to
    #[serde(rename = "csdc_wss")]
    pub relay_url: String,
    /// Base64 SPKI public key of the session
    #[serde(rename = "csdc_key")]
    pub public_key: String,
    pub action: SessionAction,
}
