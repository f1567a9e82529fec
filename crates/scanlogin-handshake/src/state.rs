//! Handshake lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle of one QR login.
///
/// States only move forward: `Pending → Acknowledged → {Resolved | Rejected |
/// Cancelled}`, with `Pending` also able to end directly in `Rejected` or
/// `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeState {
    /// QR codes are rotating, nobody has scanned yet
    Pending,
    /// A session was scanned; rotation stopped
    Acknowledged,
    Resolved,
    Rejected,
    Cancelled,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Resolved | HandshakeState::Rejected | HandshakeState::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            HandshakeState::Pending => 0,
            HandshakeState::Acknowledged => 1,
            HandshakeState::Resolved | HandshakeState::Rejected | HandshakeState::Cancelled => 2,
        }
    }

    /// Whether moving to `next` goes strictly forward
    pub fn can_transition_to(&self, next: HandshakeState) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandshakeState::Pending => "pending",
            HandshakeState::Acknowledged => "acknowledged",
            HandshakeState::Resolved => "resolved",
            HandshakeState::Rejected => "rejected",
            HandshakeState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}
