//! QR display sinks
//!
//! The handshake never renders anything itself. It hands each new payload to
//! a [`QrDisplay`] and clears it once when the login ends.

use scanlogin_crypto::SessionId;
use tokio::sync::mpsc;

/// What the current QR code should encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub session_id: SessionId,
    /// Session-store URL of the record; the scanning device fetches it
    pub url: String,
}

/// Receives QR payloads as sessions rotate
pub trait QrDisplay: Send {
    /// Replace the displayed code
    fn show(&mut self, payload: &QrPayload);

    /// Remove the displayed code. Called exactly once per handshake.
    fn clear(&mut self);
}

/// Display updates forwarded by [`ChannelDisplay`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Show(QrPayload),
    Clear,
}

/// Display that forwards every update over a channel, for UIs living on
/// another task
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelDisplay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl QrDisplay for ChannelDisplay {
    fn show(&mut self, payload: &QrPayload) {
        let _ = self.tx.send(DisplayEvent::Show(payload.clone()));
    }

    fn clear(&mut self) {
        let _ = self.tx.send(DisplayEvent::Clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_display_forwards() {
        let (mut display, mut rx) = ChannelDisplay::new();
        let payload = QrPayload {
            session_id: SessionId::new(),
            url: "https://store.example/abc".to_string(),
        };

        display.show(&payload);
        display.clear();
        assert_eq!(rx.recv().await, Some(DisplayEvent::Show(payload)));
        assert_eq!(rx.recv().await, Some(DisplayEvent::Clear));

        drop(rx);
        display.clear();
    }
}
