//! Session refresh
//!
//! While a handshake is pending a new session is minted every refresh
//! interval: generate a key pair, publish the record, then show the new QR
//! code. [`RefreshScheduler`] only owns the timer; the handshake decides on
//! each tick whether a mint may start.

use crate::error::HandshakeResult;
use futures::future::{BoxFuture, FutureExt};
use scanlogin_client::SessionStore;
use scanlogin_core::SessionRecord;
use scanlogin_crypto::{export_public_key_base64, KeyManager, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

/// Periodic refresh timer. The first tick fires immediately.
pub struct RefreshScheduler {
    period: Duration,
    interval: Option<Interval>,
    stopped: bool,
}

impl RefreshScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
            stopped: false,
        }
    }

    /// Arm the timer. Must be called from within a tokio runtime; a stopped
    /// scheduler stays stopped.
    pub fn start(&mut self) {
        if self.stopped || self.interval.is_some() {
            return;
        }
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
    }

    /// Stop for good
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!("Refresh scheduler stopped");
        }
        self.stopped = true;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick. Never completes while not running.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

/// Creates and publishes sessions
#[derive(Clone)]
pub struct SessionMinter {
    keys: KeyManager,
    store: Arc<dyn SessionStore>,
    /// Record fields shared by every session; `public_key` is filled per mint
    template: SessionRecord,
}

impl SessionMinter {
    pub fn new(keys: KeyManager, store: Arc<dyn SessionStore>, template: SessionRecord) -> Self {
        Self {
            keys,
            store,
            template,
        }
    }

    /// Generate a session and publish its record
    pub fn mint(&self) -> BoxFuture<'static, HandshakeResult<Session>> {
        let minter = self.clone();
        async move {
            let session = minter.keys.generate_session().await?;
            let record = SessionRecord {
                public_key: export_public_key_base64(&session)?,
                ..minter.template.clone()
            };
            minter.store.save(session.id().as_str(), &record).await?;
            debug!("Minted session {}", session.id());
            Ok(session)
        }
        .boxed()
    }
}
