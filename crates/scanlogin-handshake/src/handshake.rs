//! The QR login state machine
//!
//! One [`Handshake`] owns everything a login attempt touches: the refresh
//! timer, the relay subscription, the session history and the in-flight mint
//! and token exchange. It runs on a single task, so none of that state is
//! shared or locked. The caller keeps a [`HandshakeHandle`] to follow the
//! state, cancel, and await the result.

use crate::display::{QrDisplay, QrPayload};
use crate::error::{CancelOrigin, HandshakeError, HandshakeResult};
use crate::history::SessionHistory;
use crate::scheduler::{RefreshScheduler, SessionMinter};
use crate::state::HandshakeState;
use futures::future::{BoxFuture, FutureExt};
use scanlogin_client::session_store::ID_PLACEHOLDER;
use scanlogin_client::{
    AuthorizeResponse, ClientError, ClientResult, ExchangeRequest, Relay, RelayEvent,
    SessionStore, TokenExchange, Unsubscribe,
};
use scanlogin_core::{HandshakeConfig, Message, OAuth2Error, SessionAction, SessionRecord, RSA_OAEP};
use scanlogin_crypto::{codec, KeyManager, Session, SessionId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Error code and description reported when the responder cancels
const REMOTE_CANCEL_ERROR: &str = "access_denied";
const REMOTE_CANCEL_DESCRIPTION: &str = "User cancelled login.";

/// Per-login parameters
#[derive(Debug, Clone)]
pub struct HandshakeParams {
    /// Session-store URL template containing `{id}`; also the QR payload
    pub session_url: String,
    /// Authorize URL the responding device opens
    pub authorize_url: String,
    /// Redirect URI the authorization code is bound to
    pub redirect_uri: String,
    /// PKCE verifier, kept on this device
    pub code_verifier: Option<String>,
    /// Caller correlation state
    pub state: Option<String>,
}

/// Remote collaborators of a handshake
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub relay: Arc<dyn Relay>,
    pub exchange: Arc<dyn TokenExchange>,
}

/// Cloneable cancellation trigger
#[derive(Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Request cancellation. Idempotent, callable from any task.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Caller side of a running handshake
pub struct HandshakeHandle {
    canceller: Canceller,
    state: watch::Receiver<HandshakeState>,
    result: oneshot::Receiver<HandshakeResult<AuthorizeResponse>>,
}

impl HandshakeHandle {
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        *self.state.borrow()
    }

    /// A receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<HandshakeState> {
        self.state.clone()
    }

    /// Wait for the next state change. `None` once the handshake is gone and
    /// every change has been observed.
    pub async fn next_state(&mut self) -> Option<HandshakeState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    /// Wait for the handshake to settle
    pub async fn result(self) -> HandshakeResult<AuthorizeResponse> {
        self.result.await.unwrap_or(Err(HandshakeError::Abandoned))
    }
}

/// One QR login attempt
pub struct Handshake {
    params: HandshakeParams,
    relay: Arc<dyn Relay>,
    exchange: Arc<dyn TokenExchange>,
    minter: SessionMinter,
    display: Box<dyn QrDisplay>,
    scheduler: RefreshScheduler,
    history: SessionHistory,
    state: watch::Sender<HandshakeState>,
    cancel_rx: watch::Receiver<bool>,
    result_tx: Option<oneshot::Sender<HandshakeResult<AuthorizeResponse>>>,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    unsubscribe: Option<Unsubscribe>,
    mint: Option<BoxFuture<'static, HandshakeResult<Session>>>,
    exchange_call: Option<BoxFuture<'static, ClientResult<AuthorizeResponse>>>,
    cleaned_up: bool,
}

impl Handshake {
    /// Create a handshake and subscribe to the relay. Nothing is minted
    /// until [`Handshake::run`].
    pub fn new(
        config: &HandshakeConfig,
        params: HandshakeParams,
        collaborators: Collaborators,
        display: Box<dyn QrDisplay>,
    ) -> (Self, HandshakeHandle) {
        let Collaborators {
            store,
            relay,
            exchange,
        } = collaborators;

        let template = SessionRecord {
            algorithm: RSA_OAEP.to_string(),
            initiator_id: relay.client_id().to_string(),
            relay_url: relay.url().to_string(),
            public_key: String::new(),
            action: SessionAction {
                authorize: params.authorize_url.clone(),
            },
        };
        let minter = SessionMinter::new(KeyManager::new(config.key_bits), store, template);
        let (events, unsubscribe) = relay.subscribe().into_parts();

        let (state_tx, state_rx) = watch::channel(HandshakeState::Pending);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (result_tx, result_rx) = oneshot::channel();

        let handshake = Self {
            params,
            relay,
            exchange,
            minter,
            display,
            scheduler: RefreshScheduler::new(config.refresh_interval),
            history: SessionHistory::new(config.cap()),
            state: state_tx,
            cancel_rx,
            result_tx: Some(result_tx),
            events,
            unsubscribe: Some(unsubscribe),
            mint: None,
            exchange_call: None,
            cleaned_up: false,
        };
        let handle = HandshakeHandle {
            canceller: Canceller {
                tx: Arc::new(cancel_tx),
            },
            state: state_rx,
            result: result_rx,
        };
        (handshake, handle)
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drive the handshake until it settles
    pub async fn run(mut self) {
        self.start();
        let mut cancel_open = true;

        while !self.state().is_terminal() {
            tokio::select! {
                biased;

                changed = self.cancel_rx.changed(), if cancel_open => {
                    if changed.is_err() {
                        // every handle is gone; nobody can cancel any more
                        cancel_open = false;
                    }
                    self.check_cancelled();
                }
                event = self.events.recv() => self.handle_event(event).await,
                result = in_flight(&mut self.exchange_call) => {
                    self.exchange_call = None;
                    self.on_exchanged(result);
                }
                result = in_flight(&mut self.mint) => {
                    self.mint = None;
                    self.on_minted(result);
                }
                _ = self.scheduler.tick(), if self.mint.is_none() => self.on_tick(),
            }
        }
    }

    /// Arm the refresh timer
    pub fn start(&mut self) {
        if self.check_cancelled() {
            return;
        }
        self.scheduler.start();
        info!(
            "Started QR handshake as relay client {} ({} live sessions max)",
            self.relay.client_id(),
            self.history.cap()
        );
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.borrow()
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Cancel locally
    pub fn cancel(&mut self) {
        self.settle(
            HandshakeState::Cancelled,
            Err(HandshakeError::Cancelled {
                origin: CancelOrigin::Caller,
            }),
        );
    }

    /// Trial-decrypt an inbound relay frame and dispatch what it carries.
    ///
    /// Frames no live session can open are someone else's and are dropped
    /// silently.
    /// Decryption runs on the blocking pool; the message is applied only if
    /// the handshake is still live once it completes.
    pub async fn handle_frame(&mut self, frame: &str) {
        if self.check_cancelled() {
            return;
        }
        let candidates: Vec<Session> = self.history.candidates().cloned().collect();
        if candidates.is_empty() {
            return;
        }
        let opened = match codec::open_async(candidates, frame.to_string()).await {
            Ok(Some(opened)) => opened,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping relay frame: {}", e);
                return;
            }
        };
        let (session, plaintext) = opened;
        if let Some(message) = codec::decode_message(&plaintext) {
            self.handle_message(session.id(), message);
        }
    }

    /// Apply a decrypted message addressed to `session_id`
    pub fn handle_message(&mut self, session_id: &SessionId, message: Message) {
        if self.check_cancelled() {
            return;
        }
        debug!("Received {} for session {}", message.kind(), session_id);

        match message {
            Message::Ack { sending_client_id } => {
                if self.state() != HandshakeState::Pending {
                    debug!("Ignoring ACK in state {}", self.state());
                    return;
                }
                self.acknowledge(session_id, &sending_client_id);
            }
            Message::Code { code } => {
                if self.state() != HandshakeState::Acknowledged || self.exchange_call.is_some() {
                    debug!("Ignoring authorization code in state {}", self.state());
                    return;
                }
                self.start_exchange(code);
            }
            Message::ProtocolError {
                error,
                error_description,
            } => {
                let error = OAuth2Error::new(error, error_description, self.params.state.clone());
                warn!("Login rejected by provider: {}", error);
                self.settle(HandshakeState::Rejected, Err(HandshakeError::OAuth2(error)));
            }
            Message::Cancel => {
                info!("Login cancelled by responder");
                let error = OAuth2Error::new(
                    REMOTE_CANCEL_ERROR,
                    Some(REMOTE_CANCEL_DESCRIPTION.to_string()),
                    self.params.state.clone(),
                );
                self.settle(
                    HandshakeState::Cancelled,
                    Err(HandshakeError::Cancelled {
                        origin: CancelOrigin::Remote(error),
                    }),
                );
            }
        }
    }

    fn acknowledge(&mut self, session_id: &SessionId, sender: &str) {
        if !self.history.confirm(session_id) {
            return;
        }
        self.scheduler.stop();
        self.mint = None;
        self.state.send_replace(HandshakeState::Acknowledged);
        info!("Handshake acknowledged by {} on session {}", sender, session_id);
    }

    fn start_exchange(&mut self, code: String) {
        let request = ExchangeRequest {
            code,
            code_verifier: self.params.code_verifier.clone(),
            redirect_uri: self.params.redirect_uri.clone(),
            state: self.params.state.clone(),
        };
        let exchange = self.exchange.clone();
        debug!("Exchanging authorization code");
        self.exchange_call = Some(async move { exchange.exchange(request).await }.boxed());
    }

    async fn handle_event(&mut self, event: Option<RelayEvent>) {
        match event {
            Some(RelayEvent::Frame(frame)) => self.handle_frame(&frame).await,
            Some(RelayEvent::Closed(reason)) => self.relay_lost(reason),
            None => self.relay_lost(None),
        }
    }

    fn relay_lost(&mut self, reason: Option<String>) {
        if self.state().is_terminal() {
            return;
        }
        warn!(
            "Relay connection lost: {}",
            reason.as_deref().unwrap_or("no reason given")
        );
        self.settle(
            HandshakeState::Rejected,
            Err(HandshakeError::Transport(ClientError::RelayClosed)),
        );
    }

    fn on_tick(&mut self) {
        if self.check_cancelled() || self.mint.is_some() || self.history.is_confirmed() {
            return;
        }
        self.mint = Some(self.minter.mint());
    }

    fn on_minted(&mut self, result: HandshakeResult<Session>) {
        if self.check_cancelled() || self.state() != HandshakeState::Pending {
            debug!("Discarding minted session");
            return;
        }

        match result {
            Ok(session) => {
                let payload = QrPayload {
                    session_id: session.id().clone(),
                    url: self
                        .params
                        .session_url
                        .replace(ID_PLACEHOLDER, session.id().as_str()),
                };
                self.history.push(session);
                self.display.show(&payload);
                debug!("Showing session {}", payload.session_id);
            }
            Err(e) => {
                warn!("Failed to mint session: {}", e);
                self.settle(HandshakeState::Rejected, Err(e));
            }
        }
    }

    fn on_exchanged(&mut self, result: ClientResult<AuthorizeResponse>) {
        if self.check_cancelled() {
            debug!("Discarding exchange result");
            return;
        }

        match result {
            Ok(response) => {
                info!("Login completed");
                self.settle(HandshakeState::Resolved, Ok(response));
            }
            Err(e) => {
                warn!("Token exchange failed: {}", e);
                self.settle(HandshakeState::Rejected, Err(e.into()));
            }
        }
    }

    /// Apply a pending cancellation request. Returns true when the
    /// handshake is settled and the caller must not transition.
    fn check_cancelled(&mut self) -> bool {
        if self.state().is_terminal() {
            return true;
        }
        if *self.cancel_rx.borrow_and_update() {
            self.cancel();
            return true;
        }
        false
    }

    fn settle(&mut self, next: HandshakeState, outcome: HandshakeResult<AuthorizeResponse>) {
        if !self.state().can_transition_to(next) || !next.is_terminal() {
            return;
        }
        self.state.send_replace(next);
        self.cleanup();
        if let Some(tx) = self.result_tx.take() {
            let _ = tx.send(outcome);
        }
        debug!("Handshake settled as {}", next);
    }

    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        self.scheduler.stop();
        self.mint = None;
        self.exchange_call = None;
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe.unsubscribe();
        }
        self.display.clear();
    }
}

impl Drop for Handshake {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Await the future in `slot`, or never complete when it is empty
async fn in_flight<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}
