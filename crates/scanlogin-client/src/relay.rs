//! Relay (hub) connections
//!
//! The relay multiplexes sealed frames between devices. Each connection is
//! identified by a client id passed as a query parameter. Inbound frames are
//! fanned out to every current subscriber; a subscriber leaves by consuming
//! its [`Unsubscribe`] handle.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use scanlogin_core::RelayEnvelope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Events delivered to relay subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A text frame (base64 ciphertext) arrived
    Frame(String),
    /// The connection is gone; no further frames will arrive
    Closed(Option<String>),
}

/// Generate a relay client id (32 lowercase hex characters)
pub fn generate_client_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<RelayEvent>>,
}

/// Registry of subscribers to one relay connection
#[derive(Clone, Default)]
pub struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut table = self.table();
            let id = table.next_id;
            table.next_id += 1;
            table.senders.insert(id, tx);
            id
        };

        Subscription {
            events: rx,
            unsubscribe: Unsubscribe {
                listeners: self.clone(),
                id,
            },
        }
    }

    /// Deliver `event` to every subscriber, forgetting subscribers whose
    /// receiver is gone
    pub fn dispatch(&self, event: RelayEvent) {
        self.table()
            .senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.table().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.table().senders.remove(&id);
    }

    /// Lock the table, recovering it from a poisoned lock
    fn table(&self) -> MutexGuard<'_, ListenerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A subscriber's inbound event stream plus the handle that ends it
pub struct Subscription {
    events: mpsc::UnboundedReceiver<RelayEvent>,
    unsubscribe: Unsubscribe,
}

impl Subscription {
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<RelayEvent>, Unsubscribe) {
        (self.events, self.unsubscribe)
    }
}

/// One-shot handle removing a subscriber from its relay
pub struct Unsubscribe {
    listeners: Listeners,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.listeners.remove(self.id);
    }
}

/// A connection to the relay hub
#[async_trait]
pub trait Relay: Send + Sync {
    /// This connection's client id
    fn client_id(&self) -> &str;

    /// Relay address peers should connect to
    fn url(&self) -> &str;

    /// Start receiving inbound events
    fn subscribe(&self) -> Subscription;

    /// Send an envelope to the hub
    async fn send(&self, envelope: &RelayEnvelope) -> ClientResult<()>;
}

/// Relay connection over a websocket
pub struct WebSocketRelay {
    url: String,
    client_id: String,
    listeners: Listeners,
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketRelay {
    /// Connect to `url` as `client_id`
    pub async fn connect(url: &str, client_id: impl Into<String>) -> ClientResult<Self> {
        let client_id = client_id.into();
        let endpoint = connection_url(url, &client_id)?;

        let (stream, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| ClientError::RelayConnect(e.to_string()))?;
        info!("Connected to relay {} as {}", url, client_id);

        let (mut sink, mut source) = stream.split();
        let listeners = Listeners::new();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Relay send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_listeners = listeners.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        reader_listeners.dispatch(RelayEvent::Frame(text));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            };
            info!("Relay connection closed");
            reader_listeners.dispatch(RelayEvent::Closed(reason));
        });

        Ok(Self {
            url: url.to_string(),
            client_id,
            listeners,
            outbound,
            reader,
            writer,
        })
    }
}

/// Append the `clientId` query parameter identifying this connection
fn connection_url(url: &str, client_id: &str) -> ClientResult<Url> {
    let mut endpoint = Url::parse(url)?;
    endpoint.query_pairs_mut().append_pair("clientId", client_id);
    Ok(endpoint)
}

#[async_trait]
impl Relay for WebSocketRelay {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscribe(&self) -> Subscription {
        self.listeners.subscribe()
    }

    async fn send(&self, envelope: &RelayEnvelope) -> ClientResult<()> {
        let text = serde_json::to_string(envelope)?;
        self.outbound
            .send(text)
            .map_err(|_| ClientError::RelayClosed)
    }
}

impl Drop for WebSocketRelay {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// In-process hub routing direct messages between [`LocalRelay`] clients
#[derive(Clone, Default)]
pub struct LocalHub {
    url: String,
    clients: Arc<Mutex<HashMap<String, Listeners>>>,
}

impl LocalHub {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            clients: Arc::default(),
        }
    }

    /// Open a connection as `client_id`
    pub fn connect(&self, client_id: impl Into<String>) -> LocalRelay {
        let client_id = client_id.into();
        let listeners = Listeners::new();
        self.clients().insert(client_id.clone(), listeners.clone());
        LocalRelay {
            hub: self.clone(),
            client_id,
            listeners,
        }
    }

    /// Deliver a raw frame to every connected client
    pub fn broadcast(&self, frame: &str) {
        for listeners in self.connected() {
            listeners.dispatch(RelayEvent::Frame(frame.to_string()));
        }
    }

    /// Drop `client_id`'s connection, notifying its subscribers
    pub fn disconnect(&self, client_id: &str, reason: Option<String>) {
        let removed = self.clients().remove(client_id);
        if let Some(listeners) = removed {
            listeners.dispatch(RelayEvent::Closed(reason));
        }
    }

    fn connected(&self) -> Vec<Listeners> {
        self.clients().values().cloned().collect()
    }

    fn route(&self, recipient: &str) -> Option<Listeners> {
        self.clients().get(recipient).cloned()
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, Listeners>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A client connection to a [`LocalHub`]
pub struct LocalRelay {
    hub: LocalHub,
    client_id: String,
    listeners: Listeners,
}

impl LocalRelay {
    /// Number of active subscribers on this connection
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl Relay for LocalRelay {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn url(&self) -> &str {
        &self.hub.url
    }

    fn subscribe(&self) -> Subscription {
        self.listeners.subscribe()
    }

    async fn send(&self, envelope: &RelayEnvelope) -> ClientResult<()> {
        let RelayEnvelope::DirectMessage {
            recipient_client_id,
            message,
        } = envelope;

        match self.hub.route(recipient_client_id) {
            Some(listeners) => {
                listeners.dispatch(RelayEvent::Frame(message.clone()));
                Ok(())
            }
            None => {
                debug!("No relay client {}, dropping message", recipient_client_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::serve;
    use axum::{
        extract::{
            ws::{Message as WsMessage, WebSocketUpgrade},
            Query,
        },
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::time::Duration;

    fn dm(recipient: &str, message: &str) -> RelayEnvelope {
        RelayEnvelope::DirectMessage {
            recipient_client_id: recipient.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_connection_url() {
        let url = connection_url("wss://relay.example/ws", "abc").unwrap();
        assert_eq!(url.as_str(), "wss://relay.example/ws?clientId=abc");
        assert!(connection_url("not a url", "abc").is_err());
    }

    #[test]
    fn test_client_id_format() {
        let id = generate_client_id();
        assert_eq!(id.len(), 32);
        assert_ne!(id, generate_client_id());
    }

    #[tokio::test]
    async fn test_listeners_unsubscribe() {
        let listeners = Listeners::new();
        let (mut first, first_handle) = listeners.subscribe().into_parts();
        let (mut second, second_handle) = listeners.subscribe().into_parts();
        assert_eq!(listeners.len(), 2);

        listeners.dispatch(RelayEvent::Frame("one".to_string()));
        assert_eq!(first.recv().await, Some(RelayEvent::Frame("one".to_string())));
        assert_eq!(second.recv().await, Some(RelayEvent::Frame("one".to_string())));

        first_handle.unsubscribe();
        assert_eq!(listeners.len(), 1);
        assert_eq!(first.recv().await, None);

        drop(second);
        listeners.dispatch(RelayEvent::Frame("two".to_string()));
        assert!(listeners.is_empty());
        second_handle.unsubscribe();
    }

    #[tokio::test]
    async fn test_listeners_survive_poisoned_lock() {
        let listeners = Listeners::new();
        let (mut first, _first_off) = listeners.subscribe().into_parts();

        let table = listeners.table.clone();
        let _ = std::thread::spawn(move || {
            let _guard = table.lock().unwrap();
            panic!("poison the listener table");
        })
        .join();
        assert!(listeners.table.is_poisoned());

        let (mut second, second_off) = listeners.subscribe().into_parts();
        assert_eq!(listeners.len(), 2);

        listeners.dispatch(RelayEvent::Frame("hello".to_string()));
        assert_eq!(first.recv().await, Some(RelayEvent::Frame("hello".to_string())));
        assert_eq!(second.recv().await, Some(RelayEvent::Frame("hello".to_string())));

        // leaving removes only the second subscriber
        second_off.unsubscribe();
        assert_eq!(listeners.len(), 1);
        listeners.dispatch(RelayEvent::Frame("again".to_string()));
        assert_eq!(first.recv().await, Some(RelayEvent::Frame("again".to_string())));
    }

    #[tokio::test]
    async fn test_local_hub_routes_direct_messages() {
        let hub = LocalHub::new("local://hub");
        let initiator = hub.connect("initiator");
        let responder = hub.connect("responder");
        let (mut inbox, _handle) = initiator.subscribe().into_parts();
        let (mut other, _other_handle) = responder.subscribe().into_parts();

        responder.send(&dm("initiator", "c2VhbGVk")).await.unwrap();
        assert_eq!(inbox.recv().await, Some(RelayEvent::Frame("c2VhbGVk".to_string())));
        assert!(other.try_recv().is_err());

        responder.send(&dm("nobody", "lost")).await.unwrap();
        hub.broadcast("noise");
        assert_eq!(inbox.recv().await, Some(RelayEvent::Frame("noise".to_string())));
        assert_eq!(other.recv().await, Some(RelayEvent::Frame("noise".to_string())));

        hub.disconnect("initiator", Some("bye".to_string()));
        assert_eq!(inbox.recv().await, Some(RelayEvent::Closed(Some("bye".to_string()))));
        assert_eq!(initiator.url(), "local://hub");
    }

    /// Echo hub: returns DMs addressed to the connecting client, then closes
    async fn echo_hub(
        ws: WebSocketUpgrade,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let client_id = query.get("clientId").cloned().unwrap_or_default();
        ws.on_upgrade(move |mut socket| async move {
            while let Some(Ok(msg)) = socket.recv().await {
                if let WsMessage::Text(text) = msg {
                    let RelayEnvelope::DirectMessage {
                        recipient_client_id,
                        message,
                    } = serde_json::from_str(&text).unwrap();
                    if recipient_client_id == client_id {
                        let _ = socket.send(WsMessage::Text(message)).await;
                    }
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        })
    }

    #[tokio::test]
    async fn test_websocket_relay() {
        let origin = serve(Router::new().route("/ws", get(echo_hub))).await;
        let url = format!("{}/ws", origin.replace("http://", "ws://"));

        let relay = WebSocketRelay::connect(&url, "initiator").await.unwrap();
        assert_eq!(relay.client_id(), "initiator");
        assert_eq!(relay.url(), url);

        let (mut events, handle) = relay.subscribe().into_parts();
        relay.send(&dm("initiator", "ZnJhbWU=")).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(frame, Some(RelayEvent::Frame("ZnJhbWU=".to_string())));

        let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert!(matches!(closed, Some(RelayEvent::Closed(_))));

        handle.unsubscribe();
        assert!(relay.listeners.is_empty());
    }
}
