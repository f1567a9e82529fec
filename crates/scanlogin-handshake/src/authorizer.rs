//! Entry point for a QR login against an identity provider

use crate::display::QrDisplay;
use crate::error::{HandshakeError, HandshakeResult};
use crate::handshake::{Collaborators, Handshake, HandshakeHandle, HandshakeParams};
use scanlogin_client::session_store::ID_PLACEHOLDER;
use scanlogin_client::{
    build_authorize_url, generate_client_id, AuthorizeParams, MetadataClient, OAuth2Client,
    SessionApi, WebSocketRelay,
};
use scanlogin_core::{ClientConfig, HandshakeConfig, ResponseType};
use scanlogin_crypto::Pkce;
use std::sync::Arc;
use tracing::info;

/// Caller options for one login
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// Correlation state echoed on the result
    pub state: Option<String>,
    /// PKCE material; generated when the configured response type is
    /// `id_token` and none is given
    pub pkce: Option<Pkce>,
    pub nonce: Option<String>,
    pub login_hint: Option<String>,
    pub ui_locales: Option<String>,
    /// Additional authorize URL parameters
    pub extra: Vec<(String, String)>,
}

/// Starts QR logins for one client
pub struct QrAuthorizer {
    config: ClientConfig,
    handshake: HandshakeConfig,
    http: reqwest::Client,
    metadata: Arc<MetadataClient>,
}

impl QrAuthorizer {
    pub fn new(config: ClientConfig) -> Self {
        let http = reqwest::Client::new();
        let metadata = Arc::new(MetadataClient::new(
            http.clone(),
            config.authority(),
            config.client_id.clone(),
        ));
        Self {
            config,
            handshake: HandshakeConfig::default(),
            http,
            metadata,
        }
    }

    /// Builder pattern: set handshake timing
    pub fn with_handshake_config(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn metadata(&self) -> &MetadataClient {
        &self.metadata
    }

    /// Start a QR login.
    ///
    /// Fails with [`HandshakeError::QrNotEnabled`] before any session exists
    /// when the provider has QR login turned off for this client.
    pub async fn authorize(
        &self,
        options: AuthorizeOptions,
        display: Box<dyn QrDisplay>,
    ) -> HandshakeResult<HandshakeHandle> {
        let qr = self.metadata.qr_configuration().await?;
        if !qr.client.qr_enabled {
            return Err(HandshakeError::QrNotEnabled(self.config.client_id.clone()));
        }

        let intermediary = qr.intermediary_url().ok_or_else(|| {
            HandshakeError::Configuration("no QR intermediary URL configured".to_string())
        })?;
        let redirect_uri = intermediary.replace(ID_PLACEHOLDER, "");

        let pkce = match (options.pkce, self.config.response_type) {
            (Some(pkce), _) => Some(pkce),
            (None, ResponseType::IdToken) => Some(Pkce::generate()),
            (None, ResponseType::Code) => None,
        };

        let mut params = AuthorizeParams::new(redirect_uri.clone())
            .with_scope(self.config.scope.clone())
            .with_acr_values(self.config.acr_values.clone())
            .with_state(options.state.clone())
            .with_prompt("login");
        if let Some(pkce) = &pkce {
            params = params.with_pkce(pkce);
        }
        params.nonce = options.nonce;
        params.login_hint = options.login_hint;
        params.ui_locales = options.ui_locales;
        params.extra = options.extra;

        let openid = self.metadata.openid_configuration().await?;
        let authorize_url = build_authorize_url(openid, &self.config.client_id, &params)?;

        let store = SessionApi::with_client(qr.csdc_session_url.clone(), self.http.clone())?;
        let relay = WebSocketRelay::connect(&qr.csdc_wss_url, generate_client_id()).await?;

        let collaborators = Collaborators {
            store: Arc::new(store),
            relay: Arc::new(relay),
            exchange: Arc::new(OAuth2Client::new(self.http.clone(), self.metadata.clone())),
        };
        let params = HandshakeParams {
            session_url: qr.csdc_session_url.clone(),
            authorize_url,
            redirect_uri,
            code_verifier: pkce.map(|p| p.code_verifier),
            state: options.state,
        };

        let (handshake, handle) = Handshake::new(&self.handshake, params, collaborators, display);
        handshake.spawn();
        info!("QR login started for client {}", self.config.client_id);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{ChannelDisplay, DisplayEvent};
    use crate::error::CancelOrigin;
    use axum::{
        extract::{ws::WebSocketUpgrade, Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use scanlogin_client::ClientError;
    use serde_json::{json, Value};
    use std::sync::OnceLock;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Clone)]
    struct Provider {
        origin: Arc<OnceLock<String>>,
        qr_enabled: bool,
        saved: mpsc::UnboundedSender<(String, Value)>,
    }

    impl Provider {
        fn origin(&self) -> &str {
            self.origin.get().map(String::as_str).unwrap_or_default()
        }
    }

    async fn openid(State(provider): State<Provider>) -> Json<Value> {
        Json(json!({
            "issuer": provider.origin(),
            "authorization_endpoint": format!("{}/oauth2/authorize", provider.origin()),
            "token_endpoint": format!("{}/oauth2/token", provider.origin()),
            "response_types_supported": ["code", "id_token"],
            "response_modes_supported": ["query", "fragment"]
        }))
    }

    async fn qr_configuration(State(provider): State<Provider>) -> Json<Value> {
        let ws_origin = provider.origin().replacen("http", "ws", 1);
        Json(json!({
            "csdc_wss_url": format!("{}/relay", ws_origin),
            "csdc_session_url": format!("{}/sessions/{{id}}", provider.origin()),
            "qr_intermediary_url": "https://qr.example/{id}",
            "client": {"qr_enabled": provider.qr_enabled}
        }))
    }

    async fn save_session(
        State(provider): State<Provider>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let _ = provider.saved.send((id, body));
        StatusCode::CREATED
    }

    async fn relay(ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.on_upgrade(|mut socket| async move { while socket.recv().await.is_some() {} })
    }

    async fn start_provider(qr_enabled: bool) -> (String, mpsc::UnboundedReceiver<(String, Value)>) {
        let (saved, saved_rx) = mpsc::unbounded_channel();
        let provider = Provider {
            origin: Arc::new(OnceLock::new()),
            qr_enabled,
            saved,
        };
        let router = Router::new()
            .route("/.well-known/openid-configuration", get(openid))
            .route("/.well-known/criipto-configuration", get(qr_configuration))
            .route("/sessions/:id", post(save_session))
            .route("/relay", get(relay))
            .with_state(provider.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        provider.origin.set(origin.clone()).unwrap();
        (origin, saved_rx)
    }

    fn authorizer(origin: String) -> QrAuthorizer {
        QrAuthorizer::new(
            ClientConfig::new(origin, "urn:client").with_acr_values(vec!["urn:grn:authn:se:bankid".to_string()]),
        )
        .with_handshake_config(HandshakeConfig::new().with_refresh_interval(Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn test_qr_disabled_fails_before_sessions() {
        let (origin, mut saved) = start_provider(false).await;
        let (display, mut display_rx) = ChannelDisplay::new();

        let result = authorizer(origin).authorize(AuthorizeOptions::default(), Box::new(display)).await;
        assert!(matches!(result, Err(HandshakeError::QrNotEnabled(ref id)) if id == "urn:client"));
        assert!(saved.try_recv().is_err());
        assert_eq!(display_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_authorize_publishes_session() {
        let (origin, mut saved) = start_provider(true).await;
        let (display, mut display_rx) = ChannelDisplay::new();
        let options = AuthorizeOptions {
            state: Some("xyz".to_string()),
            ..Default::default()
        };

        let handle = authorizer(origin.clone())
            .authorize(options, Box::new(display))
            .await
            .unwrap();

        let Some(DisplayEvent::Show(payload)) = display_rx.recv().await else {
            panic!("expected a QR payload");
        };
        assert_eq!(payload.url, format!("{}/sessions/{}", origin, payload.session_id));

        let (id, record) = saved.recv().await.unwrap();
        assert_eq!(id, payload.session_id.as_str());
        assert_eq!(record["csdc_algo"], "RSA-OAEP");
        assert_eq!(record["csdc_initiator_id"].as_str().unwrap().len(), 32);

        let authorize = record["action"]["authorize"].as_str().unwrap();
        assert!(authorize.starts_with(&format!("{}/oauth2/authorize?scope=openid", origin)));
        assert!(authorize.contains("redirect_uri=https%3A%2F%2Fqr.example%2F&"));
        assert!(authorize.contains("response_type=code&response_mode=query"));
        assert!(authorize.contains("code_challenge_method=S256"));
        assert!(authorize.contains("state=xyz&prompt=login"));

        handle.cancel();
        assert!(matches!(
            handle.result().await,
            Err(HandshakeError::Cancelled {
                origin: CancelOrigin::Caller
            })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let (origin, _saved) = start_provider(true).await;
        let authorizer = QrAuthorizer::new(ClientConfig::new(format!("{}/missing", origin), "urn:client"));
        let (display, _display_rx) = ChannelDisplay::new();

        let result = authorizer.authorize(AuthorizeOptions::default(), Box::new(display)).await;
        assert!(matches!(
            result,
            Err(HandshakeError::Transport(ClientError::Status { status: 404, .. }))
        ));
    }
}
