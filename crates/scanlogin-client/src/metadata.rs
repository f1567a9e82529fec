//! Provider metadata discovery
//!
//! Two documents are served by the identity provider: the standard OpenID
//! configuration and the QR configuration describing the relay, the session
//! store and whether QR login is enabled for the client. Both are fetched
//! lazily, once.

use crate::error::{ClientError, ClientResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";
pub const QR_CONFIGURATION_PATH: &str = "/.well-known/criipto-configuration";

/// The subset of OpenID provider metadata scanlogin uses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub response_modes_supported: Vec<String>,
    #[serde(default)]
    pub acr_values_supported: Option<Vec<String>>,
}

/// Per-client QR settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrClientSettings {
    #[serde(default)]
    pub qr_enabled: bool,
    #[serde(default)]
    pub qr_intermediary_url: Option<String>,
    #[serde(default = "default_branding")]
    pub qr_branding: bool,
}

fn default_branding() -> bool {
    true
}

/// Relay, session store and QR settings for one client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfiguration {
    /// Relay websocket address
    pub csdc_wss_url: String,
    /// Session store URL template containing `{id}`
    pub csdc_session_url: String,
    /// Default QR landing URL template containing `{id}`
    #[serde(default)]
    pub qr_intermediary_url: Option<String>,
    pub client: QrClientSettings,
}

impl QrConfiguration {
    /// QR landing URL template, preferring the client-specific one
    pub fn intermediary_url(&self) -> Option<&str> {
        self.client
            .qr_intermediary_url
            .as_deref()
            .or(self.qr_intermediary_url.as_deref())
    }
}

/// Lazily fetches and caches provider metadata
pub struct MetadataClient {
    http: reqwest::Client,
    authority: String,
    client_id: String,
    openid: OnceCell<OpenIdConfiguration>,
    qr: OnceCell<QrConfiguration>,
}

impl MetadataClient {
    pub fn new(http: reqwest::Client, authority: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            http,
            authority: authority.into(),
            client_id: client_id.into(),
            openid: OnceCell::new(),
            qr: OnceCell::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OpenID provider configuration, fetched on first use
    pub async fn openid_configuration(&self) -> ClientResult<&OpenIdConfiguration> {
        self.openid
            .get_or_try_init(|| self.fetch(OPENID_CONFIGURATION_PATH))
            .await
    }

    /// QR configuration, fetched on first use
    pub async fn qr_configuration(&self) -> ClientResult<&QrConfiguration> {
        self.qr.get_or_try_init(|| self.fetch(QR_CONFIGURATION_PATH)).await
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = format!("{}{}", self.authority, path);
        debug!("Fetching metadata from {}", url);

        let response = self
            .http
            .get(&url)
            .query(&[("client_id", self.client_id.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::serve;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_intermediary_url_prefers_client() {
        let mut config: QrConfiguration = serde_json::from_value(json!({
            "csdc_wss_url": "wss://relay.example",
            "csdc_session_url": "https://store.example/{id}",
            "qr_intermediary_url": "https://qr.example/{id}",
            "client": {"qr_enabled": true}
        }))
        .unwrap();
        assert!(config.client.qr_branding);
        assert_eq!(config.intermediary_url(), Some("https://qr.example/{id}"));

        config.client.qr_intermediary_url = Some("https://custom.example/{id}".to_string());
        assert_eq!(config.intermediary_url(), Some("https://custom.example/{id}"));
    }

    #[tokio::test]
    async fn test_fetch_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new()
            .route(
                OPENID_CONFIGURATION_PATH,
                get(move |Query(query): Query<HashMap<String, String>>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(query.get("client_id").map(String::as_str), Some("urn:test"));
                        Json(json!({
                            "issuer": "https://idp.example",
                            "authorization_endpoint": "https://idp.example/oauth2/authorize",
                            "token_endpoint": "https://idp.example/oauth2/token",
                            "response_types_supported": ["code", "id_token"],
                            "response_modes_supported": ["query", "fragment"]
                        }))
                    }
                }),
            )
            .route(
                QR_CONFIGURATION_PATH,
                get(|| async {
                    Json(json!({
                        "csdc_wss_url": "wss://relay.example",
                        "csdc_session_url": "https://store.example/{id}",
                        "client": {"qr_enabled": false}
                    }))
                }),
            );
        let origin = serve(router).await;
        let client = MetadataClient::new(reqwest::Client::new(), origin, "urn:test");

        let openid = client.openid_configuration().await.unwrap();
        assert_eq!(openid.token_endpoint, "https://idp.example/oauth2/token");
        assert!(openid.acr_values_supported.is_none());
        client.openid_configuration().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let qr = client.qr_configuration().await.unwrap();
        assert!(!qr.client.qr_enabled);
        assert_eq!(qr.intermediary_url(), None);
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let origin = serve(Router::new()).await;
        let client = MetadataClient::new(reqwest::Client::new(), origin, "urn:test");
        assert!(matches!(
            client.qr_configuration().await,
            Err(ClientError::Status { status: 404, .. })
        ));
    }
}
