//! OAuth2 authorize URL construction and authorization-code exchange

use crate::error::{ClientError, ClientResult};
use crate::metadata::{MetadataClient, OpenIdConfiguration};
use async_trait::async_trait;
use scanlogin_core::OAuth2Error;
use scanlogin_crypto::Pkce;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Response modes accepted on top of the ones the provider advertises
const EXTRA_RESPONSE_MODES: [&str; 2] = ["json", "post_message"];

/// Parameters of an authorization request
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    pub redirect_uri: String,
    pub response_type: String,
    pub response_mode: String,
    pub scope: String,
    pub acr_values: Vec<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub login_hint: Option<String>,
    pub ui_locales: Option<String>,
    pub prompt: Option<String>,
    /// Additional query parameters, appended in order
    pub extra: Vec<(String, String)>,
}

impl AuthorizeParams {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            response_type: "code".to_string(),
            response_mode: "query".to_string(),
            scope: "openid".to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: attach the public half of PKCE material
    pub fn with_pkce(mut self, pkce: &Pkce) -> Self {
        self.code_challenge = Some(pkce.code_challenge.clone());
        self.code_challenge_method = Some(pkce.code_challenge_method.clone());
        self
    }

    /// Builder pattern: set scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Builder pattern: set acr values
    pub fn with_acr_values(mut self, acr_values: Vec<String>) -> Self {
        self.acr_values = acr_values;
        self
    }

    /// Builder pattern: set correlation state
    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state = state;
        self
    }

    /// Builder pattern: set prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Build the authorize URL, validating the request against provider metadata
pub fn build_authorize_url(
    metadata: &OpenIdConfiguration,
    client_id: &str,
    params: &AuthorizeParams,
) -> ClientResult<String> {
    let modes_supported = metadata
        .response_modes_supported
        .iter()
        .map(String::as_str)
        .chain(EXTRA_RESPONSE_MODES)
        .collect::<Vec<_>>();
    if !modes_supported.contains(&params.response_mode.as_str()) {
        return Err(ClientError::InvalidRequest(format!(
            "responseMode must be one of {}",
            modes_supported.join(",")
        )));
    }

    if !metadata
        .response_types_supported
        .contains(&params.response_type)
    {
        return Err(ClientError::InvalidRequest(format!(
            "responseType must be one of {}",
            metadata.response_types_supported.join(",")
        )));
    }

    if let Some(acr_supported) = &metadata.acr_values_supported {
        if params.acr_values.iter().any(|v| !acr_supported.contains(v)) {
            return Err(ClientError::InvalidRequest(format!(
                "acrValues must all be one of {}",
                acr_supported.join(",")
            )));
        }
    }

    if params.redirect_uri.is_empty() {
        return Err(ClientError::InvalidRequest(
            "redirectUri must be defined".to_string(),
        ));
    }

    let mut url = Url::parse(&metadata.authorization_endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("scope", &params.scope);
        query.append_pair("client_id", client_id);
        if !params.acr_values.is_empty() {
            query.append_pair("acr_values", &params.acr_values.join(" "));
        }
        query.append_pair("redirect_uri", &params.redirect_uri);
        query.append_pair("response_type", &params.response_type);
        query.append_pair("response_mode", &params.response_mode);

        if let (Some(challenge), Some(method)) =
            (&params.code_challenge, &params.code_challenge_method)
        {
            query.append_pair("code_challenge", challenge);
            query.append_pair("code_challenge_method", method);
        }

        let optional = [
            ("state", &params.state),
            ("nonce", &params.nonce),
            ("login_hint", &params.login_hint),
            ("ui_locales", &params.ui_locales),
            ("prompt", &params.prompt),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                query.append_pair(name, value);
            }
        }

        for (name, value) in &params.extra {
            query.append_pair(name, value);
        }
    }

    Ok(url.to_string())
}

/// Input to the authorization-code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRequest {
    pub code: String,
    /// PKCE verifier; without one the code itself is the result
    pub code_verifier: Option<String>,
    pub redirect_uri: String,
    /// Caller correlation state, echoed on the result
    pub state: Option<String>,
}

/// Authorization result: either the bare code or the provider's token response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Any further provider fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Authorization-code token exchange
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange `request.code`. Provider rejections are reported as
    /// [`ClientError::OAuth2`] carrying the caller's state.
    async fn exchange(&self, request: ExchangeRequest) -> ClientResult<AuthorizeResponse>;
}

/// Token exchange against the provider's token endpoint
pub struct OAuth2Client {
    http: reqwest::Client,
    metadata: Arc<MetadataClient>,
}

impl OAuth2Client {
    pub fn new(http: reqwest::Client, metadata: Arc<MetadataClient>) -> Self {
        Self { http, metadata }
    }
}

#[async_trait]
impl TokenExchange for OAuth2Client {
    async fn exchange(&self, request: ExchangeRequest) -> ClientResult<AuthorizeResponse> {
        let Some(code_verifier) = request.code_verifier.clone() else {
            debug!("No PKCE verifier, returning authorization code");
            return Ok(AuthorizeResponse {
                code: Some(request.code),
                state: request.state,
                ..Default::default()
            });
        };

        let config = self.metadata.openid_configuration().await?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("client_id", self.metadata.client_id()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("code_verifier", code_verifier.as_str()),
        ];

        let response = self
            .http
            .post(&config.token_endpoint)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| ClientError::Status {
                status: status.as_u16(),
                message: body.clone(),
            })?;

        if value.get("error").is_some() {
            let mut error: OAuth2Error = serde_json::from_value(value)?;
            error.state = request.state;
            return Err(error.into());
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        let mut tokens: AuthorizeResponse = serde_json::from_value(value)?;
        tokens.state = request.state;
        info!("Exchanged authorization code for tokens");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::OPENID_CONFIGURATION_PATH;
    use crate::test_util::serve;
    use axum::{
        routing::{get, post},
        Form, Json, Router,
    };
    use scanlogin_crypto::pkce::challenge_for;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::OnceLock;

    fn openid(origin: &str) -> serde_json::Value {
        json!({
            "issuer": origin,
            "authorization_endpoint": "https://idp.example/oauth2/authorize",
            "token_endpoint": format!("{}/oauth2/token", origin),
            "response_types_supported": ["code", "id_token"],
            "response_modes_supported": ["query", "fragment", "form_post"],
            "acr_values_supported": ["urn:grn:authn:se:bankid", "urn:grn:authn:dk:mitid"]
        })
    }

    fn metadata() -> OpenIdConfiguration {
        serde_json::from_value(openid("https://idp.example")).unwrap()
    }

    #[test]
    fn test_authorize_url_parameter_order() {
        let pkce = Pkce::from_verifier("verifier".to_string());
        let params = AuthorizeParams::new("https://qr.example/")
            .with_pkce(&pkce)
            .with_acr_values(vec!["urn:grn:authn:se:bankid".to_string()])
            .with_state(Some("xyz".to_string()))
            .with_prompt("login");

        let url = build_authorize_url(&metadata(), "urn:client", &params).unwrap();
        let expected = format!(
            "https://idp.example/oauth2/authorize?scope=openid&client_id=urn%3Aclient\
             &acr_values=urn%3Agrn%3Aauthn%3Ase%3Abankid&redirect_uri=https%3A%2F%2Fqr.example%2F\
             &response_type=code&response_mode=query&code_challenge={}\
             &code_challenge_method=S256&state=xyz&prompt=login",
            challenge_for("verifier")
        );
        assert_eq!(url, expected);
    }

    #[test]
    fn test_authorize_url_validation() {
        let metadata = metadata();

        let mut params = AuthorizeParams::new("https://qr.example/");
        params.response_mode = "json".to_string();
        assert!(build_authorize_url(&metadata, "c", &params).is_ok());

        params.response_mode = "web_message".to_string();
        assert!(matches!(
            build_authorize_url(&metadata, "c", &params),
            Err(ClientError::InvalidRequest(_))
        ));

        let mut params = AuthorizeParams::new("https://qr.example/");
        params.response_type = "token".to_string();
        assert!(build_authorize_url(&metadata, "c", &params).is_err());

        let params = AuthorizeParams::new("https://qr.example/")
            .with_acr_values(vec!["urn:grn:authn:unknown".to_string()]);
        assert!(build_authorize_url(&metadata, "c", &params).is_err());

        let params = AuthorizeParams::new("");
        assert!(build_authorize_url(&metadata, "c", &params).is_err());
    }

    async fn create_test_client() -> OAuth2Client {
        let origin_slot = Arc::new(OnceLock::<String>::new());
        let slot = origin_slot.clone();
        let router = Router::new()
            .route(
                OPENID_CONFIGURATION_PATH,
                get(move || {
                    let slot = slot.clone();
                    async move { Json(openid(slot.get().map(String::as_str).unwrap_or_default())) }
                }),
            )
            .route(
                "/oauth2/token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    assert_eq!(form["grant_type"], "authorization_code");
                    assert_eq!(form["client_id"], "urn:client");
                    assert_eq!(form["redirect_uri"], "https://qr.example/");
                    assert_eq!(form["code_verifier"], "verifier");
                    if form["code"] == "expired" {
                        return (
                            axum::http::StatusCode::BAD_REQUEST,
                            Json(json!({"error": "invalid_grant", "error_description": "Code expired"})),
                        );
                    }
                    (
                        axum::http::StatusCode::OK,
                        Json(json!({"id_token": "X", "token_type": "Bearer", "expires_in": 60, "scope": "openid"})),
                    )
                }),
            );
        let origin = serve(router).await;
        origin_slot.set(origin.clone()).unwrap();

        let metadata = MetadataClient::new(reqwest::Client::new(), origin, "urn:client");
        OAuth2Client::new(reqwest::Client::new(), Arc::new(metadata))
    }

    fn request(code: &str, verifier: Option<&str>) -> ExchangeRequest {
        ExchangeRequest {
            code: code.to_string(),
            code_verifier: verifier.map(str::to_string),
            redirect_uri: "https://qr.example/".to_string(),
            state: Some("xyz".to_string()),
        }
    }

    #[tokio::test]
    async fn test_exchange_without_verifier_returns_code() {
        let client = create_test_client().await;
        let response = client.exchange(request("abc", None)).await.unwrap();
        assert_eq!(response.code.as_deref(), Some("abc"));
        assert_eq!(response.state.as_deref(), Some("xyz"));
        assert!(response.id_token.is_none());
    }

    #[tokio::test]
    async fn test_exchange_with_verifier() {
        let client = create_test_client().await;
        let response = client
            .exchange(request("abc", Some("verifier")))
            .await
            .unwrap();
        assert_eq!(response.id_token.as_deref(), Some("X"));
        assert_eq!(response.expires_in, Some(60));
        assert_eq!(response.state.as_deref(), Some("xyz"));
        assert_eq!(response.extra["scope"], "openid");
    }

    #[tokio::test]
    async fn test_exchange_provider_error() {
        let client = create_test_client().await;
        match client.exchange(request("expired", Some("verifier"))).await {
            Err(ClientError::OAuth2(error)) => {
                assert_eq!(error.error, "invalid_grant");
                assert_eq!(error.error_description.as_deref(), Some("Code expired"));
                assert_eq!(error.state.as_deref(), Some("xyz"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
