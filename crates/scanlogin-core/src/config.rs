//! Configuration types for scanlogin

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a fresh session (and QR code) is minted while unacknowledged
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(2500);

/// How long a displayed QR code stays a valid decryption target
pub const DEFAULT_LIFETIME_BUDGET: Duration = Duration::from_secs(30);

/// RSA modulus size for per-session key pairs
pub const DEFAULT_KEY_BITS: usize = 2048;

/// OAuth2 response type requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Return the authorization code without exchanging it
    Code,
    /// Exchange the code (with PKCE) for an id token
    #[default]
    IdToken,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::IdToken => "id_token",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(ResponseType::Code),
            "id_token" | "id-token" => Ok(ResponseType::IdToken),
            _ => Err(format!("Invalid response type: {}. Use: code, id_token", s)),
        }
    }
}

/// Timing and key parameters for one QR handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Interval between session refreshes
    pub refresh_interval: Duration,
    /// Total time a minted session remains acceptable before acknowledgment
    pub lifetime_budget: Duration,
    /// RSA modulus size in bits
    pub key_bits: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            lifetime_budget: DEFAULT_LIFETIME_BUDGET,
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl HandshakeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Builder pattern: set lifetime budget
    pub fn with_lifetime_budget(mut self, budget: Duration) -> Self {
        self.lifetime_budget = budget;
        self
    }

    /// Builder pattern: set key size
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Maximum number of sessions kept as decryption candidates.
    ///
    /// `floor(lifetime_budget / refresh_interval)`, never less than one.
    pub fn cap(&self) -> usize {
        let refresh = self.refresh_interval.as_nanos();
        if refresh == 0 {
            return 1;
        }
        usize::try_from(self.lifetime_budget.as_nanos() / refresh)
            .unwrap_or(usize::MAX)
            .max(1)
    }
}

/// Identity provider settings for the authorizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Provider domain, e.g. `example.idp.io`. A full `http(s)://` origin is
    /// used verbatim.
    pub domain: String,
    /// OAuth2 client id
    pub client_id: String,
    /// Requested scope
    pub scope: String,
    /// Response type the caller ultimately wants
    pub response_type: ResponseType,
    /// Authentication context class references
    pub acr_values: Vec<String>,
}

impl ClientConfig {
    pub fn new(domain: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            scope: "openid".to_string(),
            response_type: ResponseType::default(),
            acr_values: Vec::new(),
        }
    }

    /// Builder pattern: set scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Builder pattern: set response type
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Builder pattern: set acr values
    pub fn with_acr_values(mut self, acr_values: Vec<String>) -> Self {
        self.acr_values = acr_values;
        self
    }

    /// Origin the provider metadata is served from
    pub fn authority(&self) -> String {
        if self.domain.starts_with("http://") || self.domain.starts_with("https://") {
            self.domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.domain)
        }
    }
}
