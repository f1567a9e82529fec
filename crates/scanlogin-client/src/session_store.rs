//! Session store client
//!
//! The initiating device publishes one [`SessionRecord`] per minted session at
//! a templated URL (`https://…/sessions/{id}`). The QR code encodes that URL;
//! the scanning device fetches it to learn the public key, the relay address
//! and the authorize URL to open.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use scanlogin_core::SessionRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Placeholder substituted by the session id
pub const ID_PLACEHOLDER: &str = "{id}";

/// Storage for published session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Publish (or overwrite) the record for `id`
    async fn save(&self, id: &str, record: &SessionRecord) -> ClientResult<()>;

    /// Fetch the record for `id`, `None` if there is none
    async fn get(&self, id: &str) -> ClientResult<Option<SessionRecord>>;

    /// Remove the record for `id`
    async fn delete(&self, id: &str) -> ClientResult<()>;
}

/// HTTP session store
#[derive(Debug, Clone)]
pub struct SessionApi {
    template: String,
    http: reqwest::Client,
}

impl SessionApi {
    /// Create a client for a URL template containing `{id}`
    pub fn new(template: impl Into<String>) -> ClientResult<Self> {
        Self::with_client(template, reqwest::Client::new())
    }

    /// Create a client sharing an existing HTTP connection pool
    pub fn with_client(template: impl Into<String>, http: reqwest::Client) -> ClientResult<Self> {
        let template = template.into();
        if !template.contains(ID_PLACEHOLDER) {
            return Err(ClientError::InvalidTemplate(format!(
                "expected {} to include the {} template argument",
                template, ID_PLACEHOLDER
            )));
        }
        Ok(Self { template, http })
    }

    /// Resolve the record URL for `id`
    pub fn url_for(&self, id: &str) -> String {
        self.template.replace(ID_PLACEHOLDER, id)
    }
}

#[async_trait]
impl SessionStore for SessionApi {
    async fn save(&self, id: &str, record: &SessionRecord) -> ClientResult<()> {
        let response = self.http.post(self.url_for(id)).json(record).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        debug!("Published session {}", id);
        Ok(())
    }

    async fn get(&self, id: &str) -> ClientResult<Option<SessionRecord>> {
        let response = self.http.get(self.url_for(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn delete(&self, id: &str) -> ClientResult<()> {
        let response = self.http.delete(self.url_for(id)).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        debug!("Deleted session {}", id);
        Ok(())
    }
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Ids of all stored records
    pub async fn ids(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, id: &str, record: &SessionRecord) -> ClientResult<()> {
        let mut records = self.records.write().await;
        records.insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> ClientResult<Option<SessionRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> ClientResult<()> {
        let mut records = self.records.write().await;
        records.remove(id);
        Ok(())
    }
}
