//! Remote sync API client.
//!
//! The engine talks to the remote authority through the [`SyncTransport`]
//! seam; [`HttpSyncTransport`] is the production implementation over the
//! `/sync/push`, `/sync/pull` and `/health` endpoints.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{ChangeLogEntry, ChangeOperation, ChangePayload};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Batch of local changes submitted to `POST /sync/push`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub device_id: String,
    pub changes: Vec<PushedChange>,
}

/// Wire form of one change log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedChange {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub payload: ChangePayload,
    pub timestamp: i64,
    pub device_id: String,
    pub version: i64,
}

impl From<&ChangeLogEntry> for PushedChange {
    fn from(entry: &ChangeLogEntry) -> Self {
        Self {
            id: entry.id.as_str(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            operation: entry.operation,
            payload: entry.payload.clone(),
            timestamp: entry.timestamp,
            device_id: entry.device_id.clone(),
            version: entry.version,
        }
    }
}

/// Per-entry acknowledgements returned by the push endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub results: Vec<PushResult>,
}

/// Ack or reject for one pushed change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResult {
    pub id: String,
    pub accepted: bool,
    /// Server-assigned canonical version for accepted changes
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Remote changes newer than the requested version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub changes: Vec<RemoteChange>,
    /// Highest version known to the server at response time
    #[serde(default)]
    pub latest_version: i64,
}

/// One remote change delivered by the pull endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub version: i64,
    #[serde(default)]
    pub payload: Option<Value>,
    /// Originating device, used to skip our own echoed changes
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Transport seam between the engine and the remote sync endpoints
pub trait SyncTransport: Send + Sync {
    /// Submit a batch of local changes
    fn push(&self, request: PushRequest) -> impl Future<Output = Result<PushResponse>> + Send;

    /// Fetch remote changes newer than `since`
    fn pull(&self, since: i64) -> impl Future<Output = Result<PullResponse>> + Send;

    /// One reachability check against the health endpoint
    fn health(&self) -> impl Future<Output = bool> + Send;
}

/// HTTP implementation of the sync endpoints with bearer authentication
pub struct HttpSyncTransport {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpSyncTransport {
    /// Build a transport for the given base URL.
    ///
    /// The URL must carry an http(s) scheme; a trailing slash is stripped.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            base_url,
            auth_token: normalize_text_option(auth_token),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

impl SyncTransport for HttpSyncTransport {
    fn push(&self, request: PushRequest) -> impl Future<Output = Result<PushResponse>> + Send {
        async move {
            let response = self
                .authorize(self.client.post(format!("{}/sync/push", self.base_url)))
                .header("Accept", "application/json")
                .json(&request)
                .send()
                .await?;
            Self::read_json(response).await
        }
    }

    fn pull(&self, since: i64) -> impl Future<Output = Result<PullResponse>> + Send {
        async move {
            let response = self
                .authorize(self.client.get(format!("{}/sync/pull", self.base_url)))
                .header("Accept", "application/json")
                .query(&[("since", since)])
                .send()
                .await?;
            Self::read_json(response).await
        }
    }

    fn health(&self) -> impl Future<Output = bool> + Send {
        async move {
            match self
                .client
                .head(format!("{}/health", self.base_url))
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(_) => false,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        Error::InvalidInput("sync endpoint must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "sync endpoint must include http:// or https://".to_string(),
        ))
    }
}
