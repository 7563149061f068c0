//! Client for the RAGFlow HTTP API.
//!
//! Every JSON endpoint answers with a `{code, message, data}` envelope. A
//! call only succeeds when the HTTP status is 2xx, the body parses and
//! `code` is zero; anything else becomes a [`RagflowError`].

pub mod agents;
pub mod assist;
pub mod datasets;
pub mod documents;
pub mod models;
pub mod retrieval;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Application code the agent endpoints use for a session owned by someone else.
pub const SESSION_NOT_OWNED_CODE: i64 = 102;
const SESSION_NOT_OWNED_MESSAGE: &str = "don't own the session";

#[derive(Debug, Clone)]
pub struct RagflowConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RagflowError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request failed ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Invalid JSON response: {0}")]
    Parse(String),
}

impl RagflowError {
    pub fn is_session_not_owned(&self) -> bool {
        matches!(
            self,
            RagflowError::Api { code, message }
                if *code == SESSION_NOT_OWNED_CODE && message.contains(SESSION_NOT_OWNED_MESSAGE)
        )
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Clone)]
pub struct RagflowClient {
    http: Client,
    config: RagflowConfig,
}

impl RagflowClient {
    pub fn new(config: RagflowConfig, timeout: Duration) -> Result<Self, RagflowError> {
        let http = crate::http_client(timeout)?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: Client, mut config: RagflowConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { http, config }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn has_api_key(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RagflowError> {
        self.send(self.http.get(self.url(path))).await
    }

    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, RagflowError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    pub(crate) async fn delete<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), RagflowError> {
        self.send::<Value>(self.http.delete(self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<T, RagflowError> {
        let resp = req
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await?;

        let status = resp.status();
        let url = resp.url().to_string();
        let text = resp.text().await?;
        tracing::debug!(%url, status = status.as_u16(), "RAGFlow response");

        if !status.is_success() {
            return Err(RagflowError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            let raw: String = text.chars().take(100).collect();
            RagflowError::Parse(format!("{}, raw: {}", e, raw))
        })?;

        if envelope.code != 0 {
            return Err(RagflowError::Api {
                code: envelope.code,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Request failed".to_string()),
            });
        }

        serde_json::from_value(envelope.data).map_err(|e| RagflowError::Parse(e.to_string()))
    }
}
