use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackendConfig;

/// Error body returned by PostgREST on a non-2xx response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostgrestError {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => write!(f, "{}: {}", code, msg),
            (None, Some(msg)) => write!(f, "{}", msg),
            (Some(code), None) => write!(f, "{}", code),
            (None, None) => write!(f, "no error body"),
        }?;
        if let Some(details) = &self.details {
            write!(f, "; {}", details)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend configuration: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service rejected query with status {status} ({body})")]
    Rejected {
        status: StatusCode,
        body: PostgrestError,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Rows returned by a select.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub rows: Vec<Value>,
}

/// Read capability the probe needs from a backend-as-a-service client.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn select(&self, table: &str, columns: &str) -> Result<QueryResponse, BackendError>;
}

/// PostgREST client speaking the Supabase REST dialect.
pub struct RestClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl RestClient {
    pub fn new(cfg: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = cfg.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BackendError::Config("backend url is empty".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(BackendError::Config(format!(
                "backend url must be http(s): {}",
                base_url
            )));
        }

        let anon_key = cfg
            .anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                BackendError::Config(format!(
                    "anon key not configured; set {} or backend.anon_key",
                    cfg.anon_key_env
                ))
            })?;

        let mut builder = Client::builder();
        if let Some(secs) = cfg.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(RestClient {
            client,
            base_url,
            anon_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

#[async_trait]
impl BackendClient for RestClient {
    async fn select(&self, table: &str, columns: &str) -> Result<QueryResponse, BackendError> {
        let url = self.table_url(table);
        tracing::debug!("select {} from {}", columns, url);

        let response = self
            .client
            .get(&url)
            .query(&[("select", columns)])
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body = serde_json::from_str::<PostgrestError>(&text).unwrap_or_else(|_| {
                PostgrestError {
                    message: (!text.is_empty()).then(|| text.clone()),
                    ..Default::default()
                }
            });
            return Err(BackendError::Rejected { status, body });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(rows)) => Ok(QueryResponse { rows }),
            Ok(other) => Err(BackendError::Decode(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(BackendError::Decode(e.to_string())),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build the shared client handle handed to the status view.
pub fn create_client(cfg: &BackendConfig) -> anyhow::Result<Arc<dyn BackendClient>> {
    let client = RestClient::new(cfg)?;
    tracing::info!("backend client configured for {}", client.base_url);
    Ok(Arc::new(client))
}
