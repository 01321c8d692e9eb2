use crate::app::ports::MetadataPort;
use crate::constants::COLLABORATOR_TIMEOUT_SECS;
use crate::error::{CuratorError, Result};
use crate::types::MediaKind;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// TMDB-compatible metadata database client.
#[derive(Debug)]
pub struct MetadataClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
    language: String,
}

impl MetadataClient {
    pub fn new(host: &str, api_key: &str, language: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(CuratorError::Config(
                "metadata database api key not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            language: language.to_string(),
        })
    }
}

#[async_trait]
impl MetadataPort for MetadataClient {
    async fn get_details(&self, external_id: &str, kind: MediaKind) -> Result<Option<Value>> {
        let url = format!("{}/{}/{}", self.host, kind.as_str(), external_id);
        let resp = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(resp.json().await?)),
            reqwest::StatusCode::NOT_FOUND => {
                warn!(external_id, kind = kind.as_str(), "metadata entry not found");
                Ok(None)
            }
            s => Err(CuratorError::Api {
                message: format!("metadata lookup returned HTTP {s}"),
            }),
        }
    }
}
