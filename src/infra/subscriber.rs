use crate::app::ports::{SubscriptionPort, SubscriptionReceipt, SubscriptionSpec};
use crate::constants::{COLLABORATOR_TIMEOUT_SECS, LOGIN_TIMEOUT_SECS};
use crate::error::{CuratorError, Result};
use crate::types::MediaKind;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Subscription-manager client (MoviePilot-compatible API).
///
/// Every call logs in first; tokens are short-lived and the call volume is a
/// handful per day, so caching them buys nothing.
pub struct SubscriptionClient {
    client: reqwest::Client,
    host: String,
    username: String,
    password: String,
}

impl SubscriptionClient {
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self> {
        if host.trim().is_empty() || username.trim().is_empty() {
            return Err(CuratorError::Config(
                "subscription manager host or username not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/api/v1/login/access-token", self.host))
            .timeout(Duration::from_secs(LOGIN_TIMEOUT_SECS))
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CuratorError::Api {
                message: format!("login returned HTTP {}", resp.status()),
            });
        }
        let body: Value = resp.json().await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CuratorError::MissingField("access_token".to_string()))
    }
}

/// The API reports business-level failures inside a 200 response; success is
/// `success: true` or `code: 0`.
fn business_success(body: &Value) -> bool {
    body["success"].as_bool() == Some(true) || body["code"].as_i64() == Some(0)
}

fn build_payload(spec: &SubscriptionSpec) -> Value {
    let mut payload = Map::new();
    payload.insert("name".to_string(), json!(spec.name));
    payload.insert(
        "type".to_string(),
        json!(match spec.media_type {
            MediaKind::Movie => "电影",
            MediaKind::Tv => "电视剧",
        }),
    );
    payload.insert("tmdbid".to_string(), json!(spec.tmdb_id));
    payload.insert("season".to_string(), json!(spec.season.unwrap_or(1)));
    if let Some(year) = &spec.year {
        payload.insert("year".to_string(), json!(year));
    }
    payload.insert("best_version".to_string(), json!(true));
    payload.insert("remark".to_string(), json!(spec.remark));
    for (key, value) in &spec.action_params {
        // Empty site lists mean "all sites"; omit rather than send []
        if key == "sites" && value.as_array().map(|a| a.is_empty()).unwrap_or(false) {
            continue;
        }
        payload.insert(key.clone(), value.clone());
    }
    Value::Object(payload)
}

#[async_trait]
impl SubscriptionPort for SubscriptionClient {
    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<SubscriptionReceipt> {
        let token = self.access_token().await?;
        let payload = build_payload(spec);
        debug!(payload = %payload, "subscription payload");

        let resp = self
            .client
            .post(format!("{}/api/v1/subscribe/", self.host))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CuratorError::Api {
                message: format!("subscribe returned HTTP {}", resp.status()),
            });
        }
        let body: Value = resp.json().await?;
        if !business_success(&body) {
            return Err(CuratorError::Api {
                message: format!("subscribe rejected: {body}"),
            });
        }
        let id = body["data"]["id"].as_i64();
        info!(name = %spec.name, ?id, "subscription created");
        Ok(SubscriptionReceipt { id })
    }

    async fn update_subscription(&self, spec: &SubscriptionSpec) -> Result<()> {
        let token = self.access_token().await?;
        let payload = build_payload(spec);

        let resp = self
            .client
            .put(format!("{}/api/v1/subscribe/", self.host))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CuratorError::Api {
                message: format!("subscription update returned HTTP {}", resp.status()),
            });
        }
        let body: Value = resp.json().await?;
        if !business_success(&body) {
            return Err(CuratorError::Api {
                message: format!("subscription update rejected: {body}"),
            });
        }
        info!(name = %spec.name, "subscription updated");
        Ok(())
    }

    async fn get_subscription(&self, id: i64) -> Result<Option<Value>> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(format!("{}/api/v1/subscribe/{}", self.host, id))
            .bearer_auth(token)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(resp.json().await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            s => Err(CuratorError::Api {
                message: format!("subscription lookup returned HTTP {s}"),
            }),
        }
    }
}
