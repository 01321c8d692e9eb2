use crate::app::ports::{LabelSubject, LabelingPort};
use crate::constants::COLLABORATOR_TIMEOUT_SECS;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, warn};

/// AI labeling client speaking the OpenAI chat-completion wire format.
/// Strictly best-effort: any failure degrades to an empty suggestion map.
pub struct LabelingClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl LabelingClient {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn build_prompt(subjects: &[LabelSubject]) -> String {
        let listing = serde_json::to_string(
            &subjects
                .iter()
                .map(|s| json!({"name": s.name, "year": s.year, "overview": s.overview}))
                .collect::<Vec<_>>(),
        )
        .unwrap_or_default();
        format!(
            "请为以下影视剧打上 8-10 个精准的中文标签。\n\
             标签范围包括但不限于：题材(如古装,科幻)、风格(如悬疑,喜剧)、受众(如大女主,职场)、元素(如权谋,穿越)。\n\
             只返回纯JSON格式，不要Markdown格式，不要代码块：{{\"剧名\": [\"标签1\", \"标签2\"]}}\n\n\
             剧集：{listing}"
        )
    }

    async fn request_labels(&self, subjects: &[LabelSubject]) -> Result<HashMap<String, Vec<String>>> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": Self::build_prompt(subjects)}],
            "temperature": 0.2,
            "stream": false
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        let content = body["choices"][0]["message"]["content"].as_str().unwrap_or("");
        Ok(parse_label_response(content))
    }
}

/// Models wrap the JSON in markdown fences more often than not; strip them
/// before parsing. A malformed response yields an empty map.
pub fn parse_label_response(content: &str) -> HashMap<String, Vec<String>> {
    let cleaned = content.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    match serde_json::from_str::<HashMap<String, Vec<String>>>(cleaned) {
        Ok(map) => map,
        Err(e) => {
            warn!(%e, "labeling response was not the expected JSON shape");
            HashMap::new()
        }
    }
}

#[async_trait]
impl LabelingPort for LabelingClient {
    async fn suggest_labels(&self, subjects: &[LabelSubject]) -> HashMap<String, Vec<String>> {
        if subjects.is_empty() || self.api_key.trim().is_empty() {
            return HashMap::new();
        }
        match self.request_labels(subjects).await {
            Ok(map) => map,
            Err(e) => {
                error!(%e, "labeling request failed");
                HashMap::new()
            }
        }
    }
}
