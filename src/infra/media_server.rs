use crate::app::ports::{MediaItem, MediaServerPort, TagMode, TagUpdate};
use crate::constants::COLLABORATOR_TIMEOUT_SECS;
use crate::error::{CuratorError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{info, warn};

/// Fields we ask the server to include so the write-back path has what it
/// needs (tags, lock flags) without a second fetch.
const ITEM_FIELDS: &str = "Tags,TagItems,LockData,LockedFields,ProviderIds,ProductionYear,Overview";

/// Server-managed fields that make an item update fail when echoed back.
const UPDATE_STRIP_FIELDS: &[&str] = &[
    "MediaSources",
    "PlayUserData",
    "SeasonUserData",
    "Container",
    "Size",
    "TagItems",
    "People",
    "Studios",
    "GenreItems",
];

/// Emby-compatible media-server client.
#[derive(Debug)]
pub struct MediaServerClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
    user_id: Option<String>,
}

impl MediaServerClient {
    pub fn new(host: &str, api_key: &str, user_id: Option<&str>) -> Result<Self> {
        if host.trim().is_empty() || api_key.trim().is_empty() {
            return Err(CuratorError::Config(
                "media server host or api key not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            user_id: user_id.filter(|u| !u.trim().is_empty()).map(str::to_string),
        })
    }

    /// The user-scoped endpoint sees user-specific state, so prefer it when
    /// a user id is configured.
    fn item_url(&self, item_id: &str) -> String {
        match &self.user_id {
            Some(user_id) => format!("{}/emby/Users/{}/Items/{}", self.host, user_id, item_id),
            None => format!("{}/emby/Items/{}", self.host, item_id),
        }
    }

    async fn fetch_raw(&self, item_id: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(self.item_url(item_id))
            .query(&[("api_key", self.api_key.as_str()), ("Fields", ITEM_FIELDS)])
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(resp.json().await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            s => Err(CuratorError::Api {
                message: format!("item lookup returned HTTP {s}"),
            }),
        }
    }

    fn item_from_raw(raw: &Value) -> MediaItem {
        let tags = read_tags(raw);
        let provider_ids = raw["ProviderIds"]
            .as_object()
            .map(|ids| {
                ids.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_else(HashMap::new);
        MediaItem {
            id: raw["Id"].as_str().unwrap_or_default().to_string(),
            name: raw["Name"].as_str().unwrap_or_default().to_string(),
            year: raw["ProductionYear"].as_i64().map(|y| y as i32),
            tags,
            provider_ids,
            overview: raw["Overview"].as_str().map(str::to_string),
            locked: raw["LockData"].as_bool().unwrap_or(false),
        }
    }
}

/// Older servers report tags under `TagItems` instead of `Tags`.
fn read_tags(raw: &Value) -> Vec<String> {
    let tags: Vec<String> = raw["Tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !tags.is_empty() {
        return tags;
    }
    raw["TagItems"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t["Name"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl MediaServerPort for MediaServerClient {
    async fn get_item(&self, item_id: &str) -> Result<Option<MediaItem>> {
        Ok(self.fetch_raw(item_id).await?.as_ref().map(Self::item_from_raw))
    }

    async fn set_tags(&self, item_id: &str, tags: &[String], mode: TagMode) -> Result<TagUpdate> {
        let Some(mut raw) = self.fetch_raw(item_id).await? else {
            return Err(CuratorError::Api {
                message: format!("item {item_id} not found for tag update"),
            });
        };

        let current: BTreeSet<String> = read_tags(&raw).into_iter().collect();
        let requested: BTreeSet<String> = tags.iter().cloned().collect();
        let merged: BTreeSet<String> = match mode {
            TagMode::Merge => current.union(&requested).cloned().collect(),
            TagMode::Overwrite => requested,
        };
        if merged == current {
            info!(item_id, "tags unchanged, skipping update");
            return Ok(TagUpdate::Unchanged);
        }

        raw["Tags"] = json!(merged.iter().collect::<Vec<_>>());

        // Unlock so the write sticks, then drop server-managed fields that
        // 500 the update when echoed back.
        if raw["LockData"].as_bool().unwrap_or(false) {
            raw["LockData"] = json!(false);
        }
        if raw["LockedFields"].as_array().map(|f| !f.is_empty()).unwrap_or(false) {
            raw["LockedFields"] = json!([]);
        }
        if let Some(obj) = raw.as_object_mut() {
            for field in UPDATE_STRIP_FIELDS {
                obj.remove(*field);
            }
        }

        let resp = self
            .client
            .post(format!("{}/emby/Items/{}", self.host, item_id))
            .query(&[("api_key", self.api_key.as_str())])
            .json(&raw)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CuratorError::Api {
                message: format!("tag update returned HTTP {}", resp.status()),
            });
        }
        info!(item_id, ?merged, "tags written");
        Ok(TagUpdate::Updated)
    }

    async fn find_library_name(&self, tmdb_id: &str) -> Result<Option<String>> {
        // Locate the item by provider id first
        let provider_query = format!("tmdb.{tmdb_id}");
        let resp = self
            .client
            .get(format!("{}/emby/Items", self.host))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("Recursive", "true"),
                ("AnyProviderIdEquals", provider_query.as_str()),
                ("IncludeItemTypes", "Series,Movie"),
                ("Fields", "ParentId"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CuratorError::Api {
                message: format!("provider id search returned HTTP {}", resp.status()),
            });
        }
        let body: Value = resp.json().await?;
        let Some(item_id) = body["Items"][0]["Id"].as_str().map(str::to_string) else {
            return Ok(None);
        };

        // Then walk the virtual folders until one contains it
        let libraries: Value = self
            .client
            .get(format!("{}/emby/Library/VirtualFolders", self.host))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?
            .json()
            .await?;
        for library in libraries.as_array().into_iter().flatten() {
            let Some(parent_id) = library["ItemId"].as_str() else {
                continue;
            };
            let check: Value = match self
                .client
                .get(format!("{}/emby/Items", self.host))
                .query(&[
                    ("api_key", self.api_key.as_str()),
                    ("Recursive", "true"),
                    ("ParentId", parent_id),
                    ("Ids", item_id.as_str()),
                ])
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => resp.json().await?,
                Ok(resp) => {
                    warn!(status = %resp.status(), "library membership check failed");
                    continue;
                }
                Err(e) => {
                    warn!(%e, "library membership check failed");
                    continue;
                }
            };
            if check["TotalRecordCount"].as_i64().unwrap_or(0) > 0 {
                return Ok(library["Name"].as_str().map(str::to_string));
            }
        }
        Ok(None)
    }
}
