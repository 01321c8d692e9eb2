use crate::error::Result;
use crate::rules::{CategoryRuleSet, Scheme};
use crate::types::{HistoryEntry, MediaKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A media-server item reduced to the fields the workflows read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub name: String,
    pub year: Option<i32>,
    pub tags: Vec<String>,
    pub provider_ids: HashMap<String, String>,
    pub overview: Option<String>,
    /// Metadata locked on the server side; adapters clear this before
    /// writing tags.
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    /// Union of existing and new tags.
    Merge,
    /// Replace the tag list wholesale.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagUpdate {
    Updated,
    /// The item already carried the requested tags.
    Unchanged,
}

#[async_trait]
pub trait MediaServerPort: Send + Sync {
    async fn get_item(&self, item_id: &str) -> Result<Option<MediaItem>>;

    /// Write tags, handling locked metadata transparently. Reports
    /// `Unchanged` when the write would be a no-op.
    async fn set_tags(&self, item_id: &str, tags: &[String], mode: TagMode) -> Result<TagUpdate>;

    /// Resolve which library a tmdb-identified item lives in, if any.
    async fn find_library_name(&self, tmdb_id: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait MetadataPort: Send + Sync {
    /// Raw details payload for an external id, or None when unknown.
    async fn get_details(&self, external_id: &str, kind: MediaKind) -> Result<Option<Value>>;
}

/// A re-subscription request assembled from a matched scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub name: String,
    pub tmdb_id: i64,
    pub season: Option<i32>,
    pub year: Option<String>,
    pub media_type: MediaKind,
    /// Scheme action parameters handed through verbatim (quality, filter
    /// groups, downloader, sites, ...).
    pub action_params: HashMap<String, Value>,
    pub remark: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionReceipt {
    pub id: Option<i64>,
}

#[async_trait]
pub trait SubscriptionPort: Send + Sync {
    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<SubscriptionReceipt>;
    async fn update_subscription(&self, spec: &SubscriptionSpec) -> Result<()>;
    async fn get_subscription(&self, id: i64) -> Result<Option<Value>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelSubject {
    pub name: String,
    pub year: Option<i32>,
    pub overview: Option<String>,
}

#[async_trait]
pub trait LabelingPort: Send + Sync {
    /// Best-effort label suggestions keyed by subject name. Adapters return
    /// an empty map on any failure rather than an error.
    async fn suggest_labels(&self, subjects: &[LabelSubject]) -> HashMap<String, Vec<String>>;
}

#[async_trait]
pub trait HistoryStorePort: Send + Sync {
    /// Append an outcome record. Callers treat failures as log-only.
    async fn record(&self, entry: &HistoryEntry) -> Result<()>;
}

/// Which ordered scheme list to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    /// Re-subscription ("wash") schemes applied on subscription completion.
    Wash,
    /// Follow-up subscription schemes applied on subscription creation.
    Subscribe,
}

#[async_trait]
pub trait ConfigStorePort: Send + Sync {
    /// Read-only snapshot of the ordered scheme list; never assumed stable
    /// across calls.
    async fn schemes(&self, kind: SchemeKind) -> Result<Vec<Scheme>>;
    async fn category_rules(&self) -> Result<CategoryRuleSet>;
}
