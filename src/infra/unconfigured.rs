use crate::app::ports::{
    MediaItem, MediaServerPort, MetadataPort, SubscriptionPort, SubscriptionReceipt,
    SubscriptionSpec, TagMode, TagUpdate,
};
use crate::error::{CuratorError, Result};
use crate::types::MediaKind;
use async_trait::async_trait;
use serde_json::Value;

/// Stand-in for a collaborator whose credentials are absent. Every call
/// fails with a configuration error, which the dispatcher contains to the
/// single action that needed the collaborator; other events keep flowing.
pub struct Unconfigured {
    what: &'static str,
}

impl Unconfigured {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }

    fn err<T>(&self) -> Result<T> {
        Err(CuratorError::Config(format!("{} is not configured", self.what)))
    }
}

#[async_trait]
impl MediaServerPort for Unconfigured {
    async fn get_item(&self, _item_id: &str) -> Result<Option<MediaItem>> {
        self.err()
    }
    async fn set_tags(&self, _item_id: &str, _tags: &[String], _mode: TagMode) -> Result<TagUpdate> {
        self.err()
    }
    async fn find_library_name(&self, _tmdb_id: &str) -> Result<Option<String>> {
        self.err()
    }
}

#[async_trait]
impl MetadataPort for Unconfigured {
    async fn get_details(&self, _external_id: &str, _kind: MediaKind) -> Result<Option<Value>> {
        self.err()
    }
}

#[async_trait]
impl SubscriptionPort for Unconfigured {
    async fn create_subscription(&self, _spec: &SubscriptionSpec) -> Result<SubscriptionReceipt> {
        self.err()
    }
    async fn update_subscription(&self, _spec: &SubscriptionSpec) -> Result<()> {
        self.err()
    }
    async fn get_subscription(&self, _id: i64) -> Result<Option<Value>> {
        self.err()
    }
}
