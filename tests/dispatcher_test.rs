use async_trait::async_trait;
use media_curator::app::ports::{
    ConfigStorePort, HistoryStorePort, LabelSubject, LabelingPort, MediaItem, MediaServerPort,
    MetadataPort, SchemeKind, SubscriptionPort, SubscriptionReceipt, SubscriptionSpec, TagMode,
    TagUpdate,
};
use media_curator::constants::SYSTEM_DEFAULT_SCHEME;
use media_curator::dispatcher::Dispatcher;
use media_curator::error::{CuratorError, Result};
use media_curator::rules::{CategoryRuleSet, Scheme};
use media_curator::types::{DispatchOutcome, EntityKind, HistoryEntry, MediaKind, NormalizedEvent};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::advance;

// ---- mock collaborators ----

#[derive(Default)]
struct MockMediaServer {
    items: Mutex<HashMap<String, MediaItem>>,
    library: Option<String>,
    set_tags_calls: AtomicUsize,
}

#[async_trait]
impl MediaServerPort for MockMediaServer {
    async fn get_item(&self, item_id: &str) -> Result<Option<MediaItem>> {
        Ok(self.items.lock().unwrap().get(item_id).cloned())
    }

    async fn set_tags(&self, item_id: &str, tags: &[String], mode: TagMode) -> Result<TagUpdate> {
        self.set_tags_calls.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(item_id).ok_or_else(|| CuratorError::Api {
            message: "unknown item".to_string(),
        })?;
        let before = item.tags.clone();
        match mode {
            TagMode::Merge => {
                for tag in tags {
                    if !item.tags.contains(tag) {
                        item.tags.push(tag.clone());
                    }
                }
            }
            TagMode::Overwrite => item.tags = tags.to_vec(),
        }
        if item.tags == before {
            Ok(TagUpdate::Unchanged)
        } else {
            Ok(TagUpdate::Updated)
        }
    }

    async fn find_library_name(&self, _tmdb_id: &str) -> Result<Option<String>> {
        Ok(self.library.clone())
    }
}

#[derive(Default)]
struct MockMetadata {
    details: Option<Value>,
}

#[async_trait]
impl MetadataPort for MockMetadata {
    async fn get_details(&self, _external_id: &str, _kind: MediaKind) -> Result<Option<Value>> {
        Ok(self.details.clone())
    }
}

#[derive(Default)]
struct MockSubscriber {
    created: Mutex<Vec<SubscriptionSpec>>,
    updated: Mutex<Vec<SubscriptionSpec>>,
    fail: bool,
}

#[async_trait]
impl SubscriptionPort for MockSubscriber {
    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<SubscriptionReceipt> {
        if self.fail {
            return Err(CuratorError::Api {
                message: "subscribe rejected".to_string(),
            });
        }
        self.created.lock().unwrap().push(spec.clone());
        Ok(SubscriptionReceipt { id: Some(7) })
    }

    async fn update_subscription(&self, spec: &SubscriptionSpec) -> Result<()> {
        if self.fail {
            return Err(CuratorError::Api {
                message: "update rejected".to_string(),
            });
        }
        self.updated.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn get_subscription(&self, _id: i64) -> Result<Option<Value>> {
        Ok(None)
    }
}

#[derive(Default)]
struct MockLabeler {
    responses: HashMap<String, Vec<String>>,
    calls: AtomicUsize,
    subjects_seen: Mutex<Vec<String>>,
}

#[async_trait]
impl LabelingPort for MockLabeler {
    async fn suggest_labels(&self, subjects: &[LabelSubject]) -> HashMap<String, Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut seen = self.subjects_seen.lock().unwrap();
        for subject in subjects {
            seen.push(subject.name.clone());
        }
        self.responses.clone()
    }
}

#[derive(Default)]
struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

#[async_trait]
impl HistoryStorePort for MemoryHistory {
    async fn record(&self, entry: &HistoryEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
struct StaticConfig {
    wash: Vec<Scheme>,
    subscribe: Vec<Scheme>,
    rules: CategoryRuleSet,
}

#[async_trait]
impl ConfigStorePort for StaticConfig {
    async fn schemes(&self, kind: SchemeKind) -> Result<Vec<Scheme>> {
        Ok(match kind {
            SchemeKind::Wash => self.wash.clone(),
            SchemeKind::Subscribe => self.subscribe.clone(),
        })
    }

    async fn category_rules(&self) -> Result<CategoryRuleSet> {
        Ok(self.rules.clone())
    }
}

// ---- helpers ----

struct Fixture {
    media_server: Arc<MockMediaServer>,
    labeler: Arc<MockLabeler>,
    subscriber: Arc<MockSubscriber>,
    history: Arc<MemoryHistory>,
    dispatcher: Dispatcher,
}

fn fixture(
    media_server: MockMediaServer,
    metadata: MockMetadata,
    subscriber: MockSubscriber,
    labeler: MockLabeler,
    config: StaticConfig,
) -> Fixture {
    let media_server = Arc::new(media_server);
    let labeler = Arc::new(labeler);
    let subscriber = Arc::new(subscriber);
    let history = Arc::new(MemoryHistory::default());
    let dispatcher = Dispatcher::new(
        media_server.clone(),
        Arc::new(metadata),
        subscriber.clone(),
        labeler.clone(),
        history.clone(),
        Arc::new(config),
        Duration::from_secs(15),
    );
    Fixture {
        media_server,
        labeler,
        subscriber,
        history,
        dispatcher,
    }
}

fn item(id: &str, name: &str, tags: &[&str]) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        name: name.to_string(),
        year: Some(2023),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        provider_ids: HashMap::new(),
        overview: None,
        locked: false,
    }
}

fn event(kind: EntityKind, id: &str, name: &str) -> NormalizedEvent {
    NormalizedEvent {
        entity_id: id.to_string(),
        entity_kind: kind,
        display_name: name.to_string(),
        year: Some(2023),
        provider_ids: HashMap::new(),
        overview: None,
        parent_series_id: None,
        raw_category: None,
        season: Some(1),
    }
}

fn sub_event(name: &str, tmdb: &str, category: Option<&str>) -> NormalizedEvent {
    let mut e = event(EntityKind::SubscriptionCompleted, "sub-1", name);
    e.provider_ids.insert("tmdb".to_string(), tmdb.to_string());
    e.raw_category = category.map(str::to_string);
    e
}

fn scheme(name: &str, keywords: Value, extra: Value) -> Scheme {
    let mut obj = json!({"name": name, "keywords": keywords});
    if let (Some(dst), Some(src)) = (obj.as_object_mut(), extra.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(obj).unwrap()
}

// ---- immediate movie path ----

#[tokio::test]
async fn movie_event_is_tagged_immediately() {
    let media = MockMediaServer::default();
    media
        .items
        .lock()
        .unwrap()
        .insert("m1".to_string(), item("m1", "流浪地球", &[]));
    let labeler = MockLabeler {
        responses: HashMap::from([("流浪地球".to_string(), vec!["科幻".to_string(), "灾难".to_string()])]),
        ..Default::default()
    };
    let f = fixture(media, MockMetadata::default(), MockSubscriber::default(), labeler, StaticConfig::default());

    let outcome = f.dispatcher.handle(event(EntityKind::Movie, "m1", "流浪地球")).await;
    assert_eq!(outcome, DispatchOutcome::Acted);
    let tags = f.media_server.items.lock().unwrap()["m1"].tags.clone();
    assert_eq!(tags, vec!["科幻", "灾难"]);
}

#[tokio::test]
async fn already_tagged_item_is_skipped_without_labeling() {
    let media = MockMediaServer::default();
    media
        .items
        .lock()
        .unwrap()
        .insert("m1".to_string(), item("m1", "流浪地球", &["科幻"]));
    let f = fixture(
        media,
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        StaticConfig::default(),
    );

    // Twice: the second pass must also skip rather than duplicate work
    for _ in 0..2 {
        let outcome = f.dispatcher.handle(event(EntityKind::Movie, "m1", "流浪地球")).await;
        assert_eq!(outcome, DispatchOutcome::AlreadySatisfied);
    }
    assert_eq!(f.labeler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.media_server.set_tags_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ambiguous_labeling_result_is_a_skip_not_a_guess() {
    let media = MockMediaServer::default();
    media
        .items
        .lock()
        .unwrap()
        .insert("m1".to_string(), item("m1", "流浪地球", &[]));
    let labeler = MockLabeler {
        responses: HashMap::from([
            ("甲".to_string(), vec!["a".to_string()]),
            ("乙".to_string(), vec!["b".to_string()]),
        ]),
        ..Default::default()
    };
    let f = fixture(media, MockMetadata::default(), MockSubscriber::default(), labeler, StaticConfig::default());

    let outcome = f.dispatcher.handle(event(EntityKind::Movie, "m1", "流浪地球")).await;
    assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
    assert_eq!(f.media_server.set_tags_calls.load(Ordering::SeqCst), 0);
}

// ---- debounced series path ----

#[tokio::test(start_paused = true)]
async fn episode_burst_coalesces_into_one_tagging_run() {
    let media = MockMediaServer::default();
    media
        .items
        .lock()
        .unwrap()
        .insert("s1".to_string(), item("s1", "漫长的季节", &[]));
    let labeler = MockLabeler {
        responses: HashMap::from([("漫长的季节".to_string(), vec!["悬疑".to_string()])]),
        ..Default::default()
    };
    let f = fixture(media, MockMetadata::default(), MockSubscriber::default(), labeler, StaticConfig::default());

    // Three episodes of the same series at t=0, 5, 10
    for i in 0..3 {
        let mut e = event(EntityKind::Episode, &format!("ep-{i}"), "漫长的季节");
        e.parent_series_id = Some("s1".to_string());
        let outcome = f.dispatcher.handle(e).await;
        assert_eq!(outcome, DispatchOutcome::Deferred);
        if i < 2 {
            advance(Duration::from_secs(5)).await;
        }
    }
    assert_eq!(f.dispatcher.pending_series(), 1);

    // t=24: countdown restarted at t=10, so nothing yet
    advance(Duration::from_secs(14)).await;
    assert_eq!(f.labeler.calls.load(Ordering::SeqCst), 0);

    advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(f.labeler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.dispatcher.pending_series(), 0);
    assert!(f.dispatcher.series_idle());
    let tags = f.media_server.items.lock().unwrap()["s1"].tags.clone();
    assert_eq!(tags, vec!["悬疑"]);
}

#[tokio::test(start_paused = true)]
async fn firing_uses_payload_from_latest_event() {
    let media = MockMediaServer::default();
    media
        .items
        .lock()
        .unwrap()
        .insert("s1".to_string(), item("s1", "old name", &[]));
    let labeler = MockLabeler {
        responses: HashMap::from([("new name".to_string(), vec!["tag".to_string()])]),
        ..Default::default()
    };
    let f = fixture(media, MockMetadata::default(), MockSubscriber::default(), labeler, StaticConfig::default());

    let mut first = event(EntityKind::Series, "s1", "old name");
    first.parent_series_id = None;
    f.dispatcher.handle(first).await;
    advance(Duration::from_secs(5)).await;
    f.dispatcher.handle(event(EntityKind::Series, "s1", "new name")).await;

    advance(Duration::from_secs(16)).await;
    tokio::task::yield_now().await;
    let seen = f.labeler.subjects_seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["new name"]);
}

#[tokio::test]
async fn episode_without_parent_series_is_dropped() {
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        StaticConfig::default(),
    );
    let outcome = f.dispatcher.handle(event(EntityKind::Episode, "ep-1", "孤儿集")).await;
    assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
    assert_eq!(f.dispatcher.pending_series(), 0);
}

// ---- wash (re-subscription) path ----

#[tokio::test]
async fn completed_subscription_is_washed_under_matching_scheme() {
    let config = StaticConfig {
        wash: vec![
            scheme("CN", json!("国产"), json!({"quality": "WEB-DL", "downloader": "qb完结"})),
            scheme("Fallback", json!([]), json!({"quality": "1080p"})),
        ],
        ..Default::default()
    };
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        config,
    );

    let outcome = f.dispatcher.handle(sub_event("国产剧场", "123", None)).await;
    assert_eq!(outcome, DispatchOutcome::Acted);

    let created = f.subscriber.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].tmdb_id, 123);
    assert_eq!(created[0].action_params["quality"], json!("WEB-DL"));
    assert_eq!(created[0].remark, "auto-wash:CN");

    let history = f.history.entries.lock().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "success");
}

#[tokio::test]
async fn wash_uses_library_name_to_enrich_subject() {
    let media = MockMediaServer {
        library: Some("国产剧".to_string()),
        ..Default::default()
    };
    let config = StaticConfig {
        wash: vec![scheme("CN", json!("国产"), json!({}))],
        ..Default::default()
    };
    let f = fixture(media, MockMetadata::default(), MockSubscriber::default(), MockLabeler::default(), config);

    // Display name alone would not match; the library name does
    let outcome = f.dispatcher.handle(sub_event("漫长的季节", "123", None)).await;
    assert_eq!(outcome, DispatchOutcome::Acted);
}

#[tokio::test]
async fn wash_falls_back_to_system_default_scheme() {
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        StaticConfig::default(),
    );

    let outcome = f.dispatcher.handle(sub_event("Foreign Drama", "123", None)).await;
    assert_eq!(outcome, DispatchOutcome::Acted);
    let created = f.subscriber.created.lock().unwrap();
    assert_eq!(created[0].remark, format!("auto-wash:{SYSTEM_DEFAULT_SCHEME}"));
}

#[tokio::test]
async fn classified_category_feeds_the_matcher_when_upstream_left_it_blank() {
    let metadata = MockMetadata {
        details: Some(json!({
            "origin_country": ["CN"],
            "genres": [{"id": 18}],
            "original_language": "zh"
        })),
    };
    let config = StaticConfig {
        wash: vec![scheme("CN", json!("国产剧"), json!({}))],
        rules: serde_json::from_value(json!({
            "tv": [{"name": "国产剧", "conditions": {"origin_country": "CN,TW"}}]
        }))
        .unwrap(),
        ..Default::default()
    };
    let f = fixture(MockMediaServer::default(), metadata, MockSubscriber::default(), MockLabeler::default(), config);

    // "国产剧" never appears in the subject text; the classifier supplies it
    // as the category and keyword equality does the rest
    let outcome = f.dispatcher.handle(sub_event("Some Show", "123", None)).await;
    assert_eq!(outcome, DispatchOutcome::Acted);
    assert_eq!(f.subscriber.created.lock().unwrap()[0].remark, "auto-wash:CN");
}

#[tokio::test]
async fn subscriber_failure_is_contained_and_recorded() {
    let subscriber = MockSubscriber {
        fail: true,
        ..Default::default()
    };
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        subscriber,
        MockLabeler::default(),
        StaticConfig::default(),
    );

    let outcome = f.dispatcher.handle(sub_event("国产剧场", "123", None)).await;
    assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    let history = f.history.entries.lock().unwrap();
    assert_eq!(history[0].status, "failed");
}

#[tokio::test]
async fn subscription_without_tmdb_id_is_skipped() {
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        StaticConfig::default(),
    );
    let outcome = f
        .dispatcher
        .handle(event(EntityKind::SubscriptionCompleted, "sub-1", "无ID剧"))
        .await;
    assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
    assert!(f.subscriber.created.lock().unwrap().is_empty());
}

// ---- subscription_added path ----

#[tokio::test]
async fn new_subscription_gets_follow_up_scheme_applied() {
    let config = StaticConfig {
        subscribe: vec![scheme("追更", json!("国产"), json!({"quality": "1080p"}))],
        ..Default::default()
    };
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        config,
    );

    let mut e = sub_event("国产剧场", "123", None);
    e.entity_kind = EntityKind::SubscriptionAdded;
    let outcome = f.dispatcher.handle(e).await;
    assert_eq!(outcome, DispatchOutcome::Acted);
    assert_eq!(f.subscriber.updated.lock().unwrap().len(), 1);
    assert!(f.subscriber.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn new_subscription_with_no_matching_scheme_is_a_no_op() {
    let config = StaticConfig {
        subscribe: vec![scheme("追更", json!("国产"), json!({}))],
        ..Default::default()
    };
    let f = fixture(
        MockMediaServer::default(),
        MockMetadata::default(),
        MockSubscriber::default(),
        MockLabeler::default(),
        config,
    );

    let mut e = sub_event("Foreign Drama", "123", None);
    e.entity_kind = EntityKind::SubscriptionAdded;
    let outcome = f.dispatcher.handle(e).await;
    assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
    assert!(f.subscriber.updated.lock().unwrap().is_empty());
}
