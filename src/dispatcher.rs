use crate::app::ports::{
    ConfigStorePort, HistoryStorePort, LabelSubject, LabelingPort, MediaServerPort, MetadataPort,
    SchemeKind, SubscriptionPort, SubscriptionSpec, TagMode, TagUpdate,
};
use crate::classifier::{classify, FeatureSet};
use crate::constants::{HISTORY_FAILED, HISTORY_SKIPPED, HISTORY_SUCCESS};
use crate::debounce::Debouncer;
use crate::error::CuratorError;
use crate::labelmatch::{associate_labels, clean_display_name};
use crate::matcher::{match_scheme, DEFAULT_SCHEME};
use crate::rules::Scheme;
use crate::types::{
    DispatchOutcome, EntityKind, HistoryEntry, MediaKind, NormalizedEvent, SeriesPayload,
};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Routes normalized events to immediate processing or the debounce window,
/// and owns the downstream workflows (tagging, re-subscription).
///
/// Failures inside one event's processing are contained to that event: the
/// outcome reports them, nothing propagates.
#[derive(Clone)]
pub struct Dispatcher {
    media_server: Arc<dyn MediaServerPort>,
    metadata: Arc<dyn MetadataPort>,
    subscriber: Arc<dyn SubscriptionPort>,
    labeler: Arc<dyn LabelingPort>,
    history: Arc<dyn HistoryStorePort>,
    config_store: Arc<dyn ConfigStorePort>,
    debouncer: Arc<Debouncer<SeriesPayload>>,
    debounce_window: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        media_server: Arc<dyn MediaServerPort>,
        metadata: Arc<dyn MetadataPort>,
        subscriber: Arc<dyn SubscriptionPort>,
        labeler: Arc<dyn LabelingPort>,
        history: Arc<dyn HistoryStorePort>,
        config_store: Arc<dyn ConfigStorePort>,
        debounce_window: Duration,
    ) -> Self {
        Self {
            media_server,
            metadata,
            subscriber,
            labeler,
            history,
            config_store,
            debouncer: Arc::new(Debouncer::new()),
            debounce_window,
        }
    }

    /// Number of series currently parked in the debounce window.
    pub fn pending_series(&self) -> usize {
        self.debouncer.pending()
    }

    /// True when no series is parked and no debounced tagging run is still
    /// executing. The shutdown path waits on this so a firing that has
    /// claimed its payload is not dropped mid-workflow.
    pub fn series_idle(&self) -> bool {
        self.debouncer.is_idle()
    }

    #[instrument(skip(self, event), fields(kind = ?event.entity_kind, name = %event.display_name))]
    pub async fn handle(&self, event: NormalizedEvent) -> DispatchOutcome {
        counter!("curator_events_received_total").increment(1);
        let outcome = match event.entity_kind {
            EntityKind::Movie => self.tag_workflow_for_event(&event).await,
            EntityKind::Series | EntityKind::Episode => self.defer_series(&event),
            EntityKind::SubscriptionCompleted => self.wash_workflow(&event).await,
            EntityKind::SubscriptionAdded => self.subscribe_workflow(&event).await,
        };
        match &outcome {
            DispatchOutcome::Failed(reason) => {
                counter!("curator_events_failed_total").increment(1);
                error!(reason, "event handling failed");
            }
            other => {
                counter!("curator_events_handled_total").increment(1);
                info!(outcome = ?other, "event handled");
            }
        }
        outcome
    }

    /// Series and episode events share one debounce key: the series id. An
    /// episode without a resolvable parent has no grouping key and is
    /// dropped with a warning.
    fn defer_series(&self, event: &NormalizedEvent) -> DispatchOutcome {
        let series_id = match event.entity_kind {
            EntityKind::Series => Some(event.entity_id.clone()),
            EntityKind::Episode => event.parent_series_id.clone(),
            _ => unreachable!("defer_series only sees series/episode events"),
        };
        let Some(series_id) = series_id else {
            warn!(name = %event.display_name, "episode without parent series id, dropping");
            return DispatchOutcome::Skipped("episode has no parent series id".to_string());
        };

        let payload = SeriesPayload::from_event(series_id.clone(), event);
        let dispatcher = self.clone();
        self.debouncer
            .submit(&series_id, payload, self.debounce_window, move |payload| async move {
                dispatcher.process_series_fire(payload).await;
            });
        DispatchOutcome::Deferred
    }

    async fn process_series_fire(&self, payload: SeriesPayload) {
        info!(series = %payload.display_name, "debounce window elapsed, tagging series");
        let outcome = self
            .tag_workflow(
                &payload.series_id,
                &payload.display_name,
                payload.year,
                payload.overview.as_deref(),
            )
            .await;
        if let DispatchOutcome::Failed(reason) = outcome {
            // Terminal for this firing; no automatic re-arm.
            error!(series = %payload.display_name, reason, "debounced tagging failed");
        }
    }

    async fn tag_workflow_for_event(&self, event: &NormalizedEvent) -> DispatchOutcome {
        self.tag_workflow(
            &event.entity_id,
            &event.display_name,
            event.year,
            event.overview.as_deref(),
        )
        .await
    }

    /// Label an item via the AI labeler and write the tags back, unless the
    /// item already carries tags (idempotency guard at fire time).
    async fn tag_workflow(
        &self,
        item_id: &str,
        display_name: &str,
        year: Option<i32>,
        overview: Option<&str>,
    ) -> DispatchOutcome {
        // Re-fetch current state; the event payload may be stale by now.
        let item = match self.media_server.get_item(item_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(item_id, "item not found on media server");
                return DispatchOutcome::Skipped("item not found".to_string());
            }
            Err(e) => return DispatchOutcome::Failed(format!("media server lookup: {e}")),
        };

        if !item.tags.is_empty() {
            info!(item_id, tags = ?item.tags, "item already tagged, skipping");
            counter!("curator_tagging_skipped_total").increment(1);
            return DispatchOutcome::AlreadySatisfied;
        }

        let subject = clean_display_name(display_name);
        let subjects = vec![LabelSubject {
            name: subject.clone(),
            year: year.or(item.year),
            overview: overview.map(str::to_string).or(item.overview.clone()),
        }];
        let response = self.labeler.suggest_labels(&subjects).await;
        if response.is_empty() {
            warn!(subject, "labeler returned nothing");
            return DispatchOutcome::Skipped("no labels suggested".to_string());
        }

        let labels = match associate_labels(&subject, &response) {
            Ok(labels) if !labels.is_empty() => labels,
            Ok(_) => return DispatchOutcome::Skipped("empty label list".to_string()),
            Err(e @ CuratorError::AmbiguousMatch { .. }) => {
                warn!(subject, %e, "cannot associate labeling result");
                return DispatchOutcome::Skipped("ambiguous labeling result".to_string());
            }
            Err(e) => return DispatchOutcome::Failed(format!("label association: {e}")),
        };

        match self.media_server.set_tags(item_id, &labels, TagMode::Merge).await {
            Ok(TagUpdate::Updated) => {
                counter!("curator_tagging_applied_total").increment(1);
                info!(item_id, ?labels, "tags applied");
                DispatchOutcome::Acted
            }
            Ok(TagUpdate::Unchanged) => DispatchOutcome::AlreadySatisfied,
            Err(e) => DispatchOutcome::Failed(format!("tag update: {e}")),
        }
    }

    /// Re-subscribe a completed subscription under the matched wash scheme.
    async fn wash_workflow(&self, event: &NormalizedEvent) -> DispatchOutcome {
        let Some(tmdb_id) = event.tmdb_id().and_then(|id| id.parse::<i64>().ok()) else {
            warn!(name = %event.display_name, "subscription event without tmdb id");
            return DispatchOutcome::Skipped("no tmdb id".to_string());
        };

        let schemes = match self.config_store.schemes(SchemeKind::Wash).await {
            Ok(schemes) => schemes,
            Err(e) => return DispatchOutcome::Failed(format!("config read: {e}")),
        };

        let (subject, category) = self.subject_and_category(event, tmdb_id).await;
        let scheme = match match_scheme(&subject, category.as_deref(), &schemes) {
            Some(scheme) => scheme.clone(),
            // Compiled-in last resort, distinct from configuration
            None => DEFAULT_SCHEME.clone(),
        };
        info!(name = %event.display_name, scheme = %scheme.name, "wash scheme selected");

        let spec = subscription_spec(event, tmdb_id, &scheme, MediaKind::Tv);
        match self.subscriber.create_subscription(&spec).await {
            Ok(receipt) => {
                counter!("curator_wash_success_total").increment(1);
                let message = match receipt.id {
                    Some(id) => format!("subscription id: {id}"),
                    None => "subscription created".to_string(),
                };
                self.record_history(event, &scheme, HISTORY_SUCCESS, &message).await;
                DispatchOutcome::Acted
            }
            Err(e) => {
                counter!("curator_wash_failed_total").increment(1);
                self.record_history(event, &scheme, HISTORY_FAILED, &e.to_string()).await;
                DispatchOutcome::Failed(format!("create subscription: {e}"))
            }
        }
    }

    /// Apply a follow-up configuration scheme to a newly-created
    /// subscription. No compiled-in default here: no match means no-op.
    async fn subscribe_workflow(&self, event: &NormalizedEvent) -> DispatchOutcome {
        let Some(tmdb_id) = event.tmdb_id().and_then(|id| id.parse::<i64>().ok()) else {
            warn!(name = %event.display_name, "subscription event without tmdb id");
            return DispatchOutcome::Skipped("no tmdb id".to_string());
        };

        let schemes = match self.config_store.schemes(SchemeKind::Subscribe).await {
            Ok(schemes) => schemes,
            Err(e) => return DispatchOutcome::Failed(format!("config read: {e}")),
        };

        let (subject, category) = self.subject_and_category(event, tmdb_id).await;
        let Some(scheme) = match_scheme(&subject, category.as_deref(), &schemes).cloned() else {
            info!(name = %event.display_name, "no subscribe scheme matched");
            self.record_history(event, &DEFAULT_SCHEME, HISTORY_SKIPPED, "no scheme matched")
                .await;
            return DispatchOutcome::Skipped("no scheme matched".to_string());
        };
        info!(name = %event.display_name, scheme = %scheme.name, "subscribe scheme selected");

        let spec = subscription_spec(event, tmdb_id, &scheme, MediaKind::Tv);
        match self.subscriber.update_subscription(&spec).await {
            Ok(()) => {
                self.record_history(event, &scheme, HISTORY_SUCCESS, "subscription updated").await;
                DispatchOutcome::Acted
            }
            Err(e) => {
                self.record_history(event, &scheme, HISTORY_FAILED, &e.to_string()).await;
                DispatchOutcome::Failed(format!("update subscription: {e}"))
            }
        }
    }

    /// Build the matcher inputs: subject text is the display name plus the
    /// library the item lives in; category is the upstream-assigned one, or
    /// the classifier's verdict when the upstream left it blank.
    async fn subject_and_category(
        &self,
        event: &NormalizedEvent,
        tmdb_id: i64,
    ) -> (String, Option<String>) {
        let library = match self.media_server.find_library_name(&tmdb_id.to_string()).await {
            Ok(library) => library,
            Err(e) => {
                // Enrichment only; a failed lookup narrows the subject text
                warn!(%e, "library lookup failed");
                None
            }
        };
        let subject = match &library {
            Some(library) => format!("{} {}", event.display_name, library),
            None => event.display_name.clone(),
        };

        let category = match &event.raw_category {
            Some(category) if !category.trim().is_empty() => Some(category.clone()),
            _ => self.classify_category(&tmdb_id.to_string(), MediaKind::Tv).await,
        };
        (subject, category)
    }

    /// Metadata lookup plus category rules; any failure degrades to None.
    async fn classify_category(&self, external_id: &str, kind: MediaKind) -> Option<String> {
        let rules = match self.config_store.category_rules().await {
            Ok(rules) if !rules.is_empty() => rules,
            Ok(_) => return None,
            Err(e) => {
                warn!(%e, "category rules unavailable");
                return None;
            }
        };
        let details = match self.metadata.get_details(external_id, kind).await {
            Ok(Some(details)) => details,
            Ok(None) => return None,
            Err(e) => {
                warn!(%e, external_id, "metadata lookup failed");
                return None;
            }
        };
        let features = FeatureSet::from_metadata(&details, kind);
        classify(&features, kind, &rules)
    }

    /// Fire-and-forget ledger append; failures never affect the workflow.
    async fn record_history(&self, event: &NormalizedEvent, scheme: &Scheme, status: &str, message: &str) {
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            name: event.display_name.clone(),
            season: event.season,
            external_id: event.tmdb_id().map(str::to_string),
            status: status.to_string(),
            message: message.to_string(),
            action_params: serde_json::json!({
                "scheme": scheme.name,
                "params": scheme.action_params,
            }),
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.history.record(&entry).await {
            warn!(%e, "history append failed");
        }
    }
}

fn subscription_spec(
    event: &NormalizedEvent,
    tmdb_id: i64,
    scheme: &Scheme,
    media_type: MediaKind,
) -> SubscriptionSpec {
    SubscriptionSpec {
        name: event.display_name.clone(),
        tmdb_id,
        season: event.season.or(Some(1)),
        year: event.year.map(|y| y.to_string()),
        media_type,
        action_params: scheme.action_params.clone(),
        remark: format!("auto-wash:{}", scheme.name),
    }
}
