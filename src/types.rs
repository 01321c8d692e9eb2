use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What kind of entity a normalized event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Movie,
    Series,
    Episode,
    SubscriptionAdded,
    SubscriptionCompleted,
}

/// Coarse media shape used when talking to the metadata database and the
/// category rule tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

/// A webhook payload reduced to the fields the core cares about.
///
/// Produced at the system boundary from heterogeneous payloads; immutable
/// once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub display_name: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// External provider ids, e.g. {"tmdb": "12345"}
    #[serde(default)]
    pub provider_ids: HashMap<String, String>,
    #[serde(default)]
    pub overview: Option<String>,
    /// For episodes, the id of the owning series.
    #[serde(default)]
    pub parent_series_id: Option<String>,
    /// Category the upstream system already assigned, if any.
    #[serde(default)]
    pub raw_category: Option<String>,
    /// Season number for subscription events.
    #[serde(default)]
    pub season: Option<i32>,
}

impl NormalizedEvent {
    pub fn tmdb_id(&self) -> Option<&str> {
        self.provider_ids
            .get("tmdb")
            .or_else(|| self.provider_ids.get("Tmdb"))
            .map(|s| s.as_str())
    }
}

/// Payload held in the debounce window for a series key. Each new episode
/// event for the same series replaces the previous payload, so the firing
/// task always sees the latest known metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPayload {
    pub series_id: String,
    pub display_name: String,
    pub year: Option<i32>,
    pub provider_ids: HashMap<String, String>,
    pub overview: Option<String>,
}

impl SeriesPayload {
    pub fn from_event(series_id: String, event: &NormalizedEvent) -> Self {
        Self {
            series_id,
            display_name: event.display_name.clone(),
            year: event.year,
            provider_ids: event.provider_ids.clone(),
            overview: event.overview.clone(),
        }
    }
}

/// Terminal outcome of handling one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// Action performed against a collaborator.
    Acted,
    /// Entity already satisfied the target state (e.g. tags present).
    AlreadySatisfied,
    /// No rule matched, or the event kind is not handled; expected no-op.
    Skipped(String),
    /// Parked in the debounce window; a later firing will act.
    Deferred,
    /// A collaborator call failed; contained to this event.
    Failed(String),
}

/// One row of the wash-history ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub name: String,
    pub season: Option<i32>,
    pub external_id: Option<String>,
    pub status: String,
    pub message: String,
    pub action_params: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
