use crate::rules::{CategoryRuleSet, ValueSet};
use crate::types::MediaKind;
use serde_json::Value;
use tracing::{debug, info};

/// The dimensions of a media item the category rules can condition on,
/// extracted from metadata-database details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    pub origin_countries: Vec<String>,
    pub genre_ids: Vec<String>,
    pub original_language: Vec<String>,
}

impl FeatureSet {
    /// Extract features from a metadata-database details payload. Movies
    /// carry their countries under `production_countries` (list of objects),
    /// tv under a flat `origin_country` list.
    pub fn from_metadata(details: &Value, kind: MediaKind) -> Self {
        let origin_countries = match kind {
            MediaKind::Movie => details["production_countries"]
                .as_array()
                .map(|countries| {
                    countries
                        .iter()
                        .filter_map(|c| c["iso_3166_1"].as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            MediaKind::Tv => details["origin_country"]
                .as_array()
                .map(|countries| {
                    countries
                        .iter()
                        .filter_map(|c| c.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let genre_ids = details["genres"]
            .as_array()
            .map(|genres| {
                genres
                    .iter()
                    .filter_map(|g| g["id"].as_i64())
                    .map(|id| id.to_string())
                    .collect()
            })
            .unwrap_or_default();

        // A single language, kept as a set-of-one for uniform intersection
        let original_language = details["original_language"]
            .as_str()
            .map(|l| vec![l.to_string()])
            .unwrap_or_default();

        Self {
            origin_countries,
            genre_ids,
            original_language,
        }
    }
}

/// One condition dimension: absent or empty allowed-values pass vacuously; a
/// non-empty allowed set against an empty observed dimension fails.
fn condition_satisfied(allowed: Option<&ValueSet>, observed: &[String]) -> bool {
    let Some(allowed) = allowed else {
        return true;
    };
    if allowed.is_empty() {
        return true;
    }
    if observed.is_empty() {
        return false;
    }
    allowed.intersects(observed.iter().map(|s| s.as_str()))
}

/// Resolve a category name from a feature set against the ordered rule
/// entries for `kind`.
///
/// An entry with no conditions matches unconditionally wherever it sits in
/// declared order, so a catch-all placed before the end shadows everything
/// after it. That is the configured behavior, not a tie-break.
pub fn classify(features: &FeatureSet, kind: MediaKind, rules: &CategoryRuleSet) -> Option<String> {
    for entry in rules.entries_for(kind) {
        let Some(conditions) = &entry.conditions else {
            info!(category = %entry.name, "condition-less category entry hit");
            return Some(entry.name.clone());
        };

        let satisfied = condition_satisfied(conditions.origin_country.as_ref(), &features.origin_countries)
            && condition_satisfied(conditions.genre_ids.as_ref(), &features.genre_ids)
            && condition_satisfied(
                conditions.original_language.as_ref(),
                &features.original_language,
            );

        if satisfied {
            debug!(category = %entry.name, "category entry satisfied");
            return Some(entry.name.clone());
        }
    }
    None
}
