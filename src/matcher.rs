use crate::constants::SYSTEM_DEFAULT_SCHEME;
use crate::rules::{KeywordSet, Scheme};
use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Selects one scheme for a subject, in declared order.
///
/// Pass 1 (specific): the first active scheme whose keyword list has any
/// case-insensitive substring hit against `subject_text` wins. When a keyword
/// misses the text and a `category` is present, keyword equality against the
/// category also counts as a hit.
///
/// Pass 2 (fallback): the first active scheme with an empty keyword list.
///
/// Returns `None` when neither pass yields a scheme; the caller decides
/// whether to apply the compiled-in system default. Order is priority: the
/// first match wins, never the "best" one.
pub fn match_scheme<'a>(
    subject_text: &str,
    category: Option<&str>,
    schemes: &'a [Scheme],
) -> Option<&'a Scheme> {
    let subject = subject_text.to_lowercase();
    let category = category.map(|c| c.trim().to_lowercase());

    // Pass 1: specific match
    for scheme in schemes.iter().filter(|s| s.active) {
        if scheme.keywords.is_empty() {
            continue;
        }
        for keyword in scheme.keywords.iter() {
            let kw = keyword.to_lowercase();
            if subject.contains(&kw) {
                debug!(scheme = %scheme.name, keyword, "keyword hit on subject text");
                return Some(scheme);
            }
            if let Some(cat) = &category {
                if &kw == cat {
                    debug!(scheme = %scheme.name, keyword, "keyword hit on category");
                    return Some(scheme);
                }
            }
        }
    }

    // Pass 2: fallback match
    schemes.iter().find(|s| s.active && s.keywords.is_empty())
}

/// Compiled-in last-resort scheme, distinct from anything configurable. The
/// dispatcher applies it only when `match_scheme` returns `None`.
pub static DEFAULT_SCHEME: Lazy<Scheme> = Lazy::new(|| {
    let mut action_params = HashMap::new();
    action_params.insert("filter_groups".to_string(), json!(["完结洗版"]));
    action_params.insert("downloader".to_string(), json!("qb完结"));
    action_params.insert("quality".to_string(), json!("WEB-DL"));
    action_params.insert("sites".to_string(), json!([]));
    Scheme {
        name: SYSTEM_DEFAULT_SCHEME.to_string(),
        active: true,
        keywords: KeywordSet::default(),
        category_filter: None,
        action_params,
    }
});
