use crate::error::{CuratorError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{info, warn};

/// Media servers sometimes embed invisible direction marks (LRM/RLM) or a BOM
/// in display names, which breaks key matching against labeling responses.
static INVISIBLE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200b}-\u{200f}\u{feff}]").unwrap());

pub fn clean_display_name(name: &str) -> String {
    INVISIBLE_CHARS.replace_all(name, "").trim().to_string()
}

/// Associate a labeling response with one subject name.
///
/// Strategies are tried strictly in this order, and tests depend on it:
/// 1. exact match on the cleaned subject
/// 2. cleaned-key equality
/// 3. substring containment in either direction, only when exactly one key
///    qualifies
/// 4. sole-result fallback (the response holds exactly one entry)
///
/// Anything past that is ambiguous and surfaces as an error rather than a
/// guess.
pub fn associate_labels(subject: &str, response: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let subject = clean_display_name(subject);

    // 1. exact
    if let Some(labels) = response.get(&subject) {
        return Ok(labels.clone());
    }

    // 2-3. cleaned equality, then containment
    let mut contained: Vec<(&String, &Vec<String>)> = Vec::new();
    for (key, labels) in response {
        let cleaned = clean_display_name(key);
        if cleaned == subject {
            info!(key, "label key matched after cleanup");
            return Ok(labels.clone());
        }
        if cleaned.contains(&subject) || subject.contains(&cleaned) {
            contained.push((key, labels));
        }
    }
    match contained.as_slice() {
        [(key, labels)] => {
            info!(subject, key = %key, "label key matched by containment");
            return Ok((*labels).clone());
        }
        // Two containing keys (say two seasons of the same show) cannot be
        // told apart; picking one would be a guess.
        [_, _, ..] => {
            return Err(CuratorError::AmbiguousMatch {
                subject,
                candidates: contained.iter().map(|(key, _)| (*key).clone()).collect(),
            });
        }
        [] => {}
    }

    // 4. sole result
    if response.len() == 1 {
        let (key, labels) = response.iter().next().unwrap();
        warn!(subject, returned = %key, "using sole labeling result as fallback");
        return Ok(labels.clone());
    }

    Err(CuratorError::AmbiguousMatch {
        subject,
        candidates: response.keys().cloned().collect(),
    })
}
