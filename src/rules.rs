use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Keywords as configured by the user: either a real list or a single
/// comma-delimited string. Both normalize to the same trimmed list, so the
/// matcher never has to care which shape the config used.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(normalize_terms(keywords.into_iter().map(Into::into)))
    }

    /// A scheme with no usable keywords acts as a fallback candidate.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

impl<'de> Deserialize<'de> for KeywordSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Joined(String),
            None,
        }

        let terms = match Raw::deserialize(deserializer)? {
            Raw::List(items) => normalize_terms(items.into_iter()),
            Raw::Joined(s) => normalize_terms(s.split(',').map(str::to_string)),
            Raw::None => Vec::new(),
        };
        Ok(KeywordSet(terms))
    }
}

fn normalize_terms(terms: impl Iterator<Item = String>) -> Vec<String> {
    terms
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// One configuration scheme a matched event resolves to. The fields the
/// matcher reads are typed; everything else (quality, downloader, filter
/// groups, sites, ...) rides along opaquely and is handed verbatim to the
/// subscription manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheme {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default)]
    pub category_filter: Option<String>,
    #[serde(flatten)]
    pub action_params: HashMap<String, Value>,
}

fn default_active() -> bool {
    true
}

impl Scheme {
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.action_params.get(key)
    }
}

/// Allowed values for one condition dimension, configured as a list or as a
/// comma string. Every value splits on commas, even inside a list, so
/// `["CN,TW"]` and `"CN,TW"` and `["CN", "TW"]` are the same set.
/// Comparison is case-insensitive, so values are stored uppercased.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValueSet(Vec<String>);

impl ValueSet {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            values
                .into_iter()
                .flat_map(|v| {
                    v.into()
                        .split(',')
                        .map(|part| part.trim().to_uppercase())
                        .collect::<Vec<_>>()
                })
                .filter(|v| !v.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when any allowed value appears in `observed` (compared
    /// case-insensitively).
    pub fn intersects<'a>(&self, observed: impl Iterator<Item = &'a str>) -> bool {
        let observed: Vec<String> = observed.map(|v| v.trim().to_uppercase()).collect();
        self.0.iter().any(|allowed| observed.iter().any(|o| o == allowed))
    }
}

impl<'de> Deserialize<'de> for ValueSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<Value>),
            Joined(String),
            None,
        }

        let values: Vec<String> = match Raw::deserialize(deserializer)? {
            Raw::List(items) => items.into_iter().map(value_to_string).collect(),
            Raw::Joined(s) => vec![s],
            Raw::None => Vec::new(),
        };
        Ok(ValueSet::new(values))
    }
}

fn value_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Conditions for one category entry. A dimension absent from the entry is
/// always satisfied; an empty allowed-value-set likewise. A non-empty
/// allowed-value-set against an empty observed dimension fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryConditions {
    #[serde(default)]
    pub origin_country: Option<ValueSet>,
    #[serde(default)]
    pub genre_ids: Option<ValueSet>,
    #[serde(default)]
    pub original_language: Option<ValueSet>,
}

/// One named category entry. `conditions: None` means the entry matches
/// unconditionally wherever it appears in declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    #[serde(default)]
    pub conditions: Option<CategoryConditions>,
}

/// Ordered category rules, split by media kind. Entries are kept as a list
/// rather than a map so declared order survives serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRuleSet {
    #[serde(default)]
    pub movie: Vec<CategoryEntry>,
    #[serde(default)]
    pub tv: Vec<CategoryEntry>,
}

impl CategoryRuleSet {
    pub fn entries_for(&self, kind: crate::types::MediaKind) -> &[CategoryEntry] {
        match kind {
            crate::types::MediaKind::Movie => &self.movie,
            crate::types::MediaKind::Tv => &self.tv,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.movie.is_empty() && self.tv.is_empty()
    }
}
