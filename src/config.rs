use crate::constants::SERIES_DEBOUNCE_SECS;
use crate::error::Result;
use crate::rules::{CategoryRuleSet, Scheme};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Application settings, stored as one JSON file. Every field has a default
/// so a partial file (or an older file missing newly-added keys) loads
/// cleanly; unknown keys are preserved only until the next save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // Media server
    pub media_server_host: String,
    pub media_server_api_key: String,
    pub media_server_user_id: String,

    // Subscription manager
    pub subscriber_host: String,
    pub subscriber_username: String,
    pub subscriber_password: String,

    // Metadata database
    pub metadata_api_key: String,
    pub metadata_host: String,
    pub metadata_language: String,

    // AI labeling
    pub labeler_api_key: String,
    pub labeler_api_base: String,
    pub labeler_model: String,

    // Rule configuration
    pub wash_schemes: Vec<Scheme>,
    pub subscribe_schemes: Vec<Scheme>,
    pub category_rules: CategoryRuleSet,

    // Engine tuning
    pub debounce_secs: u64,
    pub history_db_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            media_server_host: String::new(),
            media_server_api_key: String::new(),
            media_server_user_id: String::new(),
            subscriber_host: "http://127.0.0.1:3000".to_string(),
            subscriber_username: String::new(),
            subscriber_password: String::new(),
            metadata_api_key: String::new(),
            metadata_host: "https://api.themoviedb.org/3".to_string(),
            metadata_language: "zh-CN".to_string(),
            labeler_api_key: String::new(),
            labeler_api_base: "https://api.siliconflow.cn/v1".to_string(),
            labeler_model: "deepseek-ai/DeepSeek-V3".to_string(),
            wash_schemes: Vec::new(),
            subscribe_schemes: Vec::new(),
            category_rules: CategoryRuleSet::default(),
            debounce_secs: SERIES_DEBOUNCE_SECS,
            history_db_path: "data/history.db".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn debounce_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.debounce_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(dir.path().join("config.json")).unwrap();
        assert_eq!(cfg.debounce_secs, SERIES_DEBOUNCE_SECS);
        assert!(cfg.wash_schemes.is_empty());
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"media_server_host": "http://emby:8096", "wash_schemes": [{"name": "CN", "keywords": "国产"}]}"#,
        )
        .unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.media_server_host, "http://emby:8096");
        assert_eq!(cfg.wash_schemes.len(), 1);
        assert_eq!(cfg.metadata_language, "zh-CN");
    }

    #[test]
    fn save_then_load_round_trips_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = AppConfig::default();
        cfg.wash_schemes = vec![serde_json::from_value(serde_json::json!({
            "name": "4K", "keywords": ["4k", "uhd"], "quality": "Remux"
        }))
        .unwrap()];
        cfg.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.wash_schemes[0].name, "4K");
        assert_eq!(
            loaded.wash_schemes[0].param("quality").and_then(|v| v.as_str()),
            Some("Remux")
        );
    }
}
