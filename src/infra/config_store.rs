use crate::app::ports::{ConfigStorePort, SchemeKind};
use crate::config::AppConfig;
use crate::error::Result;
use crate::rules::{CategoryRuleSet, Scheme};
use async_trait::async_trait;
use std::path::PathBuf;

/// Config store reading the JSON settings file on every call, so edits to
/// the file take effect on the next event without a restart. The core never
/// assumes rule lists are stable across calls.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigStorePort for JsonConfigStore {
    async fn schemes(&self, kind: SchemeKind) -> Result<Vec<Scheme>> {
        let config = AppConfig::load(&self.path)?;
        Ok(match kind {
            SchemeKind::Wash => config.wash_schemes,
            SchemeKind::Subscribe => config.subscribe_schemes,
        })
    }

    async fn category_rules(&self) -> Result<CategoryRuleSet> {
        Ok(AppConfig::load(&self.path)?.category_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_file_edits_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"wash_schemes": [{"name": "CN", "keywords": "国产"}]}"#,
        )
        .unwrap();

        let store = JsonConfigStore::new(&path);
        let schemes = store.schemes(SchemeKind::Wash).await.unwrap();
        assert_eq!(schemes.len(), 1);

        std::fs::write(&path, r#"{"wash_schemes": []}"#).unwrap();
        let schemes = store.schemes(SchemeKind::Wash).await.unwrap();
        assert!(schemes.is_empty());
    }

    #[tokio::test]
    async fn category_rules_keep_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"category_rules": {"tv": [
                {"name": "国产剧", "conditions": {"origin_country": "CN,TW"}},
                {"name": "未分类"}
            ]}}"#,
        )
        .unwrap();

        let store = JsonConfigStore::new(&path);
        let rules = store.category_rules().await.unwrap();
        assert_eq!(rules.tv[0].name, "国产剧");
        assert_eq!(rules.tv[1].name, "未分类");
        assert!(rules.tv[1].conditions.is_none());
    }
}
