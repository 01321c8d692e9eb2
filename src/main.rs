use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};

mod app;
mod classifier;
mod config;
mod constants;
mod debounce;
mod dispatcher;
mod error;
mod infra;
mod labelmatch;
mod logging;
mod matcher;
mod rules;
mod types;

use crate::app::ports::{
    ConfigStorePort, HistoryStorePort, LabelingPort, MediaServerPort, MetadataPort, SchemeKind,
    SubscriptionPort,
};
use crate::classifier::FeatureSet;
use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::infra::config_store::JsonConfigStore;
use crate::infra::history_store::SqliteHistoryStore;
use crate::infra::labeler::LabelingClient;
use crate::infra::media_server::MediaServerClient;
use crate::infra::metadata_db::MetadataClient;
use crate::infra::subscriber::SubscriptionClient;
use crate::infra::unconfigured::Unconfigured;
use crate::types::{MediaKind, NormalizedEvent};

#[derive(Parser)]
#[command(name = "media_curator")]
#[command(about = "Automated media library tagging, classification and re-subscription engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the JSON settings file
    #[arg(long, default_value = "data/config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume newline-delimited JSON events on stdin and dispatch them
    Watch,
    /// Classify one external id against the configured category rules
    Classify {
        /// External (tmdb) id to look up
        #[arg(long)]
        tmdb_id: String,
        /// movie or tv
        #[arg(long, default_value = "tv")]
        kind: String,
    },
    /// Run the scheme matcher against a subject string
    MatchScheme {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        category: Option<String>,
        /// wash or subscribe
        #[arg(long, default_value = "wash")]
        schemes: String,
    },
    /// Show recent wash-history entries
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn media_server_port(cfg: &AppConfig) -> Arc<dyn MediaServerPort> {
    match MediaServerClient::new(
        &cfg.media_server_host,
        &cfg.media_server_api_key,
        Some(&cfg.media_server_user_id),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(%e, "media server not configured");
            Arc::new(Unconfigured::new("media server"))
        }
    }
}

fn metadata_port(cfg: &AppConfig) -> Arc<dyn MetadataPort> {
    match MetadataClient::new(&cfg.metadata_host, &cfg.metadata_api_key, &cfg.metadata_language) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(%e, "metadata database not configured");
            Arc::new(Unconfigured::new("metadata database"))
        }
    }
}

fn subscriber_port(cfg: &AppConfig) -> Arc<dyn SubscriptionPort> {
    match SubscriptionClient::new(
        &cfg.subscriber_host,
        &cfg.subscriber_username,
        &cfg.subscriber_password,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(%e, "subscription manager not configured");
            Arc::new(Unconfigured::new("subscription manager"))
        }
    }
}

fn build_dispatcher(cfg: &AppConfig, config_path: &str) -> anyhow::Result<Dispatcher> {
    let labeler: Arc<dyn LabelingPort> = Arc::new(LabelingClient::new(
        &cfg.labeler_api_base,
        &cfg.labeler_api_key,
        &cfg.labeler_model,
    )?);
    let history: Arc<dyn HistoryStorePort> = Arc::new(SqliteHistoryStore::open(&cfg.history_db_path)?);
    let config_store: Arc<dyn ConfigStorePort> = Arc::new(JsonConfigStore::new(config_path));

    Ok(Dispatcher::new(
        media_server_port(cfg),
        metadata_port(cfg),
        subscriber_port(cfg),
        labeler,
        history,
        config_store,
        cfg.debounce_window(),
    ))
}

async fn watch(cfg: &AppConfig, config_path: &str) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(cfg, config_path)?;
    info!(window_secs = cfg.debounce_secs, "watching stdin for events");
    println!("👀 Watching stdin for newline-delimited JSON events...");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut inflight = tokio::task::JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: NormalizedEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(%e, "ignoring malformed event line");
                continue;
            }
        };
        // Events are handled concurrently; one event's failure never touches
        // its siblings.
        let dispatcher = dispatcher.clone();
        inflight.spawn(async move {
            let name = event.display_name.clone();
            let outcome = dispatcher.handle(event).await;
            println!("   {name}: {outcome:?}");
        });
    }

    while inflight.join_next().await.is_some() {}

    // Let parked debounce windows fire and their workflows finish before
    // exiting
    while !dispatcher.series_idle() {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    println!("✅ Event stream drained");
    Ok(())
}

async fn classify_one(cfg: &AppConfig, tmdb_id: &str, kind: &str) -> anyhow::Result<()> {
    let kind = match kind {
        "movie" => MediaKind::Movie,
        _ => MediaKind::Tv,
    };
    let metadata = metadata_port(cfg);
    let details = metadata
        .get_details(tmdb_id, kind)
        .await?
        .ok_or_else(|| anyhow!("no metadata for {tmdb_id}"))?;
    let features = FeatureSet::from_metadata(&details, kind);
    println!("Features: {features:?}");
    match classifier::classify(&features, kind, &cfg.category_rules) {
        Some(category) => println!("✅ Category: {category}"),
        None => println!("⚠️  No category rule matched"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config))?;

    match cli.command {
        Commands::Watch => {
            if let Err(e) = watch(&cfg, &cli.config).await {
                error!(%e, "watch loop failed");
                return Err(e);
            }
        }
        Commands::Classify { tmdb_id, kind } => {
            classify_one(&cfg, &tmdb_id, &kind).await?;
        }
        Commands::MatchScheme { subject, category, schemes } => {
            let store = JsonConfigStore::new(&cli.config);
            let kind = match schemes.as_str() {
                "subscribe" => SchemeKind::Subscribe,
                _ => SchemeKind::Wash,
            };
            let schemes = store.schemes(kind).await?;
            match matcher::match_scheme(&subject, category.as_deref(), &schemes) {
                Some(scheme) => println!("✅ Matched scheme: {}", scheme.name),
                None => println!(
                    "⚠️  No scheme matched; system default would apply: {}",
                    matcher::DEFAULT_SCHEME.name
                ),
            }
        }
        Commands::History { limit } => {
            let store = SqliteHistoryStore::open(&cfg.history_db_path)?;
            for entry in store.recent(limit)? {
                println!(
                    "{}  [{}] {} season={} -> {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.status,
                    entry.name,
                    entry.season.unwrap_or(1),
                    entry.message
                );
            }
        }
    }
    Ok(())
}
