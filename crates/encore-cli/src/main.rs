//! encore: community-bot reconciliation core.
//!
//! Runs the polling features (Instagram monitor, show synchronizer)
//! against the configured Discord guild and restores sticky messages on
//! start. Event-driven features (sticky reposts, milestone grants) are
//! driven by whichever gateway host embeds `encore-runtime`'s event
//! router; this binary covers the timer-driven side.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use encore_core::AuditLog;
use encore_feeds::{InstagramFeed, InstagramFeedConfig, TourFeed, TourFeedConfig};
use encore_instagram::{InstagramAnnouncer, InstagramAnnouncerConfig};
use encore_platform::rest::{DiscordRestClient, DiscordRestConfig};
use encore_platform::{ChannelId, ChatPlatform, RoleId};
use encore_reconcile::ReconcileEngine;
use encore_runtime::{spawn_reconcile_poller, PollerConfig, PollerHandle};
use encore_shows::{ShowSync, ShowSyncConfig};
use encore_sticky::{StickyConfig, StickyManager};
use encore_store::CheckpointStore;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "encore", about = "Community bot reconciliation core")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "encore.toml")]
    config: PathBuf,
    /// Override the checkpoint database path from the config.
    #[arg(long)]
    database: Option<PathBuf>,
    /// Bot token for the chat platform.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: String,
    /// Run one reconciliation cycle per configured feature, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let db_path = args.database.unwrap_or_else(|| config.store.path.clone());
    let store = Arc::new(CheckpointStore::open(&db_path)?);
    let audit = AuditLog::new(config.store.audit_log.clone());
    tracing::info!(database = %db_path.display(), "checkpoint store opened");

    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordRestClient::new(DiscordRestConfig {
        api_base: config.platform.api_base.clone(),
        bot_token: args.token,
        guild_id: config.platform.guild_id,
        http_timeout_ms: config.platform.http_timeout_ms,
    })?);

    let engine = Arc::new(
        ReconcileEngine::new(Arc::clone(&store), audit.clone())
            .with_action_retry_limit(config.platform.action_retry_limit),
    );

    let instagram = build_instagram(&config, &platform)?;
    let shows = build_shows(&config, &platform)?;
    if instagram.is_none() && shows.is_none() {
        tracing::warn!("no polling features configured; nothing to schedule");
    }

    if args.once {
        return run_once(&engine, instagram.as_deref(), shows.as_deref()).await;
    }

    let sticky = StickyManager::new(
        Arc::clone(&store),
        Arc::clone(&platform),
        audit,
        StickyConfig {
            debounce: Duration::from_millis(config.sticky.debounce_ms),
            action_retry_limit: config.platform.action_retry_limit,
        },
    );
    let restored = sticky.restore().await?;
    if restored > 0 {
        tracing::info!(restored, "sticky messages reposted on start");
    }

    let mut pollers: Vec<PollerHandle> = Vec::new();
    if let (Some(feature), Some(section)) = (instagram, config.instagram.as_ref()) {
        pollers.push(spawn_reconcile_poller(
            Arc::clone(&engine),
            feature,
            PollerConfig::new(
                "instagram",
                Duration::from_secs(section.poll_interval_secs),
            ),
        )?);
    }
    if let (Some(feature), Some(section)) = (shows, config.shows.as_ref()) {
        pollers.push(spawn_reconcile_poller(
            Arc::clone(&engine),
            feature,
            PollerConfig::new("shows", Duration::from_secs(section.poll_interval_secs)),
        )?);
    }
    tracing::info!(pollers = pollers.len(), "encore running; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    for poller in &mut pollers {
        poller.shutdown().await;
    }
    Ok(())
}

fn build_instagram(
    config: &Config,
    platform: &Arc<dyn ChatPlatform>,
) -> Result<Option<Arc<InstagramAnnouncer>>> {
    let Some(section) = config.instagram.as_ref() else {
        return Ok(None);
    };
    let feed = InstagramFeed::new(InstagramFeedConfig::new(section.username.clone()))
        .context("failed to build instagram feed")?;
    Ok(Some(Arc::new(InstagramAnnouncer::new(
        Arc::new(feed),
        Arc::clone(platform),
        InstagramAnnouncerConfig {
            announce_channel: ChannelId(section.announce_channel),
            ping_role: section.ping_role.map(RoleId),
        },
    ))))
}

fn build_shows(
    config: &Config,
    platform: &Arc<dyn ChatPlatform>,
) -> Result<Option<Arc<ShowSync>>> {
    let Some(section) = config.shows.as_ref() else {
        return Ok(None);
    };
    let timezone: chrono_tz::Tz = section
        .timezone
        .parse()
        .map_err(|error| anyhow::anyhow!("invalid timezone '{}': {error}", section.timezone))?;
    let feed = TourFeed::new(TourFeedConfig::new(section.page_url.clone()))
        .context("failed to build tour feed")?;
    Ok(Some(Arc::new(ShowSync::new(
        Arc::new(feed),
        Arc::clone(platform),
        ShowSyncConfig::new(ChannelId(section.forum_channel), timezone, section.artist.clone()),
    ))))
}

async fn run_once(
    engine: &ReconcileEngine,
    instagram: Option<&InstagramAnnouncer>,
    shows: Option<&ShowSync>,
) -> Result<()> {
    if let Some(feature) = instagram {
        let report = engine.run_cycle(feature).await?;
        tracing::info!(
            feature = "instagram",
            observed = report.observed,
            applied = report.applied,
            failed = report.failed,
            fetch_failed = report.fetch_failed,
            "single cycle complete"
        );
    }
    if let Some(feature) = shows {
        let report = engine.run_cycle(feature).await?;
        tracing::info!(
            feature = "shows",
            observed = report.observed,
            applied = report.applied,
            failed = report.failed,
            fetch_failed = report.fetch_failed,
            "single cycle complete"
        );
    }
    Ok(())
}
