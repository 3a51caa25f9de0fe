//! TOML configuration for the encore binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_db_path() -> PathBuf {
    PathBuf::from("encore.db")
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_action_retry_limit() -> usize {
    1
}

fn default_instagram_poll_secs() -> u64 {
    300
}

fn default_shows_poll_secs() -> u64 {
    3_600
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_debounce_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,
    pub platform: PlatformSection,
    #[serde(default)]
    pub sticky: StickySection,
    pub instagram: Option<InstagramSection>,
    pub shows: Option<ShowsSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_audit_log_path")]
    pub audit_log: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            audit_log: default_audit_log_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSection {
    pub guild_id: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_action_retry_limit")]
    pub action_retry_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StickySection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StickySection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstagramSection {
    pub username: String,
    pub announce_channel: u64,
    #[serde(default)]
    pub ping_role: Option<u64>,
    #[serde(default = "default_instagram_poll_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShowsSection {
    pub page_url: String,
    pub forum_channel: u64,
    pub artist: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_shows_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }
}
