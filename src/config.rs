use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One monitored group feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub url: String,
}

/// Run configuration, loaded from a JSON file and passed into the pipeline
/// as a value. Tunables that are policy rather than correctness (time
/// rounding, confidence threshold) live here, not in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sources: Vec<FeedSource>,

    /// Below this rule-based confidence the AI fallback kicks in.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Granularity for the fingerprint time bucket, in hours.
    #[serde(default = "default_time_rounding_hours")]
    pub time_rounding_hours: i64,

    /// Maximum scroll iterations per feed pass.
    #[serde(default = "default_scroll_budget")]
    pub scroll_budget: u32,

    /// Hard cap on posts yielded per feed pass.
    #[serde(default = "default_max_posts_per_feed")]
    pub max_posts_per_feed: usize,

    /// Posts shorter than this (trimmed) are skipped as noise.
    #[serde(default = "default_min_post_chars")]
    pub min_post_chars: usize,

    /// Plausible monthly rent window; regex matches outside it are rejected.
    #[serde(default = "default_price_min")]
    pub sane_price_min: i64,
    #[serde(default = "default_price_max")]
    pub sane_price_max: i64,

    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,
    #[serde(default = "default_ai_max_attempts")]
    pub ai_max_attempts: u32,

    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_confidence_threshold() -> f32 {
    0.67
}
fn default_time_rounding_hours() -> i64 {
    24
}
fn default_scroll_budget() -> u32 {
    3
}
fn default_max_posts_per_feed() -> usize {
    20
}
fn default_min_post_chars() -> usize {
    20
}
fn default_price_min() -> i64 {
    1500
}
fn default_price_max() -> i64 {
    25_000
}
fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_ai_timeout_secs() -> u64 {
    30
}
fn default_ai_max_attempts() -> u32 {
    2
}
fn default_database_path() -> String {
    "data/rental-scout.db".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config at {}", path.as_ref().display()))?;
        serde_json::from_str(&raw).context("failed to parse config")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            confidence_threshold: default_confidence_threshold(),
            time_rounding_hours: default_time_rounding_hours(),
            scroll_budget: default_scroll_budget(),
            max_posts_per_feed: default_max_posts_per_feed(),
            min_post_chars: default_min_post_chars(),
            sane_price_min: default_price_min(),
            sane_price_max: default_price_max(),
            ai_model: default_ai_model(),
            ai_timeout_secs: default_ai_timeout_secs(),
            ai_max_attempts: default_ai_max_attempts(),
            database_path: default_database_path(),
        }
    }
}

/// Opaque secrets, read from the environment (a local .env is honored).
#[derive(Clone)]
pub struct Credentials {
    pub login_email: String,
    pub login_password: String,
    pub ai_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine in deployed environments.
        let _ = dotenvy::dotenv();

        Ok(Self {
            login_email: std::env::var("SCOUT_LOGIN_EMAIL")
                .context("SCOUT_LOGIN_EMAIL not set")?,
            login_password: std::env::var("SCOUT_LOGIN_PASSWORD")
                .context("SCOUT_LOGIN_PASSWORD not set")?,
            ai_api_key: std::env::var("SCOUT_AI_API_KEY").ok(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login_email", &self.login_email)
            .field("login_password", &"<redacted>")
            .field("ai_api_key", &self.ai_api_key.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}
