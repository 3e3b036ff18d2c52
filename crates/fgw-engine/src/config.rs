//! Environment-driven pipeline configuration.

use std::path::PathBuf;

use crate::matcher::MatchMode;

/// What to do with an offer the matcher could not enrich: keep it in the
/// live snapshot with feed fields only, or drop it from the catalog
/// entirely (it is still recorded in the audit log either way).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedPolicy {
    Retain,
    Drop,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub feed_url: String,
    pub catalog_url: String,
    pub catalog_client_id: String,
    pub catalog_token: String,
    pub webhook_url: Option<String>,
    pub state_dir: PathBuf,
    pub unmatched_policy: UnmatchedPolicy,
    pub match_mode: MatchMode,
    pub fuzzy_threshold: f64,
    pub lookup_interval_ms: u64,
    pub scheduler_enabled: bool,
    pub watch_cron_1: String,
    pub watch_cron_2: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl WatchConfig {
    pub fn from_env() -> Self {
        Self {
            feed_url: std::env::var("FGW_FEED_URL")
                .unwrap_or_else(|_| "https://www.gamerpower.com/api/giveaways".to_string()),
            catalog_url: std::env::var("FGW_CATALOG_URL")
                .unwrap_or_else(|_| "https://api.igdb.com/v4/games".to_string()),
            catalog_client_id: std::env::var("FGW_CATALOG_CLIENT_ID").unwrap_or_default(),
            catalog_token: std::env::var("FGW_CATALOG_TOKEN").unwrap_or_default(),
            webhook_url: std::env::var("FGW_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            state_dir: std::env::var("FGW_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./state")),
            unmatched_policy: if env_flag("FGW_KEEP_UNMATCHED") {
                UnmatchedPolicy::Retain
            } else {
                UnmatchedPolicy::Drop
            },
            match_mode: if env_flag("FGW_FUZZY_MATCH") {
                MatchMode::Fuzzy
            } else {
                MatchMode::Strict
            },
            fuzzy_threshold: std::env::var("FGW_FUZZY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.6),
            lookup_interval_ms: std::env::var("FGW_LOOKUP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            scheduler_enabled: env_flag("FGW_SCHEDULER_ENABLED"),
            watch_cron_1: std::env::var("FGW_CRON_1").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            watch_cron_2: std::env::var("FGW_CRON_2")
                .unwrap_or_else(|_| "0 0 18 * * *".to_string()),
            user_agent: std::env::var("FGW_USER_AGENT")
                .unwrap_or_else(|_| "fgw-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("FGW_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("snapshot.json")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir.join("skipped.jsonl")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.state_dir.join("reports")
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}
