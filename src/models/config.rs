//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Target dashboard settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Browser/page fetching behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Polling loop cadence
    #[serde(default)]
    pub poll: PollConfig,

    /// Deduplication settings
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Classification settings
    #[serde(default)]
    pub classify: ClassifyConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source.url)
            .map_err(|e| AppError::validation(format!("source.url is not a valid URL: {e}")))?;
        if self.source.tag.trim().is_empty() {
            return Err(AppError::validation("source.tag is empty"));
        }
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.nav_timeout_secs == 0 {
            return Err(AppError::validation("fetcher.nav_timeout_secs must be > 0"));
        }
        if self.poll.active_interval_secs == 0 || self.poll.idle_interval_secs == 0 {
            return Err(AppError::validation("poll intervals must be > 0"));
        }
        if self.poll.idle_interval_secs < self.poll.active_interval_secs {
            return Err(AppError::validation(
                "poll.idle_interval_secs must be >= poll.active_interval_secs",
            ));
        }
        if self.dedup.fuzzy_window_secs == 0 {
            return Err(AppError::validation("dedup.fuzzy_window_secs must be > 0"));
        }
        self.fetcher.dom.validate()?;
        Ok(())
    }
}

/// Target dashboard settings.
///
/// The defaults are the deployed contract; the TOML file overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Monitoring dashboard URL
    #[serde(default = "defaults::source_url")]
    pub url: String,

    /// Tag written into the store document's `source` field
    #[serde(default = "defaults::source_tag")]
    pub tag: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: defaults::source_url(),
            tag: defaults::source_tag(),
        }
    }
}

/// Browser/page fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests and the browser session
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Navigation timeout in seconds; expiry is non-fatal (degraded cycle)
    #[serde(default = "defaults::nav_timeout")]
    pub nav_timeout_secs: u64,

    /// Settle delay after navigation and after scrolling, in milliseconds
    #[serde(default = "defaults::settle_ms")]
    pub settle_ms: u64,

    /// CSS selector of the scrollable list container
    #[serde(default = "defaults::scroll_container")]
    pub scroll_container: String,

    /// Number of scroll steps to the bottom of the container
    #[serde(default = "defaults::scroll_steps")]
    pub scroll_steps: u32,

    /// Maximum captured response body size in bytes
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,

    /// DOM row extraction selectors
    #[serde(default)]
    pub dom: DomSelectors,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            nav_timeout_secs: defaults::nav_timeout(),
            settle_ms: defaults::settle_ms(),
            scroll_container: defaults::scroll_container(),
            scroll_steps: defaults::scroll_steps(),
            max_body_bytes: defaults::max_body_bytes(),
            dom: DomSelectors::default(),
        }
    }
}

/// CSS selectors and column layout for tabular DOM extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomSelectors {
    /// Selector for one donation row
    #[serde(default = "defaults::row_selector")]
    pub row_selector: String,

    /// Selector for cells inside a row
    #[serde(default = "defaults::cell_selector")]
    pub cell_selector: String,

    /// Logical column positions inside a row
    #[serde(default = "defaults::date_col")]
    pub date_col: usize,
    #[serde(default = "defaults::user_col")]
    pub user_col: usize,
    #[serde(default = "defaults::amount_col")]
    pub amount_col: usize,
    #[serde(default = "defaults::message_col")]
    pub message_col: Option<usize>,
    #[serde(default = "defaults::target_col")]
    pub target_col: Option<usize>,
}

impl DomSelectors {
    /// Check that both selectors parse.
    pub fn validate(&self) -> Result<()> {
        for raw in [&self.row_selector, &self.cell_selector] {
            scraper::Selector::parse(raw).map_err(|e| AppError::selector(raw, format!("{e:?}")))?;
        }
        Ok(())
    }
}

impl Default for DomSelectors {
    fn default() -> Self {
        Self {
            row_selector: defaults::row_selector(),
            cell_selector: defaults::cell_selector(),
            date_col: defaults::date_col(),
            user_col: defaults::user_col(),
            amount_col: defaults::amount_col(),
            message_col: defaults::message_col(),
            target_col: defaults::target_col(),
        }
    }
}

/// Polling loop cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Poll interval while donations are flowing, in seconds
    #[serde(default = "defaults::active_interval")]
    pub active_interval_secs: u64,

    /// Poll interval while the source is quiet, in seconds
    #[serde(default = "defaults::idle_interval")]
    pub idle_interval_secs: u64,

    /// Quiet period after which ACTIVE falls back to IDLE, in seconds
    #[serde(default = "defaults::quiet_period")]
    pub quiet_period_secs: u64,

    /// Backoff after a failed cycle, in seconds
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: defaults::active_interval(),
            idle_interval_secs: defaults::idle_interval(),
            quiet_period_secs: defaults::quiet_period(),
            retry_backoff_secs: defaults::retry_backoff(),
        }
    }
}

/// Deduplication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Fuzzy dedup window: two otherwise-identical records closer than this
    /// are one observation
    #[serde(default = "defaults::fuzzy_window")]
    pub fuzzy_window_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_window_secs: defaults::fuzzy_window(),
        }
    }
}

/// Classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Amounts paid out by the mini-game; never attributed to a streamer
    #[serde(default = "defaults::game_amounts")]
    pub game_amounts: Vec<i64>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            game_amounts: defaults::game_amounts(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn source_url() -> String {
        "https://poong.live/monitor/balloon".into()
    }
    pub fn source_tag() -> String {
        "live-monitor".into()
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; festa-crawler/0.1)".into()
    }
    pub fn nav_timeout() -> u64 {
        20
    }
    pub fn settle_ms() -> u64 {
        1500
    }
    pub fn scroll_container() -> String {
        ".monitor-list".into()
    }
    pub fn scroll_steps() -> u32 {
        4
    }
    pub fn max_body_bytes() -> usize {
        2_000_000
    }

    // DOM extraction defaults
    pub fn row_selector() -> String {
        "table.monitor tbody tr".into()
    }
    pub fn cell_selector() -> String {
        "td".into()
    }
    pub fn date_col() -> usize {
        0
    }
    pub fn user_col() -> usize {
        1
    }
    pub fn amount_col() -> usize {
        2
    }
    pub fn message_col() -> Option<usize> {
        Some(3)
    }
    pub fn target_col() -> Option<usize> {
        Some(4)
    }

    // Poll defaults
    pub fn active_interval() -> u64 {
        15
    }
    pub fn idle_interval() -> u64 {
        120
    }
    pub fn quiet_period() -> u64 {
        300
    }
    pub fn retry_backoff() -> u64 {
        30
    }

    // Dedup defaults
    pub fn fuzzy_window() -> u64 {
        60
    }

    // Classify defaults
    pub fn game_amounts() -> Vec<i64> {
        vec![777]
    }
}
