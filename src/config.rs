use crate::apis::SourceAdapter;
use crate::common::constants::{
    DEFAULT_CALENDAR_NAME, DEFAULT_DURATION_MINUTES, DEFAULT_LOG_TAIL, DEFAULT_TIMEZONE,
    DEFAULT_USER_AGENT,
};
use crate::common::error::{Result, ScraperError};
use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Reference zone for "today" when purging and for report timestamps.
    pub timezone: String,
    pub calendar_name: String,
    pub max_in_flight: usize,
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub log_tail: usize,
    pub default_duration_minutes: i64,
    pub user_agent: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            calendar_name: DEFAULT_CALENDAR_NAME.to_string(),
            max_in_flight: 6,
            fetch_timeout_secs: 20,
            max_retries: 2,
            retry_backoff_ms: 500,
            log_tail: DEFAULT_LOG_TAIL,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RunSettings {
    pub fn zone(&self) -> Tz {
        parse_zone(&self.timezone).unwrap_or(chrono_tz::America::Chicago)
    }
}

/// Per-domain politeness limits shared by every fetch against the same host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_min: u64,
    pub concurrency: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_min: 30,
            concurrency: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub max_fetches: usize,
    pub max_per_domain: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            max_fetches: 40,
            max_per_domain: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub kind: String,
    pub url: String,
    /// Explicit feed URL, skipping discovery.
    #[serde(default)]
    pub feed: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub enrich: bool,
    #[serde(default)]
    pub render: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub default_duration_minutes: Option<i64>,
    #[serde(default = "default_max_detail_pages")]
    pub max_detail_pages: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_detail_pages() -> usize {
    60
}

impl SourceConfig {
    pub fn new(source_id: &str, kind: &str, url: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            kind: kind.to_string(),
            url: url.to_string(),
            feed: None,
            timezone: None,
            enrich: false,
            render: false,
            enabled: true,
            default_duration_minutes: None,
            max_detail_pages: default_max_detail_pages(),
        }
    }
}

/// A source whose adapter kind and zone were resolved once at load time.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub config: SourceConfig,
    pub adapter: SourceAdapter,
    pub zone: Tz,
    pub default_duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedSource {
    pub source_id: String,
    pub kind: String,
    pub reason: String,
}

/// Configuration after validation: runnable sources plus the ones that were set aside.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: Config,
    pub sources: Vec<ResolvedSource>,
    pub rejected: Vec<RejectedSource>,
    /// Set when no configuration could be read at all.
    pub load_error: Option<String>,
}

impl LoadedConfig {
    /// Source ids allowed to issue enrichment fetches.
    pub fn enrichment_allow_list(&self) -> HashSet<String> {
        self.sources
            .iter()
            .filter(|s| s.config.enrich)
            .map(|s| s.config.source_id.clone())
            .collect()
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Resolve adapter kinds and zones. Unknown kinds and disabled sources are
    /// reported, never fatal.
    pub fn resolve(self) -> LoadedConfig {
        let run_zone = self.run.zone();
        let mut sources = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for source in &self.sources {
            if !source.enabled {
                rejected.push(RejectedSource {
                    source_id: source.source_id.clone(),
                    kind: source.kind.clone(),
                    reason: "disabled".to_string(),
                });
                continue;
            }
            if !seen.insert(source.source_id.clone()) {
                rejected.push(RejectedSource {
                    source_id: source.source_id.clone(),
                    kind: source.kind.clone(),
                    reason: "duplicate source_id".to_string(),
                });
                continue;
            }
            let Some(adapter) = SourceAdapter::from_kind(&source.kind) else {
                warn!(source_id = %source.source_id, kind = %source.kind, "Unknown adapter kind");
                rejected.push(RejectedSource {
                    source_id: source.source_id.clone(),
                    kind: source.kind.clone(),
                    reason: format!("unknown kind '{}'", source.kind),
                });
                continue;
            };
            let zone = match source.timezone.as_deref() {
                Some(name) => parse_zone(name).unwrap_or_else(|| {
                    warn!(source_id = %source.source_id, timezone = %name, "Unknown timezone, using run default");
                    run_zone
                }),
                None => run_zone,
            };
            let minutes = source
                .default_duration_minutes
                .unwrap_or(self.run.default_duration_minutes)
                .max(1);
            sources.push(ResolvedSource {
                config: source.clone(),
                adapter,
                zone,
                default_duration: Duration::minutes(minutes),
            });
        }

        info!(
            "Resolved {} sources ({} rejected)",
            sources.len(),
            rejected.len()
        );
        LoadedConfig {
            config: self,
            sources,
            rejected,
            load_error: None,
        }
    }
}

/// Load and resolve; any failure to read the file degrades to an empty configuration.
pub fn load_or_empty(path: &Path) -> LoadedConfig {
    match Config::load(path) {
        Ok(config) => config.resolve(),
        Err(e) => {
            warn!("No usable configuration: {}", e);
            LoadedConfig {
                load_error: Some(e.to_string()),
                ..LoadedConfig::default()
            }
        }
    }
}

pub fn parse_zone(name: &str) -> Option<Tz> {
    name.trim().trim_matches('"').parse::<Tz>().ok()
}
