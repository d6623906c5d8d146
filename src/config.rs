//! Configuration for scan behavior and risk heuristics

use crate::error::{Result, SirenError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the scan process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Fixed weight contributed by each signal category
    pub weights: SignalWeights,
    /// Trigger thresholds for the heuristic rules
    pub thresholds: RuleThresholds,
    /// Registry metadata cache settings
    pub cache: CacheConfig,
    /// Network configuration
    pub network: NetworkConfig,
    /// Scores above this value count as alerts (CLI exit status)
    pub alert_threshold: u8,
    /// Dependencies to skip during the scan
    pub ignored_dependencies: HashSet<String>,
}

/// Weight of each signal category in the aggregate score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub metadata_gaps: u32,
    pub typosquat: u32,
    pub fresh_release: u32,
    pub stale_package: u32,
    pub maintainers: u32,
    pub popularity: u32,
}

/// Thresholds that decide when a rule fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// A package first published less than this many days ago is "fresh"
    pub fresh_release_days: i64,
    /// A package whose latest release is older than this is "stale"
    pub stale_package_days: i64,
    /// Maintainer counts at or below this value trigger the maintainers rule
    pub max_maintainers: u32,
    /// Weekly downloads below this value trigger the popularity rule
    pub min_weekly_downloads: u64,
    /// Largest edit distance still reported as a typosquat
    pub typosquat_max_distance: usize,
}

/// Registry metadata cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the durable cache at all
    pub enabled: bool,
    /// Age in hours after which an entry must be refreshed
    pub ttl_hours: u64,
    /// Explicit cache file, defaults to the platform cache directory
    pub path: Option<PathBuf>,
}

/// Network configuration for registry calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for failed requests
    pub max_retries: u32,
    /// Base delay for retry backoff (milliseconds)
    pub request_delay_ms: u64,
    /// Maximum number of registry lookups in flight
    pub concurrency: usize,
    pub pypi_url: String,
    pub pypistats_url: String,
    pub npm_registry_url: String,
    pub npm_downloads_url: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            thresholds: RuleThresholds::default(),
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            ignored_dependencies: HashSet::new(),
        }
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            metadata_gaps: 40,
            typosquat: 50,
            fresh_release: 25,
            stale_package: 20,
            maintainers: 20,
            popularity: 15,
        }
    }
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            fresh_release_days: 45,
            stale_package_days: 365,
            max_maintainers: 1,
            min_weekly_downloads: 500,
            typosquat_max_distance: 2,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: 24,
            path: None,
        }
    }
}

impl CacheConfig {
    /// Get TTL as a chrono duration, capped at [`MAX_TTL_HOURS`]
    pub fn ttl(&self) -> chrono::Duration {
        let hours = i64::try_from(self.ttl_hours).unwrap_or(i64::MAX);
        chrono::Duration::hours(hours.min(MAX_TTL_HOURS))
    }
}

impl RuleThresholds {
    /// First-release age below which a package counts as fresh
    pub fn fresh_release_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.fresh_release_days.clamp(0, MAX_RULE_DAYS))
    }

    /// Latest-release age above which a package counts as stale
    pub fn stale_package_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.stale_package_days.clamp(0, MAX_RULE_DAYS))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            request_delay_ms: 250,
            concurrency: 8,
            pypi_url: "https://pypi.org".to_string(),
            pypistats_url: "https://pypistats.org".to_string(),
            npm_registry_url: "https://registry.npmjs.org".to_string(),
            npm_downloads_url: "https://api.npmjs.org".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get request delay as Duration
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Point every registry endpoint at one base URL (mock servers, mirrors)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        self.pypi_url = base.clone();
        self.pypistats_url = base.clone();
        self.npm_registry_url = base.clone();
        self.npm_downloads_url = base;
        self
    }
}

impl ScanConfig {
    /// Create a new builder for ScanConfig
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Reject values that cannot be represented as durations
    pub fn validate(&self) -> Result<()> {
        let days = [
            ("thresholds.fresh_release_days", self.thresholds.fresh_release_days),
            ("thresholds.stale_package_days", self.thresholds.stale_package_days),
        ];
        for (field, value) in days {
            if !(0..=MAX_RULE_DAYS).contains(&value) {
                return Err(SirenError::config(format!(
                    "{} must be between 0 and {}, got {}",
                    field, MAX_RULE_DAYS, value
                )));
            }
        }

        if self.cache.ttl_hours > MAX_TTL_HOURS as u64 {
            return Err(SirenError::config(format!(
                "cache.ttl_hours must be at most {}, got {}",
                MAX_TTL_HOURS, self.cache.ttl_hours
            )));
        }

        Ok(())
    }
}

/// Builder for ScanConfig
#[derive(Default)]
pub struct ScanConfigBuilder {
    weights: Option<SignalWeights>,
    thresholds: Option<RuleThresholds>,
    cache: Option<CacheConfig>,
    network: Option<NetworkConfig>,
    alert_threshold: Option<u8>,
    ignored_dependencies: HashSet<String>,
}

impl ScanConfigBuilder {
    pub fn weights(mut self, weights: SignalWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn thresholds(mut self, thresholds: RuleThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = Some(network);
        self
    }

    pub fn alert_threshold(mut self, threshold: u8) -> Self {
        self.alert_threshold = Some(threshold);
        self
    }

    pub fn ignore_dependency(mut self, name: String) -> Self {
        self.ignored_dependencies.insert(name);
        self
    }

    pub fn build(self) -> ScanConfig {
        ScanConfig {
            weights: self.weights.unwrap_or_default(),
            thresholds: self.thresholds.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            network: self.network.unwrap_or_default(),
            alert_threshold: self.alert_threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD),
            ignored_dependencies: self.ignored_dependencies,
        }
    }
}

const DEFAULT_ALERT_THRESHOLD: u8 = 60;

/// Longest accepted rule window (100 years)
pub const MAX_RULE_DAYS: i64 = 36_500;

/// Longest accepted cache TTL (100 years)
pub const MAX_TTL_HOURS: i64 = 24 * MAX_RULE_DAYS;
