//! # supply_chain_siren
//!
//! Supply-chain risk scanning for Python and JavaScript projects:
//! - **Manifest parsing**: requirements files, `package.json`, and the common lockfiles
//! - **Registry metadata**: PyPI and npm lookups behind a TTL cache
//! - **Typosquat detection**: edit distance against popular package names
//! - **Risk scoring**: fixed-weight heuristic signals summed into a 0-100 score
//!
//! ## Quick Start
//!
//! ```no_run
//! use supply_chain_siren::{scan_project, ScanConfig};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = ScanConfig::default();
//! let report = scan_project(Path::new("."), &config).await?;
//!
//! for result in report.alerts(config.alert_threshold) {
//!     println!("{} (score: {})", result.dependency.name, result.score);
//!     for signal in &result.signals {
//!         println!("  [{}] {}", signal.category, signal.message);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching
//!
//! Successful registry lookups are cached by `(ecosystem, name)`; failed
//! lookups never are.
//!
//! ```
//! use supply_chain_siren::{CacheKey, Ecosystem, MemoryCache, MetadataCache, RegistryMetadata};
//!
//! let cache = MemoryCache::new(chrono::Duration::hours(24));
//! let key = CacheKey::new(Ecosystem::Pypi, "Typing_Extensions");
//! cache.put(&key, &RegistryMetadata::default()).unwrap();
//! assert_eq!(key.to_string(), "pypi:typing-extensions");
//! assert!(cache.get(&key).unwrap().is_some());
//! ```

mod cache;
mod config;
mod error;
mod parser;
mod registry;
mod scan;
mod scoring;
mod signals;
mod types;
mod typosquat;

// Re-export public API
pub use cache::{default_cache_path, CacheEntry, FileCache, MemoryCache, MetadataCache};
pub use config::{CacheConfig, NetworkConfig, RuleThresholds, ScanConfig, ScanConfigBuilder, SignalWeights};
pub use error::{Result, SirenError};
pub use parser::{discover_manifests, parse_manifest, parse_project, DependencySet, ParsedProject};
pub use registry::RegistryClient;
pub use scan::{scan_project, Scanner};
pub use scoring::{aggregate_score, determine_level, RiskLevel, MAX_SCORE};
pub use signals::SignalEngine;
pub use types::{
    CacheKey, Dependency, Ecosystem, RegistryMetadata, ScanReport, ScanResult, ScanSummary, Signal,
    SignalCategory,
};
pub use typosquat::{ReferenceTable, TyposquatDetector, TyposquatMatch};
