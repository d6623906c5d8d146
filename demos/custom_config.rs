//! Example showing custom configuration and a standalone scanner

use std::sync::Arc;
use supply_chain_siren::{
    parse_project, CacheConfig, MemoryCache, MetadataCache, RuleThresholds, ScanConfig, Scanner,
    SignalWeights,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create custom configuration
    let config = ScanConfig::builder()
        .weights(SignalWeights {
            typosquat: 70, // Treat near-miss names as near-certain alerts
            ..SignalWeights::default()
        })
        .thresholds(RuleThresholds {
            fresh_release_days: 90,
            min_weekly_downloads: 5_000,
            ..RuleThresholds::default()
        })
        .cache(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
        .alert_threshold(40)
        .build();

    // Keep lookups in memory for this run only
    let cache: Arc<dyn MetadataCache> = Arc::new(MemoryCache::new(config.cache.ttl()));
    let scanner = Scanner::from_config(&config, Some(cache))?;

    let parsed = parse_project(std::path::Path::new("."))?;
    println!(
        "Scanning {} dependencies from {} manifest(s) with custom configuration...\n",
        parsed.dependencies.len(),
        parsed.manifests.len()
    );

    let results = scanner.scan(parsed.dependencies).await;

    println!("=== Custom Scan Results ===");
    for result in results.iter().filter(|r| r.score > config.alert_threshold) {
        println!("{} {}: score {}", result.dependency.name, result.dependency.version, result.score);
        for signal in &result.signals {
            println!("  [{}] {}", signal.category, signal.message);
        }
    }

    Ok(())
}
