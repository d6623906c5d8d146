//! Scan orchestration: parse manifests, fetch metadata, evaluate and score

use crate::cache::{FileCache, MetadataCache};
use crate::config::{CacheConfig, ScanConfig};
use crate::error::Result;
use crate::parser::parse_project;
use crate::registry::RegistryClient;
use crate::scoring::aggregate_score;
use crate::signals::SignalEngine;
use crate::types::{Dependency, RegistryMetadata, ScanReport, ScanResult};
use crate::typosquat::TyposquatDetector;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY: usize = 8;

/// Runs the per-dependency pipeline (fetch, typosquat check, signals, score)
/// for a list of dependencies.
///
/// Lookups run concurrently, bounded by `concurrency`, but results always come
/// back in input order.
pub struct Scanner {
    client: Arc<RegistryClient>,
    detector: Arc<TyposquatDetector>,
    engine: Arc<SignalEngine>,
    concurrency: usize,
}

impl Scanner {
    pub fn new(client: RegistryClient, detector: TyposquatDetector, engine: SignalEngine) -> Self {
        Self {
            client: Arc::new(client),
            detector: Arc::new(detector),
            engine: Arc::new(engine),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Build a scanner from configuration with the bundled reference table
    pub fn from_config(config: &ScanConfig, cache: Option<Arc<dyn MetadataCache>>) -> Result<Self> {
        config.validate()?;
        let client = RegistryClient::new(config.network.clone(), cache)?;
        let detector = TyposquatDetector::bundled(config.thresholds.typosquat_max_distance)?;
        let engine = SignalEngine::new(config.weights.clone(), config.thresholds.clone());
        Ok(Self::new(client, detector, engine).with_concurrency(config.network.concurrency))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub async fn scan(&self, deps: Vec<Dependency>) -> Vec<ScanResult> {
        self.scan_at(deps, Utc::now()).await
    }

    /// Scan with an explicit evaluation time
    pub async fn scan_at(&self, deps: Vec<Dependency>, now: DateTime<Utc>) -> Vec<ScanResult> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(deps.len());

        for dep in deps {
            let client = Arc::clone(&self.client);
            let detector = Arc::clone(&self.detector);
            let engine = Arc::clone(&self.engine);
            let permits = Arc::clone(&permits);
            let task_dep = dep.clone();

            let task = tokio::spawn(async move {
                let metadata = {
                    let _permit = permits.acquire_owned().await;
                    client.fetch(&task_dep).await
                };
                evaluate(&detector, &engine, task_dep, metadata, now)
            });

            tasks.push((dep, task));
        }

        // Awaiting in spawn order puts results back in manifest order
        let mut results = Vec::with_capacity(tasks.len());
        for (dep, task) in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("Scan task for {} failed: {}", dep.key(), e);
                    results.push(evaluate(
                        &self.detector,
                        &self.engine,
                        dep,
                        RegistryMetadata::not_found(),
                        now,
                    ));
                }
            }
        }

        self.client.flush_cache().await;
        results
    }
}

/// Evaluate one dependency against already fetched metadata
fn evaluate(
    detector: &TyposquatDetector,
    engine: &SignalEngine,
    dependency: Dependency,
    metadata: RegistryMetadata,
    now: DateTime<Utc>,
) -> ScanResult {
    let typosquat = detector.check(&dependency);
    let signals = engine.evaluate(&dependency, &metadata, typosquat.as_ref(), now);
    let score = aggregate_score(&signals);
    debug!(
        "{} scored {} ({} signal(s))",
        dependency.key(),
        score,
        signals.len()
    );

    ScanResult {
        dependency,
        metadata,
        signals,
        score,
    }
}

/// Scan every supported manifest under `project_path`
pub async fn scan_project(project_path: &Path, config: &ScanConfig) -> Result<ScanReport> {
    info!("Starting scan of project at: {}", project_path.display());

    let parsed = parse_project(project_path)?;
    let dependencies: Vec<Dependency> = parsed
        .dependencies
        .into_iter()
        .filter(|dep| {
            let ignored = config
                .ignored_dependencies
                .iter()
                .any(|name| dep.ecosystem.normalize_name(name) == dep.name);
            if ignored {
                debug!("Skipping ignored dependency: {}", dep.name);
            }
            !ignored
        })
        .collect();

    info!(
        "Found {} dependencies in {} manifest(s)",
        dependencies.len(),
        parsed.manifests.len()
    );

    let scanner = Scanner::from_config(config, open_cache(&config.cache))?;
    let now = Utc::now();

    let mut report = ScanReport::new(project_path.display().to_string(), now);
    report.manifests = parsed.manifests;
    report.diagnostics = parsed.errors.iter().map(ToString::to_string).collect();
    report.results = scanner.scan_at(dependencies, now).await;
    report.compute_summary();

    info!(
        "Scan complete: {}/{} flagged, max score {}",
        report.summary.flagged, report.summary.total_dependencies, report.summary.max_score
    );

    Ok(report)
}

/// Open the durable cache, or run without one if it cannot be opened
fn open_cache(config: &CacheConfig) -> Option<Arc<dyn MetadataCache>> {
    if !config.enabled {
        return None;
    }

    let opened = match &config.path {
        Some(path) => FileCache::open(path, config.ttl()),
        None => FileCache::open_default(config.ttl()),
    };

    match opened {
        Ok(cache) => {
            debug!("Using metadata cache at {}", cache.path().display());
            Some(Arc::new(cache))
        }
        Err(e) => {
            warn!("{}; continuing without a cache", e);
            None
        }
    }
}
