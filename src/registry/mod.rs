//! Registry metadata lookups for PyPI and npm, backed by the metadata cache

pub mod npm;
pub mod pypi;

use crate::cache::MetadataCache;
use crate::config::NetworkConfig;
use crate::error::{Result, SirenError};
use crate::types::{CacheKey, Dependency, Ecosystem, RegistryMetadata};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Fetches [`RegistryMetadata`] for dependencies, consulting the cache first.
///
/// Lookup failures of any kind are returned as `found = false` metadata and
/// are never written to the cache. If the cache itself fails, the client logs
/// once and performs live lookups for the rest of its lifetime.
pub struct RegistryClient {
    http: Client,
    network: NetworkConfig,
    cache: Option<Arc<dyn MetadataCache>>,
    cache_degraded: AtomicBool,
}

impl RegistryClient {
    pub fn new(network: NetworkConfig, cache: Option<Arc<dyn MetadataCache>>) -> Result<Self> {
        Ok(Self {
            http: build_client(&network)?,
            network,
            cache,
            cache_degraded: AtomicBool::new(false),
        })
    }

    /// Metadata for `dep`, from cache when fresh, otherwise from the registry
    pub async fn fetch(&self, dep: &Dependency) -> RegistryMetadata {
        let key = dep.key();

        if let Some(cached) = self.cached(&key) {
            debug!("Cache hit for {}", key);
            return cached;
        }

        match self.lookup(dep).await {
            Ok(metadata) => {
                self.store(&key, &metadata);
                metadata
            }
            Err(SirenError::PackageNotFound(_)) => {
                warn!("{} not found in registry", key);
                RegistryMetadata::not_found()
            }
            Err(e) => {
                warn!("Registry lookup failed for {}: {}", key, e);
                RegistryMetadata::not_found()
            }
        }
    }

    /// Live registry lookup, bypassing the cache
    pub async fn lookup(&self, dep: &Dependency) -> Result<RegistryMetadata> {
        match dep.ecosystem {
            Ecosystem::Pypi => pypi::fetch_pypi_metadata(&self.http, &dep.name, &self.network).await,
            Ecosystem::Npm => npm::fetch_npm_metadata(&self.http, &dep.name, &self.network).await,
        }
    }

    /// Persist cached entries written during this run.
    ///
    /// The write happens on the blocking pool; a failure degrades the cache
    /// like any other cache error.
    pub async fn flush_cache(&self) {
        let Some(cache) = self.active_cache().cloned() else {
            return;
        };
        match tokio::task::spawn_blocking(move || cache.flush()).await {
            Ok(Ok(())) => debug!("Metadata cache flushed"),
            Ok(Err(e)) => self.degrade(e),
            Err(e) => warn!("Cache flush task failed: {}", e),
        }
    }

    /// True once a cache failure switched the client to live-only lookups
    pub fn cache_degraded(&self) -> bool {
        self.cache_degraded.load(Ordering::Relaxed)
    }

    fn active_cache(&self) -> Option<&Arc<dyn MetadataCache>> {
        if self.cache_degraded() {
            return None;
        }
        self.cache.as_ref()
    }

    fn cached(&self, key: &CacheKey) -> Option<RegistryMetadata> {
        match self.active_cache()?.get(key) {
            Ok(hit) => hit,
            Err(e) => {
                self.degrade(e);
                None
            }
        }
    }

    fn store(&self, key: &CacheKey, metadata: &RegistryMetadata) {
        let Some(cache) = self.active_cache() else {
            return;
        };
        if let Err(e) = cache.put(key, metadata) {
            self.degrade(e);
        }
    }

    fn degrade(&self, error: SirenError) {
        if !self.cache_degraded.swap(true, Ordering::Relaxed) {
            warn!("{}; falling back to live registry lookups", error);
        }
    }
}

/// Build HTTP client with proper configuration
fn build_client(config: &NetworkConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout())
        .build()
        .map_err(|e| SirenError::config(format!("Failed to build HTTP client: {}", e)))
}

/// GET with bounded exponential backoff.
///
/// Transport errors, 429 and 5xx responses are retried up to
/// `max_retries` times. The last response is returned as-is so the caller
/// can report its status.
async fn get_with_retry(
    client: &Client,
    url: &str,
    config: &NetworkConfig,
) -> Result<reqwest::Response> {
    let mut attempts = 0;
    let mut delay = config.request_delay();

    loop {
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let retryable =
                    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && attempts < config.max_retries {
                    warn!("{} returned {}, retrying after {:?}", url, status, delay);
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                    delay *= 2;
                    continue;
                }
                return Ok(response);
            }
            Err(e) => {
                if attempts >= config.max_retries {
                    return Err(e.into());
                }
                warn!("Request to {} failed, retrying: {}", url, e);
                tokio::time::sleep(delay).await;
                attempts += 1;
                delay *= 2;
            }
        }
    }
}

/// GET a JSON document, mapping 404 to `PackageNotFound` and any other
/// non-2xx status or undecodable body to `RegistryLookupFailed`
async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    config: &NetworkConfig,
    ecosystem: Ecosystem,
    name: &str,
) -> Result<T> {
    let response = get_with_retry(client, url, config).await?;
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(SirenError::PackageNotFound(format!("{}:{}", ecosystem, name)));
    }
    if !status.is_success() {
        return Err(SirenError::lookup(ecosystem, name, format!("HTTP {}", status)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| SirenError::lookup(ecosystem, name, format!("unexpected response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCache, MemoryCache};
    use chrono::Duration;

    struct BrokenCache;

    impl MetadataCache for BrokenCache {
        fn get(&self, _key: &CacheKey) -> Result<Option<RegistryMetadata>> {
            Err(SirenError::cache("disk on fire"))
        }

        fn put(&self, _key: &CacheKey, _metadata: &RegistryMetadata) -> Result<()> {
            Err(SirenError::cache("disk on fire"))
        }
    }

    fn network(server: &mockito::Server) -> NetworkConfig {
        NetworkConfig {
            max_retries: 1,
            request_delay_ms: 1,
            ..NetworkConfig::default()
        }
        .with_base_url(&server.url())
    }

    fn npm_dep(name: &str) -> Dependency {
        Dependency::new(name, "^1.0.0", Ecosystem::Npm, "package.json")
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let server = mockito::Server::new_async().await;
        let cache = Arc::new(MemoryCache::new(Duration::hours(1)));
        let dep = npm_dep("left-pad");
        let cached = RegistryMetadata {
            found: true,
            maintainers_count: 7,
            ..Default::default()
        };
        cache.put(&dep.key(), &cached).unwrap();

        let client = RegistryClient::new(network(&server), Some(cache)).unwrap();
        assert_eq!(client.fetch(&dep).await, cached);
    }

    #[tokio::test]
    async fn test_failed_lookups_are_not_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ghost-pkg")
            .with_status(404)
            .expect(2)
            .create_async()
            .await;

        let cache = Arc::new(MemoryCache::new(Duration::hours(1)));
        let client = RegistryClient::new(network(&server), Some(cache.clone())).unwrap();
        let dep = npm_dep("ghost-pkg");

        assert!(!client.fetch(&dep).await.found);
        assert!(!client.fetch(&dep).await.found);
        assert!(cache.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_give_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = RegistryClient::new(network(&server), None).unwrap();
        let metadata = client.fetch(&npm_dep("flaky")).await;

        assert_eq!(metadata, RegistryMetadata::not_found());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_lookup_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/garbled")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = RegistryClient::new(network(&server), None).unwrap();
        let err = client.lookup(&npm_dep("garbled")).await.unwrap_err();
        assert!(matches!(err, SirenError::RegistryLookupFailed { .. }));
    }

    #[tokio::test]
    async fn test_file_cache_written_on_flush() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tiny")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"maintainers": [{"name": "solo"}]}"#)
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registry_cache.json");
        let cache = Arc::new(FileCache::open(&path, Duration::hours(1)).unwrap());
        let client = RegistryClient::new(network(&server), Some(cache)).unwrap();

        assert!(client.fetch(&npm_dep("tiny")).await.found);
        assert!(!path.exists());

        client.flush_cache().await;
        assert!(std::fs::read_to_string(&path).unwrap().contains("npm:tiny"));
        assert!(!client.cache_degraded());
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_live_lookups() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tiny")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"maintainers": [{"name": "solo"}]}"#)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/downloads/point/last-week/tiny")
            .with_status(200)
            .with_body(r#"{"downloads": 3}"#)
            .create_async()
            .await;

        let client = RegistryClient::new(network(&server), Some(Arc::new(BrokenCache))).unwrap();
        let dep = npm_dep("tiny");

        let first = client.fetch(&dep).await;
        assert!(first.found);
        assert!(client.cache_degraded());
        assert_eq!(client.fetch(&dep).await, first);
        mock.assert_async().await;
    }
}
