//! Registry metadata cache with TTL support.
//!
//! Lookups are keyed by `(ecosystem, name)`. An entry older than the TTL is
//! reported as absent so the caller refreshes it; a refresh replaces the whole
//! entry. Only successful lookups are ever stored.
//!
//! Two implementations share the [`MetadataCache`] trait:
//! - [`FileCache`] keeps every entry in one JSON document on disk so repeated
//!   scans survive process restarts.
//! - [`MemoryCache`] keeps entries in memory only.
//!
//! # Example
//!
//! ```no_run
//! use supply_chain_siren::{CacheKey, Ecosystem, FileCache, MetadataCache, RegistryMetadata};
//!
//! let cache = FileCache::open_default(chrono::Duration::hours(24))?;
//! let key = CacheKey::new(Ecosystem::Pypi, "requests");
//! cache.put(&key, &RegistryMetadata { found: true, ..Default::default() })?;
//! assert!(cache.get(&key)?.is_some());
//! # Ok::<(), supply_chain_siren::SirenError>(())
//! ```

use crate::error::{Result, SirenError};
use crate::types::{CacheKey, RegistryMetadata};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

const CACHE_DIR_NAME: &str = "supply-chain-siren";
const CACHE_FILE_NAME: &str = "registry_cache.json";

/// Storage for previously fetched registry metadata
pub trait MetadataCache: Send + Sync {
    /// Return the stored metadata, or `None` if missing or older than the TTL
    fn get(&self, key: &CacheKey) -> Result<Option<RegistryMetadata>>;

    /// Store metadata under `key`, replacing any previous entry
    fn put(&self, key: &CacheKey, metadata: &RegistryMetadata) -> Result<()>;

    /// Write pending entries to durable storage
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// A timestamped metadata snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: RegistryMetadata,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(metadata: RegistryMetadata) -> Self {
        Self {
            metadata,
            fetched_at: Utc::now(),
        }
    }

    /// True while the entry's age does not exceed `ttl`
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) <= ttl
    }
}

/// In-memory cache, lost when the process exits
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<RegistryMetadata>> {
        let entries = self.entries.read().map_err(|_| SirenError::cache("memory cache lock poisoned"))?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, Utc::now()))
            .map(|entry| entry.metadata.clone()))
    }

    fn put(&self, key: &CacheKey, metadata: &RegistryMetadata) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| SirenError::cache("memory cache lock poisoned"))?;
        entries.insert(key.clone(), CacheEntry::new(metadata.clone()));
        Ok(())
    }
}

/// Durable cache stored as a single JSON document.
///
/// The document maps `"<ecosystem>:<name>"` to a [`CacheEntry`]. `put` only
/// updates memory; `flush` (or drop) rewrites the document through a
/// temporary file that is renamed over the target, so readers never observe
/// a half-written file.
pub struct FileCache {
    path: PathBuf,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    dirty: AtomicBool,
    persist_lock: Mutex<()>,
}

impl FileCache {
    /// Open (or create) the cache document at `path`.
    ///
    /// A missing or corrupt document starts an empty cache. Failure to create
    /// the parent directory is reported as `CacheUnavailable`.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SirenError::cache(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&content) {
                Ok(entries) => {
                    debug!("Loaded {} cache entries from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(SirenError::cache(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            ttl,
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
            persist_lock: Mutex::new(()),
        })
    }

    /// Open the cache in the platform cache directory
    pub fn open_default(ttl: Duration) -> Result<Self> {
        Self::open(default_cache_path()?, ttl)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove every entry, in memory and on disk
    pub fn clear(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().map_err(|_| SirenError::cache("cache lock poisoned"))?;
        self.entries
            .write()
            .map_err(|_| SirenError::cache("cache lock poisoned"))?
            .clear();
        self.dirty.store(false, Ordering::Release);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SirenError::cache(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn persist(&self) -> Result<()> {
        let content = {
            let entries = self.entries.read().map_err(|_| SirenError::cache("cache lock poisoned"))?;
            serde_json::to_string_pretty(&*entries)?
        };

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| SirenError::cache(format!("cannot write {}: {}", self.path.display(), e)))
    }
}

impl MetadataCache for FileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<RegistryMetadata>> {
        let entries = self.entries.read().map_err(|_| SirenError::cache("cache lock poisoned"))?;
        Ok(entries
            .get(&key.to_string())
            .filter(|entry| entry.is_fresh(self.ttl, Utc::now()))
            .map(|entry| entry.metadata.clone()))
    }

    fn put(&self, key: &CacheKey, metadata: &RegistryMetadata) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| SirenError::cache("cache lock poisoned"))?
            .insert(key.to_string(), CacheEntry::new(metadata.clone()));
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Serialize writers so the document on disk reflects the map at the
        // time of each rename.
        let _guard = self.persist_lock.lock().map_err(|_| SirenError::cache("cache lock poisoned"))?;
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.persist().map_err(|e| {
            self.dirty.store(true, Ordering::Release);
            e
        })
    }
}

impl Drop for FileCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush metadata cache: {}", e);
        }
    }
}

/// Location of the default cache document
pub fn default_cache_path() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join(CACHE_DIR_NAME).join(CACHE_FILE_NAME))
        .ok_or_else(|| SirenError::cache("no platform cache directory"))
}
