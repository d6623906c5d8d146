//! Error types for the scanning engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SirenError>;

/// Main error type for scan operations
#[derive(Error, Debug)]
pub enum SirenError {
    #[error("Manifest {path} could not be read: {reason}")]
    ManifestUnreadable { path: PathBuf, reason: String },

    #[error("No supported dependency manifests found under {0}")]
    NoManifests(PathBuf),

    #[error("Registry lookup failed for {ecosystem}:{name}: {reason}")]
    RegistryLookupFailed {
        ecosystem: String,
        name: String,
        reason: String,
    },

    #[error("Package not found in registry: {0}")]
    PackageNotFound(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),
}

impl SirenError {
    /// Create a manifest error
    pub fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ManifestUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a registry lookup error
    pub fn lookup(
        ecosystem: impl ToString,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RegistryLookupFailed {
            ecosystem: ecosystem.to_string(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
