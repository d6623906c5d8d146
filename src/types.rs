//! Core data types for dependency risk reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Package registry scope a dependency belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pypi,
    Npm,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pypi => "pypi",
            Self::Npm => "npm",
        }
    }

    /// Normalize a package name the way the registry compares names.
    ///
    /// npm names are lowercased. PyPI names follow PEP 503: lowercased with
    /// every run of `-`, `_` and `.` collapsed into a single `-`.
    pub fn normalize_name(&self, name: &str) -> String {
        let name = name.trim().to_lowercase();
        match self {
            Self::Npm => name,
            Self::Pypi => {
                let mut normalized = String::with_capacity(name.len());
                let mut in_separator = false;
                for c in name.chars() {
                    if matches!(c, '-' | '_' | '.') {
                        if !in_separator {
                            normalized.push('-');
                        }
                        in_separator = true;
                    } else {
                        normalized.push(c);
                        in_separator = false;
                    }
                }
                normalized
            }
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pypi" | "python" => Ok(Self::Pypi),
            "npm" | "node" => Ok(Self::Npm),
            _ => Err(format!("Unknown ecosystem: {}", s)),
        }
    }
}

/// A package declared in a project manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Registry-normalized package name
    pub name: String,
    /// Version or constraint as declared (`*` when unconstrained)
    pub version: String,
    pub ecosystem: Ecosystem,
    /// Manifest the declaration was read from
    pub source: PathBuf,
}

impl Dependency {
    pub fn new(
        name: &str,
        version: impl Into<String>,
        ecosystem: Ecosystem,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: ecosystem.normalize_name(name),
            version: version.into(),
            ecosystem,
            source: source.into(),
        }
    }

    /// Cache and dedup key for this dependency
    pub fn key(&self) -> CacheKey {
        CacheKey {
            ecosystem: self.ecosystem,
            name: self.name.clone(),
        }
    }
}

/// `(ecosystem, name)` identity of a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub ecosystem: Ecosystem,
    pub name: String,
}

impl CacheKey {
    pub fn new(ecosystem: Ecosystem, name: &str) -> Self {
        Self {
            ecosystem,
            name: ecosystem.normalize_name(name),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.name)
    }
}

/// Normalized metadata fetched from a package registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    /// False when the registry lookup failed; every other field is then unknown
    pub found: bool,
    pub maintainers_count: u32,
    pub weekly_downloads: Option<u64>,
    pub first_release_at: Option<DateTime<Utc>>,
    pub latest_release_at: Option<DateTime<Utc>>,
    pub latest_version: Option<String>,
    pub homepage: Option<String>,
    pub repository_url: Option<String>,
}

impl RegistryMetadata {
    /// Metadata for a package whose lookup failed
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Heuristic a signal was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalCategory {
    Typosquat,
    FreshRelease,
    StalePackage,
    Maintainers,
    Popularity,
    MetadataGaps,
}

impl SignalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typosquat => "typosquat",
            Self::FreshRelease => "fresh-release",
            Self::StalePackage => "stale-package",
            Self::Maintainers => "maintainers",
            Self::Popularity => "popularity",
            Self::MetadataGaps => "metadata-gaps",
        }
    }
}

impl std::fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One triggered heuristic explaining part of a risk score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub category: SignalCategory,
    pub weight: u32,
    pub message: String,
}

/// Evaluation of a single dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub dependency: Dependency,
    pub metadata: RegistryMetadata,
    /// Signals in rule evaluation order
    pub signals: Vec<Signal>,
    /// Aggregate risk score (0-100)
    pub score: u8,
}

impl ScanResult {
    pub fn has_signal(&self, category: SignalCategory) -> bool {
        self.signals.iter().any(|s| s.category == category)
    }
}

/// Complete scan report for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Path to the scanned project
    pub project_path: String,
    /// Timestamp when the scan was performed
    pub timestamp: DateTime<Utc>,
    /// Manifests that were parsed
    pub manifests: Vec<PathBuf>,
    /// One result per dependency, in manifest order
    pub results: Vec<ScanResult>,
    /// Manifest-level problems that did not abort the scan
    pub diagnostics: Vec<String>,
    /// Summary statistics
    pub summary: ScanSummary,
}

/// Summary statistics for a scan report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_dependencies: usize,
    /// Dependencies with at least one signal
    pub flagged: usize,
    pub metadata_gaps: usize,
    pub typosquats: usize,
    pub max_score: u8,
    pub average_score: f32,
}

impl ScanReport {
    /// Create a new scan report
    pub fn new(project_path: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            project_path,
            timestamp,
            manifests: Vec::new(),
            results: Vec::new(),
            diagnostics: Vec::new(),
            summary: ScanSummary::default(),
        }
    }

    /// Compute summary statistics from results
    pub fn compute_summary(&mut self) {
        let total = self.results.len();
        let mut total_score = 0u32;
        let mut summary = ScanSummary {
            total_dependencies: total,
            ..ScanSummary::default()
        };

        for result in &self.results {
            if !result.signals.is_empty() {
                summary.flagged += 1;
            }
            if result.has_signal(SignalCategory::MetadataGaps) {
                summary.metadata_gaps += 1;
            }
            if result.has_signal(SignalCategory::Typosquat) {
                summary.typosquats += 1;
            }
            summary.max_score = summary.max_score.max(result.score);
            total_score += result.score as u32;
        }

        summary.average_score = if total > 0 {
            total_score as f32 / total as f32
        } else {
            0.0
        };

        self.summary = summary;
    }

    /// Results whose score exceeds the alert threshold
    pub fn alerts(&self, threshold: u8) -> Vec<&ScanResult> {
        self.results.iter().filter(|r| r.score > threshold).collect()
    }
}
