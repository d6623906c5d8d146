//! Typosquat detection against the most downloaded packages per ecosystem

use crate::error::Result;
use crate::types::{Dependency, Ecosystem};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bundled reference names, ordered from most to least downloaded
const BUNDLED_TOP_PACKAGES: &str = include_str!("data/top_packages.json");

/// Popular package names per ecosystem, in popularity rank order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceTable {
    pub pypi: Vec<String>,
    pub npm: Vec<String>,
}

impl ReferenceTable {
    /// Parse a `{"pypi": [...], "npm": [...]}` document
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// The table shipped with the crate
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_TOP_PACKAGES)
    }

    fn names(&self, ecosystem: Ecosystem) -> &[String] {
        match ecosystem {
            Ecosystem::Pypi => &self.pypi,
            Ecosystem::Npm => &self.npm,
        }
    }
}

/// Closest popular package to a suspicious name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TyposquatMatch {
    /// The popular package the name resembles
    pub reference: String,
    pub distance: usize,
    /// Position in the reference list, 0 = most downloaded
    pub rank: usize,
}

#[derive(Debug, Clone)]
struct RankedNames {
    names: Vec<String>,
    exact: HashSet<String>,
}

impl RankedNames {
    fn new(ecosystem: Ecosystem, names: &[String]) -> Self {
        let names: Vec<String> = names.iter().map(|n| ecosystem.normalize_name(n)).collect();
        let exact = names.iter().cloned().collect();
        Self { names, exact }
    }
}

/// Flags names within a small edit distance of a popular package.
///
/// The reference table is immutable once the detector is built.
#[derive(Debug, Clone)]
pub struct TyposquatDetector {
    pypi: RankedNames,
    npm: RankedNames,
    max_distance: usize,
}

impl TyposquatDetector {
    pub fn new(table: &ReferenceTable, max_distance: usize) -> Self {
        Self {
            pypi: RankedNames::new(Ecosystem::Pypi, table.names(Ecosystem::Pypi)),
            npm: RankedNames::new(Ecosystem::Npm, table.names(Ecosystem::Npm)),
            max_distance,
        }
    }

    /// Detector over the bundled reference table
    pub fn bundled(max_distance: usize) -> Result<Self> {
        Ok(Self::new(&ReferenceTable::bundled()?, max_distance))
    }

    pub fn check(&self, dep: &Dependency) -> Option<TyposquatMatch> {
        self.check_name(dep.ecosystem, &dep.name)
    }

    /// Find the nearest reference name at distance `1..=max_distance`.
    ///
    /// Names that are themselves in the reference list are never flagged.
    /// Ties go to the more popular reference.
    pub fn check_name(&self, ecosystem: Ecosystem, name: &str) -> Option<TyposquatMatch> {
        let ranked = match ecosystem {
            Ecosystem::Pypi => &self.pypi,
            Ecosystem::Npm => &self.npm,
        };
        let candidate = ecosystem.normalize_name(name);
        if candidate.is_empty() || ranked.exact.contains(&candidate) {
            return None;
        }

        let candidate_len = candidate.chars().count();
        let mut best: Option<TyposquatMatch> = None;

        for (rank, reference) in ranked.names.iter().enumerate() {
            if candidate_len.abs_diff(reference.chars().count()) > self.max_distance {
                continue;
            }

            let distance = levenshtein::levenshtein(&candidate, reference);
            if distance == 0 || distance > self.max_distance {
                continue;
            }

            // Strictly smaller only: earlier ranks win ties
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(TyposquatMatch {
                    reference: reference.clone(),
                    distance,
                    rank,
                });
                if distance == 1 {
                    break;
                }
            }
        }

        best
    }
}
