//! Heuristic rules turning registry metadata into risk signals

use crate::config::{RuleThresholds, SignalWeights};
use crate::typosquat::TyposquatMatch;
use crate::types::{Dependency, RegistryMetadata, Signal, SignalCategory};
use chrono::{DateTime, Utc};

/// Evaluates the fixed rule set for one dependency at a time.
///
/// Rules run in a fixed order (metadata gaps, typosquat, fresh release,
/// stale package, maintainers, popularity) and the resulting signals keep
/// that order. Rules that read registry fields only run when the lookup
/// succeeded and skip fields the registry did not report.
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    weights: SignalWeights,
    thresholds: RuleThresholds,
}

impl SignalEngine {
    pub fn new(weights: SignalWeights, thresholds: RuleThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn weights(&self) -> &SignalWeights {
        &self.weights
    }

    pub fn evaluate(
        &self,
        dep: &Dependency,
        metadata: &RegistryMetadata,
        typosquat: Option<&TyposquatMatch>,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();

        if !metadata.found {
            signals.push(self.metadata_gaps());
        }
        if let Some(hit) = typosquat {
            signals.push(self.typosquat(dep, hit));
        }
        if !metadata.found {
            return signals;
        }

        signals.extend(self.fresh_release(metadata, now));
        signals.extend(self.stale_package(metadata, now));
        signals.extend(self.maintainers(metadata));
        signals.extend(self.popularity(metadata));
        signals
    }

    fn metadata_gaps(&self) -> Signal {
        Signal {
            category: SignalCategory::MetadataGaps,
            weight: self.weights.metadata_gaps,
            message: "Package metadata unavailable; registry lookup failed.".to_string(),
        }
    }

    fn typosquat(&self, dep: &Dependency, hit: &TyposquatMatch) -> Signal {
        Signal {
            category: SignalCategory::Typosquat,
            weight: self.weights.typosquat,
            message: format!(
                "Name '{}' is {} edit{} away from popular package '{}'.",
                dep.name,
                hit.distance,
                if hit.distance == 1 { "" } else { "s" },
                hit.reference
            ),
        }
    }

    fn fresh_release(&self, metadata: &RegistryMetadata, now: DateTime<Utc>) -> Option<Signal> {
        let first = metadata.first_release_at?;
        let age = now.signed_duration_since(first);
        (age < self.thresholds.fresh_release_window()).then(|| Signal {
            category: SignalCategory::FreshRelease,
            weight: self.weights.fresh_release,
            message: format!(
                "Package was first published {} day(s) ago; consider additional vetting.",
                age.num_days().max(0)
            ),
        })
    }

    fn stale_package(&self, metadata: &RegistryMetadata, now: DateTime<Utc>) -> Option<Signal> {
        let latest = metadata.latest_release_at?;
        let age = now.signed_duration_since(latest);
        (age > self.thresholds.stale_package_window()).then(|| Signal {
            category: SignalCategory::StalePackage,
            weight: self.weights.stale_package,
            message: format!(
                "Latest release is {} days old; project may be unmaintained.",
                age.num_days()
            ),
        })
    }

    fn maintainers(&self, metadata: &RegistryMetadata) -> Option<Signal> {
        (metadata.maintainers_count <= self.thresholds.max_maintainers).then(|| Signal {
            category: SignalCategory::Maintainers,
            weight: self.weights.maintainers,
            message: if metadata.maintainers_count == 0 {
                "No maintainers listed; ownership cannot be verified.".to_string()
            } else {
                format!(
                    "{} maintainer(s) detected; project is susceptible to account compromise.",
                    metadata.maintainers_count
                )
            },
        })
    }

    fn popularity(&self, metadata: &RegistryMetadata) -> Option<Signal> {
        let downloads = metadata.weekly_downloads?;
        (downloads < self.thresholds.min_weekly_downloads).then(|| Signal {
            category: SignalCategory::Popularity,
            weight: self.weights.popularity,
            message: format!(
                "Weekly downloads are low ({}); limited community adoption.",
                downloads
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ecosystem;
    use chrono::Duration;

    fn dep(name: &str) -> Dependency {
        Dependency::new(name, "1.0.0", Ecosystem::Pypi, "requirements.txt")
    }

    fn healthy(now: DateTime<Utc>) -> RegistryMetadata {
        RegistryMetadata {
            found: true,
            maintainers_count: 5,
            weekly_downloads: Some(1_000_000),
            first_release_at: Some(now - Duration::days(3000)),
            latest_release_at: Some(now - Duration::days(10)),
            ..Default::default()
        }
    }

    fn categories(signals: &[Signal]) -> Vec<SignalCategory> {
        signals.iter().map(|s| s.category).collect()
    }

    fn squat() -> TyposquatMatch {
        TyposquatMatch {
            reference: "requests".to_string(),
            distance: 2,
            rank: 3,
        }
    }

    #[test]
    fn test_healthy_package_has_no_signals() {
        let now = Utc::now();
        let engine = SignalEngine::default();
        assert!(engine.evaluate(&dep("requests"), &healthy(now), None, now).is_empty());
    }

    #[test]
    fn test_not_found_only_metadata_gaps() {
        let engine = SignalEngine::default();
        let signals = engine.evaluate(&dep("ghost"), &RegistryMetadata::not_found(), None, Utc::now());
        assert_eq!(categories(&signals), vec![SignalCategory::MetadataGaps]);
        assert_eq!(signals[0].weight, 40);
    }

    #[test]
    fn test_not_found_with_typosquat() {
        let engine = SignalEngine::default();
        let signals = engine.evaluate(
            &dep("reqeusts"),
            &RegistryMetadata::not_found(),
            Some(&squat()),
            Utc::now(),
        );
        assert_eq!(
            categories(&signals),
            vec![SignalCategory::MetadataGaps, SignalCategory::Typosquat]
        );
        assert!(signals[1].message.contains("'requests'"));
    }

    #[test]
    fn test_all_rules_fire_in_order() {
        let now = Utc::now();
        let metadata = RegistryMetadata {
            found: true,
            maintainers_count: 1,
            weekly_downloads: Some(12),
            first_release_at: Some(now - Duration::days(10)),
            latest_release_at: Some(now - Duration::days(400)),
            ..Default::default()
        };
        let signals = SignalEngine::default().evaluate(&dep("reqeusts"), &metadata, Some(&squat()), now);
        assert_eq!(
            categories(&signals),
            vec![
                SignalCategory::Typosquat,
                SignalCategory::FreshRelease,
                SignalCategory::StalePackage,
                SignalCategory::Maintainers,
                SignalCategory::Popularity,
            ]
        );
    }

    #[test]
    fn test_threshold_boundaries() {
        let now = Utc::now();
        let engine = SignalEngine::default();
        let metadata = RegistryMetadata {
            first_release_at: Some(now - Duration::days(45)),
            latest_release_at: Some(now - Duration::days(365)),
            maintainers_count: 2,
            weekly_downloads: Some(500),
            ..healthy(now)
        };
        assert!(engine.evaluate(&dep("flask"), &metadata, None, now).is_empty());
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let now = Utc::now();
        let metadata = RegistryMetadata {
            found: true,
            maintainers_count: 4,
            ..Default::default()
        };
        assert!(SignalEngine::default()
            .evaluate(&dep("flask"), &metadata, None, now)
            .is_empty());
    }

    #[test]
    fn test_custom_weights_and_thresholds() {
        let now = Utc::now();
        let engine = SignalEngine::new(
            SignalWeights {
                popularity: 33,
                ..SignalWeights::default()
            },
            RuleThresholds {
                min_weekly_downloads: 10_000,
                ..RuleThresholds::default()
            },
        );
        let metadata = RegistryMetadata {
            weekly_downloads: Some(8_000),
            ..healthy(now)
        };
        let signals = engine.evaluate(&dep("flask"), &metadata, None, now);
        assert_eq!(categories(&signals), vec![SignalCategory::Popularity]);
        assert_eq!(signals[0].weight, 33);
    }
}
