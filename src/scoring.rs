//! Risk score aggregation

use crate::types::Signal;
use serde::{Deserialize, Serialize};

/// Highest possible risk score
pub const MAX_SCORE: u8 = 100;

/// Combine signals into a single score: the sum of their weights, capped at 100
pub fn aggregate_score(signals: &[Signal]) -> u8 {
    let total = signals
        .iter()
        .fold(0u32, |acc, signal| acc.saturating_add(signal.weight));
    total.min(MAX_SCORE as u32) as u8
}

/// Coarse risk band used for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No signals
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Determine risk band from score
pub fn determine_level(score: u8) -> RiskLevel {
    if score >= 60 {
        RiskLevel::High
    } else if score >= 30 {
        RiskLevel::Medium
    } else if score > 0 {
        RiskLevel::Low
    } else {
        RiskLevel::None
    }
}
