//! Percentile and delta arithmetic for version comparison
//!
//! Pure functions over slices; nothing here touches storage.

use serde::{Deserialize, Serialize};

/// Score at or above which a version is considered a regression
pub const DEGRADED_THRESHOLD: f64 = 10.0;

/// Score at or below which a version is considered an improvement
pub const IMPROVED_THRESHOLD: f64 = -10.0;

/// Percentile `p` (0-100) of an ascending slice, interpolating linearly
/// between the two nearest ranks
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
        }
    }
}

pub fn p95(sorted: &[f64]) -> Option<f64> {
    percentile(sorted, 95.0)
}

/// Relative change from `baseline` to `current`, in percent
///
/// A zero baseline only yields a delta when `current` is zero too.
pub fn delta_percent(current: f64, baseline: f64) -> Option<f64> {
    if baseline == 0.0 {
        return (current == 0.0).then_some(0.0);
    }
    Some((current - baseline) / baseline * 100.0)
}

/// Mean of the values that are present
pub fn mean_present(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactStatus {
    Degraded,
    Improved,
    Stable,
    Unknown,
}

impl ImpactStatus {
    pub fn classify(score: Option<f64>) -> Self {
        match score {
            None => ImpactStatus::Unknown,
            Some(s) if s >= DEGRADED_THRESHOLD => ImpactStatus::Degraded,
            Some(s) if s <= IMPROVED_THRESHOLD => ImpactStatus::Improved,
            Some(_) => ImpactStatus::Stable,
        }
    }
}

/// Outcome of comparing one resource profile against a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub status: ImpactStatus,
    pub score: Option<f64>,
    pub cpu_delta_percent: Option<f64>,
    pub memory_delta_percent: Option<f64>,
}

impl ImpactResult {
    pub fn unknown() -> Self {
        Self {
            status: ImpactStatus::Unknown,
            score: None,
            cpu_delta_percent: None,
            memory_delta_percent: None,
        }
    }

    /// Combine CPU and memory deltas into a scored result
    pub fn from_deltas(cpu_delta_percent: Option<f64>, memory_delta_percent: Option<f64>) -> Self {
        let score = mean_present(&[cpu_delta_percent, memory_delta_percent]);
        Self {
            status: ImpactStatus::classify(score),
            score,
            cpu_delta_percent,
            memory_delta_percent,
        }
    }
}
