//! Version impact analysis
//!
//! Compares windowed p95 CPU and memory between the containers of two
//! version snapshots of the same deployment. Missing or failing sample
//! queries degrade a container to `unknown` instead of failing the whole
//! comparison.

use super::deployment::{DeploymentGroup, VersionSnapshot};
use super::stats::{delta_percent, mean_present, p95, ImpactResult, ImpactStatus};
use crate::models::{container_id, ResourceSample};
use crate::store::SampleStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Sliding window of samples considered for a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactWindow {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "24h")]
    OneDay,
}

impl ImpactWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactWindow::FiveMinutes => "5m",
            ImpactWindow::ThirtyMinutes => "30m",
            ImpactWindow::OneDay => "24h",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            ImpactWindow::FiveMinutes => chrono::Duration::minutes(5),
            ImpactWindow::ThirtyMinutes => chrono::Duration::minutes(30),
            ImpactWindow::OneDay => chrono::Duration::hours(24),
        }
    }
}

impl Default for ImpactWindow {
    fn default() -> Self {
        ImpactWindow::ThirtyMinutes
    }
}

impl fmt::Display for ImpactWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown impact window '{0}', expected 5m, 30m or 24h")]
pub struct UnknownWindow(String);

impl FromStr for ImpactWindow {
    type Err = UnknownWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(ImpactWindow::FiveMinutes),
            "30m" => Ok(ImpactWindow::ThirtyMinutes),
            "24h" => Ok(ImpactWindow::OneDay),
            other => Err(UnknownWindow(other.to_string())),
        }
    }
}

/// p95 usage of one side of a comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageProfile {
    pub samples: usize,
    pub cpu_p95_millicores: Option<f64>,
    pub memory_p95_bytes: Option<f64>,
}

impl UsageProfile {
    pub fn from_samples(samples: &[ResourceSample]) -> Self {
        let mut cpu: Vec<f64> = samples.iter().map(|s| s.cpu_millicores as f64).collect();
        let mut memory: Vec<f64> = samples.iter().map(|s| s.memory_bytes as f64).collect();
        cpu.sort_by(f64::total_cmp);
        memory.sort_by(f64::total_cmp);

        Self {
            samples: samples.len(),
            cpu_p95_millicores: p95(&cpu),
            memory_p95_bytes: p95(&memory),
        }
    }
}

/// Comparison of one container present in both versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerImpact {
    pub container_name: String,
    pub current: UsageProfile,
    pub baseline: UsageProfile,
    pub result: ImpactResult,
}

/// Comparison of two versions of a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionImpact {
    pub current_version: String,
    pub baseline_version: String,
    pub window: ImpactWindow,
    pub containers: Vec<ContainerImpact>,
    pub score: Option<f64>,
    pub status: ImpactStatus,
    pub degraded: usize,
    pub improved: usize,
}

/// Newest version and the one before it
pub fn latest_pair(snapshots: &[VersionSnapshot]) -> Option<(&VersionSnapshot, &VersionSnapshot)> {
    match snapshots {
        [current, baseline, ..] => Some((current, baseline)),
        _ => None,
    }
}

async fn profile(
    store: &dyn SampleStore,
    snapshot: &VersionSnapshot,
    container_name: &str,
    since: DateTime<Utc>,
) -> Option<UsageProfile> {
    let id = container_id(&snapshot.pod.uid, container_name);
    match store.samples_since(&id, since).await {
        Ok(samples) => Some(UsageProfile::from_samples(&samples)),
        Err(e) => {
            warn!(
                pod = %snapshot.pod.name,
                container = %container_name,
                error = %e,
                "Failed to load samples for impact comparison"
            );
            None
        }
    }
}

fn compare_profiles(current: &UsageProfile, baseline: &UsageProfile) -> ImpactResult {
    let delta = |c: Option<f64>, b: Option<f64>| match (c, b) {
        (Some(c), Some(b)) => delta_percent(c, b),
        _ => None,
    };
    ImpactResult::from_deltas(
        delta(current.cpu_p95_millicores, baseline.cpu_p95_millicores),
        delta(current.memory_p95_bytes, baseline.memory_p95_bytes),
    )
}

/// Compare every container name present in both snapshots
pub async fn compare_versions(
    store: &dyn SampleStore,
    current: &VersionSnapshot,
    baseline: &VersionSnapshot,
    window: ImpactWindow,
    now: DateTime<Utc>,
) -> VersionImpact {
    let since = now - window.duration();
    let mut containers = Vec::new();

    for container in current.containers() {
        let name = container.name.as_str();
        if !baseline.containers().iter().any(|c| c.name == name) {
            continue;
        }

        let current_profile = profile(store, current, name, since).await;
        let baseline_profile = profile(store, baseline, name, since).await;

        let (current_profile, baseline_profile, result) = match (current_profile, baseline_profile)
        {
            (Some(c), Some(b)) => {
                let result = compare_profiles(&c, &b);
                (c, b, result)
            }
            (c, b) => (
                c.unwrap_or_default(),
                b.unwrap_or_default(),
                ImpactResult::unknown(),
            ),
        };

        containers.push(ContainerImpact {
            container_name: name.to_string(),
            current: current_profile,
            baseline: baseline_profile,
            result,
        });
    }

    let scores: Vec<Option<f64>> = containers.iter().map(|c| c.result.score).collect();
    let score = mean_present(&scores);
    let count = |status: ImpactStatus| {
        containers
            .iter()
            .filter(|c| c.result.status == status)
            .count()
    };

    VersionImpact {
        current_version: current.version.clone(),
        baseline_version: baseline.version.clone(),
        window,
        degraded: count(ImpactStatus::Degraded),
        improved: count(ImpactStatus::Improved),
        status: ImpactStatus::classify(score),
        score,
        containers,
    }
}

/// Compare a deployment's newest version with the previous one
pub async fn analyze_deployment(
    store: &dyn SampleStore,
    group: &DeploymentGroup,
    window: ImpactWindow,
    now: DateTime<Utc>,
) -> Option<VersionImpact> {
    let snapshots = group.version_snapshots();
    let (current, baseline) = latest_pair(&snapshots)?;
    Some(compare_versions(store, current, baseline, window, now).await)
}
