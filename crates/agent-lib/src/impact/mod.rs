//! Deployment grouping and version impact analysis
//!
//! This module provides:
//! - Deployment and version inference from pod labels and names
//! - Per-deployment health aggregation
//! - Windowed p95 comparison between two versions of a deployment

mod analyzer;
mod deployment;
mod stats;

pub use analyzer::{
    analyze_deployment, compare_versions, latest_pair, ContainerImpact, ImpactWindow,
    UnknownWindow, UsageProfile, VersionImpact,
};
pub use deployment::{
    group_deployments, infer_deployment_name, infer_version, version_snapshots, DeploymentGroup,
    HealthSummary, VersionSnapshot, DEPLOYMENT_LABELS, MAX_VERSION_SNAPSHOTS, VERSION_LABELS,
};
pub use stats::{
    delta_percent, mean_present, p95, percentile, ImpactResult, ImpactStatus, DEGRADED_THRESHOLD,
    IMPROVED_THRESHOLD,
};
