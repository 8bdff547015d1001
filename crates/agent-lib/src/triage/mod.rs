//! Workload health classification
//!
//! This module provides:
//! - Per-container severity from runtime state, last-state reason and restarts
//! - Per-pod health and attention score
//! - Triage ordering shared by pods and deployment groups

mod pod;
mod severity;

pub use pod::{
    compute_pod_health, sort_for_triage, triage_order, Health, LogSignals, PodHealth, Triage,
    TriagedPod,
};
pub use severity::{classify_severity, ContainerSeverity, Severity, FATAL_REASONS};
