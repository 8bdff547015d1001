//! Pod health and triage ordering

use super::severity::{classify_severity, ContainerSeverity, Severity};
use crate::models::PodSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Pod-level statuses that are failing regardless of container state
const FAILING_POD_STATUSES: &[&str] = &["Error", "OOMKilled", "CrashLoopBackOff"];

const POD_ERROR_SCORE: i64 = 200;
const ERROR_LOGS_SCORE: i64 = 60;
const PENDING_MIN_SCORE: i64 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Warning,
    Error,
}

impl Health {
    /// Triage priority; lower sorts first
    pub fn priority(&self) -> u8 {
        match self {
            Health::Error => 0,
            Health::Warning => 1,
            Health::Healthy => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodHealth {
    pub health: Health,
    pub attention_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention_reason: Option<String>,
}

impl PodHealth {
    fn new(health: Health, attention_score: i64, reason: Option<String>) -> Self {
        Self {
            health,
            attention_score,
            attention_reason: reason,
        }
    }

    pub fn healthy() -> Self {
        Self::new(Health::Healthy, 0, None)
    }
}

/// Error-level log entries seen per container name
#[derive(Debug, Clone, Default)]
pub struct LogSignals {
    error_entries: HashMap<String, u32>,
}

impl LogSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_errors(&mut self, container: impl Into<String>, entries: u32) {
        *self.error_entries.entry(container.into()).or_insert(0) += entries;
    }

    pub fn error_entries(&self, container: &str) -> u32 {
        self.error_entries.get(container).copied().unwrap_or(0)
    }
}

/// Derive a pod's health from its status, its containers and their logs
pub fn compute_pod_health(pod: &PodSnapshot, logs: &LogSignals) -> PodHealth {
    if FAILING_POD_STATUSES.contains(&pod.status.as_str()) {
        return PodHealth::new(Health::Error, POD_ERROR_SCORE, Some(pod.status.clone()));
    }

    let worst: Option<ContainerSeverity> = pod
        .containers
        .iter()
        .map(classify_severity)
        .max_by_key(|severity| severity.score);
    let (severity, score, label) = match worst {
        Some(s) => (s.severity, s.score, Some(s.label)),
        None => (Severity::Healthy, 0, None),
    };

    if severity == Severity::Error {
        return PodHealth::new(Health::Error, score, label);
    }

    if pod
        .containers
        .iter()
        .any(|c| logs.error_entries(&c.name) > 0)
    {
        return PodHealth::new(
            Health::Warning,
            ERROR_LOGS_SCORE,
            Some("Error logs detected".to_string()),
        );
    }

    if pod.status == "Pending" || severity == Severity::Warning {
        let reason = if severity == Severity::Warning {
            label
        } else {
            Some(pod.status.clone())
        };
        return PodHealth::new(Health::Warning, score.max(PENDING_MIN_SCORE), reason);
    }

    if severity == Severity::Initializing {
        return PodHealth::new(Health::Warning, score, label);
    }

    PodHealth::healthy()
}

/// Anything that can be ordered for triage
pub trait Triage {
    fn health(&self) -> Health;
    fn attention_score(&self) -> i64;
    fn created_at(&self) -> DateTime<Utc>;
}

/// Most urgent first: worst health, then highest score, then newest
pub fn triage_order<T: Triage>(a: &T, b: &T) -> Ordering {
    a.health()
        .priority()
        .cmp(&b.health().priority())
        .then_with(|| b.attention_score().cmp(&a.attention_score()))
        .then_with(|| b.created_at().cmp(&a.created_at()))
}

pub fn sort_for_triage<T: Triage>(items: &mut [T]) {
    items.sort_by(triage_order);
}

/// A pod paired with its computed health
#[derive(Debug, Clone)]
pub struct TriagedPod {
    pub pod: PodSnapshot,
    pub health: PodHealth,
}

impl TriagedPod {
    pub fn new(pod: PodSnapshot, logs: &LogSignals) -> Self {
        let health = compute_pod_health(&pod, logs);
        Self { pod, health }
    }
}

impl Triage for TriagedPod {
    fn health(&self) -> Health {
        self.health.health
    }

    fn attention_score(&self) -> i64 {
        self.health.attention_score
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.pod.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerSnapshot, ContainerState};
    use chrono::{Duration, TimeZone};

    fn container(
        name: &str,
        state: ContainerState,
        reason: Option<&str>,
        ready: bool,
        restarts: u32,
    ) -> ContainerSnapshot {
        ContainerSnapshot {
            name: name.to_string(),
            state,
            last_state_reason: reason.map(str::to_string),
            ready,
            restart_count: restarts,
            cpu_limit: None,
            memory_limit: None,
        }
    }

    fn running(name: &str) -> ContainerSnapshot {
        container(name, ContainerState::Running, None, true, 0)
    }

    fn pod(name: &str, status: &str, containers: Vec<ContainerSnapshot>) -> PodSnapshot {
        PodSnapshot {
            uid: format!("uid-{}", name),
            name: name.to_string(),
            namespace: "prod".to_string(),
            status: status.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            labels: Default::default(),
            containers,
        }
    }

    #[test]
    fn test_failing_pod_status_wins() {
        let p = pod("web-0", "CrashLoopBackOff", vec![running("web")]);
        let health = compute_pod_health(&p, &LogSignals::new());
        assert_eq!(health.health, Health::Error);
        assert_eq!(health.attention_score, 200);
        assert_eq!(health.attention_reason.as_deref(), Some("CrashLoopBackOff"));
    }

    #[test]
    fn test_worst_container_error() {
        let p = pod(
            "web-0",
            "Running",
            vec![
                running("web"),
                container("sidecar", ContainerState::Terminated, Some("OOMKilled"), false, 3),
            ],
        );
        let health = compute_pod_health(&p, &LogSignals::new());
        assert_eq!(health.health, Health::Error);
        assert_eq!(health.attention_score, 103);
        assert_eq!(health.attention_reason.as_deref(), Some("OOMKilled"));
    }

    #[test]
    fn test_error_logs_raise_warning() {
        let p = pod("web-0", "Running", vec![running("web")]);
        let mut logs = LogSignals::new();
        logs.record_errors("web", 4);

        let health = compute_pod_health(&p, &logs);
        assert_eq!(health.health, Health::Warning);
        assert_eq!(health.attention_score, 60);
        assert_eq!(health.attention_reason.as_deref(), Some("Error logs detected"));
    }

    #[test]
    fn test_logs_for_other_pods_ignored() {
        let p = pod("web-0", "Running", vec![running("web")]);
        let mut logs = LogSignals::new();
        logs.record_errors("worker", 1);

        assert_eq!(compute_pod_health(&p, &logs), PodHealth::healthy());
    }

    #[test]
    fn test_pending_pod_has_minimum_score() {
        let p = pod(
            "web-0",
            "Pending",
            vec![container("web", ContainerState::Waiting, Some("ContainerCreating"), false, 0)],
        );
        let health = compute_pod_health(&p, &LogSignals::new());
        assert_eq!(health.health, Health::Warning);
        assert_eq!(health.attention_score, 35);
        assert_eq!(health.attention_reason.as_deref(), Some("Pending"));
    }

    #[test]
    fn test_warning_container_score_kept_above_minimum() {
        let p = pod(
            "web-0",
            "Running",
            vec![container("web", ContainerState::Running, None, true, 2)],
        );
        let health = compute_pod_health(&p, &LogSignals::new());
        assert_eq!(health.health, Health::Warning);
        assert_eq!(health.attention_score, 42);
    }

    #[test]
    fn test_initializing_container_is_warning() {
        let p = pod(
            "web-0",
            "Running",
            vec![container("web", ContainerState::Waiting, Some("PodInitializing"), false, 0)],
        );
        let health = compute_pod_health(&p, &LogSignals::new());
        assert_eq!(health.health, Health::Warning);
        assert_eq!(health.attention_score, 20);
        assert_eq!(health.attention_reason.as_deref(), Some("PodInitializing"));
    }

    #[test]
    fn test_healthy_pod() {
        let p = pod("web-0", "Running", vec![running("web"), running("sidecar")]);
        assert_eq!(compute_pod_health(&p, &LogSignals::new()), PodHealth::healthy());
    }

    #[test]
    fn test_sort_for_triage() {
        let logs = LogSignals::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut older_warning = pod(
            "a",
            "Running",
            vec![container("c", ContainerState::Running, None, true, 1)],
        );
        older_warning.created_at = base;
        let mut newer_warning = older_warning.clone();
        newer_warning.name = "b".to_string();
        newer_warning.created_at = base + Duration::hours(1);

        let mut pods = vec![
            TriagedPod::new(pod("healthy", "Running", vec![running("c")]), &logs),
            TriagedPod::new(older_warning, &logs),
            TriagedPod::new(pod("pending", "Pending", vec![]), &logs),
            TriagedPod::new(pod("crash", "CrashLoopBackOff", vec![]), &logs),
            TriagedPod::new(newer_warning, &logs),
        ];
        sort_for_triage(&mut pods);

        let names: Vec<&str> = pods.iter().map(|p| p.pod.name.as_str()).collect();
        assert_eq!(names, vec!["crash", "b", "a", "pending", "healthy"]);

        for pair in pods.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.health().priority() <= b.health().priority());
            if a.health() == b.health() {
                assert!(a.attention_score() >= b.attention_score());
            }
        }
    }
}
