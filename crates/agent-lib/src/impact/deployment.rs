//! Deployment grouping and version snapshots
//!
//! Pods are grouped by an inferred deployment name and, within a
//! deployment, by an inferred version label.

use crate::models::{ContainerSnapshot, PodSnapshot};
use crate::triage::{sort_for_triage, Health, Triage, TriagedPod};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Label keys naming the owning deployment, in order of preference
pub const DEPLOYMENT_LABELS: &[&str] = &["app.kubernetes.io/name", "app", "k8s-app", "name"];

/// Label keys carrying a version, in order of preference
pub const VERSION_LABELS: &[&str] = &[
    "version",
    "app.kubernetes.io/version",
    "helm.sh/chart",
    "app.kubernetes.io/instance",
    "deployment-version",
    "release",
];

/// Distinct versions kept per deployment
pub const MAX_VERSION_SNAPSHOTS: usize = 10;

/// `<name>-<pod-template-hash>-<pod-suffix>`
fn replicaset_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+)-[a-z0-9]{6,10}-[a-z0-9]{5}$").expect("valid replicaset pattern")
    })
}

/// `<name>-<ordinal>` as used by stateful sets
fn ordinal_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+)-\d+$").expect("valid ordinal pattern"))
}

fn first_label<'a>(pod: &'a PodSnapshot, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| pod.labels.get(*key))
        .map(String::as_str)
        .find(|value| !value.is_empty())
}

/// Deployment a pod belongs to: a label if present, else its name minus
/// the controller-generated suffix, else the raw pod name
pub fn infer_deployment_name(pod: &PodSnapshot) -> String {
    if let Some(name) = first_label(pod, DEPLOYMENT_LABELS) {
        return name.to_string();
    }

    [replicaset_suffix(), ordinal_suffix()]
        .iter()
        .find_map(|re| re.captures(&pod.name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| pod.name.clone())
}

pub fn infer_version(pod: &PodSnapshot) -> Option<String> {
    first_label(pod, VERSION_LABELS).map(str::to_string)
}

/// Pod counts per health state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub warning: usize,
    pub error: usize,
}

impl HealthSummary {
    fn record(&mut self, health: Health) {
        match health {
            Health::Healthy => self.healthy += 1,
            Health::Warning => self.warning += 1,
            Health::Error => self.error += 1,
        }
    }
}

/// Pods sharing a deployment name, newest first
#[derive(Debug, Clone)]
pub struct DeploymentGroup {
    pub name: String,
    pub pods: Vec<TriagedPod>,
    /// Worst pod health
    pub health: Health,
    /// Highest pod attention score
    pub attention_score: i64,
    pub health_summary: HealthSummary,
}

impl DeploymentGroup {
    fn new(name: String, mut pods: Vec<TriagedPod>) -> Self {
        pods.sort_by(|a, b| b.pod.created_at.cmp(&a.pod.created_at));

        let mut health_summary = HealthSummary::default();
        let mut health = Health::Healthy;
        let mut attention_score = 0;
        for pod in &pods {
            health_summary.record(pod.health.health);
            if pod.health.health.priority() < health.priority() {
                health = pod.health.health;
            }
            attention_score = attention_score.max(pod.health.attention_score);
        }

        Self {
            name,
            pods,
            health,
            attention_score,
            health_summary,
        }
    }

    /// Version snapshots for this deployment's pods, most recent first
    pub fn version_snapshots(&self) -> Vec<VersionSnapshot> {
        let pods: Vec<PodSnapshot> = self.pods.iter().map(|p| p.pod.clone()).collect();
        version_snapshots(&pods)
    }
}

impl Triage for DeploymentGroup {
    fn health(&self) -> Health {
        self.health
    }

    fn attention_score(&self) -> i64 {
        self.attention_score
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.pods
            .first()
            .map(|p| p.pod.created_at)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Group triaged pods by deployment and order the groups for triage
pub fn group_deployments(pods: Vec<TriagedPod>) -> Vec<DeploymentGroup> {
    let mut grouped: BTreeMap<String, Vec<TriagedPod>> = BTreeMap::new();
    for pod in pods {
        grouped
            .entry(infer_deployment_name(&pod.pod))
            .or_default()
            .push(pod);
    }

    let mut groups: Vec<DeploymentGroup> = grouped
        .into_iter()
        .map(|(name, pods)| DeploymentGroup::new(name, pods))
        .collect();
    sort_for_triage(&mut groups);
    groups
}

/// The most recent pod observed running a given version
#[derive(Debug, Clone)]
pub struct VersionSnapshot {
    pub version: String,
    pub pod: PodSnapshot,
}

impl VersionSnapshot {
    pub fn containers(&self) -> &[ContainerSnapshot] {
        &self.pod.containers
    }
}

/// One snapshot per distinct version, most recent pod wins, newest
/// versions first. Pods without a version label are skipped.
pub fn version_snapshots(pods: &[PodSnapshot]) -> Vec<VersionSnapshot> {
    let mut ordered: Vec<&PodSnapshot> = pods.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut snapshots: Vec<VersionSnapshot> = Vec::new();
    for pod in ordered {
        let Some(version) = infer_version(pod) else {
            continue;
        };
        if snapshots.iter().any(|s| s.version == version) {
            continue;
        }
        snapshots.push(VersionSnapshot {
            version,
            pod: pod.clone(),
        });
        if snapshots.len() == MAX_VERSION_SNAPSHOTS {
            break;
        }
    }
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerState;
    use crate::triage::LogSignals;
    use chrono::{Duration, TimeZone};

    fn pod(name: &str, labels: &[(&str, &str)], age_hours: i64) -> PodSnapshot {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        PodSnapshot {
            uid: format!("uid-{}", name),
            name: name.to_string(),
            namespace: "prod".to_string(),
            status: "Running".to_string(),
            created_at: base - Duration::hours(age_hours),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            containers: vec![ContainerSnapshot {
                name: "app".to_string(),
                state: ContainerState::Running,
                last_state_reason: None,
                ready: true,
                restart_count: 0,
                cpu_limit: None,
                memory_limit: None,
            }],
        }
    }

    #[test]
    fn test_deployment_name_from_labels() {
        let p = pod("checkout-7d9f8b6c5d-x2k4p", &[("app", "checkout"), ("name", "other")], 0);
        assert_eq!(infer_deployment_name(&p), "checkout");

        let p = pod("x", &[("app.kubernetes.io/name", "cart"), ("app", "ignored")], 0);
        assert_eq!(infer_deployment_name(&p), "cart");
    }

    #[test]
    fn test_deployment_name_from_pod_name() {
        assert_eq!(
            infer_deployment_name(&pod("checkout-api-7d9f8b6c5d-x2k4p", &[], 0)),
            "checkout-api"
        );
        assert_eq!(infer_deployment_name(&pod("postgres-2", &[], 0)), "postgres");
        assert_eq!(infer_deployment_name(&pod("standalone", &[], 0)), "standalone");
    }

    #[test]
    fn test_version_label_preference() {
        let p = pod("a", &[("release", "r1"), ("app.kubernetes.io/version", "1.4.0")], 0);
        assert_eq!(infer_version(&p).as_deref(), Some("1.4.0"));
        assert_eq!(infer_version(&pod("b", &[], 0)), None);
    }

    #[test]
    fn test_group_deployments() {
        let logs = LogSignals::new();
        let mut crashing = pod("web-1", &[("app", "web")], 1);
        crashing.status = "CrashLoopBackOff".to_string();

        let pods = vec![
            TriagedPod::new(pod("web-0", &[("app", "web")], 5), &logs),
            TriagedPod::new(crashing, &logs),
            TriagedPod::new(pod("db-0", &[], 2), &logs),
        ];
        let groups = group_deployments(pods);

        assert_eq!(groups.len(), 2);
        let web = &groups[0];
        assert_eq!(web.name, "web");
        assert_eq!(web.health, Health::Error);
        assert_eq!(web.attention_score, 200);
        assert_eq!(web.pods[0].pod.name, "web-1", "newest pod first");
        assert_eq!(
            web.health_summary,
            HealthSummary {
                healthy: 1,
                warning: 0,
                error: 1
            }
        );
        assert_eq!(groups[1].name, "db");
        assert_eq!(groups[1].health, Health::Healthy);
    }

    #[test]
    fn test_version_snapshots_keep_newest_pod_per_version() {
        let pods = vec![
            pod("web-a", &[("version", "v1")], 10),
            pod("web-b", &[("version", "v1")], 8),
            pod("web-c", &[("version", "v2")], 1),
            pod("web-d", &[], 0),
        ];
        let snapshots = version_snapshots(&pods);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].version, "v2");
        assert_eq!(snapshots[1].version, "v1");
        assert_eq!(snapshots[1].pod.name, "web-b");
        assert_eq!(snapshots[1].containers().len(), 1);
    }

    #[test]
    fn test_version_snapshots_capped() {
        let pods: Vec<PodSnapshot> = (0..15)
            .map(|i| {
                let version = format!("v{}", i);
                pod(&format!("web-{}", i), &[("version", version.as_str())], i)
            })
            .collect();
        let snapshots = version_snapshots(&pods);

        assert_eq!(snapshots.len(), MAX_VERSION_SNAPSHOTS);
        assert_eq!(snapshots[0].version, "v0");
        assert_eq!(snapshots[9].version, "v9");
    }
}
