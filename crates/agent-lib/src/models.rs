//! Core data models for the telemetry collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One container's usage as returned by an acquisition tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRow {
    pub pod_uid: String,
    pub pod_name: String,
    pub container_name: String,
    pub cpu_raw: String,
    pub memory_raw: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

/// A persisted, append-only resource sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub sampled_at: DateTime<Utc>,
    pub namespace: String,
    pub pod_uid: String,
    pub pod_name: String,
    pub container_name: String,
    pub container_id: String,
    pub cpu_raw: String,
    pub memory_raw: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

impl ResourceSample {
    /// Stamp an acquired row with its cycle time and stable container id
    pub fn from_row(row: UsageRow, namespace: &str, sampled_at: DateTime<Utc>) -> Self {
        let container_id = container_id(&row.pod_uid, &row.container_name);
        Self {
            sampled_at,
            namespace: namespace.to_string(),
            pod_uid: row.pod_uid,
            pod_name: row.pod_name,
            container_name: row.container_name,
            container_id,
            cpu_raw: row.cpu_raw,
            memory_raw: row.memory_raw,
            cpu_millicores: row.cpu_millicores,
            memory_bytes: row.memory_bytes,
        }
    }
}

/// Stable id for a logical container: the same (pod uid, container name)
/// always yields the same id across cycles and restarts.
pub fn container_id(pod_uid: &str, container_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pod_uid.as_bytes());
    hasher.update(b"/");
    hasher.update(container_name.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

/// Container runtime state as reported by the pod inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ContainerState {
    Running,
    Waiting,
    Terminated,
}

/// Container as seen by the inventory sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub name: String,
    pub state: ContainerState,
    /// Reason attached to the current or last state (e.g. `OOMKilled`, `ContainerCreating`)
    pub last_state_reason: Option<String>,
    pub ready: bool,
    pub restart_count: u32,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
}

/// Pod as seen by the inventory sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    /// Phase or pod-level reason (`Running`, `Pending`, `CrashLoopBackOff`, ...)
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub labels: std::collections::BTreeMap<String, String>,
    pub containers: Vec<ContainerSnapshot>,
}
