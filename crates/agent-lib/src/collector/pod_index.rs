//! Per-cycle pod index
//!
//! Built once per cycle from a single pod listing. Maps `namespace/name`
//! to pod uid and node, and runtime container ids to pod identity so
//! exposition series without pod labels can still be attributed.

use super::cluster::PodRecord;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PodIndexEntry {
    pub uid: String,
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeContainer {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
}

#[derive(Debug, Default)]
pub struct PodIndex {
    pods: HashMap<String, PodIndexEntry>,
    runtime: HashMap<String, RuntimeContainer>,
}

impl PodIndex {
    pub fn build(pods: &[PodRecord]) -> Self {
        let mut index = PodIndex::default();

        for pod in pods {
            index.pods.insert(
                pod_key(&pod.namespace, &pod.name),
                PodIndexEntry {
                    uid: pod.uid.clone(),
                    node_name: pod.node_name.clone(),
                },
            );

            for container in &pod.containers {
                let Some(id) = container.runtime_id.as_deref().and_then(normalize_runtime_id)
                else {
                    continue;
                };
                index.runtime.insert(
                    id.to_string(),
                    RuntimeContainer {
                        namespace: pod.namespace.clone(),
                        pod_name: pod.name.clone(),
                        container_name: container.name.clone(),
                    },
                );
            }
        }

        index
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&PodIndexEntry> {
        self.pods.get(&pod_key(namespace, name))
    }

    pub fn uid(&self, namespace: &str, name: &str) -> Option<&str> {
        self.get(namespace, name).map(|entry| entry.uid.as_str())
    }

    /// Look up a container by runtime id, pod status form or cgroup path form
    pub fn resolve_runtime_id(&self, raw: &str) -> Option<&RuntimeContainer> {
        self.runtime.get(normalize_runtime_id(raw)?)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

fn pod_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Reduce a runtime container reference to the bare id
///
/// Accepts `containerd://<id>` as found in pod status, and cgroup paths
/// such as `/kubepods/burstable/pod<uid>/<id>` or
/// `/kubepods.slice/.../cri-containerd-<id>.scope` as found in `id` labels.
pub fn normalize_runtime_id(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let tail = match raw.split_once("://") {
        Some((_, id)) => id,
        None => raw.trim_end_matches('/').rsplit('/').next().unwrap_or(raw),
    };

    let tail = tail.strip_suffix(".scope").unwrap_or(tail);
    let id = ["cri-containerd-", "docker-", "crio-", "cri-o-"]
        .iter()
        .find_map(|prefix| tail.strip_prefix(prefix))
        .unwrap_or(tail);

    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
