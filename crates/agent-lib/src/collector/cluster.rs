//! Cluster API access
//!
//! Everything the acquisition tiers need from the Kubernetes API sits
//! behind [`ClusterApi`] so tiers can be exercised against a fake cluster.
//! [`KubeCluster`] is the production implementation on top of `kube`.

use crate::error::ClusterError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Pod identity as listed from the API server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodRecord {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerRecord>,
}

/// Container name plus the runtime id from pod status (`containerd://...`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerRecord {
    pub name: String,
    pub runtime_id: Option<String>,
}

/// `metrics.k8s.io/v1beta1` PodMetricsList
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMetricsList {
    #[serde(default)]
    pub items: Vec<PodMetricsItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodMetricsItem {
    pub metadata: MetricsMetadata,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    #[serde(default)]
    pub usage: UsageQuantities,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQuantities {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

/// Kubelet `/stats/summary` response (only the fields we read)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    #[serde(default)]
    pub pods: Vec<PodStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStats {
    pub pod_ref: PodReference,
    #[serde(default)]
    pub containers: Vec<ContainerStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodReference {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub name: String,
    #[serde(default)]
    pub cpu: Option<CpuStats>,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    #[serde(default)]
    pub usage_nano_cores: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    #[serde(default)]
    pub working_set_bytes: Option<u64>,
}

/// Read access to the cluster used by the acquisition engine
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List pods in a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodRecord>, ClusterError>;

    /// List the names of all cluster nodes
    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError>;

    /// Aggregated per-container usage from the metrics API
    async fn pod_metrics(&self, namespace: &str) -> Result<PodMetricsList, ClusterError>;

    /// Raw exposition text from a node's container metrics endpoint
    async fn node_exposition(&self, node: &str) -> Result<String, ClusterError>;

    /// Kubelet stats summary for a node
    async fn node_summary(&self, node: &str) -> Result<StatsSummary, ClusterError>;
}

/// Cluster access through the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn get(path: &str) -> Result<http::Request<Vec<u8>>, ClusterError> {
        Ok(http::Request::get(path).body(Vec::new())?)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodRecord>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(pod_record).collect())
    }

    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|node| node.metadata.name)
            .collect())
    }

    async fn pod_metrics(&self, namespace: &str) -> Result<PodMetricsList, ClusterError> {
        let path = format!("/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods", namespace);
        Ok(self.client.request(Self::get(&path)?).await?)
    }

    async fn node_exposition(&self, node: &str) -> Result<String, ClusterError> {
        let path = format!("/api/v1/nodes/{}/proxy/metrics/cadvisor", node);
        Ok(self.client.request_text(Self::get(&path)?).await?)
    }

    async fn node_summary(&self, node: &str) -> Result<StatsSummary, ClusterError> {
        let path = format!("/api/v1/nodes/{}/proxy/stats/summary", node);
        Ok(self.client.request(Self::get(&path)?).await?)
    }
}

/// Flatten a `Pod` into the identity fields the pod index needs
fn pod_record(pod: Pod) -> Option<PodRecord> {
    let metadata = pod.metadata;
    let uid = metadata.uid?;
    let name = metadata.name?;

    let statuses = pod.status.map(|status| {
        status
            .init_container_statuses
            .unwrap_or_default()
            .into_iter()
            .chain(status.container_statuses.unwrap_or_default())
            .map(|cs| ContainerRecord {
                name: cs.name,
                runtime_id: cs.container_id,
            })
            .collect::<Vec<_>>()
    });

    Some(PodRecord {
        uid,
        name,
        namespace: metadata.namespace.unwrap_or_default(),
        node_name: pod.spec.and_then(|spec| spec.node_name),
        labels: metadata.labels.unwrap_or_default(),
        containers: statuses.unwrap_or_default(),
    })
}
