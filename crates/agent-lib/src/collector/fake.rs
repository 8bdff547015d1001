//! Scripted in-memory cluster for tests

use super::cluster::{ClusterApi, ContainerRecord, PodMetricsList, PodRecord, StatsSummary};
use crate::error::ClusterError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct FakeCluster {
    pub pods: Vec<PodRecord>,
    pub nodes: Vec<String>,
    pub pod_metrics: Option<PodMetricsList>,
    pub expositions: Mutex<HashMap<String, String>>,
    pub summaries: HashMap<String, StatsSummary>,
    pub fail_pod_list: bool,
    /// Time each pod listing takes, in tokio time
    pub pod_list_delay: Option<Duration>,

    pub pod_list_calls: AtomicUsize,
    pub pod_metrics_calls: AtomicUsize,
    pub exposition_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(
        mut self,
        namespace: &str,
        name: &str,
        uid: &str,
        containers: &[(&str, &str)],
    ) -> Self {
        self.pods.push(PodRecord {
            uid: uid.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            node_name: Some("node-a".to_string()),
            labels: Default::default(),
            containers: containers
                .iter()
                .map(|(name, runtime_id)| ContainerRecord {
                    name: name.to_string(),
                    runtime_id: Some(runtime_id.to_string()),
                })
                .collect(),
        });
        self
    }

    pub fn with_pod_list_delay(mut self, delay: Duration) -> Self {
        self.pod_list_delay = Some(delay);
        self
    }

    pub fn with_node(mut self, node: &str) -> Self {
        self.nodes.push(node.to_string());
        self
    }

    pub fn with_pod_metrics(mut self, json: &str) -> Self {
        self.pod_metrics = Some(serde_json::from_str(json).expect("valid pod metrics json"));
        self
    }

    pub fn with_exposition(self, node: &str, text: &str) -> Self {
        self.set_exposition(node, text);
        self
    }

    /// Replace a node's exposition text between cycles
    pub fn set_exposition(&self, node: &str, text: &str) {
        self.expositions
            .lock()
            .unwrap()
            .insert(node.to_string(), text.to_string());
    }

    pub fn with_summary(mut self, node: &str, json: &str) -> Self {
        self.summaries.insert(
            node.to_string(),
            serde_json::from_str(json).expect("valid summary json"),
        );
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodRecord>, ClusterError> {
        self.pod_list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.pod_list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_pod_list {
            return Err(ClusterError::Unexpected("pod list unavailable".into()));
        }
        Ok(self
            .pods
            .iter()
            .filter(|pod| pod.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        Ok(self.nodes.clone())
    }

    async fn pod_metrics(&self, _namespace: &str) -> Result<PodMetricsList, ClusterError> {
        self.pod_metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.pod_metrics
            .clone()
            .ok_or_else(|| ClusterError::Unexpected("404 metrics.k8s.io not served".into()))
    }

    async fn node_exposition(&self, node: &str) -> Result<String, ClusterError> {
        self.exposition_calls.fetch_add(1, Ordering::SeqCst);
        self.expositions
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .ok_or_else(|| ClusterError::Unexpected(format!("no exposition for {}", node)))
    }

    async fn node_summary(&self, node: &str) -> Result<StatsSummary, ClusterError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.summaries
            .get(node)
            .cloned()
            .ok_or_else(|| ClusterError::Unexpected(format!("no summary for {}", node)))
    }
}
