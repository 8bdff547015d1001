//! Tier 2: per-node exposition scrape
//!
//! Scrapes every node's container metrics endpoint and keeps two series
//! per container: the cumulative CPU counter, converted to a rate against
//! the previous cycle, and the working-set memory gauge.

use super::counter::{counter_key, counter_key_pod};
use super::pod_index::PodIndex;
use super::{AcquisitionContext, AcquisitionTier, TierKind};
use crate::error::TierError;
use crate::exposition::{parse_line, ExpositionSample};
use crate::models::UsageRow;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

pub const CPU_SECONDS_METRIC: &str = "container_cpu_usage_seconds_total";
pub const WORKING_SET_METRIC: &str = "container_memory_working_set_bytes";

pub struct NodeScrapeTier;

/// Latest values seen for one container across all scraped nodes
#[derive(Debug, Default)]
struct ContainerSeries {
    pod_uid: String,
    pod_name: String,
    container_name: String,
    cpu: Option<(f64, i64)>,
    memory: Option<(f64, i64)>,
}

#[async_trait]
impl AcquisitionTier for NodeScrapeTier {
    fn kind(&self) -> TierKind {
        TierKind::NodeScrape
    }

    async fn acquire(&self, ctx: &mut AcquisitionContext<'_>) -> Result<Vec<UsageRow>, TierError> {
        let nodes = ctx
            .cluster
            .list_nodes()
            .await
            .map_err(|e| TierError::request("node list", e))?;

        // Scrape everything before touching counter state so a failing node
        // leaves the baselines untouched for the next cycle.
        let mut series: BTreeMap<String, ContainerSeries> = BTreeMap::new();
        for node in &nodes {
            let text = ctx
                .cluster
                .node_exposition(node)
                .await
                .map_err(|e| TierError::request(format!("node {} metrics", node), e))?;

            let mut skipped = 0usize;
            for line in text.lines() {
                let Some(sample) = parse_line(line, ctx.now_ms) else {
                    if !line.trim().is_empty() && !line.trim_start().starts_with('#') {
                        skipped += 1;
                    }
                    continue;
                };
                if sample.metric != CPU_SECONDS_METRIC && sample.metric != WORKING_SET_METRIC {
                    continue;
                }
                record_sample(&mut series, &sample, ctx.namespace, ctx.pod_index);
            }

            if skipped > 0 {
                debug!(node = %node, skipped, "Skipped malformed exposition lines");
            }
        }

        if series.is_empty() {
            return Err(TierError::NoMetrics);
        }

        let rows = series
            .into_iter()
            .map(|(key, s)| {
                let cpu_millicores = s
                    .cpu
                    .map(|(total, ts)| ctx.counters.observe(&key, total, ts))
                    .unwrap_or(0);
                let memory_bytes = s
                    .memory
                    .map(|(value, _)| value.max(0.0).round() as u64)
                    .unwrap_or(0);

                UsageRow {
                    pod_uid: s.pod_uid,
                    pod_name: s.pod_name,
                    container_name: s.container_name,
                    cpu_raw: format!("{}m", cpu_millicores),
                    memory_raw: memory_bytes.to_string(),
                    cpu_millicores,
                    memory_bytes,
                }
            })
            .collect();

        // drop baselines of pods that left the namespace
        let (namespace, index) = (ctx.namespace, ctx.pod_index);
        ctx.counters.retain(|key| {
            counter_key_pod(key)
                .map_or(false, |(ns, pod)| ns == namespace && index.get(ns, pod).is_some())
        });

        Ok(rows)
    }
}

fn record_sample(
    series: &mut BTreeMap<String, ContainerSeries>,
    sample: &ExpositionSample,
    namespace: &str,
    index: &PodIndex,
) {
    if !sample.value.is_finite() {
        return;
    }
    let Some((pod, container)) = resolve_identity(sample, namespace, index) else {
        return;
    };
    let Some(uid) = index.uid(namespace, &pod) else {
        return;
    };

    let entry = series
        .entry(counter_key(namespace, &pod, &container))
        .or_insert_with(|| ContainerSeries {
            pod_uid: uid.to_string(),
            pod_name: pod.clone(),
            container_name: container.clone(),
            ..Default::default()
        });

    let slot = if sample.metric == CPU_SECONDS_METRIC {
        &mut entry.cpu
    } else {
        &mut entry.memory
    };
    // latest timestamp wins when a node repeats a series
    if slot.map_or(true, |(_, ts)| sample.timestamp_ms >= ts) {
        *slot = Some((sample.value, sample.timestamp_ms));
    }
}

/// Work out (pod, container) for a sample in the target namespace
///
/// Prefers the pod labels on the series; falls back to the runtime id in
/// the `id` label for sources that omit them.
fn resolve_identity(
    sample: &ExpositionSample,
    namespace: &str,
    index: &PodIndex,
) -> Option<(String, String)> {
    let non_empty = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| sample.label(key).filter(|v| !v.is_empty()))
    };

    let labelled = (
        non_empty(&["namespace"]),
        non_empty(&["pod", "pod_name"]),
        non_empty(&["container", "container_name"]),
    );

    if let (Some(ns), Some(pod), Some(container)) = labelled {
        if ns != namespace || container == "POD" {
            return None;
        }
        return Some((pod.to_string(), container.to_string()));
    }

    let mapped = index.resolve_runtime_id(sample.label("id")?)?;
    if mapped.namespace != namespace {
        return None;
    }
    Some((mapped.pod_name.clone(), mapped.container_name.clone()))
}
