//! Tier 3: per-node kubelet stats summary
//!
//! `usageNanoCores` is already instantaneous, so it only needs a unit
//! conversion; working-set bytes are taken as reported.

use super::{AcquisitionContext, AcquisitionTier, TierKind};
use crate::error::TierError;
use crate::models::UsageRow;
use async_trait::async_trait;
use tracing::debug;

pub struct StatsSummaryTier;

#[async_trait]
impl AcquisitionTier for StatsSummaryTier {
    fn kind(&self) -> TierKind {
        TierKind::StatsSummary
    }

    async fn acquire(&self, ctx: &mut AcquisitionContext<'_>) -> Result<Vec<UsageRow>, TierError> {
        let nodes = ctx
            .cluster
            .list_nodes()
            .await
            .map_err(|e| TierError::request("node list", e))?;

        let mut rows = Vec::new();
        for node in &nodes {
            let summary = ctx
                .cluster
                .node_summary(node)
                .await
                .map_err(|e| TierError::request(format!("node {} stats summary", node), e))?;

            for pod in summary.pods {
                if pod.pod_ref.namespace != ctx.namespace {
                    continue;
                }

                let uid = pod
                    .pod_ref
                    .uid
                    .filter(|uid| !uid.is_empty())
                    .or_else(|| {
                        ctx.pod_index
                            .uid(&pod.pod_ref.namespace, &pod.pod_ref.name)
                            .map(str::to_string)
                    });
                let Some(uid) = uid else {
                    debug!(pod = %pod.pod_ref.name, node = %node, "Pod uid unresolved, dropping");
                    continue;
                };

                for container in pod.containers {
                    let nano_cores = container
                        .cpu
                        .and_then(|cpu| cpu.usage_nano_cores)
                        .unwrap_or(0);
                    let memory_bytes = container
                        .memory
                        .and_then(|memory| memory.working_set_bytes)
                        .unwrap_or(0);

                    rows.push(UsageRow {
                        pod_uid: uid.clone(),
                        pod_name: pod.pod_ref.name.clone(),
                        container_name: container.name,
                        cpu_raw: format!("{}n", nano_cores),
                        memory_raw: memory_bytes.to_string(),
                        cpu_millicores: (nano_cores as f64 / 1e6).round() as u64,
                        memory_bytes,
                    });
                }
            }
        }

        if rows.is_empty() && !ctx.pod_index.is_empty() {
            return Err(TierError::NoMetrics);
        }

        Ok(rows)
    }
}
