//! Tier 1: aggregated metrics API
//!
//! Usage from `metrics.k8s.io` is already an instantaneous rate, so rows
//! are built straight from the reported quantities.

use super::{AcquisitionContext, AcquisitionTier, TierKind};
use crate::error::TierError;
use crate::models::UsageRow;
use crate::quantity::{cpu_to_millicores, memory_to_bytes};
use async_trait::async_trait;
use tracing::debug;

pub struct MetricsApiTier;

#[async_trait]
impl AcquisitionTier for MetricsApiTier {
    fn kind(&self) -> TierKind {
        TierKind::MetricsApi
    }

    async fn acquire(&self, ctx: &mut AcquisitionContext<'_>) -> Result<Vec<UsageRow>, TierError> {
        let list = ctx
            .cluster
            .pod_metrics(ctx.namespace)
            .await
            .map_err(|e| TierError::request("metrics.k8s.io", e))?;

        let mut rows = Vec::new();
        for item in list.items {
            let namespace = item.metadata.namespace.as_deref().unwrap_or(ctx.namespace);
            if namespace != ctx.namespace {
                continue;
            }

            let Some(uid) = ctx.pod_index.uid(namespace, &item.metadata.name) else {
                debug!(pod = %item.metadata.name, "Pod not in index, dropping metrics");
                continue;
            };

            for container in item.containers {
                let cpu_raw = container.usage.cpu.unwrap_or_default();
                let memory_raw = container.usage.memory.unwrap_or_default();
                rows.push(UsageRow {
                    pod_uid: uid.to_string(),
                    pod_name: item.metadata.name.clone(),
                    container_name: container.name,
                    cpu_millicores: cpu_to_millicores(&cpu_raw).unwrap_or(0),
                    memory_bytes: memory_to_bytes(&memory_raw).unwrap_or(0),
                    cpu_raw,
                    memory_raw,
                });
            }
        }

        if rows.is_empty() && !ctx.pod_index.is_empty() {
            return Err(TierError::NoMetrics);
        }

        Ok(rows)
    }
}
