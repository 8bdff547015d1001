//! Container resource acquisition
//!
//! Usage is acquired through an ordered chain of tiers: the aggregated
//! metrics API, a per-node exposition scrape, and the per-node kubelet
//! stats summary. Each cycle builds a fresh pod index, then tries the
//! tiers top to bottom and keeps the first one that succeeds.

mod cluster;
mod counter;
mod r#loop;
mod metrics_api;
mod node_scrape;
mod pod_index;
mod stats_summary;

#[cfg(test)]
pub(crate) mod fake;

pub use cluster::{
    ClusterApi, ContainerRecord, ContainerStats, ContainerUsage, CpuStats, KubeCluster,
    MemoryStats, MetricsMetadata, PodMetricsItem, PodMetricsList, PodRecord, PodReference,
    PodStats, StatsSummary, UsageQuantities,
};
pub use counter::{counter_key, counter_key_pod, CounterEntry, CounterState};
pub use metrics_api::MetricsApiTier;
pub use node_scrape::{NodeScrapeTier, CPU_SECONDS_METRIC, WORKING_SET_METRIC};
pub use pod_index::{normalize_runtime_id, PodIndex, PodIndexEntry, RuntimeContainer};
pub use r#loop::{CycleReport, SamplerConfig, SamplingLoop, SamplingLoopBuilder};
pub use stats_summary::StatsSummaryTier;

use crate::error::{AcquisitionError, TierError};
use crate::models::UsageRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Which acquisition tier produced a cycle's rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierKind {
    MetricsApi,
    NodeScrape,
    StatsSummary,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::MetricsApi => "metrics-api",
            TierKind::NodeScrape => "node-scrape",
            TierKind::StatsSummary => "stats-summary",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a tier may read, plus the counter state it may update
pub struct AcquisitionContext<'a> {
    pub cluster: &'a dyn ClusterApi,
    pub namespace: &'a str,
    pub pod_index: &'a PodIndex,
    pub counters: &'a mut CounterState,
    /// Acquisition time, used for exposition samples without a timestamp
    pub now_ms: i64,
}

/// One acquisition strategy in the fallback chain
#[async_trait]
pub trait AcquisitionTier: Send + Sync {
    fn kind(&self) -> TierKind;

    async fn acquire(&self, ctx: &mut AcquisitionContext<'_>) -> Result<Vec<UsageRow>, TierError>;
}

/// Rows from the tier that served this cycle
#[derive(Debug)]
pub struct Acquisition {
    pub tier: TierKind,
    pub rows: Vec<UsageRow>,
    /// Tiers that were tried and failed before `tier`
    pub failures: Vec<(TierKind, TierError)>,
}

/// Ordered fallback chain of acquisition tiers
pub struct AcquisitionEngine {
    tiers: Vec<Box<dyn AcquisitionTier>>,
}

impl AcquisitionEngine {
    pub fn new(tiers: Vec<Box<dyn AcquisitionTier>>) -> Self {
        Self { tiers }
    }

    /// The standard chain: metrics API, node scrape, stats summary
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(MetricsApiTier),
            Box::new(NodeScrapeTier),
            Box::new(StatsSummaryTier),
        ])
    }

    pub fn tiers(&self) -> impl Iterator<Item = TierKind> + '_ {
        self.tiers.iter().map(|tier| tier.kind())
    }

    /// Run one acquisition: build the pod index, then try each tier in order
    pub async fn acquire(
        &self,
        cluster: &dyn ClusterApi,
        namespace: &str,
        counters: &mut CounterState,
    ) -> Result<Acquisition, AcquisitionError> {
        let pods = cluster
            .list_pods(namespace)
            .await
            .map_err(AcquisitionError::PodIndex)?;
        let pod_index = PodIndex::build(&pods);
        let now_ms = chrono::Utc::now().timestamp_millis();

        debug!(namespace = %namespace, pods = pod_index.len(), "Built pod index");

        let mut failures = Vec::new();
        for tier in &self.tiers {
            let mut ctx = AcquisitionContext {
                cluster,
                namespace,
                pod_index: &pod_index,
                counters: &mut *counters,
                now_ms,
            };

            match tier.acquire(&mut ctx).await {
                Ok(rows) => {
                    return Ok(Acquisition {
                        tier: tier.kind(),
                        rows,
                        failures,
                    });
                }
                Err(e) => {
                    warn!(
                        event = "tier_failed",
                        tier = %tier.kind(),
                        namespace = %namespace,
                        error = %e,
                        "Acquisition tier failed, falling through"
                    );
                    failures.push((tier.kind(), e));
                }
            }
        }

        Err(AcquisitionError::AllTiersFailed(failures))
    }
}

impl Default for AcquisitionEngine {
    fn default() -> Self {
        Self::standard()
    }
}
