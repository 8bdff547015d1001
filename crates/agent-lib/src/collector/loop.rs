//! Resource sampling loop
//!
//! Drives the acquisition engine on a fixed interval and persists each
//! cycle's rows as one transaction. The sleep before the next cycle is
//! shortened by however long the cycle took, so the cadence does not drift
//! with acquisition latency.

use super::{AcquisitionEngine, ClusterApi, CounterState, TierKind};
use crate::error::CycleError;
use crate::health::{components, HealthRegistry};
use crate::models::ResourceSample;
use crate::observability::{SamplerMetrics, StructuredLogger};
use crate::store::SampleStore;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Namespace sampled every cycle (default: "default")
    pub namespace: String,
    /// Target cycle period (default: 30 seconds)
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            interval: Duration::from_secs(30),
        }
    }
}

/// Outcome of one committed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub tier: TierKind,
    pub written: u64,
    /// Tiers that failed before `tier` served the cycle
    pub fallbacks: usize,
    pub elapsed: Duration,
}

/// Periodic sampler: acquire, stamp, persist
pub struct SamplingLoop {
    engine: AcquisitionEngine,
    cluster: Arc<dyn ClusterApi>,
    store: Arc<dyn SampleStore>,
    counters: CounterState,
    config: SamplerConfig,
    health: HealthRegistry,
    metrics: SamplerMetrics,
    logger: StructuredLogger,
    schema_ready: bool,
}

impl SamplingLoop {
    pub fn new(
        engine: AcquisitionEngine,
        cluster: Arc<dyn ClusterApi>,
        store: Arc<dyn SampleStore>,
        config: SamplerConfig,
        health: HealthRegistry,
    ) -> Self {
        let logger = StructuredLogger::new(config.namespace.clone());
        Self {
            engine,
            cluster,
            store,
            counters: CounterState::new(),
            config,
            health,
            metrics: SamplerMetrics::new(),
            logger,
            schema_ready: false,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn counters(&self) -> &CounterState {
        &self.counters
    }

    /// Run until a shutdown signal arrives
    ///
    /// Shutdown is only observed while sleeping between cycles, so a cycle
    /// that has started always finishes its transaction.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let tiers: Vec<TierKind> = self.engine.tiers().collect();
        debug!(tiers = ?tiers, "Acquisition chain");
        self.logger
            .log_startup(env!("CARGO_PKG_VERSION"), self.config.interval.as_secs());

        loop {
            let start = Instant::now();
            // outcome is already logged and recorded in run_cycle
            let _ = self.run_cycle().await;

            let sleep_for = self.config.interval.saturating_sub(start.elapsed());
            debug!(sleep_ms = sleep_for.as_millis(), "Waiting for next cycle");

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.recv() => {
                    self.logger.log_shutdown("shutdown signal received");
                    break;
                }
            }
        }
    }

    /// Execute one full cycle and record its outcome
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let start = Instant::now();
        let result = self.sample(start).await;
        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());

        if result.is_err() {
            self.metrics.inc_cycles_failed();
        }
        result
    }

    async fn sample(&mut self, start: Instant) -> Result<CycleReport, CycleError> {
        self.ensure_schema().await?;

        let sampled_at = Utc::now();
        let acquisition = match self
            .engine
            .acquire(self.cluster.as_ref(), &self.config.namespace, &mut self.counters)
            .await
        {
            Ok(acquisition) => acquisition,
            Err(e) => {
                self.logger.log_cycle_skipped(&e);
                self.health
                    .set_degraded(components::COLLECTOR, e.to_string())
                    .await;
                return Err(e.into());
            }
        };
        self.health.set_healthy(components::COLLECTOR).await;

        let samples: Vec<ResourceSample> = acquisition
            .rows
            .into_iter()
            .map(|row| ResourceSample::from_row(row, &self.config.namespace, sampled_at))
            .collect();

        let written = if samples.is_empty() {
            debug!(namespace = %self.config.namespace, "No containers to sample");
            0
        } else {
            match self.store.insert_samples(&samples).await {
                Ok(written) => written,
                Err(e) => {
                    self.logger.log_persist_failed(&format!("{:#}", e), samples.len());
                    self.health
                        .set_unhealthy(components::STORE, format!("{:#}", e))
                        .await;
                    return Err(CycleError::Persist(e));
                }
            }
        };
        self.health.set_healthy(components::STORE).await;

        let report = CycleReport {
            tier: acquisition.tier,
            written,
            fallbacks: acquisition.failures.len(),
            elapsed: start.elapsed(),
        };
        self.metrics.record_cycle(report.tier, report.written);
        self.logger.log_cycle(
            report.tier,
            report.written,
            report.fallbacks,
            report.elapsed.as_millis(),
        );

        Ok(report)
    }

    async fn ensure_schema(&mut self) -> Result<(), CycleError> {
        if self.schema_ready {
            return Ok(());
        }

        if let Err(e) = self.store.ensure_schema().await {
            self.logger.log_persist_failed(&format!("{:#}", e), 0);
            self.health
                .set_unhealthy(components::STORE, format!("{:#}", e))
                .await;
            return Err(CycleError::Persist(e));
        }

        self.schema_ready = true;
        self.health.set_ready(true).await;
        Ok(())
    }
}

/// Builder for the sampling loop
pub struct SamplingLoopBuilder {
    engine: Option<AcquisitionEngine>,
    cluster: Option<Arc<dyn ClusterApi>>,
    store: Option<Arc<dyn SampleStore>>,
    health: Option<HealthRegistry>,
    config: SamplerConfig,
}

impl SamplingLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            engine: None,
            cluster: None,
            store: None,
            health: None,
            config: SamplerConfig::default(),
        }
    }

    /// Override the tier chain (defaults to the standard three tiers)
    pub fn engine(mut self, engine: AcquisitionEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterApi>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn store(mut self, store: Arc<dyn SampleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a health registry with the probe server
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Build the sampling loop
    pub fn build(self) -> Result<SamplingLoop> {
        let cluster = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("Cluster client is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Sample store is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Sampling interval must be greater than zero");
        }

        Ok(SamplingLoop::new(
            self.engine.unwrap_or_default(),
            cluster,
            store,
            self.config,
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for SamplingLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
