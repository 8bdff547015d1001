//! Observability infrastructure for the telemetry sampler
//!
//! Provides:
//! - Prometheus self-metrics (cycle latency, cycle outcomes, rows written, serving tier)
//! - Structured JSON logging with tracing

use crate::collector::TierKind;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds)
const CYCLE_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SamplerMetricsInner> = OnceLock::new();

struct SamplerMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_failed: IntCounter,
    samples_written: IntCounter,
    containers_sampled: IntGauge,
    tier_cycles: IntCounterVec,
}

impl SamplerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "pod_telemetry_cycle_latency_seconds",
                "Time spent acquiring and persisting one sampling cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_completed: register_int_counter!(
                "pod_telemetry_cycles_completed_total",
                "Sampling cycles whose samples were committed"
            )
            .expect("Failed to register cycles_completed"),

            cycles_failed: register_int_counter!(
                "pod_telemetry_cycles_failed_total",
                "Sampling cycles skipped or rolled back"
            )
            .expect("Failed to register cycles_failed"),

            samples_written: register_int_counter!(
                "pod_telemetry_samples_written_total",
                "Resource samples committed to storage"
            )
            .expect("Failed to register samples_written"),

            containers_sampled: register_int_gauge!(
                "pod_telemetry_containers_sampled",
                "Containers sampled in the most recent successful cycle"
            )
            .expect("Failed to register containers_sampled"),

            tier_cycles: register_int_counter_vec!(
                "pod_telemetry_tier_cycles_total",
                "Cycles served by each acquisition tier",
                &["tier"]
            )
            .expect("Failed to register tier_cycles"),
        }
    }
}

/// Sampler metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct SamplerMetrics {
    _private: (),
}

impl Default for SamplerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SamplerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SamplerMetricsInner {
        GLOBAL_METRICS.get_or_init(SamplerMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    /// Record a committed cycle
    pub fn record_cycle(&self, tier: TierKind, samples: u64) {
        let inner = self.inner();
        inner.cycles_completed.inc();
        inner.samples_written.inc_by(samples);
        inner.containers_sampled.set(samples as i64);
        inner.tier_cycles.with_label_values(&[tier.as_str()]).inc();
    }

    pub fn inc_cycles_failed(&self) {
        self.inner().cycles_failed.inc();
    }

    pub fn cycles_completed(&self) -> u64 {
        self.inner().cycles_completed.get()
    }

    pub fn cycles_failed(&self) -> u64 {
        self.inner().cycles_failed.get()
    }
}

/// Structured logger for sampler events
///
/// Emits one JSON event per significant occurrence with a stable `event`
/// field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "sampler_started",
            namespace = %self.namespace,
            version = %version,
            interval_secs = interval_secs,
            "Resource sampler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sampler_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Resource sampler shutting down"
        );
    }

    pub fn log_cycle(&self, tier: TierKind, samples: u64, fallbacks: usize, elapsed_ms: u128) {
        info!(
            event = "cycle_completed",
            namespace = %self.namespace,
            tier = %tier,
            samples = samples,
            fallbacks = fallbacks,
            elapsed_ms = elapsed_ms,
            "Sampling cycle committed"
        );
    }

    pub fn log_cycle_skipped(&self, error: &dyn std::fmt::Display) {
        warn!(
            event = "cycle_skipped",
            namespace = %self.namespace,
            error = %error,
            "No acquisition tier succeeded, skipping cycle"
        );
    }

    pub fn log_persist_failed(&self, error: &dyn std::fmt::Display, samples: usize) {
        warn!(
            event = "cycle_persist_failed",
            namespace = %self.namespace,
            samples = samples,
            error = %error,
            "Sample batch rolled back"
        );
    }
}
