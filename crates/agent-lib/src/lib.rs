//! Library for the pod resource telemetry collector
//!
//! This crate provides the core functionality for:
//! - Container usage acquisition with a three-tier fallback chain
//! - Quantity and exposition-format parsing
//! - Transactional sample persistence
//! - Workload health classification and version impact analysis
//! - Health checks and observability

pub mod collector;
pub mod error;
pub mod exposition;
pub mod health;
pub mod impact;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod store;
pub mod triage;

pub use error::{AcquisitionError, ClusterError, CycleError, TierError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SamplerMetrics, StructuredLogger};
pub use store::{PgSampleStore, SampleStore, StoreConfig};
