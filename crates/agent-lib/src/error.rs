//! Error types shared by the acquisition tiers and the sampling loop

use crate::collector::TierKind;
use thiserror::Error;

/// Failure talking to the cluster API
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Failure of a single acquisition tier
#[derive(Debug, Error)]
pub enum TierError {
    #[error("{endpoint} request failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: ClusterError,
    },

    #[error("no usable container metrics returned")]
    NoMetrics,
}

impl TierError {
    pub fn request(endpoint: impl Into<String>, source: ClusterError) -> Self {
        TierError::Request {
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// Failure of a whole acquisition attempt
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to list pods for the pod index: {0}")]
    PodIndex(#[source] ClusterError),

    #[error("all acquisition tiers failed ({})", summarize(.0))]
    AllTiersFailed(Vec<(TierKind, TierError)>),
}

fn summarize(failures: &[(TierKind, TierError)]) -> String {
    failures
        .iter()
        .map(|(tier, err)| format!("{}: {}", tier, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of one sampling cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("failed to persist samples: {0:#}")]
    Persist(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tiers_failed_message() {
        let err = AcquisitionError::AllTiersFailed(vec![
            (
                TierKind::MetricsApi,
                TierError::request("metrics.k8s.io", ClusterError::Unexpected("503".into())),
            ),
            (TierKind::NodeScrape, TierError::NoMetrics),
        ]);

        let message = err.to_string();
        assert!(message.contains("metrics-api: metrics.k8s.io request failed"));
        assert!(message.contains("node-scrape: no usable container metrics"));
    }
}
