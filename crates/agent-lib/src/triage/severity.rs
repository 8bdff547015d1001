//! Per-container severity classification
//!
//! Severity is decided by an ordered rule table: rules are evaluated top to
//! bottom and the first one whose predicate matches produces the result.

use crate::models::{ContainerSnapshot, ContainerState};
use serde::{Deserialize, Serialize};

/// Last-state reasons that always classify a container as failing
pub const FATAL_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "OOMKilled",
    "Error",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
    "RunContainerError",
];

/// Waiting reasons that mean the container is still starting up
const STARTUP_REASONS: &[&str] = &["ContainerCreating", "PodInitializing"];

/// Restart count at which a container is treated as failing
const RESTART_ERROR_THRESHOLD: u32 = 5;

/// Restarts counted toward a warning score
const RESTART_WARNING_CAP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Initializing,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Healthy => "healthy",
            Severity::Initializing => "initializing",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Severity of one container with a short label and its attention score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSeverity {
    pub severity: Severity,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub score: i64,
}

struct SeverityRule {
    severity: Severity,
    matches: fn(&ContainerSnapshot) -> bool,
    score: fn(&ContainerSnapshot) -> i64,
    label: fn(&ContainerSnapshot) -> String,
}

const RULES: &[SeverityRule] = &[
    SeverityRule {
        severity: Severity::Error,
        matches: is_failing,
        score: |c| 100 + i64::from(c.restart_count),
        label: |c| {
            fatal_reason(c)
                .map(str::to_string)
                .unwrap_or_else(|| match c.state {
                    ContainerState::Terminated => "Terminated".to_string(),
                    _ => "Restarting".to_string(),
                })
        },
    },
    SeverityRule {
        severity: Severity::Initializing,
        matches: is_starting,
        score: |_| 20,
        label: |c| reason(c).unwrap_or("Initializing").to_string(),
    },
    SeverityRule {
        severity: Severity::Warning,
        matches: |c| c.state == ContainerState::Waiting || !c.ready || c.restart_count > 0,
        score: |c| 40 + i64::from(c.restart_count.min(RESTART_WARNING_CAP)),
        label: |c| {
            if c.state == ContainerState::Waiting {
                reason(c).unwrap_or("Waiting").to_string()
            } else if !c.ready {
                "Not Ready".to_string()
            } else {
                "Restarted".to_string()
            }
        },
    },
];

fn reason(container: &ContainerSnapshot) -> Option<&str> {
    container
        .last_state_reason
        .as_deref()
        .filter(|reason| !reason.is_empty())
}

fn fatal_reason(container: &ContainerSnapshot) -> Option<&str> {
    reason(container).filter(|reason| FATAL_REASONS.contains(reason))
}

fn is_failing(container: &ContainerSnapshot) -> bool {
    container.state == ContainerState::Terminated
        || fatal_reason(container).is_some()
        || container.restart_count >= RESTART_ERROR_THRESHOLD
}

fn is_starting(container: &ContainerSnapshot) -> bool {
    container.state == ContainerState::Waiting
        && reason(container)
            .map_or(false, |r| STARTUP_REASONS.contains(&r) || r.starts_with("Init:"))
}

/// Classify a single container
pub fn classify_severity(container: &ContainerSnapshot) -> ContainerSeverity {
    let details = (container.restart_count > 0)
        .then(|| format!("{} restarts", container.restart_count));

    RULES
        .iter()
        .find(|rule| (rule.matches)(container))
        .map(|rule| ContainerSeverity {
            severity: rule.severity,
            label: (rule.label)(container),
            details: details.clone(),
            score: (rule.score)(container),
        })
        .unwrap_or(ContainerSeverity {
            severity: Severity::Healthy,
            label: "Running".to_string(),
            details: None,
            score: 0,
        })
}
