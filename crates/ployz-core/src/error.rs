//! The structured deploy error and its constituent parts (C8, §4.8).

use std::fmt;

use crate::phase::{DeployErrorPhase, TierPhase};
use crate::validation::ValidationError;

/// The crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures from the data model and spec-normalization layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// `DeploySpec::validate` or a constraint parser rejected the input.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Canonical JSON (de)serialization failed.
    #[error("failed to (de)serialize canonical spec json: {0}")]
    Json(#[from] serde_json::Error),
    /// A phase string did not match any known variant.
    #[error(transparent)]
    ParsePhase(#[from] crate::phase::ParsePhaseError),
}

/// The one-line diagnosis of a single container's postcondition state,
/// as produced by the postcondition checker (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContainerDiagnostic {
    /// The container name this diagnostic is about.
    pub container_name: String,
    /// The expected image, formatted as `running image=<want>`.
    pub expected: String,
    /// The observed state.
    pub actual: ContainerDiagnosticKind,
}

impl fmt::Display for ContainerDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.container_name, self.actual)
    }
}

/// What the postcondition checker observed for one expected container.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContainerDiagnosticKind {
    /// No container by this name was found in the actual state.
    Missing,
    /// The container exists but is not running.
    Stopped {
        /// The image of the stopped container.
        image: String,
    },
    /// The container is running but its image doesn't match what was expected.
    Mismatch {
        /// The image actually running.
        image: String,
    },
    /// The container is running the expected image.
    Match {
        /// The image actually running.
        image: String,
    },
}

impl fmt::Display for ContainerDiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Stopped { image } => write!(f, "stopped image={image}"),
            Self::Mismatch { image } | Self::Match { image } => write!(f, "running image={image}"),
        }
    }
}

impl ContainerDiagnosticKind {
    /// Returns true if this diagnostic represents a postcondition violation.
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        !matches!(self, Self::Match { .. })
    }
}

/// The outcome of executing one tier, as carried by a [`DeployError`]'s
/// `tiers` field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TierResult {
    /// Zero-based index of this tier within the plan.
    pub index: usize,
    /// A human-readable label for this tier (e.g. its service names, joined).
    pub name: String,
    /// The tier's final phase.
    pub status: TierPhase,
    /// Per-container postcondition diagnostics, populated when a
    /// postcondition check ran for this tier.
    #[serde(default)]
    pub containers: Vec<ContainerDiagnostic>,
}

impl TierResult {
    /// Creates a pending tier result with no diagnostics.
    #[must_use]
    pub fn pending(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: TierPhase::Pending,
            containers: Vec::new(),
        }
    }
}

/// The top-level error returned by the executor (§4.6/§4.8/§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployError {
    /// The namespace this deploy targeted.
    pub namespace: String,
    /// Which stage of the executor pipeline failed.
    pub phase: DeployErrorPhase,
    /// The tier index being processed when the failure occurred, if any
    /// tier had been reached yet (absent for ownership failures and
    /// pre-tier cancellation).
    pub tier_idx: Option<usize>,
    /// The failing tier's label, if any.
    pub tier_name: Option<String>,
    /// Results for every tier processed so far, in order.
    pub tiers: Vec<TierResult>,
    /// A human-readable message.
    pub message: String,
}

impl DeployError {
    /// Builds an error for a failure with no tier context yet (ownership
    /// acquisition, or cancellation observed before any tier started).
    #[must_use]
    pub fn without_tier(namespace: impl Into<String>, phase: DeployErrorPhase, message: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            phase,
            tier_idx: None,
            tier_name: None,
            tiers: Vec::new(),
            message: message.into(),
        }
    }

    /// Builds an error attributed to a specific tier.
    #[must_use]
    pub fn at_tier(
        namespace: impl Into<String>,
        phase: DeployErrorPhase,
        tier_idx: usize,
        tier_name: impl Into<String>,
        tiers: Vec<TierResult>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            phase,
            tier_idx: Some(tier_idx),
            tier_name: Some(tier_name.into()),
            tiers,
            message: message.into(),
        }
    }
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tier_idx, &self.tier_name) {
            (Some(idx), Some(name)) => write!(
                f,
                "deploy \"{}\" failed at {} (tier {} \"{}\"): {}",
                self.namespace, self.phase, idx, name, self.message
            ),
            _ => write!(
                f,
                "deploy \"{}\" failed at {}: {}",
                self.namespace, self.phase, self.message
            ),
        }
    }
}

impl std::error::Error for DeployError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_tier_context() {
        let err = DeployError::at_tier(
            "prod",
            DeployErrorPhase::Health,
            2,
            "api, worker",
            Vec::new(),
            "container api did not become healthy",
        );
        assert_eq!(
            err.to_string(),
            "deploy \"prod\" failed at health (tier 2 \"api, worker\"): container api did not become healthy"
        );
    }

    #[test]
    fn display_without_tier_context() {
        let err = DeployError::without_tier("prod", DeployErrorPhase::Ownership, "lease held by machine-2");
        assert_eq!(
            err.to_string(),
            "deploy \"prod\" failed at ownership: lease held by machine-2"
        );
    }

    #[test]
    fn diagnostic_kind_display() {
        assert_eq!(ContainerDiagnosticKind::Missing.to_string(), "missing");
        assert_eq!(
            ContainerDiagnosticKind::Stopped { image: "api:1".into() }.to_string(),
            "stopped image=api:1"
        );
        assert_eq!(
            ContainerDiagnosticKind::Mismatch { image: "api:2".into() }.to_string(),
            "running image=api:2"
        );
    }

    #[test]
    fn diagnostic_kind_is_mismatch() {
        assert!(!ContainerDiagnosticKind::Match { image: "api:1".into() }.is_mismatch());
        assert!(ContainerDiagnosticKind::Missing.is_mismatch());
        assert!(ContainerDiagnosticKind::Stopped { image: "api:1".into() }.is_mismatch());
    }

    #[test]
    fn core_error_wraps_validation_error() {
        let verr = ValidationError::constraint("services[0].name", "duplicate service name 'api'");
        let cerr: CoreError = verr.into();
        assert!(matches!(cerr, CoreError::Validation(_)));
    }
}
