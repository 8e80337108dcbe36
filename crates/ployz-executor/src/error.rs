//! Error types for the executor crate.
//!
//! [`PortError`] is the uniform error type every external-interface trait in
//! [`crate::ports`] returns. [`ExecutorError`] is the internal, phase-tagged
//! error the tier-execution pipeline raises; [`crate::executor::apply`] folds
//! it into a public [`ployz_core::error::DeployError`] once the namespace and
//! tier context are known.

use std::fmt;

use ployz_core::phase::DeployErrorPhase;

/// An error surfaced by an external-interface port implementation
/// (container runtime, store, health checker, state reader).
#[derive(Debug)]
pub struct PortError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PortError {
    /// Creates a port error with no further cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a port error wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// The pipeline stage an internal execution failure occurred at, paired with
/// the underlying [`PortError`] (§4.6/§7).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Failed to acquire or retain the deploy ownership lease.
    #[error("ownership: {0}")]
    Ownership(PortError),
    /// Failed to pre-pull an image for this tier.
    #[error("pre-pull: {0}")]
    PrePull(PortError),
    /// Failed while executing a bucket action against the runtime or a store.
    #[error("execute: {0}")]
    Execute(PortError),
    /// A new container did not become healthy in time.
    #[error("health: {0}")]
    Health(PortError),
}

impl ExecutorError {
    /// Wraps a runtime/store error as an `execute` failure. The common case;
    /// named shorter than the variant for call-site brevity.
    pub fn execute(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Execute(PortError::with_source("bucket action failed", err))
    }

    /// The [`DeployErrorPhase`] this error maps to.
    #[must_use]
    pub fn phase(&self) -> DeployErrorPhase {
        match self {
            Self::Ownership(_) => DeployErrorPhase::Ownership,
            Self::PrePull(_) => DeployErrorPhase::PrePull,
            Self::Execute(_) => DeployErrorPhase::Execute,
            Self::Health(_) => DeployErrorPhase::Health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_error_displays_message() {
        let err = PortError::new("connection refused");
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn port_error_exposes_source() {
        let cause = std::io::Error::other("disk full");
        let err = PortError::with_source("insert failed", cause);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn executor_error_phase_mapping() {
        assert_eq!(ExecutorError::Ownership(PortError::new("x")).phase(), DeployErrorPhase::Ownership);
        assert_eq!(ExecutorError::PrePull(PortError::new("x")).phase(), DeployErrorPhase::PrePull);
        assert_eq!(ExecutorError::Execute(PortError::new("x")).phase(), DeployErrorPhase::Execute);
        assert_eq!(ExecutorError::Health(PortError::new("x")).phase(), DeployErrorPhase::Health);
    }
}
