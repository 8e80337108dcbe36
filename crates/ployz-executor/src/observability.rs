//! Optional audit logging and metrics recording for [`crate::executor::apply`].
//!
//! Bundled the same way [`crate::executor::ExecutorPorts`] bundles the
//! runtime/store collaborators: one struct instead of two separate
//! `Option<Arc<_>>` parameters. Both fields are optional — a caller that
//! only wants the in-process [`crate::events::EventSink`] can omit this
//! entirely, and `apply` degrades to doing nothing extra.

use std::sync::Arc;
use std::time::Duration;

use ployz_audit::{AuditLogger, DeployAuditEvent, DeployEventKind};
use ployz_metrics::{DeployMetrics, Outcome};

/// The durable audit log and metrics recorder an `apply` call reports to.
#[derive(Clone, Default)]
pub struct Observability {
    /// Durable, structured record of lifecycle transitions.
    pub audit: Option<Arc<AuditLogger>>,
    /// Prometheus/OpenTelemetry counters and histograms.
    pub metrics: Option<Arc<DeployMetrics>>,
}

impl Observability {
    /// Creates an instance with both sinks attached.
    #[must_use]
    pub fn new(audit: Arc<AuditLogger>, metrics: Arc<DeployMetrics>) -> Self {
        Self {
            audit: Some(audit),
            metrics: Some(metrics),
        }
    }

    /// Appends one audit event. A logging failure (serialization, backend
    /// error) is swallowed at `warn` — the audit log must never be able to
    /// fail a deploy.
    pub(crate) fn audit_event(&self, event: DeployAuditEvent) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.log(&event) {
                tracing::warn!(%err, kind = event.kind.as_str(), "failed to append audit event");
            }
        }
    }

    pub(crate) fn deploy_started(&self, namespace: &str, deploy_id: &str) {
        self.audit_event(DeployAuditEvent::new(DeployEventKind::DeployStarted, namespace, deploy_id, "preflight begun"));
    }

    pub(crate) fn ownership_lost(&self, namespace: &str, deploy_id: &str, message: String) {
        self.audit_event(DeployAuditEvent::new(DeployEventKind::OwnershipLost, namespace, deploy_id, message));
    }

    pub(crate) fn tier_started(&self, namespace: &str, deploy_id: &str, tier: usize, tier_name: &str) {
        self.audit_event(
            DeployAuditEvent::new(DeployEventKind::TierStarted, namespace, deploy_id, format!("tier {tier} starting")).with_tier(tier, tier_name),
        );
    }

    pub(crate) fn rollback_started(&self, namespace: &str, deploy_id: &str, tier: usize, tier_name: &str) {
        self.audit_event(
            DeployAuditEvent::new(DeployEventKind::RollbackStarted, namespace, deploy_id, "health check failed, rolling back tier")
                .with_tier(tier, tier_name),
        );
    }

    pub(crate) fn postcondition_mismatch(&self, namespace: &str, deploy_id: &str, tier: usize, tier_name: &str) {
        self.audit_event(
            DeployAuditEvent::new(
                DeployEventKind::PostconditionMismatch,
                namespace,
                deploy_id,
                "actual container state did not match the plan after execution",
            )
            .with_tier(tier, tier_name),
        );
    }

    pub(crate) fn tier_completed(&self, namespace: &str, deploy_id: &str, tier: usize, tier_name: &str, duration: Duration, outcome: Outcome) {
        if outcome == Outcome::Ok {
            self.audit_event(
                DeployAuditEvent::new(DeployEventKind::TierCompleted, namespace, deploy_id, format!("tier {tier} complete")).with_tier(tier, tier_name),
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_tier(outcome, duration);
        }
    }

    pub(crate) fn deploy_finished(&self, namespace: &str, deploy_id: &str, outcome: Outcome, message: String) {
        let kind = if outcome == Outcome::Ok {
            DeployEventKind::DeployCompleted
        } else {
            DeployEventKind::DeployFailed
        };
        self.audit_event(DeployAuditEvent::new(kind, namespace, deploy_id, message));
        if let Some(metrics) = &self.metrics {
            metrics.record_deploy(outcome);
        }
    }
}
