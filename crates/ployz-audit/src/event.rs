//! Audit event definitions for the deploy executor.
//!
//! A [`DeployAuditEvent`] is the durable record of one significant executor
//! transition, distinct from the in-process, best-effort `ProgressEvent`
//! the executor also emits: the audit event is appended once per transition
//! and is meant to survive the process, while the progress channel is a
//! live view that may drop entries under backpressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Timestamp, Uuid};

/// Generates a new v7 UUID for audit events.
fn new_event_id() -> Uuid {
    let ts = Timestamp::now(uuid::NoContext);
    Uuid::new_v7(ts)
}

/// Severity level for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational event
    #[default]
    Info,
    /// Warning event
    Warning,
    /// Error event
    Error,
    /// Critical event requiring immediate attention
    Critical,
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded
    Success,
    /// Operation failed
    Failure,
    /// Operation was denied (e.g. an ownership lease was not granted)
    Denied,
    /// Operation is in progress
    InProgress,
}

/// Base trait for all audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type identifier.
    fn event_type(&self) -> &'static str;

    /// Returns the event severity.
    fn severity(&self) -> EventSeverity;

    /// Returns the event timestamp.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Returns the correlation ID for request tracing.
    fn correlation_id(&self) -> Option<&str>;
}

/// The kind of deploy-lifecycle transition a [`DeployAuditEvent`] records.
///
/// This mirrors the progress-event vocabulary of `ployz-executor` (§4.6)
/// plus a few transitions (ownership, postcondition mismatch) that are
/// significant enough to audit but aren't part of the live progress
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployEventKind {
    /// A deploy attempt began preflight (ownership acquisition, row upsert).
    DeployStarted,
    /// The ownership lease was acquired for this machine.
    OwnershipAcquired,
    /// The ownership lease was lost or could not be acquired.
    OwnershipLost,
    /// A tier began processing.
    TierStarted,
    /// An image finished pulling.
    ImagePulled,
    /// A container was created.
    ContainerCreated,
    /// A container was removed.
    ContainerRemoved,
    /// A container's live resources were updated.
    ContainerUpdated,
    /// A row's `spec_json` was rewritten with no container action.
    SpecUpdated,
    /// A health check passed.
    HealthCheckPassed,
    /// Tier rollback began after a health check failure.
    RollbackStarted,
    /// A tier finished successfully.
    TierCompleted,
    /// The postcondition check found actual state did not match expected.
    PostconditionMismatch,
    /// The deploy completed successfully.
    DeployCompleted,
    /// The deploy failed.
    DeployFailed,
}

impl DeployEventKind {
    /// The canonical snake_case string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeployStarted => "deploy_started",
            Self::OwnershipAcquired => "ownership_acquired",
            Self::OwnershipLost => "ownership_lost",
            Self::TierStarted => "tier_started",
            Self::ImagePulled => "image_pulled",
            Self::ContainerCreated => "container_created",
            Self::ContainerRemoved => "container_removed",
            Self::ContainerUpdated => "container_updated",
            Self::SpecUpdated => "spec_updated",
            Self::HealthCheckPassed => "health_check_passed",
            Self::RollbackStarted => "rollback_started",
            Self::TierCompleted => "tier_completed",
            Self::PostconditionMismatch => "postcondition_mismatch",
            Self::DeployCompleted => "deploy_completed",
            Self::DeployFailed => "deploy_failed",
        }
    }

    fn default_outcome(self) -> EventOutcome {
        match self {
            Self::OwnershipLost | Self::RollbackStarted | Self::PostconditionMismatch | Self::DeployFailed => EventOutcome::Failure,
            _ => EventOutcome::Success,
        }
    }
}

/// A single durable record of a deploy-lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployAuditEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// The kind of transition being recorded.
    pub kind: DeployEventKind,
    /// The deploy's namespace.
    pub namespace: String,
    /// The deploy id.
    pub deploy_id: String,
    /// Tier index, when the event is scoped to a tier.
    pub tier: Option<usize>,
    /// Tier name, when the event is scoped to a tier.
    pub tier_name: Option<String>,
    /// Service name, when the event is scoped to a service.
    pub service: Option<String>,
    /// Machine id, when the event is scoped to a machine.
    pub machine_id: Option<String>,
    /// Container name, when the event is scoped to a single container.
    pub container: Option<String>,
    /// Outcome of the transition.
    pub outcome: EventOutcome,
    /// A human-readable message.
    pub message: String,
    /// Correlation ID, typically the deploy id itself.
    pub correlation_id: Option<String>,
}

impl DeployAuditEvent {
    /// Creates a new event with the default outcome for `kind`.
    #[must_use]
    pub fn new(kind: DeployEventKind, namespace: impl Into<String>, deploy_id: impl Into<String>, message: impl Into<String>) -> Self {
        let deploy_id = deploy_id.into();
        Self {
            id: new_event_id(),
            timestamp: Utc::now(),
            outcome: kind.default_outcome(),
            kind,
            namespace: namespace.into(),
            correlation_id: Some(deploy_id.clone()),
            deploy_id,
            tier: None,
            tier_name: None,
            service: None,
            machine_id: None,
            container: None,
            message: message.into(),
        }
    }

    /// Sets the tier index and name.
    #[must_use]
    pub fn with_tier(mut self, index: usize, name: impl Into<String>) -> Self {
        self.tier = Some(index);
        self.tier_name = Some(name.into());
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the machine id.
    #[must_use]
    pub fn with_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    /// Sets the container name.
    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Overrides the default outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: EventOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

impl AuditEvent for DeployAuditEvent {
    fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    fn severity(&self) -> EventSeverity {
        match self.outcome {
            EventOutcome::Success | EventOutcome::InProgress => EventSeverity::Info,
            EventOutcome::Failure => EventSeverity::Warning,
            EventOutcome::Denied => EventSeverity::Error,
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}
