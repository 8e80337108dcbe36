//! Best-effort progress notifications (§4.6/§9).
//!
//! The executor never blocks on a consumer: [`EventSink::emit`] is
//! synchronous and infallible, and [`ChannelEventSink`] drops events rather
//! than applying backpressure when its bounded channel is full.

use std::fmt;

/// The full progress-event vocabulary (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEventKind {
    /// A tier has begun processing.
    TierStarted,
    /// An image finished pulling.
    ImagePulled,
    /// A container was removed.
    ContainerRemoved,
    /// A container was created.
    ContainerCreated,
    /// A container was started.
    ContainerStarted,
    /// A container's live resources were updated.
    ContainerUpdated,
    /// A row's `spec_json` was rewritten with no container action.
    SpecUpdated,
    /// A health check passed.
    HealthCheckPassed,
    /// Tier rollback began.
    RollbackStarted,
    /// A tier finished (successfully or not).
    TierComplete,
    /// The deploy failed.
    DeployFailed,
    /// The deploy completed successfully.
    DeployComplete,
}

impl ProgressEventKind {
    /// The canonical lowercase string form, matching the vocabulary in §4.6.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TierStarted => "tier_started",
            Self::ImagePulled => "image_pulled",
            Self::ContainerRemoved => "container_removed",
            Self::ContainerCreated => "container_created",
            Self::ContainerStarted => "container_started",
            Self::ContainerUpdated => "container_updated",
            Self::SpecUpdated => "spec_updated",
            Self::HealthCheckPassed => "health_check_passed",
            Self::RollbackStarted => "rollback_started",
            Self::TierComplete => "tier_complete",
            Self::DeployFailed => "deploy_failed",
            Self::DeployComplete => "deploy_complete",
        }
    }
}

impl fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress notification. Fields are populated where applicable to
/// the event's kind; a consumer should treat an absent field as "not
/// meaningful for this event" rather than an error.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// The event kind.
    pub kind: ProgressEventKind,
    /// Tier index, when the event is scoped to a tier.
    pub tier: Option<usize>,
    /// Service name, when the event is scoped to a service.
    pub service: Option<String>,
    /// Machine id, when the event is scoped to a machine.
    pub machine_id: Option<String>,
    /// Container name, when the event is scoped to a single container.
    pub container: Option<String>,
    /// A human-readable message.
    pub message: String,
}

impl ProgressEvent {
    /// Creates a bare event with only a kind and message.
    #[must_use]
    pub fn new(kind: ProgressEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            tier: None,
            service: None,
            machine_id: None,
            container: None,
            message: message.into(),
        }
    }

    /// Sets the tier index.
    #[must_use]
    pub fn with_tier(mut self, tier: usize) -> Self {
        self.tier = Some(tier);
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
}

/// A best-effort, non-blocking sink for [`ProgressEvent`]s.
pub trait EventSink: Send + Sync {
    /// Emits an event. Must never block; implementations that buffer should
    /// drop on overflow rather than apply backpressure.
    fn emit(&self, event: ProgressEvent);
}

/// An [`EventSink`] backed by a bounded `tokio` mpsc channel. Overflow drops
/// the event and logs at `debug`; a closed receiver is treated the same way.
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::Sender<ProgressEvent>,
}

impl ChannelEventSink {
    /// Creates a sink/receiver pair with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ProgressEvent) {
        if let Err(err) = self.tx.try_send(event) {
            tracing::debug!(%err, "progress event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_strings_match_vocabulary() {
        assert_eq!(ProgressEventKind::TierStarted.as_str(), "tier_started");
        assert_eq!(ProgressEventKind::DeployComplete.to_string(), "deploy_complete");
    }

    #[test]
    fn builder_sets_optional_fields() {
        let event = ProgressEvent::new(ProgressEventKind::ContainerCreated, "created")
            .with_tier(1)
            .with_service("api")
            .with_machine("m1")
            .with_container("ployz-ns-api-a001");
        assert_eq!(event.tier, Some(1));
        assert_eq!(event.service.as_deref(), Some("api"));
        assert_eq!(event.machine_id.as_deref(), Some("m1"));
        assert_eq!(event.container.as_deref(), Some("ployz-ns-api-a001"));
    }

    #[tokio::test]
    async fn channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelEventSink::new(4);
        sink.emit(ProgressEvent::new(ProgressEventKind::TierStarted, "go"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, ProgressEventKind::TierStarted);
    }

    #[tokio::test]
    async fn channel_sink_drops_on_overflow_without_blocking() {
        let (sink, mut rx) = ChannelEventSink::new(1);
        sink.emit(ProgressEvent::new(ProgressEventKind::TierStarted, "one"));
        sink.emit(ProgressEvent::new(ProgressEventKind::TierComplete, "two"));
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ProgressEventKind::TierStarted);
    }
}
