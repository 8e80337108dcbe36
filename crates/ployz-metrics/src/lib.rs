//! # ployz-metrics
//!
//! Prometheus/OpenTelemetry metrics for the ployz deploy executor:
//! `ployz_deploys_total{result}`, `ployz_tiers_total{result}`,
//! `ployz_rollbacks_total`, and `ployz_tier_duration_seconds`, exported over
//! an `axum` `/metrics` endpoint.
//!
//! This crate is a recording surface only — it does not decide when a
//! metric fires. `ployz-executor` calls [`DeployMetrics::record_deploy`] and
//! [`DeployMetrics::record_tier`] at the same lifecycle points it already
//! emits progress events and audit records.

mod config;
mod error;
mod global;
mod recorder;
mod server;

pub use config::{MetricsConfig, MetricsConfigBuilder};
pub use error::{MetricsError, Result};
pub use global::{global, install};
pub use recorder::{DeployMetrics, Outcome};
pub use server::{serve, MetricsServer};
