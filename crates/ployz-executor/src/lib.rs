//! Tier-by-tier deploy execution (C6) and postcondition verification (C7).
//!
//! This crate takes a [`ployz_core::model::DeployPlan`] produced by
//! `ployz-planner` and converges one machine's containers to it: acquiring
//! the deploy's ownership lease, walking tiers in order, executing each
//! tier's bucket actions against a [`ports::ContainerRuntime`] and the
//! container/deployment stores, verifying the result against the plan, and
//! rolling back on a health failure.
//!
//! Everything the executor depends on but doesn't implement itself —
//! container runtime, persistence, health checking, state reading, the
//! clock — is expressed as a trait in [`ports`], so production adapters and
//! test fakes can be swapped in without touching this crate.

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod observability;
pub mod ports;
pub mod postcondition;
pub mod rollback;

pub use config::{ExecutorConfig, ExecutorConfigBuilder};
pub use error::{ExecutorError, PortError};
pub use events::{ChannelEventSink, EventSink, ProgressEvent, ProgressEventKind};
pub use executor::{apply, ApplyResult, Cancel, ExecutorPorts};
pub use observability::Observability;
pub use postcondition::{assert_tier_state, expected_containers, has_mismatch, ExpectedContainer};
pub use rollback::{RollbackAction, RollbackLog};
