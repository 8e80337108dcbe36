//! # ployz-planner
//!
//! Builds the deterministic, tiered [`ployz_core::DeployPlan`] a deploy
//! will execute, given an incoming spec, the rows already on disk, and a
//! machine schedule (C5, §4.5).

pub mod error;
pub mod plan;

pub use error::{PlannerError, Result};
pub use plan::{compute_deploy_id, plan};
