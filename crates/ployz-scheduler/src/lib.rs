//! # ployz-scheduler
//!
//! Topological tiering and machine scheduling for ployz deploy specs.
//!
//! - [`toposort`] - dependency tiering (C3)
//! - [`schedule`] - constraint-aware, volume-affinity-grouped machine
//!   assignment (C4)
//!
//! ## Example
//!
//! ```rust,ignore
//! use ployz_scheduler::{schedule, toposort};
//!
//! let tiers = toposort(&services)?;
//! let assignments = schedule("prod", &services, &machines, &current_rows)?;
//! ```

pub mod error;
pub mod schedule;
mod sorted;
pub mod toposort;

pub use error::{Result, SchedulerError};
pub use schedule::schedule;
pub use toposort::toposort;
