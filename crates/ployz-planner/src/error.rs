//! Error types for deploy planning.

use thiserror::Error;

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Errors that can occur while building a [`crate::plan::DeployPlan`].
#[derive(Error, Debug)]
pub enum PlannerError {
    /// Tiering the incoming spec failed.
    #[error(transparent)]
    Scheduler(#[from] ployz_scheduler::SchedulerError),

    /// A core data-model error surfaced while planning.
    #[error(transparent)]
    Core(#[from] ployz_core::CoreError),

    /// The schedule passed in was missing an entry for a service present in
    /// the incoming spec.
    #[error("schedule is missing assignments for service {service}")]
    MissingAssignments {
        /// The unscheduled service.
        service: String,
    },
}
