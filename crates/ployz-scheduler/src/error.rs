//! Error types for topological tiering and scheduling.

use thiserror::Error;

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur while tiering or scheduling a deploy spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A service had an empty name.
    #[error("service at index {index} has an empty name")]
    EmptyServiceName {
        /// Index of the offending service within the input list.
        index: usize,
    },

    /// Two services declared the same name.
    #[error("duplicate service name: {name}")]
    DuplicateService {
        /// The duplicated name.
        name: String,
    },

    /// A service declared a dependency on itself.
    #[error("service {name} depends on itself")]
    SelfDependency {
        /// The self-dependent service.
        name: String,
    },

    /// A service declared a dependency on a service that doesn't exist.
    #[error("service {name} depends on unknown service {dependency}")]
    UnknownDependency {
        /// The dependent service.
        name: String,
        /// The unresolved dependency name.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle among services: {remaining:?}")]
    Cycle {
        /// Names of the services still unresolved when the cycle was detected.
        remaining: Vec<String>,
    },

    /// No machine had a non-empty id.
    #[error("no machines with a non-empty id were provided")]
    NoMachines,

    /// A service had no eligible machines after applying its constraints.
    #[error("service {service} has zero eligible machines after applying constraints")]
    NoEligibleMachines {
        /// The service with no eligible machines.
        service: String,
    },

    /// A volume-affinity group's combined eligible set was empty.
    #[error("volume-affinity group {members:?} has an empty combined eligible set")]
    EmptyAffinityGroup {
        /// Names of the services in the group.
        members: Vec<String>,
    },

    /// Two services in the same volume-affinity group declared conflicting
    /// replica counts.
    #[error("volume-affinity group {members:?} has conflicting replica counts: {counts:?}")]
    ConflictingReplicaCounts {
        /// Names of the services in the group.
        members: Vec<String>,
        /// The distinct replica counts found.
        counts: Vec<usize>,
    },

    /// A constraint string was not of the form `node.labels.<key> (==|!=) <value>`.
    #[error("invalid constraint syntax: {raw}")]
    InvalidConstraint {
        /// The raw constraint string.
        raw: String,
    },

    /// A core data-model error surfaced while scheduling.
    #[error(transparent)]
    Core(#[from] ployz_core::CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display() {
        let err = SchedulerError::Cycle {
            remaining: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle among services: [\"a\", \"b\"]");
    }

    #[test]
    fn unknown_dependency_display() {
        let err = SchedulerError::UnknownDependency {
            name: "api".into(),
            dependency: "db".into(),
        };
        assert_eq!(err.to_string(), "service api depends on unknown service db");
    }
}
