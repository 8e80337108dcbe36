//! # ployz-core
//!
//! Core data model, spec canonicalization, change classification, and the
//! phase/error types shared across the ployz deploy engine.
//!
//! This crate provides the foundational, side-effect-free pieces used by
//! every other crate in the workspace:
//!
//! - [`model`] - the `ServiceSpec` / `DeploySpec` / `ContainerRow` /
//!   `DeploymentRow` data model (§3)
//! - [`canonical`] - spec normalization (C1)
//! - [`classify`] - change classification (C2)
//! - [`phase`] - the `DeployPhase` / `TierPhase` / `OwnershipPhase` /
//!   `DeployErrorPhase` state machines (C8)
//! - [`error`] - `CoreError` and the structured `DeployError` (C8)
//!
//! ## Example
//!
//! ```rust
//! use ployz_core::model::{ServiceSpec, RestartPolicy};
//! use ployz_core::canonical::canonicalize;
//!
//! let spec = ServiceSpec {
//!     name: "api".into(),
//!     image: "api:1".into(),
//!     restart_policy: RestartPolicy::Always,
//!     ..ServiceSpec::new("api", "api:1")
//! };
//! let canon = canonicalize(&spec);
//! assert_eq!(canon.name, "api");
//! ```

pub mod canonical;
pub mod classify;
pub mod error;
pub mod model;
pub mod phase;
pub mod validation;


pub use canonical::{canonicalize, equal};
pub use classify::{classify, ChangeKind};
pub use error::{ContainerDiagnostic, ContainerDiagnosticKind, CoreError, DeployError, Result, TierResult};
pub use model::{
    Constraint, ConstraintOp, ContainerRow, ContainerStatus, DeployPlan, DeploySpec,
    DeploymentRow, HealthCheck, MachineAssignment, MachineInfo, Mount, Placement, PlanEntry,
    PortMapping, Protocol, Resources, RestartPolicy, ServiceDeployConfig, ServiceSpec, Tier,
    UpdateConfig, UpdateOrder,
};
pub use phase::{DeployErrorPhase, DeployPhase, OwnershipPhase, TierPhase};
pub use validation::{ValidationError, ValidationErrorKind};
