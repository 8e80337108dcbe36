//! # ployz-test
//!
//! In-memory fakes for every port the deploy executor depends on
//! (`ContainerRuntime`, `ContainerStore`, `DeploymentStore`, `HealthChecker`,
//! `StateReader`, `Clock`), plus fault-injection hooks so integration
//! scenarios can drive rollback and ownership-race paths deterministically,
//! without touching a real container engine or sleeping on real time.
//!
//! [`cluster::FakeCluster`] assembles the fakes into a ready-to-use
//! `ExecutorPorts` bundle. The scenario tests under `tests/` exercise the
//! executor end to end through it.

pub mod clock;
pub mod cluster;
pub mod health;
pub mod runtime;
pub mod stores;

pub use clock::FakeClock;
pub use cluster::FakeCluster;
pub use health::FakeHealthChecker;
pub use runtime::{FakeRuntime, FakeStateReader, Registry, RuntimeRecord};
pub use stores::{FakeContainerStore, FakeDeploymentStore};
