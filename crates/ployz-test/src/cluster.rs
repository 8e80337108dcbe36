//! Wires the individual port fakes together into one handle, so integration
//! scenarios don't have to assemble an [`ExecutorPorts`] by hand.

use std::sync::Arc;

use ployz_executor::ExecutorPorts;

use crate::clock::FakeClock;
use crate::health::FakeHealthChecker;
use crate::runtime::{FakeRuntime, FakeStateReader, Registry};
use crate::stores::{FakeContainerStore, FakeDeploymentStore};

/// A fully wired set of fake ports simulating one machine's container
/// runtime and a namespace's shared stores.
///
/// Two [`FakeCluster`]s can be made to share the same `container_store` and
/// `deployment_store` (but each keep their own [`FakeRuntime`]) to simulate
/// two machines racing to apply the same deploy.
pub struct FakeCluster {
    pub runtime: Arc<FakeRuntime>,
    pub container_store: Arc<FakeContainerStore>,
    pub deployment_store: Arc<FakeDeploymentStore>,
    pub health: Arc<FakeHealthChecker>,
    pub state_reader: Arc<FakeStateReader>,
    pub clock: Arc<FakeClock>,
}

impl FakeCluster {
    /// Builds a cluster with brand-new, unshared stores.
    #[must_use]
    pub fn new() -> Self {
        let runtime = Arc::new(FakeRuntime::new());
        let state_reader = Arc::new(FakeStateReader::new(runtime.registry()));
        Self {
            runtime,
            container_store: Arc::new(FakeContainerStore::new()),
            deployment_store: Arc::new(FakeDeploymentStore::new()),
            health: Arc::new(FakeHealthChecker::new()),
            state_reader,
            clock: Arc::new(FakeClock::default()),
        }
    }

    /// Builds a cluster that shares `container_store`/`deployment_store` with
    /// another machine, but keeps its own runtime, registry, and clock — for
    /// simulating multiple machines applying the same deploy concurrently.
    #[must_use]
    pub fn sharing_stores(other: &Self) -> Self {
        let runtime = Arc::new(FakeRuntime::new());
        let state_reader = Arc::new(FakeStateReader::new(runtime.registry()));
        Self {
            runtime,
            container_store: Arc::clone(&other.container_store),
            deployment_store: Arc::clone(&other.deployment_store),
            health: Arc::new(FakeHealthChecker::new()),
            state_reader,
            clock: Arc::new(FakeClock::default()),
        }
    }

    /// Returns this cluster's backing registry, for inspection or for
    /// wiring up an independent [`FakeStateReader`].
    #[must_use]
    pub fn registry(&self) -> Registry {
        self.runtime.registry()
    }

    /// Builds the [`ExecutorPorts`] bundle the executor's `apply` takes.
    #[must_use]
    pub fn ports(&self) -> ExecutorPorts {
        ExecutorPorts {
            runtime: Arc::clone(&self.runtime) as _,
            container_store: Arc::clone(&self.container_store) as _,
            deployment_store: Arc::clone(&self.deployment_store) as _,
            health: Arc::clone(&self.health) as _,
            state_reader: Arc::clone(&self.state_reader) as _,
            clock: Arc::clone(&self.clock) as _,
        }
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}
