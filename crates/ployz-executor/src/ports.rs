//! External-interface traits (§6): the collaborators the executor drives but
//! does not implement itself — container runtime, stores, health checker,
//! state reader, and clock. Production adapters for these live outside this
//! crate; [`ployz_test`] provides in-memory fakes for testing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ployz_core::model::{ContainerRow, DeploymentRow, HealthCheck, Mount, PortMapping, RestartPolicy};

use crate::error::PortError;

/// The result type every port method returns.
pub type PortResult<T> = Result<T, PortError>;

/// Resource limits applied via [`ContainerRuntime::container_update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceConfig {
    /// CPU limit, in cores.
    pub cpu_limit: f64,
    /// Memory limit, in bytes.
    pub memory_limit: i64,
}

/// Everything the runtime needs to create a container.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateConfig {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command override.
    pub cmd: Vec<String>,
    /// Environment, as `KEY=VALUE` strings.
    pub env: Vec<String>,
    /// Network mode; empty string means the runtime's default.
    pub network_mode: String,
    /// Mounts.
    pub mounts: Vec<Mount>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Labels, including the managed `ployz.*` labels.
    pub labels: BTreeMap<String, String>,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
    /// Health check, if any.
    pub health_check: Option<HealthCheck>,
}

/// The result of inspecting a single container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectResult {
    /// Whether a container by this name exists.
    pub exists: bool,
    /// Whether it is currently running.
    pub running: bool,
    /// The image it was created from.
    pub image: String,
}

/// One row of `container_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerListEntry {
    /// Container name.
    pub name: String,
    /// Image it was created from.
    pub image: String,
    /// Whether it is running.
    pub running: bool,
}

/// The container engine on a single machine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pulls `image`, if not already present locally.
    async fn image_pull(&self, image: &str) -> PortResult<()>;
    /// Creates a container from `config`. Does not start it.
    async fn container_create(&self, config: CreateConfig) -> PortResult<()>;
    /// Starts a previously created container.
    async fn container_start(&self, name: &str) -> PortResult<()>;
    /// Stops a running container.
    async fn container_stop(&self, name: &str) -> PortResult<()>;
    /// Removes a container. `force` also removes a running one.
    async fn container_remove(&self, name: &str, force: bool) -> PortResult<()>;
    /// Applies a live resource update to a running container.
    async fn container_update(&self, name: &str, resources: ResourceConfig) -> PortResult<()>;
    /// Inspects a single container by name.
    async fn container_inspect(&self, name: &str) -> PortResult<InspectResult>;
    /// Lists containers matching every key/value in `label_filter`.
    async fn container_list(&self, label_filter: &BTreeMap<String, String>) -> PortResult<Vec<ContainerListEntry>>;
}

/// Persistence for container rows (§6).
#[async_trait]
pub trait ContainerStore: Send + Sync {
    /// Ensures the backing table/collection exists.
    async fn ensure_table(&self) -> PortResult<()>;
    /// Inserts a new row.
    async fn insert(&self, row: ContainerRow) -> PortResult<()>;
    /// Overwrites an existing row.
    async fn update(&self, row: ContainerRow) -> PortResult<()>;
    /// Deletes a row by id (`deploy_id/container_name`).
    async fn delete(&self, id: &str) -> PortResult<()>;
    /// Lists every row in a namespace.
    async fn list_by_namespace(&self, namespace: &str) -> PortResult<Vec<ContainerRow>>;
    /// Lists every row belonging to a deploy.
    async fn list_by_deploy(&self, deploy_id: &str) -> PortResult<Vec<ContainerRow>>;
    /// Deletes every row in a namespace.
    async fn delete_by_namespace(&self, namespace: &str) -> PortResult<()>;
}

/// Persistence and ownership arbitration for deployment rows (§6).
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Ensures the backing table/collection exists.
    async fn ensure_table(&self) -> PortResult<()>;
    /// Inserts a new row.
    async fn insert(&self, row: DeploymentRow) -> PortResult<()>;
    /// Overwrites an existing row.
    async fn update(&self, row: DeploymentRow) -> PortResult<()>;
    /// Deletes a row by id.
    async fn delete(&self, id: &str) -> PortResult<()>;
    /// Reads a single row by id.
    async fn get(&self, id: &str) -> PortResult<Option<DeploymentRow>>;
    /// Lists in-progress deploys for a namespace.
    async fn get_active_by_namespace(&self, namespace: &str) -> PortResult<Vec<DeploymentRow>>;
    /// The most recent successful deploy for a namespace, if any.
    async fn latest_successful_by_namespace(&self, namespace: &str) -> PortResult<Option<DeploymentRow>>;
    /// Acquires the single-writer lease on `deploy_id` for `machine_id`.
    /// Succeeds for exactly one racing caller; losers get a `PortError`.
    async fn acquire_ownership(&self, deploy_id: &str, machine_id: &str, now: DateTime<Utc>) -> PortResult<()>;
    /// Confirms `machine_id` still holds the lease on `deploy_id`.
    async fn check_ownership(&self, deploy_id: &str, machine_id: &str) -> PortResult<()>;
    /// Refreshes the lease heartbeat.
    async fn bump_heartbeat(&self, deploy_id: &str, machine_id: &str, now: DateTime<Utc>) -> PortResult<()>;
    /// Releases the lease unconditionally.
    async fn release_ownership(&self, deploy_id: &str) -> PortResult<()>;
}

/// Blocks until a container's configured health check passes or fails.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Waits for `container_name` to become healthy per `check`'s own
    /// policy (test command, interval, timeout, retries, start period).
    async fn wait_healthy(&self, container_name: &str, check: &HealthCheck) -> PortResult<()>;
}

/// One container's observed state, as read from a machine.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerState {
    /// Container name.
    pub name: String,
    /// Image it is running.
    pub image: String,
    /// Whether it is running.
    pub running: bool,
    /// Whether it is passing its health check.
    pub healthy: bool,
}

/// Reads actual container state for postcondition verification (§4.7).
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Lists every container this namespace owns on `machine_id`.
    async fn read_machine_state(&self, machine_id: &str, namespace: &str) -> PortResult<Vec<ContainerState>>;
}

/// Supplies the current time. All persisted timestamps are UTC ISO-8601 with
/// nanosecond precision, derived from this.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}
