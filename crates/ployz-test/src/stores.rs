//! Fake persistence for container and deployment rows, including the
//! ownership-lease arbitration [`ployz_executor::ports::DeploymentStore`]
//! requires.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ployz_core::model::{ContainerRow, DeploymentRow};
use ployz_executor::error::PortError;
use ployz_executor::ports::{ContainerStore, DeploymentStore, PortResult};

/// An in-memory [`ContainerStore`].
#[derive(Default)]
pub struct FakeContainerStore {
    rows: Mutex<BTreeMap<String, ContainerRow>>,
}

impl FakeContainerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with `rows` (as if from a prior deploy).
    pub fn seed(&self, rows: impl IntoIterator<Item = ContainerRow>) {
        let mut guard = self.rows.lock();
        for row in rows {
            guard.insert(row.id.clone(), row);
        }
    }

    /// Returns every row currently stored, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<ContainerRow> {
        self.rows.lock().values().cloned().collect()
    }
}

#[async_trait]
impl ContainerStore for FakeContainerStore {
    async fn ensure_table(&self) -> PortResult<()> {
        Ok(())
    }

    async fn insert(&self, row: ContainerRow) -> PortResult<()> {
        self.rows.lock().insert(row.id.clone(), row);
        Ok(())
    }

    async fn update(&self, row: ContainerRow) -> PortResult<()> {
        self.rows.lock().insert(row.id.clone(), row);
        Ok(())
    }

    async fn delete(&self, id: &str) -> PortResult<()> {
        self.rows.lock().remove(id);
        Ok(())
    }

    async fn list_by_namespace(&self, namespace: &str) -> PortResult<Vec<ContainerRow>> {
        Ok(self.rows.lock().values().filter(|r| r.namespace == namespace).cloned().collect())
    }

    async fn list_by_deploy(&self, deploy_id: &str) -> PortResult<Vec<ContainerRow>> {
        Ok(self.rows.lock().values().filter(|r| r.deploy_id == deploy_id).cloned().collect())
    }

    async fn delete_by_namespace(&self, namespace: &str) -> PortResult<()> {
        self.rows.lock().retain(|_, r| r.namespace != namespace);
        Ok(())
    }
}

/// An in-memory [`DeploymentStore`] with real single-writer lease
/// arbitration: exactly one machine can hold a deploy's lease at a time,
/// and a stale heartbeat (older than `lease_ttl`) lets another machine take
/// it over.
pub struct FakeDeploymentStore {
    rows: Mutex<BTreeMap<String, DeploymentRow>>,
    leases: Mutex<BTreeMap<String, (String, DateTime<Utc>)>>,
    lease_ttl: chrono::Duration,
}

impl FakeDeploymentStore {
    /// Creates an empty store with a 30-second lease TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            leases: Mutex::new(BTreeMap::new()),
            lease_ttl: chrono::Duration::seconds(30),
        }
    }

    /// Creates an empty store with a custom lease TTL.
    #[must_use]
    pub fn with_lease_ttl(lease_ttl: chrono::Duration) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            leases: Mutex::new(BTreeMap::new()),
            lease_ttl,
        }
    }

    /// Returns the current lease holder for `deploy_id`, if any.
    #[must_use]
    pub fn current_owner(&self, deploy_id: &str) -> Option<String> {
        self.leases.lock().get(deploy_id).map(|(owner, _)| owner.clone())
    }
}

impl Default for FakeDeploymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeploymentStore for FakeDeploymentStore {
    async fn ensure_table(&self) -> PortResult<()> {
        Ok(())
    }

    async fn insert(&self, row: DeploymentRow) -> PortResult<()> {
        self.rows.lock().insert(row.id.clone(), row);
        Ok(())
    }

    async fn update(&self, row: DeploymentRow) -> PortResult<()> {
        self.rows.lock().insert(row.id.clone(), row);
        Ok(())
    }

    async fn delete(&self, id: &str) -> PortResult<()> {
        self.rows.lock().remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> PortResult<Option<DeploymentRow>> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn get_active_by_namespace(&self, namespace: &str) -> PortResult<Vec<DeploymentRow>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|r| r.namespace == namespace && r.status == ployz_core::DeployPhase::InProgress)
            .cloned()
            .collect())
    }

    async fn latest_successful_by_namespace(&self, namespace: &str) -> PortResult<Option<DeploymentRow>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|r| r.namespace == namespace && r.status == ployz_core::DeployPhase::Succeeded)
            .max_by_key(|r| r.updated_at.clone())
            .cloned())
    }

    async fn acquire_ownership(&self, deploy_id: &str, machine_id: &str, now: DateTime<Utc>) -> PortResult<()> {
        let mut leases = self.leases.lock();
        match leases.get(deploy_id) {
            Some((owner, heartbeat)) if owner != machine_id && now.signed_duration_since(*heartbeat) < self.lease_ttl => {
                Err(PortError::new(format!("deploy {deploy_id} is already owned by {owner}")))
            }
            _ => {
                leases.insert(deploy_id.to_string(), (machine_id.to_string(), now));
                Ok(())
            }
        }
    }

    async fn check_ownership(&self, deploy_id: &str, machine_id: &str) -> PortResult<()> {
        match self.leases.lock().get(deploy_id) {
            Some((owner, _)) if owner == machine_id => Ok(()),
            Some((owner, _)) => Err(PortError::new(format!("lease for {deploy_id} is held by {owner}, not {machine_id}"))),
            None => Err(PortError::new(format!("no lease held for {deploy_id}"))),
        }
    }

    async fn bump_heartbeat(&self, deploy_id: &str, machine_id: &str, now: DateTime<Utc>) -> PortResult<()> {
        let mut leases = self.leases.lock();
        match leases.get_mut(deploy_id) {
            Some((owner, heartbeat)) if owner == machine_id => {
                *heartbeat = now;
                Ok(())
            }
            _ => Err(PortError::new(format!("cannot bump heartbeat: {machine_id} does not hold the lease on {deploy_id}"))),
        }
    }

    async fn release_ownership(&self, deploy_id: &str) -> PortResult<()> {
        self.leases.lock().remove(deploy_id);
        Ok(())
    }
}
