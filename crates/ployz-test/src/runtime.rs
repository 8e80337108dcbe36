//! A fake container runtime backed by an in-memory registry, shared with
//! [`FakeStateReader`] so postcondition checks see exactly what the runtime
//! did.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ployz_executor::error::PortError;
use ployz_executor::ports::{ContainerListEntry, ContainerRuntime, ContainerState, CreateConfig, InspectResult, PortResult, ResourceConfig};

/// One container as the fake runtime sees it.
#[derive(Debug, Clone)]
pub struct RuntimeRecord {
    /// Image it was created from.
    pub image: String,
    /// Whether it is currently started.
    pub running: bool,
    /// Live resource limits, as last applied by `container_update`.
    pub resources: ResourceConfig,
    /// Labels it was created with (includes the managed `ployz.*` labels).
    pub labels: BTreeMap<String, String>,
}

/// Shared in-memory container registry.
pub type Registry = Arc<Mutex<BTreeMap<String, RuntimeRecord>>>;

/// A fake [`ContainerRuntime`] that keeps containers in memory and can be
/// told to fail specific operations by name, to exercise rollback paths.
#[derive(Default)]
pub struct FakeRuntime {
    registry: Registry,
    fail_create: Mutex<BTreeSet<String>>,
    fail_start: Mutex<BTreeSet<String>>,
    pulled_images: Mutex<BTreeSet<String>>,
}

impl FakeRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the backing registry, for a [`FakeStateReader`]
    /// to read from.
    #[must_use]
    pub fn registry(&self) -> Registry {
        Arc::clone(&self.registry)
    }

    /// Makes the next `container_create` for `name` fail.
    pub fn fail_create(&self, name: impl Into<String>) {
        self.fail_create.lock().insert(name.into());
    }

    /// Makes the next `container_start` for `name` fail.
    pub fn fail_start(&self, name: impl Into<String>) {
        self.fail_start.lock().insert(name.into());
    }

    /// Returns every image ever passed to `image_pull`, in call order dedup'd
    /// by first occurrence is not preserved — callers should check set
    /// membership, not order.
    #[must_use]
    pub fn pulled_images(&self) -> BTreeSet<String> {
        self.pulled_images.lock().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_pull(&self, image: &str) -> PortResult<()> {
        self.pulled_images.lock().insert(image.to_string());
        Ok(())
    }

    async fn container_create(&self, config: CreateConfig) -> PortResult<()> {
        if self.fail_create.lock().remove(&config.name) {
            return Err(PortError::new(format!("injected failure creating {}", config.name)));
        }
        self.registry.lock().insert(
            config.name.clone(),
            RuntimeRecord {
                image: config.image,
                running: false,
                resources: ResourceConfig::default(),
                labels: config.labels,
            },
        );
        Ok(())
    }

    async fn container_start(&self, name: &str) -> PortResult<()> {
        if self.fail_start.lock().remove(name) {
            return Err(PortError::new(format!("injected failure starting {name}")));
        }
        let mut registry = self.registry.lock();
        let record = registry.get_mut(name).ok_or_else(|| PortError::new(format!("no such container: {name}")))?;
        record.running = true;
        Ok(())
    }

    async fn container_stop(&self, name: &str) -> PortResult<()> {
        if let Some(record) = self.registry.lock().get_mut(name) {
            record.running = false;
        }
        Ok(())
    }

    async fn container_remove(&self, name: &str, _force: bool) -> PortResult<()> {
        self.registry.lock().remove(name);
        Ok(())
    }

    async fn container_update(&self, name: &str, resources: ResourceConfig) -> PortResult<()> {
        let mut registry = self.registry.lock();
        let record = registry.get_mut(name).ok_or_else(|| PortError::new(format!("no such container: {name}")))?;
        record.resources = resources;
        Ok(())
    }

    async fn container_inspect(&self, name: &str) -> PortResult<InspectResult> {
        let registry = self.registry.lock();
        Ok(match registry.get(name) {
            Some(record) => InspectResult {
                exists: true,
                running: record.running,
                image: record.image.clone(),
            },
            None => InspectResult::default(),
        })
    }

    async fn container_list(&self, label_filter: &BTreeMap<String, String>) -> PortResult<Vec<ContainerListEntry>> {
        let registry = self.registry.lock();
        Ok(registry
            .iter()
            .filter(|(_, record)| label_filter.iter().all(|(k, v)| record.labels.get(k) == Some(v)))
            .map(|(name, record)| ContainerListEntry {
                name: name.clone(),
                image: record.image.clone(),
                running: record.running,
            })
            .collect())
    }
}

/// Reads [`ContainerState`] for a machine directly out of a [`Registry`]
/// (typically shared with a [`FakeRuntime`] via [`FakeRuntime::registry`]),
/// filtering by the managed `ployz.machine_id`/`ployz.namespace` labels the
/// executor always sets on create.
pub struct FakeStateReader {
    registry: Registry,
    healthy_override: Mutex<BTreeMap<String, bool>>,
}

impl FakeStateReader {
    /// Creates a state reader backed by `registry` (typically shared with a
    /// [`FakeRuntime`] via [`FakeRuntime::registry`]).
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            healthy_override: Mutex::new(BTreeMap::new()),
        }
    }

    /// Marks `name` as unhealthy for subsequent reads (defaults to healthy).
    pub fn mark_unhealthy(&self, name: impl Into<String>) {
        self.healthy_override.lock().insert(name.into(), false);
    }
}

#[async_trait]
impl ployz_executor::ports::StateReader for FakeStateReader {
    async fn read_machine_state(&self, machine_id: &str, namespace: &str) -> PortResult<Vec<ContainerState>> {
        let registry = self.registry.lock();
        let overrides = self.healthy_override.lock();
        Ok(registry
            .iter()
            .filter(|(_, record)| record.labels.get("ployz.machine_id").map(String::as_str) == Some(machine_id))
            .filter(|(_, record)| record.labels.get("ployz.namespace").map(String::as_str) == Some(namespace))
            .map(|(name, record)| ContainerState {
                name: name.clone(),
                image: record.image.clone(),
                running: record.running,
                healthy: *overrides.get(name).unwrap_or(&true),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, namespace: &str, machine_id: &str) -> CreateConfig {
        let mut labels = BTreeMap::new();
        labels.insert("ployz.namespace".to_string(), namespace.to_string());
        labels.insert("ployz.machine_id".to_string(), machine_id.to_string());
        CreateConfig {
            name: name.to_string(),
            image: "api:1".to_string(),
            cmd: Vec::new(),
            env: Vec::new(),
            network_mode: String::new(),
            mounts: Vec::new(),
            ports: Vec::new(),
            labels,
            restart_policy: ployz_core::RestartPolicy::default(),
            health_check: None,
        }
    }

    #[tokio::test]
    async fn created_and_started_container_is_visible_to_state_reader() {
        let runtime = FakeRuntime::new();
        let reader = FakeStateReader::new(runtime.registry());

        runtime.container_create(config("c1", "ns", "m1")).await.unwrap();
        runtime.container_start("c1").await.unwrap();

        let state = reader.read_machine_state("m1", "ns").await.unwrap();
        assert_eq!(state.len(), 1);
        assert!(state[0].running);
        assert!(state[0].healthy);
    }

    #[tokio::test]
    async fn fail_create_triggers_injected_error() {
        let runtime = FakeRuntime::new();
        runtime.fail_create("c1");
        let err = runtime.container_create(config("c1", "ns", "m1")).await.unwrap_err();
        assert!(err.to_string().contains("injected failure"));
    }

    #[tokio::test]
    async fn mark_unhealthy_is_reflected_in_state() {
        let runtime = FakeRuntime::new();
        let reader = FakeStateReader::new(runtime.registry());
        runtime.container_create(config("c1", "ns", "m1")).await.unwrap();
        runtime.container_start("c1").await.unwrap();
        reader.mark_unhealthy("c1");

        let state = reader.read_machine_state("m1", "ns").await.unwrap();
        assert!(!state[0].healthy);
    }
}
