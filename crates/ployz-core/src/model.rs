//! The deploy data model (§3).
//!
//! Every type here is a plain, `serde`-serializable value. None of them carry
//! behavior beyond small constructors and predicates — canonicalization
//! lives in [`crate::canonical`], classification in [`crate::classify`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A mount's source-to-target bind, as declared on a service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mount {
    /// Host path, named volume, or empty.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl Mount {
    /// Creates a new mount.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only,
        }
    }

    /// Returns true if `source` names a volume rather than a bind path.
    ///
    /// A mount is a named-volume reference iff `source` is non-empty, not
    /// absolute, not prefixed by `./`, `../`, or `~`, and contains no path
    /// separator or backslash.
    #[must_use]
    pub fn is_named_volume(&self) -> bool {
        let s = self.source.as_str();
        !s.is_empty()
            && !s.starts_with('/')
            && !s.starts_with("./")
            && !s.starts_with("../")
            && !s.starts_with('~')
            && !s.contains('/')
            && !s.contains('\\')
    }

    /// The sort key used everywhere mounts are ordered: `(source, target, !read_only)`.
    #[must_use]
    pub fn sort_key(&self) -> (String, String, bool) {
        (self.source.clone(), self.target.clone(), !self.read_only)
    }
}

/// Transport protocol for a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Tcp
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// A host-to-container port publication. `host_port == 0` means unpublished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host-side port, or 0 if unpublished.
    pub host_port: u16,
    /// Container-side port.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortMapping {
    /// Creates a new port mapping.
    #[must_use]
    pub fn new(host_port: u16, container_port: u16, protocol: Protocol) -> Self {
        Self {
            host_port,
            container_port,
            protocol,
        }
    }

    /// Returns true if this port is published to the host.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.host_port != 0
    }

    /// The sort key used everywhere ports are ordered: `(host, container, protocol)`.
    #[must_use]
    pub fn sort_key(&self) -> (u16, u16, Protocol) {
        (self.host_port, self.container_port, self.protocol)
    }
}

/// A container health check. Absence means "no health gate".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Command to run inside the container to probe health.
    pub test: Vec<String>,
    /// Interval between checks, in seconds.
    pub interval_secs: u64,
    /// Timeout for a single check, in seconds.
    pub timeout_secs: u64,
    /// Number of consecutive failures before unhealthy.
    pub retries: u32,
    /// Grace period after start before failures count, in seconds.
    pub start_period_secs: u64,
    /// If true, this health check is disabled (collapses to absent on canonicalization).
    #[serde(default)]
    pub disable: bool,
}

impl HealthCheck {
    /// Returns true if this health check is effectively disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disable
    }
}

/// Resource limits. All-zero collapses to absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// CPU limit, in cores.
    pub cpu_limit: f64,
    /// Memory limit, in bytes.
    pub memory_limit: i64,
}

impl Resources {
    /// Returns true if both limits are zero (i.e. this should collapse to absent).
    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        self.cpu_limit == 0.0 && self.memory_limit == 0
    }
}

impl Eq for Resources {}

/// The container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart automatically.
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart only on non-zero exit.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

/// A complete, uncanonicalized service specification.
///
/// Canonical form (produced by [`crate::canonical::canonicalize`]):
/// environment sorted ascending; mounts sorted by `(source, target, !read_only)`;
/// ports sorted by `(host, container, protocol)`; nil-vs-empty collapsed to
/// absent; all-zero `resources` collapsed to absent; a disabled `health_check`
/// collapsed to absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name, unique within a namespace.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Command to run (overrides the image's `CMD`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Entrypoint (overrides the image's `ENTRYPOINT`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    /// Environment variables, as `KEY=VALUE` strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    /// Volume/bind mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    /// Published ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    /// Arbitrary labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Health check, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    /// Resource limits, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
}

impl ServiceSpec {
    /// Creates a minimal service spec with only a name and image set.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            entrypoint: Vec::new(),
            environment: Vec::new(),
            mounts: Vec::new(),
            ports: Vec::new(),
            labels: BTreeMap::new(),
            restart_policy: RestartPolicy::default(),
            health_check: None,
            resources: None,
        }
    }
}

/// Where a service's replicas may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// One replica on every eligible machine.
    Global,
    /// `replicas` replicas spread over eligible machines.
    Replicated,
}

/// A placement constraint of the form `node.labels.<key> (==|!=) <value>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// The raw constraint string, e.g. `node.labels.zone==us-east`.
    pub raw: String,
}

impl Constraint {
    /// Wraps a raw constraint string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

/// A parsed constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Label must exist and equal the value.
    Eq,
    /// Label must be absent or differ from the value.
    Ne,
}

/// Ordering strategy for a `NeedsRecreate` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOrder {
    /// Bring up the new container before tearing down the old one.
    #[default]
    StartFirst,
    /// Tear down the old container before bringing up the new one.
    StopFirst,
}

/// Rolling-update configuration for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Update ordering; default `start-first` when absent.
    #[serde(default)]
    pub order: UpdateOrder,
    /// Number of replicas recreated concurrently within a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// What to do when a batch fails (operator-facing annotation only; the
    /// core always fails the deploy and relies on the rollback log).
    #[serde(default)]
    pub failure_action: String,
}

fn default_parallelism() -> usize {
    1
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            order: UpdateOrder::default(),
            parallelism: default_parallelism(),
            failure_action: String::new(),
        }
    }
}

/// A service's full deploy configuration: its spec plus placement,
/// scaling, constraints, dependencies, and update policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDeployConfig {
    /// The service's container spec.
    pub spec: ServiceSpec,
    /// Placement mode.
    #[serde(default = "default_placement")]
    pub placement: Placement,
    /// Replica count (only meaningful when `placement == Replicated`; default 1).
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Placement constraints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    /// Names of services that must be scheduled in an earlier tier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Rolling-update configuration.
    #[serde(default)]
    pub update_config: UpdateConfig,
}

fn default_placement() -> Placement {
    Placement::Replicated
}

fn default_replicas() -> u32 {
    1
}

impl ServiceDeployConfig {
    /// Creates a replicated service deploy config with 1 replica and no
    /// constraints or dependencies.
    #[must_use]
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            placement: Placement::Replicated,
            replicas: 1,
            constraints: Vec::new(),
            depends_on: Vec::new(),
            update_config: UpdateConfig::default(),
        }
    }

    /// The service's name (delegates to the inner spec).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// A full, operator-submitted deploy specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    /// The isolation namespace for this deploy.
    pub namespace: String,
    /// Services to deploy.
    pub services: Vec<ServiceDeployConfig>,
}

impl DeploySpec {
    /// Validates that service names are non-empty and unique.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::CoreError::Validation`] wrapping a
    /// [`crate::validation::ValidationError`] describing the first failure
    /// found, in service order.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (idx, svc) in self.services.iter().enumerate() {
            let field = format!("services[{idx}].name");
            if svc.name().is_empty() {
                return Err(crate::validation::ValidationError::empty(field).into());
            }
            if !seen.insert(svc.name().to_string()) {
                return Err(crate::validation::ValidationError::constraint(
                    field,
                    format!("duplicate service name '{}'", svc.name()),
                )
                .into());
            }
        }
        Ok(())
    }
}

/// A machine in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    /// Unique machine identifier.
    pub id: String,
    /// Machine labels, used by placement constraints.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A single replica's target: which machine, under which container name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineAssignment {
    /// Target machine.
    pub machine_id: String,
    /// The container name to use on that machine.
    pub container_name: String,
}

/// The lifecycle status of a persisted container row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Created but not yet started.
    Created,
    /// Running.
    Running,
    /// Stopped.
    Stopped,
    /// Removed (tombstone; rows are normally deleted outright instead).
    Removed,
}

/// A persisted record of one container this deploy owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRow {
    /// `deploy_id + "/" + container_name`.
    pub id: String,
    /// Namespace.
    pub namespace: String,
    /// Owning deploy.
    pub deploy_id: String,
    /// Service name.
    pub service: String,
    /// Machine this container runs on.
    pub machine_id: String,
    /// Container name on that machine.
    pub container_name: String,
    /// Canonical JSON of the `ServiceSpec`.
    pub spec_json: String,
    /// Current status.
    pub status: ContainerStatus,
    /// Optimistic-concurrency version.
    pub version: u64,
    /// Creation timestamp, UTC ISO-8601 with nanosecond precision.
    pub created_at: String,
    /// Last-update timestamp, UTC ISO-8601 with nanosecond precision.
    pub updated_at: String,
}

impl ContainerRow {
    /// Builds the row id from a deploy id and container name.
    #[must_use]
    pub fn row_id(deploy_id: &str, container_name: &str) -> String {
        format!("{deploy_id}/{container_name}")
    }
}

/// A persisted record of one deploy attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRow {
    /// Deploy id.
    pub id: String,
    /// Namespace.
    pub namespace: String,
    /// JSON of the incoming plan/spec.
    pub spec_json: String,
    /// Arbitrary labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Current phase.
    pub status: crate::phase::DeployPhase,
    /// Machine id currently holding the ownership lease, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Last heartbeat timestamp for the owner, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_heartbeat: Option<String>,
    /// Machines participating in this deploy.
    #[serde(default)]
    pub machine_ids: Vec<String>,
    /// Optimistic-concurrency version.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: String,
    /// Last-update timestamp.
    pub updated_at: String,
}

/// One line item in a service's plan: a single `(machine, container_name)`
/// target and what's to be done with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Target machine.
    pub machine_id: String,
    /// Target container name.
    pub container_name: String,
    /// The canonical spec this entry should converge to.
    pub spec: ServiceSpec,
    /// The existing row, if any (absent only for `Create` entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_row: Option<ContainerRow>,
    /// Human-readable reason for this entry's bucket.
    pub reason: String,
    /// The owning service's rolling-update configuration, carried through so
    /// the executor can batch `NeedsRecreate` entries without re-consulting
    /// the original `DeploySpec`.
    #[serde(default)]
    pub update_config: UpdateConfig,
}

impl PlanEntry {
    /// Returns the sort key `(machine_id, container_name)` used to order
    /// entries within a bucket.
    #[must_use]
    pub fn sort_key(&self) -> (String, String) {
        (self.machine_id.clone(), self.container_name.clone())
    }
}

/// One dependency tier of a [`DeployPlan`]: every non-`Remove` entry here
/// depends only on services fully resolved in earlier tiers.
///
/// Entries are grouped by bucket rather than kept in one flat list so the
/// executor can walk them in its required intra-tier order
/// (Remove, Create, `NeedsSpecUpdate`, `NeedsUpdate`, `NeedsRecreate`)
/// without re-sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tier {
    /// Zero-based index within the plan.
    pub index: usize,
    /// A human-readable label (its services' names, joined), used in
    /// `DeployError`'s tier context.
    pub name: String,
    /// Entries with no existing row to pair against.
    #[serde(default)]
    pub create: Vec<PlanEntry>,
    /// Entries whose canonical spec is unchanged.
    #[serde(default)]
    pub up_to_date: Vec<PlanEntry>,
    /// Entries whose stored JSON differs from the re-encoded canonical spec
    /// but whose canonical content is unchanged (metadata-only row rewrite).
    #[serde(default)]
    pub needs_spec_update: Vec<PlanEntry>,
    /// Entries whose only change is to `resources` (live update).
    #[serde(default)]
    pub needs_update: Vec<PlanEntry>,
    /// Entries that must be recreated under a new container name.
    #[serde(default)]
    pub needs_recreate: Vec<PlanEntry>,
    /// Entries whose existing row has no surviving assignment.
    #[serde(default)]
    pub remove: Vec<PlanEntry>,
}

impl Tier {
    /// Creates an empty, named tier.
    #[must_use]
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true if every bucket in this tier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.up_to_date.is_empty()
            && self.needs_spec_update.is_empty()
            && self.needs_update.is_empty()
            && self.needs_recreate.is_empty()
            && self.remove.is_empty()
    }
}

/// The planner's output: a deterministic, tiered execution plan (§4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployPlan {
    /// The target namespace.
    pub namespace: String,
    /// The deterministic deploy id (§3).
    pub deploy_id: String,
    /// Tiers in execution order.
    pub tiers: Vec<Tier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_named_volume_detection() {
        assert!(Mount::new("data", "/var/lib/data", false).is_named_volume());
        assert!(!Mount::new("/host/path", "/container/path", false).is_named_volume());
        assert!(!Mount::new("./relative", "/x", false).is_named_volume());
        assert!(!Mount::new("../parent", "/x", false).is_named_volume());
        assert!(!Mount::new("~/home", "/x", false).is_named_volume());
        assert!(!Mount::new("has/slash", "/x", false).is_named_volume());
        assert!(!Mount::new("has\\backslash", "/x", false).is_named_volume());
        assert!(!Mount::new("", "/x", false).is_named_volume());
    }

    #[test]
    fn port_published() {
        assert!(!PortMapping::new(0, 80, Protocol::Tcp).is_published());
        assert!(PortMapping::new(8080, 80, Protocol::Tcp).is_published());
    }

    #[test]
    fn resources_all_zero() {
        assert!(Resources {
            cpu_limit: 0.0,
            memory_limit: 0
        }
        .is_all_zero());
        assert!(!Resources {
            cpu_limit: 0.5,
            memory_limit: 0
        }
        .is_all_zero());
    }

    #[test]
    fn deploy_spec_validate_rejects_duplicates() {
        let spec = DeploySpec {
            namespace: "ns".into(),
            services: vec![
                ServiceDeployConfig::new(ServiceSpec::new("api", "api:1")),
                ServiceDeployConfig::new(ServiceSpec::new("api", "api:2")),
            ],
        };
        assert!(matches!(
            spec.validate(),
            Err(crate::error::CoreError::Validation(e)) if e.kind == crate::validation::ValidationErrorKind::Constraint
        ));
    }

    #[test]
    fn deploy_spec_validate_rejects_empty_name() {
        let spec = DeploySpec {
            namespace: "ns".into(),
            services: vec![ServiceDeployConfig::new(ServiceSpec::new("", "api:1"))],
        };
        assert!(matches!(
            spec.validate(),
            Err(crate::error::CoreError::Validation(e)) if e.kind == crate::validation::ValidationErrorKind::Empty
        ));
    }

    #[test]
    fn deploy_spec_validate_accepts_unique_names() {
        let spec = DeploySpec {
            namespace: "ns".into(),
            services: vec![
                ServiceDeployConfig::new(ServiceSpec::new("api", "api:1")),
                ServiceDeployConfig::new(ServiceSpec::new("worker", "worker:1")),
            ],
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn container_row_id_format() {
        assert_eq!(ContainerRow::row_id("deploy-1", "ployz-ns-api-a1b2"), "deploy-1/ployz-ns-api-a1b2");
    }
}
