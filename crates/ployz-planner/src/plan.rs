//! Deploy planning (C5, §4.5) and deterministic `DeployID` derivation (§3).

use std::collections::BTreeMap;

use ployz_core::model::{ContainerRow, DeploySpec, MachineAssignment, PlanEntry, ServiceSpec, Tier};
use ployz_core::{canonicalize, classify, ChangeKind, DeployPlan};
use sha2::{Digest, Sha256};

use crate::error::{PlannerError, Result};

/// Computes the deterministic `DeployID` for `namespace` and `assignments`.
///
/// The hash input is the namespace followed by, for each service in
/// lexical order, the service name and its sorted `(machine_id,
/// container_name)` assignments. Identical inputs always produce the same
/// id, making re-submission of an unchanged plan idempotent.
#[must_use]
pub fn compute_deploy_id(namespace: &str, assignments: &BTreeMap<String, Vec<MachineAssignment>>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    for (service, service_assignments) in assignments {
        hasher.update(b"\n");
        hasher.update(service.as_bytes());
        let mut sorted = service_assignments.clone();
        sorted.sort();
        for a in &sorted {
            hasher.update(b"\n");
            hasher.update(a.machine_id.as_bytes());
            hasher.update(b"=");
            hasher.update(a.container_name.as_bytes());
        }
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Describes, field by field, how `old` differs from `new`, for use in a
/// plan entry's human-readable reason string.
fn describe_spec_diff(old: &ServiceSpec, new: &ServiceSpec) -> String {
    let old = canonicalize(old);
    let new = canonicalize(new);
    let mut parts = Vec::new();

    if old.image != new.image {
        parts.push(format!("image: {}→{}", old.image, new.image));
    }
    if old.command != new.command {
        parts.push(format!("command: {:?}→{:?}", old.command, new.command));
    }
    if old.entrypoint != new.entrypoint {
        parts.push(format!("entrypoint: {:?}→{:?}", old.entrypoint, new.entrypoint));
    }
    if old.environment != new.environment {
        parts.push(format!("env: {:?}→{:?}", old.environment, new.environment));
    }
    if old.ports != new.ports {
        parts.push(format!("ports: {:?}→{:?}", old.ports, new.ports));
    }
    if old.mounts != new.mounts {
        parts.push(format!("mounts: {:?}→{:?}", old.mounts, new.mounts));
    }
    if old.labels != new.labels {
        parts.push(format!("labels: {:?}→{:?}", old.labels, new.labels));
    }
    if old.restart_policy != new.restart_policy {
        parts.push(format!("restart: {:?}→{:?}", old.restart_policy, new.restart_policy));
    }
    if old.health_check != new.health_check {
        parts.push("healthcheck changed".to_string());
    }
    if old.resources != new.resources {
        parts.push(format!("resources: {:?}→{:?}", old.resources, new.resources));
    }

    if parts.is_empty() {
        "no canonical difference".to_string()
    } else {
        parts.join(", ")
    }
}

/// An index of current rows keyed by `(service, machine_id)`, each bucket
/// kept sorted ascending by `container_name` so the smallest-named row is
/// always paired first (stable pairing preference, §4.5 step 2).
struct RowIndex {
    buckets: BTreeMap<(String, String), Vec<ContainerRow>>,
}

impl RowIndex {
    fn build(rows: &[ContainerRow]) -> Self {
        let mut buckets: BTreeMap<(String, String), Vec<ContainerRow>> = BTreeMap::new();
        for row in rows {
            buckets
                .entry((row.service.clone(), row.machine_id.clone()))
                .or_default()
                .push(row.clone());
        }
        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        }
        Self { buckets }
    }

    fn pop(&mut self, service: &str, machine_id: &str) -> Option<ContainerRow> {
        let key = (service.to_string(), machine_id.to_string());
        let bucket = self.buckets.get_mut(&key)?;
        if bucket.is_empty() {
            return None;
        }
        Some(bucket.remove(0))
    }

    /// Drains every row still indexed under `service`, across all machines.
    fn drain_service(&mut self, service: &str) -> Vec<ContainerRow> {
        let mut drained = Vec::new();
        let keys: Vec<(String, String)> = self
            .buckets
            .keys()
            .filter(|(svc, _)| svc == service)
            .cloned()
            .collect();
        for key in keys {
            if let Some(bucket) = self.buckets.remove(&key) {
                drained.extend(bucket);
            }
        }
        drained
    }

    /// Drains every remaining row, grouped by service, in lexical service
    /// order.
    fn drain_all(self) -> BTreeMap<String, Vec<ContainerRow>> {
        let mut by_service: BTreeMap<String, Vec<ContainerRow>> = BTreeMap::new();
        for ((service, _machine), rows) in self.buckets {
            by_service.entry(service).or_default().extend(rows);
        }
        by_service
    }
}

/// Builds a tiered, bucketed [`DeployPlan`] from `incoming`, the existing
/// `current_rows`, and a `schedule` (the output of
/// [`ployz_scheduler::schedule`]) mapping each incoming service to its
/// target assignments.
///
/// # Errors
///
/// Returns [`PlannerError::Scheduler`] if tiering fails, or
/// [`PlannerError::MissingAssignments`] if `schedule` has no entry for an
/// incoming service.
pub fn plan(
    incoming: &DeploySpec,
    current_rows: &[ContainerRow],
    schedule: &BTreeMap<String, Vec<MachineAssignment>>,
) -> Result<DeployPlan> {
    incoming.validate().map_err(PlannerError::Core)?;

    let service_tiers = ployz_scheduler::toposort(&incoming.services)?;
    let by_name: BTreeMap<&str, &ployz_core::ServiceDeployConfig> =
        incoming.services.iter().map(|s| (s.name(), s)).collect();

    let mut rows = RowIndex::build(current_rows);
    let mut tiers = Vec::with_capacity(service_tiers.len() + 1);

    for (tier_index, service_names) in service_tiers.iter().enumerate() {
        let mut tier = Tier::new(tier_index, service_names.join(", "));

        for service_name in service_names {
            let svc = by_name[service_name.as_str()];
            let assignments = schedule
                .get(service_name)
                .ok_or_else(|| PlannerError::MissingAssignments {
                    service: service_name.clone(),
                })?;

            let mut sorted_assignments = assignments.clone();
            sorted_assignments.sort();

            let existing_count = current_rows.iter().filter(|r| &r.service == service_name).count();
            let target_count = sorted_assignments.len();
            let mut create_idx = 0usize;

            for assignment in &sorted_assignments {
                match rows.pop(service_name, &assignment.machine_id) {
                    None => {
                        create_idx += 1;
                        let reason = if existing_count == 0 {
                            "new service".to_string()
                        } else if target_count > existing_count {
                            format!("scaling {existing_count}→{target_count}: adding {create_idx}")
                        } else {
                            "new assignment".to_string()
                        };
                        tier.create.push(PlanEntry {
                            machine_id: assignment.machine_id.clone(),
                            container_name: assignment.container_name.clone(),
                            spec: canonicalize(&svc.spec),
                            current_row: None,
                            reason,
                            update_config: svc.update_config.clone(),
                        });
                    }
                    Some(row) => {
                        let stored_spec: ServiceSpec = serde_json::from_str(&row.spec_json)
                            .unwrap_or_else(|_| ServiceSpec::new(service_name.clone(), String::new()));
                        let decode_failed = serde_json::from_str::<ServiceSpec>(&row.spec_json).is_err();
                        let kind = if decode_failed {
                            ChangeKind::NeedsRecreate
                        } else {
                            classify(&stored_spec, &svc.spec)
                        };
                        let reason = describe_spec_diff(&stored_spec, &svc.spec);
                        let entry = PlanEntry {
                            machine_id: row.machine_id.clone(),
                            container_name: row.container_name.clone(),
                            spec: canonicalize(&svc.spec),
                            current_row: Some(row),
                            reason,
                            update_config: svc.update_config.clone(),
                        };
                        match kind {
                            ChangeKind::UpToDate => {
                                // §4.2: promote to NeedsSpecUpdate if the stored
                                // canonical JSON differs byte-for-byte from the
                                // re-encoded incoming canonical JSON — stored
                                // metadata drift with no container action.
                                let incoming_json = serde_json::to_string(&canonicalize(&svc.spec))
                                    .unwrap_or_default();
                                if entry.current_row.as_ref().is_some_and(|r| r.spec_json != incoming_json) {
                                    tier.needs_spec_update.push(entry);
                                } else {
                                    tier.up_to_date.push(entry);
                                }
                            }
                            ChangeKind::NeedsSpecUpdate => tier.needs_spec_update.push(entry),
                            ChangeKind::NeedsUpdate => tier.needs_update.push(entry),
                            ChangeKind::NeedsRecreate => tier.needs_recreate.push(PlanEntry {
                                machine_id: assignment.machine_id.clone(),
                                container_name: assignment.container_name.clone(),
                                ..entry
                            }),
                        }
                    }
                }
            }

            let leftover = rows.drain_service(service_name);
            for (idx, row) in leftover.into_iter().enumerate() {
                let reason = if target_count < existing_count {
                    format!("scaling {existing_count}→{target_count}: removing {}", idx + 1)
                } else {
                    "remove stale assignment".to_string()
                };
                tier.remove.push(PlanEntry {
                    machine_id: row.machine_id.clone(),
                    container_name: row.container_name.clone(),
                    spec: canonicalize(&svc.spec),
                    current_row: Some(row),
                    reason,
                    update_config: svc.update_config.clone(),
                });
            }
        }

        tiers.push(tier);
    }

    let removed_services = rows.drain_all();
    if !removed_services.is_empty() {
        let mut trailing = Tier::new(tiers.len(), removed_services.keys().cloned().collect::<Vec<_>>().join(", "));
        for (service_name, service_rows) in removed_services {
            for row in service_rows {
                let spec: ServiceSpec = serde_json::from_str(&row.spec_json)
                    .unwrap_or_else(|_| ServiceSpec::new(service_name.clone(), String::new()));
                trailing.remove.push(PlanEntry {
                    machine_id: row.machine_id.clone(),
                    container_name: row.container_name.clone(),
                    spec: canonicalize(&spec),
                    current_row: Some(row),
                    reason: "service removed".to_string(),
                    update_config: ployz_core::model::UpdateConfig::default(),
                });
            }
        }
        tiers.push(trailing);
    }

    let deploy_id = compute_deploy_id(&incoming.namespace, schedule);

    Ok(DeployPlan {
        namespace: incoming.namespace.clone(),
        deploy_id,
        tiers,
    })
}
