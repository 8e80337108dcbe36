//! Machine scheduling (C4, §4.4).

use std::collections::{BTreeMap, HashMap};

use ployz_core::model::{Constraint, ConstraintOp, MachineAssignment, MachineInfo, Placement, ServiceDeployConfig};
use ployz_core::ContainerRow;
use rand::Rng;

use crate::error::{Result, SchedulerError};
use crate::sorted::sorted_keys;

const CONTAINER_NAME_MAX_LEN: usize = 255;

/// Parses a raw constraint of the form `node.labels.<key>(==|!=)<value>`.
fn parse_constraint(raw: &str) -> Result<(String, ConstraintOp, String)> {
    let (op, op_str) = if let Some(idx) = raw.find("==") {
        (ConstraintOp::Eq, (idx, "=="))
    } else if let Some(idx) = raw.find("!=") {
        (ConstraintOp::Ne, (idx, "!="))
    } else {
        return Err(SchedulerError::InvalidConstraint { raw: raw.to_string() });
    };
    let (idx, op_token) = op_str;
    let lhs = &raw[..idx];
    let value = &raw[idx + op_token.len()..];
    let key = lhs.strip_prefix("node.labels.").ok_or_else(|| SchedulerError::InvalidConstraint { raw: raw.to_string() })?;
    if key.is_empty() || value.is_empty() {
        return Err(SchedulerError::InvalidConstraint { raw: raw.to_string() });
    }
    Ok((key.to_string(), op, value.to_string()))
}

fn constraint_matches(machine: &MachineInfo, key: &str, op: ConstraintOp, value: &str) -> bool {
    match op {
        ConstraintOp::Eq => machine.labels.get(key).map(|v| v == value).unwrap_or(false),
        ConstraintOp::Ne => machine.labels.get(key).map(|v| v != value).unwrap_or(true),
    }
}

/// Computes the sorted machine ids eligible for `constraints`.
fn eligible_machines(machines: &[MachineInfo], constraints: &[Constraint]) -> Result<Vec<String>> {
    let parsed: Vec<(String, ConstraintOp, String)> =
        constraints.iter().map(|c| parse_constraint(&c.raw)).collect::<Result<_>>()?;

    let mut eligible: Vec<String> = machines
        .iter()
        .filter(|m| parsed.iter().all(|(key, op, value)| constraint_matches(m, key, *op, value)))
        .map(|m| m.id.clone())
        .collect();
    eligible.sort();
    eligible.dedup();
    Ok(eligible)
}

/// A minimal union-find over service names, used to group services that
/// share a named-volume mount source.
struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    fn new(names: impl Iterator<Item = String>) -> Self {
        Self {
            parent: names.map(|n| (n.clone(), n)).collect(),
        }
    }

    fn find(&mut self, x: &str) -> String {
        let mut root = x.to_string();
        while self.parent[&root] != root {
            root = self.parent[&root].clone();
        }
        let mut cur = x.to_string();
        while self.parent[&cur] != cur {
            let next = self.parent[&cur].clone();
            self.parent.insert(cur, root.clone());
            cur = next;
        }
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lexically smaller root wins, so group keys stay deterministic.
            if ra < rb {
                self.parent.insert(rb, ra);
            } else {
                self.parent.insert(ra, rb);
            }
        }
    }
}

/// Picks `k` machines from `eligible`, biased toward the least-loaded ones.
///
/// Repeatedly selects the lowest-scored machine in `existing`; ties are
/// broken by a round-robin cursor that starts at 0 and advances past the
/// index last chosen, modulo `eligible.len()`.
fn place_replicas(k: usize, eligible: &[String], existing: &mut HashMap<String, u32>, cursor: &mut usize) -> Vec<String> {
    if eligible.is_empty() {
        return Vec::new();
    }
    let n = eligible.len();
    let mut chosen = Vec::with_capacity(k);
    for _ in 0..k {
        let mut best_idx = *cursor % n;
        let mut best_score = u32::MAX;
        for offset in 0..n {
            let idx = (*cursor + offset) % n;
            let score = *existing.get(&eligible[idx]).unwrap_or(&0);
            if score < best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        let machine = eligible[best_idx].clone();
        *existing.entry(machine.clone()).or_insert(0) += 1;
        *cursor = (best_idx + 1) % n;
        chosen.push(machine);
    }
    chosen
}

/// Synthesizes `ployz-{namespace}-{service}-{4-hex}`, truncated to fit 255
/// bytes by shrinking `namespace` first, then `service`.
fn container_name(namespace: &str, service: &str, suffix: &str) -> String {
    let fixed = "ployz--".len() + "-".len() + suffix.len();
    let budget = CONTAINER_NAME_MAX_LEN.saturating_sub(fixed);
    let mut ns = namespace.to_string();
    let mut svc = service.to_string();
    let total = ns.len() + svc.len();
    if total > budget {
        let overflow = total - budget;
        let ns_trim = overflow.min(ns.len());
        ns.truncate(ns.len() - ns_trim);
        let remaining = overflow - ns_trim;
        if remaining > 0 {
            let svc_trim = remaining.min(svc.len());
            svc.truncate(svc.len() - svc_trim);
        }
    }
    format!("ployz-{ns}-{svc}-{suffix}")
}

fn random_suffix() -> String {
    let value: u16 = rand::thread_rng().gen();
    format!("{value:04x}")
}

/// Builds the existing-load histogram from current container rows, keyed
/// by machine id.
fn existing_load(current_rows: &[ContainerRow]) -> HashMap<String, u32> {
    let mut load = HashMap::new();
    for row in current_rows {
        *load.entry(row.machine_id.clone()).or_insert(0u32) += 1;
    }
    load
}

/// Schedules `services` onto `machines`, producing a deterministic
/// assignment list per service.
///
/// # Errors
///
/// Returns [`SchedulerError::NoMachines`], [`SchedulerError::NoEligibleMachines`],
/// [`SchedulerError::EmptyAffinityGroup`], [`SchedulerError::ConflictingReplicaCounts`],
/// or [`SchedulerError::InvalidConstraint`].
pub fn schedule(
    namespace: &str,
    services: &[ServiceDeployConfig],
    machines: &[MachineInfo],
    current_rows: &[ContainerRow],
) -> Result<BTreeMap<String, Vec<MachineAssignment>>> {
    if machines.iter().all(|m| m.id.is_empty()) {
        return Err(SchedulerError::NoMachines);
    }

    let mut eligible_by_service: HashMap<String, Vec<String>> = HashMap::new();
    for svc in services {
        let eligible = eligible_machines(machines, &svc.constraints)?;
        if eligible.is_empty() {
            return Err(SchedulerError::NoEligibleMachines {
                service: svc.name().to_string(),
            });
        }
        eligible_by_service.insert(svc.name().to_string(), eligible);
    }

    let mut uf = UnionFind::new(services.iter().map(|s| s.name().to_string()));
    let mut volume_owner: HashMap<String, String> = HashMap::new();
    for svc in services {
        for mount in &svc.spec.mounts {
            if mount.is_named_volume() {
                if let Some(owner) = volume_owner.get(&mount.source) {
                    uf.union(owner, svc.name());
                } else {
                    volume_owner.insert(mount.source.clone(), svc.name().to_string());
                }
            }
        }
    }

    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for svc in services {
        let root = uf.find(svc.name());
        groups.entry(root).or_default().push(svc.name().to_string());
    }

    let by_name: HashMap<&str, &ServiceDeployConfig> = services.iter().map(|s| (s.name(), s)).collect();
    let mut existing = existing_load(current_rows);
    let mut cursor = 0usize;
    let mut assignments: BTreeMap<String, Vec<MachineAssignment>> = BTreeMap::new();

    for root in sorted_keys(&groups) {
        let mut members = groups.remove(&root).expect("root present");
        members.sort();

        let mut combined: Option<Vec<String>> = None;
        for name in &members {
            let elig = &eligible_by_service[name];
            combined = Some(match combined {
                None => elig.clone(),
                Some(acc) => acc.into_iter().filter(|m| elig.contains(m)).collect(),
            });
        }
        let combined = combined.unwrap_or_default();
        if combined.is_empty() {
            return Err(SchedulerError::EmptyAffinityGroup { members });
        }

        let anchor_name = members.first().expect("non-empty group").clone();
        let anchor = by_name[anchor_name.as_str()];

        let effective_count = |svc: &ServiceDeployConfig| -> usize {
            match svc.placement {
                Placement::Global => combined.len(),
                Placement::Replicated => svc.replicas as usize,
            }
        };

        let mut distinct_counts: Vec<usize> = members.iter().map(|n| effective_count(by_name[n.as_str()])).collect();
        distinct_counts.sort_unstable();
        distinct_counts.dedup();
        if distinct_counts.len() > 1 {
            return Err(SchedulerError::ConflictingReplicaCounts {
                members,
                counts: distinct_counts,
            });
        }

        let chosen_machines = match anchor.placement {
            Placement::Global => combined.clone(),
            Placement::Replicated => place_replicas(anchor.replicas as usize, &combined, &mut existing, &mut cursor),
        };

        for name in &members {
            let svc = by_name[name.as_str()];
            let mut list = Vec::with_capacity(chosen_machines.len());
            for machine_id in &chosen_machines {
                let suffix = random_suffix();
                list.push(MachineAssignment {
                    machine_id: machine_id.clone(),
                    container_name: container_name(namespace, svc.name(), &suffix),
                });
            }
            assignments.insert(name.clone(), list);
        }
    }

    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ployz_core::model::{Mount, ServiceSpec};
    use std::collections::BTreeMap as Map;

    fn machine(id: &str, labels: &[(&str, &str)]) -> MachineInfo {
        MachineInfo {
            id: id.to_string(),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn replicated(name: &str, replicas: u32) -> ServiceDeployConfig {
        let mut cfg = ServiceDeployConfig::new(ServiceSpec::new(name, format!("{name}:1")));
        cfg.replicas = replicas;
        cfg
    }

    #[test]
    fn rejects_when_no_machines_have_ids() {
        let machines = vec![machine("", &[])];
        let services = vec![replicated("api", 1)];
        assert_eq!(schedule("ns", &services, &machines, &[]), Err(SchedulerError::NoMachines));
    }

    #[test]
    fn constraint_eq_filters_machines() {
        let machines = vec![machine("m1", &[("zone", "east")]), machine("m2", &[("zone", "west")])];
        let mut svc = replicated("api", 1);
        svc.constraints = vec![Constraint::new("node.labels.zone==east")];
        let result = schedule("ns", &[svc], &machines, &[]).unwrap();
        assert_eq!(result["api"].len(), 1);
        assert_eq!(result["api"][0].machine_id, "m1");
    }

    #[test]
    fn constraint_ne_matches_absent_label() {
        let machines = vec![machine("m1", &[]), machine("m2", &[("zone", "west")])];
        let mut svc = replicated("api", 2);
        svc.constraints = vec![Constraint::new("node.labels.zone!=west")];
        let result = schedule("ns", &[svc], &machines, &[]).unwrap();
        assert_eq!(result["api"].len(), 2);
        assert!(result["api"].iter().all(|a| a.machine_id == "m1"));
    }

    #[test]
    fn zero_eligible_machines_is_an_error() {
        let machines = vec![machine("m1", &[("zone", "east")])];
        let mut svc = replicated("api", 1);
        svc.constraints = vec![Constraint::new("node.labels.zone==west")];
        assert_eq!(
            schedule("ns", &[svc], &machines, &[]),
            Err(SchedulerError::NoEligibleMachines { service: "api".into() })
        );
    }

    #[test]
    fn replica_placement_spreads_under_equal_load() {
        let machines = vec![machine("m1", &[]), machine("m2", &[]), machine("m3", &[])];
        let svc = replicated("api", 3);
        let result = schedule("ns", &[svc], &machines, &[]).unwrap();
        let mut ids: Vec<String> = result["api"].iter().map(|a| a.machine_id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]);
    }

    #[test]
    fn replica_placement_is_sticky_to_existing_load() {
        let machines = vec![machine("m1", &[]), machine("m2", &[])];
        let svc = replicated("api", 1);
        let current_rows = vec![ContainerRow {
            id: "x".into(),
            namespace: "ns".into(),
            deploy_id: "d1".into(),
            service: "other".into(),
            machine_id: "m1".into(),
            container_name: "ployz-ns-other-aaaa".into(),
            spec_json: "{}".into(),
            status: ployz_core::ContainerStatus::Running,
            version: 1,
            created_at: "now".into(),
            updated_at: "now".into(),
        }];
        let result = schedule("ns", &[svc], &machines, &current_rows).unwrap();
        assert_eq!(result["api"][0].machine_id, "m2");
    }

    #[test]
    fn global_placement_uses_whole_eligible_set() {
        let machines = vec![machine("m1", &[]), machine("m2", &[]), machine("m3", &[])];
        let mut svc = replicated("agent", 1);
        svc.placement = Placement::Global;
        let result = schedule("ns", &[svc], &machines, &[]).unwrap();
        let mut ids: Vec<String> = result["agent"].iter().map(|a| a.machine_id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]);
    }

    #[test]
    fn volume_affinity_colocates_services() {
        let machines = vec![machine("m1", &[]), machine("m2", &[])];
        let mut a = replicated("a", 1);
        a.spec.mounts = vec![Mount::new("shared-data", "/data", false)];
        let mut b = replicated("b", 1);
        b.spec.mounts = vec![Mount::new("shared-data", "/data", false)];
        let result = schedule("ns", &[a, b], &machines, &[]).unwrap();
        assert_eq!(result["a"][0].machine_id, result["b"][0].machine_id);
    }

    #[test]
    fn volume_affinity_conflicting_replica_counts_is_an_error() {
        let machines = vec![machine("m1", &[]), machine("m2", &[])];
        let mut a = replicated("a", 1);
        a.spec.mounts = vec![Mount::new("shared-data", "/data", false)];
        let mut b = replicated("b", 2);
        b.spec.mounts = vec![Mount::new("shared-data", "/data", false)];
        assert!(matches!(
            schedule("ns", &[a, b], &machines, &[]),
            Err(SchedulerError::ConflictingReplicaCounts { .. })
        ));
    }

    #[test]
    fn container_name_format() {
        let name = container_name("prod", "api", "ab12");
        assert_eq!(name, "ployz-prod-api-ab12");
    }

    #[test]
    fn container_name_truncates_namespace_first() {
        let long_ns = "n".repeat(300);
        let name = container_name(&long_ns, "api", "ab12");
        assert!(name.len() <= CONTAINER_NAME_MAX_LEN);
        assert!(name.ends_with("-api-ab12"));
    }

    #[test]
    fn invalid_constraint_syntax_is_rejected() {
        let machines = vec![machine("m1", &[])];
        let mut svc = replicated("api", 1);
        svc.constraints = vec![Constraint::new("bogus")];
        assert!(matches!(
            schedule("ns", &[svc], &machines, &[]),
            Err(SchedulerError::InvalidConstraint { .. })
        ));
    }

    #[test]
    fn assignments_are_returned_in_a_btreemap_for_stable_iteration() {
        let machines = vec![machine("m1", &[])];
        let services = vec![replicated("b", 1), replicated("a", 1)];
        let result: Map<String, Vec<MachineAssignment>> = schedule("ns", &services, &machines, &[]).unwrap();
        let keys: Vec<&String> = result.keys().collect();
        assert_eq!(keys, vec![&"a".to_string(), &"b".to_string()]);
    }
}
