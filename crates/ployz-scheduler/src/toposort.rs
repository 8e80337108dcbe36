//! Topological sorting of services into dependency tiers (C3, §4.3).

use std::collections::{BTreeMap, BTreeSet};

use ployz_core::ServiceDeployConfig;

use crate::error::{Result, SchedulerError};

/// Topologically sorts `services` into tiers: each tier is a list of
/// service names (lexically sorted) whose `depends_on` entries are all in
/// strictly earlier tiers.
///
/// Uses Kahn's algorithm. Both the ready queue and each node's adjacency
/// list are processed in lexical order, so the result is fully
/// deterministic for a given input set.
///
/// # Errors
///
/// Returns [`SchedulerError::EmptyServiceName`], [`SchedulerError::DuplicateService`],
/// [`SchedulerError::SelfDependency`], [`SchedulerError::UnknownDependency`], or
/// [`SchedulerError::Cycle`].
pub fn toposort(services: &[ServiceDeployConfig]) -> Result<Vec<Vec<String>>> {
    let mut seen = BTreeSet::new();
    for (index, svc) in services.iter().enumerate() {
        if svc.name().is_empty() {
            return Err(SchedulerError::EmptyServiceName { index });
        }
        if !seen.insert(svc.name().to_string()) {
            return Err(SchedulerError::DuplicateService {
                name: svc.name().to_string(),
            });
        }
    }

    // dependents[x] = services that depend on x, i.e. edges x -> dependent.
    let mut dependents: BTreeMap<String, BTreeSet<String>> =
        services.iter().map(|s| (s.name().to_string(), BTreeSet::new())).collect();
    let mut in_degree: BTreeMap<String, usize> =
        services.iter().map(|s| (s.name().to_string(), 0)).collect();

    for svc in services {
        for dep in &svc.depends_on {
            if dep == svc.name() {
                return Err(SchedulerError::SelfDependency {
                    name: svc.name().to_string(),
                });
            }
            if !seen.contains(dep) {
                return Err(SchedulerError::UnknownDependency {
                    name: svc.name().to_string(),
                    dependency: dep.clone(),
                });
            }
            dependents.get_mut(dep).expect("dep validated above").insert(svc.name().to_string());
            *in_degree.get_mut(svc.name()).expect("service present") += 1;
        }
    }

    let mut tiers = Vec::new();
    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(name, _)| name.clone())
        .collect();
    let mut resolved = 0usize;

    while !ready.is_empty() {
        let tier: Vec<String> = ready.iter().cloned().collect();
        resolved += tier.len();

        let mut next_ready = BTreeSet::new();
        for name in &tier {
            for dependent in &dependents[name] {
                let deg = in_degree.get_mut(dependent).expect("dependent present");
                *deg -= 1;
                if *deg == 0 {
                    next_ready.insert(dependent.clone());
                }
            }
        }

        tiers.push(tier);
        ready = next_ready;
    }

    if resolved != services.len() {
        let mut remaining: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(name, _)| name)
            .collect();
        remaining.sort();
        return Err(SchedulerError::Cycle { remaining });
    }

    Ok(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ployz_core::ServiceSpec;

    fn svc(name: &str, deps: &[&str]) -> ServiceDeployConfig {
        let mut cfg = ServiceDeployConfig::new(ServiceSpec::new(name, format!("{name}:1")));
        cfg.depends_on = deps.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[test]
    fn independent_services_share_one_tier() {
        let services = vec![svc("b", &[]), svc("a", &[])];
        let tiers = toposort(&services).unwrap();
        assert_eq!(tiers, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn chain_produces_one_tier_per_link() {
        let services = vec![svc("c", &["b"]), svc("b", &["a"]), svc("a", &[])];
        let tiers = toposort(&services).unwrap();
        assert_eq!(
            tiers,
            vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]
        );
    }

    #[test]
    fn diamond_dependency() {
        let services = vec![svc("d", &["b", "c"]), svc("c", &["a"]), svc("b", &["a"]), svc("a", &[])];
        let tiers = toposort(&services).unwrap();
        assert_eq!(
            tiers,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn detects_self_dependency() {
        let services = vec![svc("a", &["a"])];
        assert_eq!(
            toposort(&services),
            Err(SchedulerError::SelfDependency { name: "a".into() })
        );
    }

    #[test]
    fn detects_unknown_dependency() {
        let services = vec![svc("a", &["missing"])];
        assert_eq!(
            toposort(&services),
            Err(SchedulerError::UnknownDependency {
                name: "a".into(),
                dependency: "missing".into()
            })
        );
    }

    #[test]
    fn detects_duplicate_service() {
        let services = vec![svc("a", &[]), svc("a", &[])];
        assert_eq!(
            toposort(&services),
            Err(SchedulerError::DuplicateService { name: "a".into() })
        );
    }

    #[test]
    fn detects_empty_name() {
        let services = vec![svc("", &[])];
        assert_eq!(toposort(&services), Err(SchedulerError::EmptyServiceName { index: 0 }));
    }

    #[test]
    fn detects_cycle() {
        let services = vec![svc("a", &["b"]), svc("b", &["a"])];
        match toposort(&services) {
            Err(SchedulerError::Cycle { remaining }) => {
                assert_eq!(remaining, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let services = vec![svc("c", &["a"]), svc("b", &["a"]), svc("a", &[])];
        let first = toposort(&services).unwrap();
        let second = toposort(&services).unwrap();
        assert_eq!(first, second);
    }
}
