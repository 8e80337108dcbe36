//! Spec normalization (C1, §4.1).
//!
//! `canonicalize` produces a form where nil-vs-empty never produces
//! inequality: environment is sorted, mounts and ports are sorted by their
//! respective sort keys, and empty/all-zero sub-records collapse to absent.
//! It is idempotent and stable under a JSON encode/decode round trip.

use crate::model::ServiceSpec;

/// Normalizes a service spec into its canonical form.
///
/// `canonicalize(canonicalize(x)) == canonicalize(x)` for all `x`, and
/// `canonicalize(x)` is unchanged by a JSON encode/decode round trip.
#[must_use]
pub fn canonicalize(spec: &ServiceSpec) -> ServiceSpec {
    let mut out = spec.clone();

    out.environment.sort();
    out.environment.dedup();

    out.mounts.sort_by_key(super::model::Mount::sort_key);

    out.ports.sort_by_key(super::model::PortMapping::sort_key);
    out.ports.dedup();

    if let Some(hc) = &out.health_check {
        if hc.is_disabled() {
            out.health_check = None;
        }
    }

    if let Some(res) = &out.resources {
        if res.is_all_zero() {
            out.resources = None;
        }
    }

    out
}

/// Returns true if `a` and `b` are equal in canonical form.
#[must_use]
pub fn equal(a: &ServiceSpec, b: &ServiceSpec) -> bool {
    canonicalize(a) == canonicalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HealthCheck, Mount, PortMapping, Protocol, Resources, RestartPolicy};

    fn base() -> ServiceSpec {
        ServiceSpec::new("api", "api:1")
    }

    #[test]
    fn idempotent() {
        let mut spec = base();
        spec.environment = vec!["B=2".into(), "A=1".into()];
        spec.mounts = vec![Mount::new("data", "/data", false), Mount::new("cfg", "/cfg", true)];
        let once = canonicalize(&spec);
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn json_round_trip_stable() {
        let mut spec = base();
        spec.ports = vec![PortMapping::new(8080, 80, Protocol::Tcp)];
        let canon = canonicalize(&spec);
        let encoded = serde_json::to_string(&canon).unwrap();
        let decoded: ServiceSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(canon, decoded);
    }

    #[test]
    fn environment_sorted_ascending() {
        let mut spec = base();
        spec.environment = vec!["Z=1".into(), "A=2".into(), "M=3".into()];
        let canon = canonicalize(&spec);
        assert_eq!(canon.environment, vec!["A=2".to_string(), "M=3".to_string(), "Z=1".to_string()]);
    }

    #[test]
    fn mounts_sorted_by_key() {
        let mut spec = base();
        spec.mounts = vec![
            Mount::new("data", "/data", false),
            Mount::new("data", "/data", true),
            Mount::new("cfg", "/cfg", false),
        ];
        let canon = canonicalize(&spec);
        assert_eq!(
            canon.mounts,
            vec![
                Mount::new("cfg", "/cfg", false),
                Mount::new("data", "/data", false),
                Mount::new("data", "/data", true),
            ]
        );
    }

    #[test]
    fn disabled_health_check_collapses_to_absent() {
        let mut spec = base();
        spec.health_check = Some(HealthCheck {
            test: vec!["CMD".into(), "true".into()],
            interval_secs: 10,
            timeout_secs: 5,
            retries: 3,
            start_period_secs: 0,
            disable: true,
        });
        assert_eq!(canonicalize(&spec).health_check, None);
    }

    #[test]
    fn all_zero_resources_collapse_to_absent() {
        let mut spec = base();
        spec.resources = Some(Resources {
            cpu_limit: 0.0,
            memory_limit: 0,
        });
        assert_eq!(canonicalize(&spec).resources, None);
    }

    #[test]
    fn equal_ignores_environment_order() {
        let mut a = base();
        a.environment = vec!["A=1".into(), "B=2".into()];
        let mut b = base();
        b.environment = vec!["B=2".into(), "A=1".into()];
        assert!(equal(&a, &b));
    }

    #[test]
    fn equal_detects_real_differences() {
        let a = base();
        let mut b = base();
        b.restart_policy = RestartPolicy::Always;
        assert!(!equal(&a, &b));
    }
}
