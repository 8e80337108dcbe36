//! Change classification (C2, §4.2).

use crate::canonical::{canonicalize, equal};
use crate::model::ServiceSpec;

/// The classification of a change between a current and incoming spec.
///
/// `NeedsSpecUpdate` is not produced here — it requires the *stored*
/// canonical JSON, which only the Planner has (§4.2); the Planner promotes
/// a classifier `UpToDate` result to `NeedsSpecUpdate` when the stored bytes
/// differ from the re-encoded incoming canonical spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Canonical specs are identical; no action needed.
    UpToDate,
    /// Stored metadata drift only; a row rewrite with no container action.
    /// Only ever produced by the Planner's promotion step.
    NeedsSpecUpdate,
    /// Only `resources` differ; a live container update suffices.
    NeedsUpdate,
    /// Anything else changed; the container must be recreated.
    NeedsRecreate,
}

/// Classifies the change from `current` to `incoming`.
///
/// Equal canonical specs classify as `UpToDate`. Otherwise, specs with
/// `resources` stripped are compared again: if those match, the only
/// difference is resource limits, which live containers can absorb
/// (`NeedsUpdate`); anything else requires `NeedsRecreate`.
#[must_use]
pub fn classify(current: &ServiceSpec, incoming: &ServiceSpec) -> ChangeKind {
    if equal(current, incoming) {
        return ChangeKind::UpToDate;
    }

    let mut current_no_res = canonicalize(current);
    let mut incoming_no_res = canonicalize(incoming);
    current_no_res.resources = None;
    incoming_no_res.resources = None;

    if current_no_res == incoming_no_res {
        ChangeKind::NeedsUpdate
    } else {
        ChangeKind::NeedsRecreate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resources;

    fn base() -> ServiceSpec {
        ServiceSpec::new("api", "api:1")
    }

    #[test]
    fn identical_specs_are_up_to_date() {
        let a = base();
        let b = base();
        assert_eq!(classify(&a, &b), ChangeKind::UpToDate);
    }

    #[test]
    fn resource_only_change_needs_update() {
        let a = base();
        let mut b = base();
        b.resources = Some(Resources {
            cpu_limit: 1.0,
            memory_limit: 1_000_000,
        });
        assert_eq!(classify(&a, &b), ChangeKind::NeedsUpdate);
    }

    #[test]
    fn image_change_needs_recreate() {
        let a = base();
        let b = ServiceSpec::new("api", "api:2");
        assert_eq!(classify(&a, &b), ChangeKind::NeedsRecreate);
    }

    #[test]
    fn image_and_resource_change_needs_recreate() {
        let a = base();
        let mut b = ServiceSpec::new("api", "api:2");
        b.resources = Some(Resources {
            cpu_limit: 1.0,
            memory_limit: 1_000_000,
        });
        assert_eq!(classify(&a, &b), ChangeKind::NeedsRecreate);
    }

    #[test]
    fn classify_is_reflexive() {
        let a = base();
        assert_eq!(classify(&a, &a), ChangeKind::UpToDate);
    }
}
