//! Postcondition Checker (C7, §4.7).

use std::collections::{BTreeMap, BTreeSet};

use ployz_core::error::{ContainerDiagnostic, ContainerDiagnosticKind};
use ployz_core::model::Tier;

use crate::ports::ContainerState;

/// One container this tier expects to be running, by the time the
/// postcondition check runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedContainer {
    /// Container name.
    pub container_name: String,
    /// Expected image.
    pub image: String,
}

/// Builds the expected-container set for a tier: every non-`Remove` bucket,
/// deduplicated by container name, in bucket order
/// (`create, up_to_date, needs_spec_update, needs_update, needs_recreate`).
#[must_use]
pub fn expected_containers(tier: &Tier) -> Vec<ExpectedContainer> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for entry in tier
        .create
        .iter()
        .chain(tier.up_to_date.iter())
        .chain(tier.needs_spec_update.iter())
        .chain(tier.needs_update.iter())
        .chain(tier.needs_recreate.iter())
    {
        if seen.insert(entry.container_name.clone()) {
            out.push(ExpectedContainer {
                container_name: entry.container_name.clone(),
                image: entry.spec.image.clone(),
            });
        }
    }
    out
}

/// Compares `actual` against `expected`, producing one [`ContainerDiagnostic`]
/// per expected container (§4.7): absent is `missing`, present-but-not-running
/// is `stopped image=<actual>`, running-with-wrong-image is `running
/// image=<actual>` (a mismatch), running-with-matching-image is a match.
#[must_use]
pub fn assert_tier_state(actual: &[ContainerState], expected: &[ExpectedContainer]) -> Vec<ContainerDiagnostic> {
    let actual_by_name: BTreeMap<&str, &ContainerState> = actual.iter().map(|c| (c.name.as_str(), c)).collect();

    expected
        .iter()
        .map(|exp| {
            let expected_str = format!("running image={}", exp.image);
            let actual_kind = match actual_by_name.get(exp.container_name.as_str()) {
                None => ContainerDiagnosticKind::Missing,
                Some(c) if !c.running => ContainerDiagnosticKind::Stopped { image: c.image.clone() },
                Some(c) if c.image != exp.image => ContainerDiagnosticKind::Mismatch { image: c.image.clone() },
                Some(c) => ContainerDiagnosticKind::Match { image: c.image.clone() },
            };
            ContainerDiagnostic {
                container_name: exp.container_name.clone(),
                expected: expected_str,
                actual: actual_kind,
            }
        })
        .collect()
}

/// Returns true if any diagnostic in `diagnostics` is a postcondition
/// violation.
#[must_use]
pub fn has_mismatch(diagnostics: &[ContainerDiagnostic]) -> bool {
    diagnostics.iter().any(|d| d.actual.is_mismatch())
}
