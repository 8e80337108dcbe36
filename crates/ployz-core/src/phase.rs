//! Phase state machines (C8, §3 / §4.8).
//!
//! Every enum here is a small tagged value with a canonical lowercase string
//! form, a parse inverse, an `is_valid` predicate over transitions, and a
//! `transition` that asserts legality in debug builds and silently stays put
//! on an illegal transition in release builds. The core never performs an
//! illegal transition; it is a programmer error to attempt one.

use std::fmt;
use std::str::FromStr;

/// The overall phase of a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    /// Currently being applied.
    InProgress,
    /// Applied successfully.
    Succeeded,
    /// Applied and failed.
    Failed,
}

impl DeployPhase {
    /// The canonical lowercase string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true if `self -> to` is a legal transition.
    ///
    /// `in_progress -> {succeeded, failed}`; `failed -> in_progress` is the
    /// only legal retry. All other pairs, including self-transitions, are
    /// illegal.
    #[must_use]
    pub fn is_valid(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::InProgress, Self::Succeeded)
                | (Self::InProgress, Self::Failed)
                | (Self::Failed, Self::InProgress)
        )
    }

    /// Transitions to `to` if legal. Asserts legality in debug builds;
    /// silently leaves `self` unchanged on an illegal transition in release
    /// builds.
    pub fn transition(&mut self, to: Self) {
        debug_assert!(self.is_valid(to), "illegal DeployPhase transition {self:?} -> {to:?}");
        if self.is_valid(to) {
            *self = to;
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployPhase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(ParsePhaseError::unknown("DeployPhase", other)),
        }
    }
}

/// The phase of a single tier within a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierPhase {
    /// Not yet started.
    Pending,
    /// Currently executing bucket actions.
    Executing,
    /// Waiting on health checks.
    Health,
    /// Running the postcondition checker.
    Postcondition,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished unsuccessfully. Terminal.
    Failed,
    /// Rolled back after a health failure. Terminal.
    RolledBack,
}

impl TierPhase {
    /// The canonical lowercase string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Health => "health",
            Self::Postcondition => "postcondition",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Returns true if this phase has no legal outgoing transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }

    /// Returns true if `self -> to` is a legal transition.
    ///
    /// `pending -> executing -> {health -> {postcondition -> {completed|failed}
    /// | failed | rolled_back} | postcondition | failed | rolled_back}`.
    #[must_use]
    pub fn is_valid(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Executing)
                | (Self::Executing, Self::Health)
                | (Self::Executing, Self::Postcondition)
                | (Self::Executing, Self::Failed)
                | (Self::Executing, Self::RolledBack)
                | (Self::Health, Self::Postcondition)
                | (Self::Health, Self::Failed)
                | (Self::Health, Self::RolledBack)
                | (Self::Postcondition, Self::Completed)
                | (Self::Postcondition, Self::Failed)
        )
    }

    /// Transitions to `to` if legal; silent no-op otherwise (debug-asserts).
    pub fn transition(&mut self, to: Self) {
        debug_assert!(self.is_valid(to), "illegal TierPhase transition {self:?} -> {to:?}");
        if self.is_valid(to) {
            *self = to;
        }
    }
}

impl fmt::Display for TierPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierPhase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "executing" => Ok(Self::Executing),
            "health" => Ok(Self::Health),
            "postcondition" => Ok(Self::Postcondition),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(ParsePhaseError::unknown("TierPhase", other)),
        }
    }
}

/// The ownership-lease phase for a deploy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPhase {
    /// No lease has been acquired or checked yet.
    Unknown,
    /// This machine holds the lease.
    Held,
    /// The lease was lost (another machine took it, or it expired). Terminal.
    Lost,
}

impl OwnershipPhase {
    /// The canonical lowercase string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Held => "held",
            Self::Lost => "lost",
        }
    }

    /// Returns true if `self -> to` is a legal transition.
    ///
    /// `unknown -> {held, lost}`; `held -> lost`; `lost` is terminal.
    #[must_use]
    pub fn is_valid(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Unknown, Self::Held) | (Self::Unknown, Self::Lost) | (Self::Held, Self::Lost)
        )
    }

    /// Transitions to `to` if legal; silent no-op otherwise (debug-asserts).
    pub fn transition(&mut self, to: Self) {
        debug_assert!(self.is_valid(to), "illegal OwnershipPhase transition {self:?} -> {to:?}");
        if self.is_valid(to) {
            *self = to;
        }
    }
}

impl fmt::Display for OwnershipPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnershipPhase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "held" => Ok(Self::Held),
            "lost" => Ok(Self::Lost),
            other => Err(ParsePhaseError::unknown("OwnershipPhase", other)),
        }
    }
}

/// The stage of the executor pipeline a `DeployError` occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployErrorPhase {
    /// Failed to acquire or retain the ownership lease.
    Ownership,
    /// Failed to pre-pull an image before executing a tier.
    PrePull,
    /// Failed while executing a bucket action.
    Execute,
    /// A new container failed to become healthy.
    Health,
    /// Actual and expected post-tier state disagreed.
    Postcondition,
}

impl DeployErrorPhase {
    /// The canonical lowercase string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ownership => "ownership",
            Self::PrePull => "pre-pull",
            Self::Execute => "execute",
            Self::Health => "health",
            Self::Postcondition => "postcondition",
        }
    }

    /// `DeployErrorPhase` tags a `DeployError` once at construction rather
    /// than evolving through a sequence, so every value is reachable from
    /// every other; this always returns true.
    #[must_use]
    pub fn is_valid(self, _to: Self) -> bool {
        true
    }

    /// Sets `self` to `to`. `DeployErrorPhase` has no illegal transitions
    /// (see [`Self::is_valid`]), so this always succeeds.
    pub fn transition(&mut self, to: Self) {
        *self = to;
    }
}

impl fmt::Display for DeployErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployErrorPhase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ownership" => Ok(Self::Ownership),
            "pre-pull" => Ok(Self::PrePull),
            "execute" => Ok(Self::Execute),
            "health" => Ok(Self::Health),
            "postcondition" => Ok(Self::Postcondition),
            other => Err(ParsePhaseError::unknown("DeployErrorPhase", other)),
        }
    }
}

/// Failure to parse a phase enum's canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {enum_name} value: {value:?}")]
pub struct ParsePhaseError {
    enum_name: &'static str,
    value: String,
}

impl ParsePhaseError {
    fn unknown(enum_name: &'static str, value: &str) -> Self {
        Self {
            enum_name,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_phase_round_trip() {
        for phase in [DeployPhase::InProgress, DeployPhase::Succeeded, DeployPhase::Failed] {
            assert_eq!(phase.as_str().parse::<DeployPhase>().unwrap(), phase);
        }
    }

    #[test]
    fn deploy_phase_retry_is_only_legal_failed_transition() {
        assert!(DeployPhase::Failed.is_valid(DeployPhase::InProgress));
        assert!(!DeployPhase::Failed.is_valid(DeployPhase::Succeeded));
        assert!(!DeployPhase::Succeeded.is_valid(DeployPhase::InProgress));
    }

    #[test]
    fn deploy_phase_illegal_transition_is_noop_in_release_semantics() {
        let mut phase = DeployPhase::Succeeded;
        if !phase.is_valid(DeployPhase::Failed) {
            let before = phase;
            // Mirrors release-mode behavior directly, without relying on
            // debug_assert actually panicking under `cfg(debug_assertions)`.
            if before.is_valid(DeployPhase::Failed) {
                phase = DeployPhase::Failed;
            }
            assert_eq!(phase, before);
        }
    }

    #[test]
    fn tier_phase_terminal_states() {
        assert!(TierPhase::Completed.is_terminal());
        assert!(TierPhase::Failed.is_terminal());
        assert!(TierPhase::RolledBack.is_terminal());
        assert!(!TierPhase::Pending.is_terminal());
        assert!(!TierPhase::Health.is_terminal());
    }

    #[test]
    fn tier_phase_full_happy_path() {
        let mut phase = TierPhase::Pending;
        phase.transition(TierPhase::Executing);
        assert_eq!(phase, TierPhase::Executing);
        phase.transition(TierPhase::Health);
        assert_eq!(phase, TierPhase::Health);
        phase.transition(TierPhase::Postcondition);
        assert_eq!(phase, TierPhase::Postcondition);
        phase.transition(TierPhase::Completed);
        assert_eq!(phase, TierPhase::Completed);
    }

    #[test]
    fn tier_phase_executing_can_skip_health() {
        assert!(TierPhase::Executing.is_valid(TierPhase::Postcondition));
    }

    #[test]
    fn ownership_phase_lost_is_terminal() {
        assert!(!OwnershipPhase::Lost.is_valid(OwnershipPhase::Held));
        assert!(!OwnershipPhase::Lost.is_valid(OwnershipPhase::Unknown));
    }

    #[test]
    fn parse_errors_on_unknown_value() {
        assert!("bogus".parse::<DeployPhase>().is_err());
        assert!("bogus".parse::<TierPhase>().is_err());
        assert!("bogus".parse::<OwnershipPhase>().is_err());
        assert!("bogus".parse::<DeployErrorPhase>().is_err());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(DeployErrorPhase::PrePull.to_string(), "pre-pull");
        assert_eq!(TierPhase::RolledBack.to_string(), "rolled_back");
    }
}
