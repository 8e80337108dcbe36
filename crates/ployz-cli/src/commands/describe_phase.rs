//! `ployz describe-phase` - parse a phase string through one of the C8
//! phase enums, print its canonical form, and optionally check whether a
//! transition to another phase string would be legal.
//!
//! Useful for shell-scripted probing of a stored phase value without
//! pulling in the whole crate.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use ployz_core::phase::{DeployErrorPhase, DeployPhase, OwnershipPhase, TierPhase};

/// Which phase state machine to parse against.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PhaseKind {
    Deploy,
    Tier,
    Ownership,
    Error,
}

/// Arguments for the describe-phase command.
#[derive(Args)]
pub struct DescribePhaseArgs {
    /// Which phase enum to parse against.
    #[arg(value_enum)]
    pub kind: PhaseKind,

    /// The phase string to parse (e.g. `in_progress`, `health`).
    pub value: String,

    /// If given, check whether `value -> to` is a legal transition.
    /// Not meaningful for `error`, which has no transitions.
    #[arg(long)]
    pub to: Option<String>,
}

pub fn run(args: &DescribePhaseArgs) -> Result<()> {
    match args.kind {
        PhaseKind::Deploy => describe::<DeployPhase>(&args.value, args.to.as_deref(), DeployPhase::is_valid),
        PhaseKind::Tier => describe::<TierPhase>(&args.value, args.to.as_deref(), TierPhase::is_valid),
        PhaseKind::Ownership => describe::<OwnershipPhase>(&args.value, args.to.as_deref(), OwnershipPhase::is_valid),
        PhaseKind::Error => {
            if args.to.is_some() {
                bail!("DeployErrorPhase has no transitions; --to is not meaningful here");
            }
            describe_no_transitions::<DeployErrorPhase>(&args.value)
        }
    }
}

fn describe<P>(value: &str, to: Option<&str>, is_valid: impl Fn(P, P) -> bool) -> Result<()>
where
    P: std::str::FromStr + std::fmt::Display + Copy,
    P::Err: std::fmt::Display,
{
    let parsed: P = value.parse().map_err(|err| anyhow::anyhow!("{err}"))?;
    println!("{parsed}");

    if let Some(to) = to {
        let target: P = to.parse().map_err(|err| anyhow::anyhow!("{err}"))?;
        println!("{parsed} -> {target}: {}", if is_valid(parsed, target) { "legal" } else { "illegal" });
    }
    Ok(())
}

fn describe_no_transitions<P>(value: &str) -> Result<()>
where
    P: std::str::FromStr + std::fmt::Display,
    P::Err: std::fmt::Display,
{
    let parsed: P = value.parse().map_err(|err| anyhow::anyhow!("{err}"))?;
    println!("{parsed}");
    Ok(())
}
