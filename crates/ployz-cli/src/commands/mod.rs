//! CLI commands and argument parsing.

pub mod apply;
pub mod describe_phase;
pub mod plan;

use clap::{Parser, Subcommand};

/// ployz - operator aid for the deploy engine's plan/apply pipeline.
#[derive(Parser)]
#[command(name = "ployz")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Compute a DeployPlan from a spec, a machine list, and optional
    /// current container rows, without executing it.
    Plan(plan::PlanArgs),

    /// Compute a DeployPlan, then drive it to convergence against the
    /// in-memory fakes (not a real cluster; see the crate docs).
    Apply(apply::ApplyArgs),

    /// Parse a phase string through one of the C8 phase enums and print its
    /// canonical form, or check a transition between two phase strings.
    DescribePhase(describe_phase::DescribePhaseArgs),

    /// Print version information.
    Version,
}
