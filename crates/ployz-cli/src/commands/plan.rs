//! `ployz plan` - compute a DeployPlan without executing it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ployz_core::model::{ContainerRow, DeploySpec, MachineInfo};
use tracing::info;

/// Arguments for the plan command.
#[derive(Args)]
pub struct PlanArgs {
    /// Path to a JSON-encoded `DeploySpec`.
    #[arg(long)]
    pub spec: PathBuf,

    /// Path to a JSON-encoded array of `MachineInfo`.
    #[arg(long)]
    pub machines: PathBuf,

    /// Path to a JSON-encoded array of `ContainerRow` already on disk.
    /// Omit for a fresh namespace with no prior deploys.
    #[arg(long)]
    pub rows: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "text")]
    pub output: OutputFormat,
}

/// Output format for plan/apply results.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Runs the plan command: loads inputs, schedules, plans, and prints the
/// resulting `DeployPlan`.
pub fn run(args: &PlanArgs) -> Result<()> {
    let spec = read_json::<DeploySpec>(&args.spec).context("reading deploy spec")?;
    let machines = read_json::<Vec<MachineInfo>>(&args.machines).context("reading machine list")?;
    let rows = match &args.rows {
        Some(path) => read_json::<Vec<ContainerRow>>(path).context("reading current container rows")?,
        None => Vec::new(),
    };

    info!(namespace = %spec.namespace, services = spec.services.len(), machines = machines.len(), "computing deploy plan");

    let plan = build_plan(&spec, &machines, &rows)?;

    match args.output {
        OutputFormat::Text => print_text(&plan),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}

/// Runs scheduling and planning, shared with the `apply` command.
pub fn build_plan(spec: &DeploySpec, machines: &[MachineInfo], rows: &[ContainerRow]) -> Result<ployz_core::model::DeployPlan> {
    let schedule = ployz_scheduler::schedule(&spec.namespace, &spec.services, machines, rows).context("scheduling services to machines")?;
    let plan = ployz_planner::plan(spec, rows, &schedule).context("building deploy plan")?;
    Ok(plan)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {} as JSON", path.display()))
}

fn print_text(plan: &ployz_core::model::DeployPlan) {
    println!("deploy_id: {}", plan.deploy_id);
    println!("namespace: {}", plan.namespace);
    for tier in &plan.tiers {
        println!();
        println!("tier {} [{}]", tier.index, tier.name);
        print_bucket("create", &tier.create);
        print_bucket("up_to_date", &tier.up_to_date);
        print_bucket("needs_spec_update", &tier.needs_spec_update);
        print_bucket("needs_update", &tier.needs_update);
        print_bucket("needs_recreate", &tier.needs_recreate);
        print_bucket("remove", &tier.remove);
    }
}

fn print_bucket(label: &str, entries: &[ployz_core::model::PlanEntry]) {
    for entry in entries {
        println!("  [{label}] {} @ {} ({})", entry.container_name, entry.machine_id, entry.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ployz_core::model::ServiceDeployConfig;
    use ployz_core::ServiceSpec;

    #[test]
    fn build_plan_schedules_and_plans_a_fresh_service() {
        let spec = DeploySpec {
            namespace: "ns".into(),
            services: vec![ServiceDeployConfig::new(ServiceSpec::new("api", "api:1"))],
        };
        let machines = vec![MachineInfo {
            id: "m1".into(),
            labels: Default::default(),
        }];

        let plan = build_plan(&spec, &machines, &[]).unwrap();
        assert_eq!(plan.namespace, "ns");
        assert_eq!(plan.tiers.len(), 1);
        assert_eq!(plan.tiers[0].create.len(), 1);
    }

    #[test]
    fn build_plan_fails_with_no_eligible_machines() {
        let spec = DeploySpec {
            namespace: "ns".into(),
            services: vec![ServiceDeployConfig::new(ServiceSpec::new("api", "api:1"))],
        };
        assert!(build_plan(&spec, &[], &[]).is_err());
    }
}
