//! `ployz apply` - plan, then drive the plan to convergence against the
//! in-memory fakes from `ployz-test`.
//!
//! This is an operator aid for exercising the executor, not a production
//! deploy path: a real deployment talks to the real cluster's container
//! runtime and replicated stores (out of scope for this crate).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use ployz_core::model::{ContainerRow, DeploySpec, MachineInfo, ServiceSpec};
use ployz_executor::ports::CreateConfig;
use ployz_executor::{apply as execute_plan, Cancel, ChannelEventSink, ExecutorConfig, Observability};

use super::plan::{build_plan, OutputFormat};

/// Arguments for the apply command.
#[derive(Args)]
pub struct ApplyArgs {
    /// Path to a JSON-encoded `DeploySpec`.
    #[arg(long)]
    pub spec: PathBuf,

    /// Path to a JSON-encoded array of `MachineInfo`.
    #[arg(long)]
    pub machines: PathBuf,

    /// Path to a JSON-encoded array of `ContainerRow` already on disk.
    #[arg(long)]
    pub rows: Option<PathBuf>,

    /// The machine this process is acting as.
    #[arg(long)]
    pub machine_id: String,

    /// Output format for the final result.
    #[arg(short, long, default_value = "text")]
    pub output: OutputFormat,
}

pub async fn run(args: &ApplyArgs) -> Result<()> {
    let spec = read_json::<DeploySpec>(&args.spec).context("reading deploy spec")?;
    let machines = read_json::<Vec<MachineInfo>>(&args.machines).context("reading machine list")?;
    let rows = match &args.rows {
        Some(path) => read_json::<Vec<ContainerRow>>(path).context("reading current container rows")?,
        None => Vec::new(),
    };

    let deploy_plan = build_plan(&spec, &machines, &rows)?;

    let cluster = ployz_test::FakeCluster::new();
    for row in &rows {
        if row.machine_id != args.machine_id {
            continue;
        }
        if let Ok(existing_spec) = serde_json::from_str::<ServiceSpec>(&row.spec_json) {
            let config = build_create_config(row, &existing_spec, &spec.namespace);
            cluster.runtime.container_create(config).await.ok();
            cluster.runtime.container_start(&row.container_name).await.ok();
        }
        cluster.container_store.insert(row.clone()).await.ok();
    }

    let (sink, mut rx) = ChannelEventSink::new(256);
    let sink: Arc<dyn ployz_executor::EventSink> = Arc::new(sink);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}: {}", event.kind, event.message);
        }
    });

    let result = execute_plan(
        &deploy_plan,
        &args.machine_id,
        &cluster.ports(),
        Some(sink),
        &ExecutorConfig::default(),
        &Cancel::new(),
        &Observability::default(),
    )
    .await;

    let _ = printer.await;

    match (&result, args.output) {
        (Ok(applied), OutputFormat::Text) => {
            println!();
            println!("deploy {} succeeded ({} tiers)", applied.deploy_id, applied.tiers.len());
        }
        (Ok(applied), OutputFormat::Json) => {
            let summary = serde_json::json!({
                "namespace": applied.namespace,
                "deploy_id": applied.deploy_id,
                "tiers": applied.tiers,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        (Err(err), OutputFormat::Text) => println!("\n{err}"),
        (Err(err), OutputFormat::Json) => {
            let summary = serde_json::json!({
                "namespace": err.namespace,
                "phase": err.phase.as_str(),
                "tier_idx": err.tier_idx,
                "tier_name": err.tier_name,
                "tiers": err.tiers,
                "message": err.message,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    if result.is_err() {
        anyhow::bail!("deploy did not converge");
    }
    Ok(())
}

fn build_create_config(row: &ContainerRow, spec: &ServiceSpec, namespace: &str) -> CreateConfig {
    let mut labels = spec.labels.clone();
    labels.insert("ployz.namespace".to_string(), namespace.to_string());
    labels.insert("ployz.service".to_string(), row.service.clone());
    labels.insert("ployz.deploy_id".to_string(), row.deploy_id.clone());
    labels.insert("ployz.machine_id".to_string(), row.machine_id.clone());

    CreateConfig {
        name: row.container_name.clone(),
        image: spec.image.clone(),
        cmd: spec.command.clone(),
        env: spec.environment.clone(),
        network_mode: String::new(),
        mounts: spec.mounts.clone(),
        ports: spec.ports.clone(),
        labels,
        restart_policy: spec.restart_policy,
        health_check: spec.health_check.clone(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {} as JSON", path.display()))
}
