//! The tier-by-tier execution entry point (C6, §4.6).
//!
//! [`apply`] drives one plan to convergence on one machine: preflight
//! (ownership, heartbeat), a per-tier loop (cancellation, pre-pull,
//! intra-tier bucket execution, postcondition check), and postflight
//! (final status, lease release). Every external effect goes through the
//! [`crate::ports`] traits, bundled here as [`ExecutorPorts`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use ployz_core::error::{DeployError, TierResult};
use ployz_core::model::{
    ContainerRow, ContainerStatus, DeployPlan, DeploymentRow, HealthCheck, PlanEntry, ServiceSpec, Tier, UpdateOrder,
};
use ployz_core::phase::{DeployErrorPhase, DeployPhase, TierPhase};
use ployz_metrics::Outcome;

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::events::{EventSink, ProgressEvent, ProgressEventKind};
use crate::observability::Observability;
use crate::ports::{Clock, ContainerRuntime, ContainerStore, CreateConfig, DeploymentStore, HealthChecker, ResourceConfig, StateReader};
use crate::postcondition::{assert_tier_state, expected_containers, has_mismatch};
use crate::rollback::{self, RollbackAction, RollbackLog};

/// The collaborators [`apply`] drives. Bundled into one struct so the
/// entry point doesn't carry six separate `Arc` parameters.
#[derive(Clone)]
pub struct ExecutorPorts {
    /// The container engine on this machine.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Container-row persistence.
    pub container_store: Arc<dyn ContainerStore>,
    /// Deployment-row persistence and ownership arbitration.
    pub deployment_store: Arc<dyn DeploymentStore>,
    /// Blocks until a container is healthy.
    pub health: Arc<dyn HealthChecker>,
    /// Reads actual container state for postcondition verification.
    pub state_reader: Arc<dyn StateReader>,
    /// The current-time source.
    pub clock: Arc<dyn Clock>,
}

/// A cooperative cancellation flag, checked only at tier boundaries (§5).
#[derive(Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    /// Creates a not-yet-cancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Takes effect at the next tier boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The successful outcome of [`apply`].
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// The target namespace.
    pub namespace: String,
    /// The deploy id that converged.
    pub deploy_id: String,
    /// Results for every tier, in order.
    pub tiers: Vec<TierResult>,
}

/// Applies `plan` on `machine_id`, converging every tier in order.
///
/// This is the only public entry point for C6; all bucket-execution and
/// rollback machinery below is implementation detail reached through it.
#[allow(clippy::too_many_arguments)]
pub async fn apply(
    plan: &DeployPlan,
    machine_id: &str,
    ports: &ExecutorPorts,
    events: Option<Arc<dyn EventSink>>,
    config: &ExecutorConfig,
    cancel: &Cancel,
    observability: &Observability,
) -> Result<ApplyResult, DeployError> {
    let namespace = plan.namespace.as_str();
    let now = ports.clock.now();

    observability.deploy_started(namespace, &plan.deploy_id);

    if let Err(err) = preflight(plan, machine_id, ports, now).await {
        observability.deploy_finished(namespace, &plan.deploy_id, Outcome::Failed, err.to_string());
        return Err(DeployError::without_tier(namespace, err.phase(), err.to_string()));
    }

    let (stop_heartbeat, heartbeat_handle) = spawn_heartbeat(
        plan.deploy_id.clone(),
        machine_id.to_string(),
        Arc::clone(&ports.deployment_store),
        Arc::clone(&ports.clock),
        config.heartbeat_interval,
    );

    let result = run_tiers(plan, machine_id, ports, events.as_deref(), cancel, observability).await;

    let _ = stop_heartbeat.send(());
    let _ = heartbeat_handle.await;

    let final_status = if result.is_ok() { DeployPhase::Succeeded } else { DeployPhase::Failed };
    let postflight_failure = postflight(plan, ports, final_status).await;

    let outcome = if result.is_ok() && postflight_failure.is_none() { Outcome::Ok } else { Outcome::Failed };
    let summary = match (&result, &postflight_failure) {
        (Ok(_), None) => "deploy converged".to_string(),
        (Ok(_), Some(pf_err)) => format!("deploy converged but postflight failed: {pf_err}"),
        (Err(err), _) => err.message.clone(),
    };
    observability.deploy_finished(namespace, &plan.deploy_id, outcome, summary);

    match (result, postflight_failure) {
        (Ok(applied), None) => Ok(applied),
        (Ok(applied), Some(pf_err)) => {
            let (tier_idx, tier_name) = applied
                .tiers
                .last()
                .map(|t| (t.index, t.name.clone()))
                .unzip();
            Err(match tier_idx {
                Some(idx) => DeployError::at_tier(
                    namespace,
                    DeployErrorPhase::Execute,
                    idx,
                    tier_name.unwrap_or_default(),
                    applied.tiers,
                    format!("deploy converged but postflight failed: {pf_err}"),
                ),
                None => DeployError::without_tier(
                    namespace,
                    DeployErrorPhase::Execute,
                    format!("deploy converged but postflight failed: {pf_err}"),
                ),
            })
        }
        (Err(mut err), Some(pf_err)) => {
            err.message = format!("{}; postflight also failed: {pf_err}", err.message);
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}

async fn preflight(plan: &DeployPlan, machine_id: &str, ports: &ExecutorPorts, now: DateTime<Utc>) -> Result<(), ExecutorError> {
    let now_str = format_timestamp(now);

    let existing = ports
        .deployment_store
        .get(&plan.deploy_id)
        .await
        .map_err(ExecutorError::Ownership)?;

    let plan_json = serde_json::to_string(plan).map_err(|err| ExecutorError::Ownership(crate::error::PortError::with_source("failed to encode plan", err)))?;

    let row = DeploymentRow {
        id: plan.deploy_id.clone(),
        namespace: plan.namespace.clone(),
        spec_json: plan_json,
        labels: existing.as_ref().map(|r| r.labels.clone()).unwrap_or_default(),
        status: DeployPhase::InProgress,
        owner: Some(machine_id.to_string()),
        owner_heartbeat: Some(now_str.clone()),
        machine_ids: existing
            .as_ref()
            .map(|r| r.machine_ids.clone())
            .unwrap_or_else(|| vec![machine_id.to_string()]),
        version: existing.as_ref().map(|r| r.version + 1).unwrap_or(1),
        created_at: existing.as_ref().map(|r| r.created_at.clone()).unwrap_or_else(|| now_str.clone()),
        updated_at: now_str,
    };

    if existing.is_some() {
        ports.deployment_store.update(row).await
    } else {
        ports.deployment_store.insert(row).await
    }
    .map_err(ExecutorError::Ownership)?;

    ports
        .deployment_store
        .acquire_ownership(&plan.deploy_id, machine_id, now)
        .await
        .map_err(ExecutorError::Ownership)
}

async fn postflight(plan: &DeployPlan, ports: &ExecutorPorts, status: DeployPhase) -> Option<String> {
    let mut failures = Vec::new();

    match ports.deployment_store.get(&plan.deploy_id).await {
        Ok(Some(mut row)) => {
            row.status.transition(status);
            row.owner = None;
            row.owner_heartbeat = None;
            row.updated_at = format_timestamp(ports.clock.now());
            if let Err(err) = ports.deployment_store.update(row).await {
                tracing::warn!(%err, deploy_id = %plan.deploy_id, "postflight failed to update deployment row");
                failures.push(format!("update deployment row: {err}"));
            }
        }
        Ok(None) => {
            tracing::warn!(deploy_id = %plan.deploy_id, "postflight found no deployment row to finalize");
            failures.push("no deployment row found to finalize".to_string());
        }
        Err(err) => {
            tracing::warn!(%err, deploy_id = %plan.deploy_id, "postflight failed to read deployment row");
            failures.push(format!("read deployment row: {err}"));
        }
    }

    if let Err(err) = ports.deployment_store.release_ownership(&plan.deploy_id).await {
        tracing::warn!(%err, deploy_id = %plan.deploy_id, "postflight failed to release ownership");
        failures.push(format!("release ownership: {err}"));
    }

    if failures.is_empty() {
        None
    } else {
        Some(failures.join(", "))
    }
}

fn spawn_heartbeat(
    deploy_id: String,
    machine_id: String,
    store: Arc<dyn DeploymentStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> (tokio::sync::oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    if let Err(err) = store.bump_heartbeat(&deploy_id, &machine_id, clock.now()).await {
                        tracing::warn!(%err, %deploy_id, "ownership heartbeat refresh failed");
                    }
                }
            }
        }
    });
    (stop_tx, handle)
}

async fn run_tiers(
    plan: &DeployPlan,
    machine_id: &str,
    ports: &ExecutorPorts,
    events: Option<&dyn EventSink>,
    cancel: &Cancel,
    observability: &Observability,
) -> Result<ApplyResult, DeployError> {
    let namespace = plan.namespace.as_str();
    let mut tier_results: Vec<TierResult> = Vec::with_capacity(plan.tiers.len());

    for tier in &plan.tiers {
        if cancel.is_cancelled() {
            emit(events, ProgressEvent::new(ProgressEventKind::DeployFailed, "deploy cancelled").with_tier(tier.index));
            return Err(DeployError::at_tier(
                namespace,
                DeployErrorPhase::Execute,
                tier.index,
                tier.name.clone(),
                tier_results,
                "deploy cancelled before tier started",
            ));
        }

        let tier_started_at = Instant::now();
        let mut tier_result = TierResult::pending(tier.index, tier.name.clone());
        tier_result.status.transition(TierPhase::Executing);
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::TierStarted, format!("tier {} starting", tier.index)).with_tier(tier.index),
        );
        observability.tier_started(namespace, &plan.deploy_id, tier.index, &tier.name);

        if let Err(err) = ports.deployment_store.check_ownership(&plan.deploy_id, machine_id).await {
            emit(events, ProgressEvent::new(ProgressEventKind::DeployFailed, "ownership lost").with_tier(tier.index));
            observability.ownership_lost(namespace, &plan.deploy_id, format!("ownership check failed: {err}"));
            return Err(DeployError::at_tier(
                namespace,
                DeployErrorPhase::Ownership,
                tier.index,
                tier.name.clone(),
                tier_results,
                format!("ownership check failed: {err}"),
            ));
        }

        for image in distinct_images(tier) {
            if let Err(err) = ports.runtime.image_pull(&image).await {
                return Err(DeployError::at_tier(
                    namespace,
                    DeployErrorPhase::PrePull,
                    tier.index,
                    tier.name.clone(),
                    tier_results,
                    format!("failed to pull {image}: {err}"),
                ));
            }
            emit(
                events,
                ProgressEvent::new(ProgressEventKind::ImagePulled, format!("pulled {image}")).with_tier(tier.index),
            );
        }

        let ctx = TierCtx {
            namespace,
            deploy_id: &plan.deploy_id,
            machine_id,
            now: format_timestamp(ports.clock.now()),
        };

        if let Err(err) = execute_tier(tier, ports, &ctx, events, observability, namespace, &plan.deploy_id).await {
            let outcome = if matches!(err.phase(), DeployErrorPhase::Health) { Outcome::RolledBack } else { Outcome::Failed };
            tier_result.status.transition(match err.phase() {
                DeployErrorPhase::Health => TierPhase::RolledBack,
                _ => TierPhase::Failed,
            });
            tier_results.push(tier_result);
            emit(
                events,
                ProgressEvent::new(ProgressEventKind::DeployFailed, err.to_string()).with_tier(tier.index),
            );
            observability.tier_completed(namespace, &plan.deploy_id, tier.index, &tier.name, tier_started_at.elapsed(), outcome);
            return Err(DeployError::at_tier(namespace, err.phase(), tier.index, tier.name.clone(), tier_results, err.to_string()));
        }

        tier_result.status.transition(TierPhase::Postcondition);
        let expected = expected_containers(tier);
        match ports.state_reader.read_machine_state(machine_id, namespace).await {
            Err(err) => {
                tier_result.status.transition(TierPhase::Failed);
                tier_results.push(tier_result);
                observability.tier_completed(namespace, &plan.deploy_id, tier.index, &tier.name, tier_started_at.elapsed(), Outcome::Failed);
                return Err(DeployError::at_tier(
                    namespace,
                    DeployErrorPhase::Postcondition,
                    tier.index,
                    tier.name.clone(),
                    tier_results,
                    format!("failed to read machine state: {err}"),
                ));
            }
            Ok(actual) => {
                let diagnostics = assert_tier_state(&actual, &expected);
                let mismatch = has_mismatch(&diagnostics);
                tier_result.containers = diagnostics;
                if mismatch {
                    tier_result.status.transition(TierPhase::Failed);
                    tier_results.push(tier_result);
                    observability.postcondition_mismatch(namespace, &plan.deploy_id, tier.index, &tier.name);
                    observability.tier_completed(namespace, &plan.deploy_id, tier.index, &tier.name, tier_started_at.elapsed(), Outcome::Failed);
                    return Err(DeployError::at_tier(
                        namespace,
                        DeployErrorPhase::Postcondition,
                        tier.index,
                        tier.name.clone(),
                        tier_results,
                        "actual container state did not match the plan after execution",
                    ));
                }
            }
        }

        tier_result.status.transition(TierPhase::Completed);
        tier_results.push(tier_result);
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::TierComplete, format!("tier {} complete", tier.index)).with_tier(tier.index),
        );
        observability.tier_completed(namespace, &plan.deploy_id, tier.index, &tier.name, tier_started_at.elapsed(), Outcome::Ok);
    }

    emit(events, ProgressEvent::new(ProgressEventKind::DeployComplete, "deploy complete"));
    Ok(ApplyResult {
        namespace: namespace.to_string(),
        deploy_id: plan.deploy_id.clone(),
        tiers: tier_results,
    })
}

struct TierCtx<'a> {
    namespace: &'a str,
    deploy_id: &'a str,
    machine_id: &'a str,
    now: String,
}

/// Runs one tier's bucket actions in the required intra-tier order (Remove,
/// Create, NeedsSpecUpdate, NeedsUpdate, NeedsRecreate), building a rollback
/// log as it goes. On a health failure, replays the log and returns
/// [`ExecutorError::Health`]; any other failure bubbles immediately, leaving
/// the partial state in place.
async fn execute_tier(
    tier: &Tier,
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    events: Option<&dyn EventSink>,
    observability: &Observability,
    namespace: &str,
    deploy_id: &str,
) -> Result<(), ExecutorError> {
    let mut log = RollbackLog::new();
    let mut pending_health: Vec<(String, HealthCheck)> = Vec::new();

    let outcome = run_buckets(tier, ports, ctx, &mut log, &mut pending_health, events).await;

    let outcome = match outcome {
        Ok(()) => {
            let mut result = Ok(());
            for (name, check) in &pending_health {
                if let Err(err) = ports.health.wait_healthy(name, check).await {
                    result = Err(ExecutorError::Health(err));
                    break;
                }
                emit(
                    events,
                    ProgressEvent::new(ProgressEventKind::HealthCheckPassed, format!("{name} healthy")).with_tier(tier.index).with_container(name.clone()),
                );
            }
            result
        }
        Err(err) => Err(err),
    };

    if let Err(err) = &outcome {
        if matches!(err, ExecutorError::Health(_)) {
            emit(
                events,
                ProgressEvent::new(ProgressEventKind::RollbackStarted, "health check failed, rolling back tier").with_tier(tier.index),
            );
            observability.rollback_started(namespace, deploy_id, tier.index, &tier.name);
            if let Some(rollback_err) = rollback::replay(&log, &*ports.runtime, &*ports.container_store).await {
                tracing::warn!(%rollback_err, tier = tier.index, "tier rollback did not fully succeed");
            }
        }
    }

    outcome
}

async fn run_buckets(
    tier: &Tier,
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    pending_health: &mut Vec<(String, HealthCheck)>,
    events: Option<&dyn EventSink>,
) -> Result<(), ExecutorError> {
    for entry in tier.remove.iter().filter(|e| e.machine_id == ctx.machine_id) {
        handle_remove(entry, ports, ctx, log, events, tier.index).await?;
    }
    for entry in tier.create.iter().filter(|e| e.machine_id == ctx.machine_id) {
        handle_create(entry, ports, ctx, log, pending_health, events, tier.index).await?;
    }
    for entry in tier.needs_spec_update.iter().filter(|e| e.machine_id == ctx.machine_id) {
        handle_needs_spec_update(entry, ports, ctx, log, events, tier.index).await?;
    }
    for entry in tier.needs_update.iter().filter(|e| e.machine_id == ctx.machine_id) {
        handle_needs_update(entry, ports, ctx, log, events, tier.index).await?;
    }

    let local_recreate: Vec<&PlanEntry> = tier.needs_recreate.iter().filter(|e| e.machine_id == ctx.machine_id).collect();
    execute_needs_recreate_bucket(tier, &local_recreate, ports, ctx, log, pending_health, events).await
}

async fn handle_remove(
    entry: &PlanEntry,
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    events: Option<&dyn EventSink>,
    tier_idx: usize,
) -> Result<(), ExecutorError> {
    let row = entry.current_row.as_ref().expect("a Remove entry always carries the row being removed");

    ports.runtime.container_stop(&row.container_name).await.map_err(ExecutorError::Execute)?;
    ports.runtime.container_remove(&row.container_name, true).await.map_err(ExecutorError::Execute)?;
    ports.container_store.delete(&row.id).await.map_err(ExecutorError::Execute)?;
    emit(
        events,
        ProgressEvent::new(ProgressEventKind::ContainerRemoved, format!("removed {}", row.container_name))
            .with_tier(tier_idx)
            .with_service(row.service.clone())
            .with_machine(row.machine_id.clone())
            .with_container(row.container_name.clone()),
    );

    let old_spec = decode_spec(row)?;
    let create = build_create_config(&row.container_name, &old_spec, ctx.namespace, &row.service, ctx.deploy_id, ctx.machine_id);
    log.push(RollbackAction::RecreateAndStart {
        create: Box::new(create),
        row: Box::new(row.clone()),
    });
    Ok(())
}

async fn handle_create(
    entry: &PlanEntry,
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    pending_health: &mut Vec<(String, HealthCheck)>,
    events: Option<&dyn EventSink>,
    tier_idx: usize,
) -> Result<(), ExecutorError> {
    let create = build_create_config(&entry.container_name, &entry.spec, ctx.namespace, &entry.spec.name, ctx.deploy_id, ctx.machine_id);
    ports.runtime.container_create(create).await.map_err(ExecutorError::Execute)?;
    emit(
        events,
        ProgressEvent::new(ProgressEventKind::ContainerCreated, format!("created {}", entry.container_name))
            .with_tier(tier_idx)
            .with_service(entry.spec.name.clone())
            .with_machine(ctx.machine_id.to_string())
            .with_container(entry.container_name.clone()),
    );

    ports.runtime.container_start(&entry.container_name).await.map_err(ExecutorError::Execute)?;
    emit(
        events,
        ProgressEvent::new(ProgressEventKind::ContainerStarted, format!("started {}", entry.container_name))
            .with_tier(tier_idx)
            .with_service(entry.spec.name.clone())
            .with_machine(ctx.machine_id.to_string())
            .with_container(entry.container_name.clone()),
    );

    let row = new_row(entry, ctx)?;
    let row_id = row.id.clone();
    ports.container_store.insert(row).await.map_err(ExecutorError::Execute)?;
    log.push(RollbackAction::StopRemoveDeleteRow {
        name: entry.container_name.clone(),
        row_id,
    });

    if let Some(check) = entry.spec.health_check.as_ref().filter(|h| !h.is_disabled()) {
        pending_health.push((entry.container_name.clone(), check.clone()));
    }
    Ok(())
}

async fn handle_needs_spec_update(
    entry: &PlanEntry,
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    events: Option<&dyn EventSink>,
    tier_idx: usize,
) -> Result<(), ExecutorError> {
    let row = entry.current_row.as_ref().expect("a NeedsSpecUpdate entry always carries its current row");
    let mut updated = row.clone();
    updated.spec_json = serde_json::to_string(&entry.spec).map_err(ExecutorError::execute)?;
    updated.updated_at = ctx.now.clone();
    updated.version += 1;
    ports.container_store.update(updated).await.map_err(ExecutorError::Execute)?;
    emit(
        events,
        ProgressEvent::new(ProgressEventKind::SpecUpdated, format!("rewrote spec for {}", row.container_name))
            .with_tier(tier_idx)
            .with_service(entry.spec.name.clone())
            .with_machine(ctx.machine_id.to_string())
            .with_container(row.container_name.clone()),
    );
    log.push(RollbackAction::RestoreRow { row: Box::new(row.clone()) });
    Ok(())
}

async fn handle_needs_update(
    entry: &PlanEntry,
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    events: Option<&dyn EventSink>,
    tier_idx: usize,
) -> Result<(), ExecutorError> {
    let row = entry.current_row.as_ref().expect("a NeedsUpdate entry always carries its current row");
    let old_spec = decode_spec(row)?;
    let old_resources = resource_config(&old_spec);
    let new_resources = resource_config(&entry.spec);

    ports.runtime.container_update(&row.container_name, new_resources).await.map_err(ExecutorError::Execute)?;
    emit(
        events,
        ProgressEvent::new(ProgressEventKind::ContainerUpdated, format!("updated resources for {}", row.container_name))
            .with_tier(tier_idx)
            .with_service(entry.spec.name.clone())
            .with_machine(ctx.machine_id.to_string())
            .with_container(row.container_name.clone()),
    );

    let mut updated = row.clone();
    updated.spec_json = serde_json::to_string(&entry.spec).map_err(ExecutorError::execute)?;
    updated.updated_at = ctx.now.clone();
    updated.version += 1;
    ports.container_store.update(updated).await.map_err(ExecutorError::Execute)?;

    log.push(RollbackAction::RestoreResourcesAndRow {
        name: row.container_name.clone(),
        resources: old_resources,
        row: Box::new(row.clone()),
    });
    Ok(())
}

/// Processes the `NeedsRecreate` bucket in batches of `update_config.parallelism`
/// consecutive same-service entries, choosing stop-first or start-first per
/// batch (§4.6, §9).
async fn execute_needs_recreate_bucket(
    tier: &Tier,
    entries: &[&PlanEntry],
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    pending_health: &mut Vec<(String, HealthCheck)>,
    events: Option<&dyn EventSink>,
) -> Result<(), ExecutorError> {
    let mut i = 0;
    while i < entries.len() {
        let parallelism = entries[i].update_config.parallelism.max(1);
        let service = entries[i].spec.name.clone();
        let mut batch: Vec<&PlanEntry> = vec![entries[i]];
        i += 1;
        while batch.len() < parallelism && i < entries.len() && entries[i].spec.name == service {
            batch.push(entries[i]);
            i += 1;
        }

        match detect_update_order(&batch, tier) {
            UpdateOrder::StopFirst => execute_recreate_batch_stop_first(&batch, ports, ctx, log, pending_health, events, tier.index).await?,
            UpdateOrder::StartFirst => execute_recreate_batch_start_first(&batch, ports, ctx, log, events, tier.index).await?,
        }
    }
    Ok(())
}

fn detect_update_order(batch: &[&PlanEntry], tier: &Tier) -> UpdateOrder {
    let port_overlap = batch.iter().any(|entry| {
        let Some(row) = entry.current_row.as_ref() else {
            return false;
        };
        let Ok(old_spec) = serde_json::from_str::<ServiceSpec>(&row.spec_json) else {
            return false;
        };
        old_spec.ports.iter().any(|old_port| {
            old_port.is_published()
                && entry
                    .spec
                    .ports
                    .iter()
                    .any(|new_port| new_port.is_published() && new_port.host_port == old_port.host_port && new_port.protocol == old_port.protocol)
        })
    });
    if port_overlap {
        return UpdateOrder::StopFirst;
    }

    let service = batch[0].spec.name.as_str();
    if service_replica_count(tier, service) == 1 && service_has_mount(tier, service) {
        return UpdateOrder::StopFirst;
    }

    batch[0].update_config.order
}

fn service_replica_count(tier: &Tier, service: &str) -> usize {
    tier.create
        .iter()
        .chain(tier.up_to_date.iter())
        .chain(tier.needs_spec_update.iter())
        .chain(tier.needs_update.iter())
        .chain(tier.needs_recreate.iter())
        .filter(|e| e.spec.name == service)
        .count()
}

fn service_has_mount(tier: &Tier, service: &str) -> bool {
    tier.create
        .iter()
        .chain(tier.needs_recreate.iter())
        .filter(|e| e.spec.name == service)
        .any(|e| !e.spec.mounts.is_empty())
}

async fn execute_recreate_batch_stop_first(
    batch: &[&PlanEntry],
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    pending_health: &mut Vec<(String, HealthCheck)>,
    events: Option<&dyn EventSink>,
    tier_idx: usize,
) -> Result<(), ExecutorError> {
    for entry in batch {
        let row = entry.current_row.as_ref().expect("a NeedsRecreate entry always carries its current row");
        ports.runtime.container_stop(&row.container_name).await.map_err(ExecutorError::Execute)?;
        ports.runtime.container_remove(&row.container_name, true).await.map_err(ExecutorError::Execute)?;
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::ContainerRemoved, format!("removed {}", row.container_name))
                .with_tier(tier_idx)
                .with_service(entry.spec.name.clone())
                .with_container(row.container_name.clone()),
        );
    }

    for entry in batch {
        let row = entry.current_row.as_ref().expect("a NeedsRecreate entry always carries its current row");

        let create = build_create_config(&entry.container_name, &entry.spec, ctx.namespace, &entry.spec.name, ctx.deploy_id, ctx.machine_id);
        ports.runtime.container_create(create).await.map_err(ExecutorError::Execute)?;
        ports.runtime.container_start(&entry.container_name).await.map_err(ExecutorError::Execute)?;
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::ContainerStarted, format!("started {}", entry.container_name))
                .with_tier(tier_idx)
                .with_service(entry.spec.name.clone())
                .with_container(entry.container_name.clone()),
        );

        ports.container_store.delete(&row.id).await.map_err(ExecutorError::Execute)?;
        let new_row = new_row(entry, ctx)?;
        let new_row_id = new_row.id.clone();
        ports.container_store.insert(new_row).await.map_err(ExecutorError::Execute)?;

        let old_spec = decode_spec(row)?;
        let old_create = build_create_config(&row.container_name, &old_spec, ctx.namespace, &row.service, ctx.deploy_id, ctx.machine_id);
        log.push(RollbackAction::RestoreOldContainer {
            create: Box::new(old_create),
            old_row: Box::new(row.clone()),
            new_name: entry.container_name.clone(),
            new_row_id,
        });

        if let Some(check) = entry.spec.health_check.as_ref().filter(|h| !h.is_disabled()) {
            pending_health.push((entry.container_name.clone(), check.clone()));
        }
    }
    Ok(())
}

async fn execute_recreate_batch_start_first(
    batch: &[&PlanEntry],
    ports: &ExecutorPorts,
    ctx: &TierCtx<'_>,
    log: &mut RollbackLog,
    events: Option<&dyn EventSink>,
    tier_idx: usize,
) -> Result<(), ExecutorError> {
    for entry in batch {
        let row = entry.current_row.as_ref().expect("a NeedsRecreate entry always carries its current row");

        let create = build_create_config(&entry.container_name, &entry.spec, ctx.namespace, &entry.spec.name, ctx.deploy_id, ctx.machine_id);
        ports.runtime.container_create(create).await.map_err(ExecutorError::Execute)?;
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::ContainerCreated, format!("created {}", entry.container_name))
                .with_tier(tier_idx)
                .with_service(entry.spec.name.clone())
                .with_container(entry.container_name.clone()),
        );
        ports.runtime.container_start(&entry.container_name).await.map_err(ExecutorError::Execute)?;
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::ContainerStarted, format!("started {}", entry.container_name))
                .with_tier(tier_idx)
                .with_service(entry.spec.name.clone())
                .with_container(entry.container_name.clone()),
        );

        let handle = log.push(RollbackAction::RemoveNewContainer {
            name: entry.container_name.clone(),
        });

        if let Some(check) = entry.spec.health_check.as_ref().filter(|h| !h.is_disabled()) {
            if let Err(err) = ports.health.wait_healthy(&entry.container_name, check).await {
                return Err(ExecutorError::Health(err));
            }
            emit(
                events,
                ProgressEvent::new(ProgressEventKind::HealthCheckPassed, format!("{} healthy", entry.container_name))
                    .with_tier(tier_idx)
                    .with_container(entry.container_name.clone()),
            );
        }

        ports.runtime.container_stop(&row.container_name).await.map_err(ExecutorError::Execute)?;
        ports.runtime.container_remove(&row.container_name, true).await.map_err(ExecutorError::Execute)?;
        emit(
            events,
            ProgressEvent::new(ProgressEventKind::ContainerRemoved, format!("removed {}", row.container_name))
                .with_tier(tier_idx)
                .with_service(entry.spec.name.clone())
                .with_container(row.container_name.clone()),
        );
        ports.container_store.delete(&row.id).await.map_err(ExecutorError::Execute)?;

        let new_row = new_row(entry, ctx)?;
        let new_row_id = new_row.id.clone();
        ports.container_store.insert(new_row).await.map_err(ExecutorError::Execute)?;

        let old_spec = decode_spec(row)?;
        let old_create = build_create_config(&row.container_name, &old_spec, ctx.namespace, &row.service, ctx.deploy_id, ctx.machine_id);
        log.upgrade(
            handle,
            RollbackAction::RestoreOldContainer {
                create: Box::new(old_create),
                old_row: Box::new(row.clone()),
                new_name: entry.container_name.clone(),
                new_row_id,
            },
        );
    }
    Ok(())
}

fn decode_spec(row: &ContainerRow) -> Result<ServiceSpec, ExecutorError> {
    serde_json::from_str(&row.spec_json).map_err(ExecutorError::execute)
}

fn resource_config(spec: &ServiceSpec) -> ResourceConfig {
    spec.resources
        .as_ref()
        .map(|r| ResourceConfig {
            cpu_limit: r.cpu_limit,
            memory_limit: r.memory_limit,
        })
        .unwrap_or_default()
}

fn new_row(entry: &PlanEntry, ctx: &TierCtx<'_>) -> Result<ContainerRow, ExecutorError> {
    Ok(ContainerRow {
        id: ContainerRow::row_id(ctx.deploy_id, &entry.container_name),
        namespace: ctx.namespace.to_string(),
        deploy_id: ctx.deploy_id.to_string(),
        service: entry.spec.name.clone(),
        machine_id: ctx.machine_id.to_string(),
        container_name: entry.container_name.clone(),
        spec_json: serde_json::to_string(&entry.spec).map_err(ExecutorError::execute)?,
        status: ContainerStatus::Running,
        version: 1,
        created_at: ctx.now.clone(),
        updated_at: ctx.now.clone(),
    })
}

fn build_create_config(container_name: &str, spec: &ServiceSpec, namespace: &str, service: &str, deploy_id: &str, machine_id: &str) -> CreateConfig {
    let mut labels = spec.labels.clone();
    labels.insert("ployz.namespace".to_string(), namespace.to_string());
    labels.insert("ployz.service".to_string(), service.to_string());
    labels.insert("ployz.deploy_id".to_string(), deploy_id.to_string());
    labels.insert("ployz.machine_id".to_string(), machine_id.to_string());

    CreateConfig {
        name: container_name.to_string(),
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

fn distinct_images(tier: &Tier) -> Vec<String> {
    let set: BTreeSet<String> = tier
        .create
        .iter()
        .chain(tier.needs_recreate.iter())
        .map(|e| e.spec.image.clone())
        .collect();
    set.into_iter().collect()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn emit(events: Option<&dyn EventSink>, event: ProgressEvent) {
    if let Some(sink) = events {
        sink.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ployz_core::model::{Mount, PlanEntry, PortMapping, Protocol, ServiceSpec, UpdateConfig};

    fn recreate_entry(service: &str, container_name: &str, old_ports: Vec<PortMapping>, new_ports: Vec<PortMapping>, mounts: Vec<Mount>) -> PlanEntry {
        let mut old_spec = ServiceSpec::new(service, "api:1");
        old_spec.ports = old_ports;
        let mut new_spec = ServiceSpec::new(service, "api:2");
        new_spec.ports = new_ports;
        new_spec.mounts = mounts;

        let current_row = ContainerRow {
            id: format!("deploy-1/{container_name}"),
            namespace: "ns".into(),
            deploy_id: "deploy-0".into(),
            service: service.to_string(),
            machine_id: "m1".into(),
            container_name: container_name.to_string(),
            spec_json: serde_json::to_string(&old_spec).unwrap(),
            status: ContainerStatus::Running,
            version: 1,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        };

        PlanEntry {
            machine_id: "m1".into(),
            container_name: container_name.to_string(),
            spec: new_spec,
            current_row: Some(current_row),
            reason: "image changed".into(),
            update_config: UpdateConfig::default(),
        }
    }

    #[test]
    fn detect_update_order_picks_stop_first_on_port_overlap() {
        let entry = recreate_entry(
            "api",
            "ployz-ns-api-a001",
            vec![PortMapping::new(8080, 80, Protocol::Tcp)],
            vec![PortMapping::new(8080, 80, Protocol::Tcp)],
            Vec::new(),
        );
        let mut tier = Tier::new(0, "api");
        tier.needs_recreate.push(entry.clone());
        let batch = vec![&entry];
        assert_eq!(detect_update_order(&batch, &tier), UpdateOrder::StopFirst);
    }

    #[test]
    fn detect_update_order_picks_stop_first_for_single_replica_with_mount() {
        let entry = recreate_entry(
            "api",
            "ployz-ns-api-a001",
            Vec::new(),
            Vec::new(),
            vec![Mount::new("data", "/var/lib/data", false)],
        );
        let mut tier = Tier::new(0, "api");
        tier.needs_recreate.push(entry.clone());
        let batch = vec![&entry];
        assert_eq!(detect_update_order(&batch, &tier), UpdateOrder::StopFirst);
    }

    #[test]
    fn detect_update_order_defaults_to_start_first() {
        let entry = recreate_entry("api", "ployz-ns-api-a001", Vec::new(), Vec::new(), Vec::new());
        let mut tier = Tier::new(0, "api");
        tier.needs_recreate.push(entry.clone());
        let batch = vec![&entry];
        assert_eq!(detect_update_order(&batch, &tier), UpdateOrder::StartFirst);
    }

    #[test]
    fn detect_update_order_ignores_mount_rule_with_multiple_replicas() {
        let entry_a = recreate_entry("api", "ployz-ns-api-a001", Vec::new(), Vec::new(), vec![Mount::new("d", "/d", false)]);
        let entry_b = recreate_entry("api", "ployz-ns-api-a002", Vec::new(), Vec::new(), vec![Mount::new("d", "/d", false)]);
        let mut tier = Tier::new(0, "api");
        tier.needs_recreate.push(entry_a.clone());
        tier.needs_recreate.push(entry_b);
        let batch = vec![&entry_a];
        assert_eq!(detect_update_order(&batch, &tier), UpdateOrder::StartFirst);
    }

    #[test]
    fn distinct_images_are_sorted_and_deduplicated() {
        let mut tier = Tier::new(0, "api, worker");
        tier.create.push(recreate_entry("worker", "ployz-ns-worker-a001", Vec::new(), Vec::new(), Vec::new()));
        tier.needs_recreate.push(recreate_entry("api", "ployz-ns-api-a001", Vec::new(), Vec::new(), Vec::new()));
        tier.needs_recreate.push(recreate_entry("api", "ployz-ns-api-a002", Vec::new(), Vec::new(), Vec::new()));
        assert_eq!(distinct_images(&tier), vec!["api:2".to_string()]);
    }

    #[test]
    fn build_create_config_sets_managed_labels() {
        let spec = ServiceSpec::new("api", "api:1");
        let config = build_create_config("ployz-ns-api-a001", &spec, "ns", "api", "deploy-1", "m1");
        assert_eq!(config.labels.get("ployz.namespace"), Some(&"ns".to_string()));
        assert_eq!(config.labels.get("ployz.service"), Some(&"api".to_string()));
        assert_eq!(config.labels.get("ployz.deploy_id"), Some(&"deploy-1".to_string()));
        assert_eq!(config.labels.get("ployz.machine_id"), Some(&"m1".to_string()));
    }

    #[test]
    fn cancel_handle_reflects_state() {
        let cancel = Cancel::new();
        assert!(!cancel.is_cancelled());
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }
}
