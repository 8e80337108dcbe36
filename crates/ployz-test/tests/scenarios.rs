//! End-to-end scenarios driving the executor through the fakes in this
//! crate: fresh deploys, health-triggered rollback, postcondition mismatch,
//! start-first/stop-first recreate, and cross-machine ownership races.

use std::collections::BTreeMap;
use std::sync::Arc;

use ployz_core::model::{
    ContainerRow, ContainerStatus, DeploySpec, HealthCheck, MachineAssignment, MachineInfo, Mount, PortMapping, Protocol, ServiceDeployConfig, ServiceSpec,
    UpdateConfig, UpdateOrder,
};
use ployz_core::phase::DeployErrorPhase;
use ployz_core::canonicalize;
use ployz_executor::{apply, Cancel, ExecutorConfig, Observability};
use ployz_test::FakeCluster;

use ployz_audit::{AuditLogger, InMemoryBackend};
use ployz_metrics::DeployMetrics;

fn assignment(machine_id: &str, container_name: &str) -> MachineAssignment {
    MachineAssignment {
        machine_id: machine_id.to_string(),
        container_name: container_name.to_string(),
    }
}

fn row(namespace: &str, deploy_id: &str, service: &str, machine_id: &str, container_name: &str, spec: &ServiceSpec) -> ContainerRow {
    ContainerRow {
        id: ContainerRow::row_id(deploy_id, container_name),
        namespace: namespace.to_string(),
        deploy_id: deploy_id.to_string(),
        service: service.to_string(),
        machine_id: machine_id.to_string(),
        container_name: container_name.to_string(),
        spec_json: serde_json::to_string(&canonicalize(spec)).unwrap(),
        status: ContainerStatus::Running,
        version: 1,
        created_at: "2026-01-01T00:00:00Z".into(),
        updated_at: "2026-01-01T00:00:00Z".into(),
    }
}

fn basic_health_check() -> HealthCheck {
    HealthCheck {
        test: vec!["CMD".into(), "true".into()],
        interval_secs: 1,
        timeout_secs: 1,
        retries: 1,
        start_period_secs: 0,
        disable: false,
    }
}

#[tokio::test]
async fn s1_fresh_deploy_single_service_single_replica() {
    let cluster = FakeCluster::new();
    let spec = ServiceSpec::new("api", "api:1");
    let incoming = DeploySpec {
        namespace: "ns".into(),
        services: vec![ServiceDeployConfig::new(spec)],
    };
    let mut schedule = BTreeMap::new();
    schedule.insert("api".to_string(), vec![assignment("m1", "ployz-ns-api-a001")]);

    let deploy_plan = ployz_planner::plan(&incoming, &[], &schedule).unwrap();

    let result = apply(
        &deploy_plan,
        "m1",
        &cluster.ports(),
        None,
        &ExecutorConfig::default(),
        &Cancel::new(),
        &Observability::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.tiers.len(), 1);

    let state = cluster.state_reader.read_machine_state("m1", "ns").await.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].name, "ployz-ns-api-a001");
    assert!(state[0].running);

    let rows = cluster.container_store.list_by_namespace("ns").await.unwrap();
    assert_eq!(rows.len(), 1);

    let deployment = cluster.deployment_store.get(&deploy_plan.deploy_id).await.unwrap().unwrap();
    assert_eq!(deployment.status, ployz_core::DeployPhase::Succeeded);
    assert!(deployment.owner.is_none());
}

#[tokio::test]
async fn s2_health_failure_rolls_back_tier() {
    let cluster = FakeCluster::new();
    let mut spec = ServiceSpec::new("api", "api:1");
    spec.health_check = Some(basic_health_check());
    let incoming = DeploySpec {
        namespace: "ns".into(),
        services: vec![ServiceDeployConfig::new(spec)],
    };
    let mut schedule = BTreeMap::new();
    schedule.insert("api".to_string(), vec![assignment("m1", "ployz-ns-api-a001")]);
    let deploy_plan = ployz_planner::plan(&incoming, &[], &schedule).unwrap();

    cluster.health.fail("ployz-ns-api-a001");

    let err = apply(
        &deploy_plan,
        "m1",
        &cluster.ports(),
        None,
        &ExecutorConfig::default(),
        &Cancel::new(),
        &Observability::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.phase, DeployErrorPhase::Health);

    let state = cluster.state_reader.read_machine_state("m1", "ns").await.unwrap();
    assert!(state.is_empty(), "rolled-back container must not remain in the runtime");

    let rows = cluster.container_store.list_by_namespace("ns").await.unwrap();
    assert!(rows.is_empty());

    let deployment = cluster.deployment_store.get(&deploy_plan.deploy_id).await.unwrap().unwrap();
    assert_eq!(deployment.status, ployz_core::DeployPhase::Failed);
}

#[tokio::test]
async fn s3_postcondition_mismatch_does_not_roll_back() {
    let cluster = FakeCluster::new();
    let spec = ServiceSpec::new("api", "api:1");
    let incoming = DeploySpec {
        namespace: "ns".into(),
        services: vec![ServiceDeployConfig::new(spec)],
    };
    let mut schedule = BTreeMap::new();
    schedule.insert("api".to_string(), vec![assignment("m1", "ployz-ns-api-a001")]);
    let deploy_plan = ployz_planner::plan(&incoming, &[], &schedule).unwrap();

    // A state reader pinned to a different namespace always reports empty,
    // simulating the runtime not reflecting what was just created.
    let blind_reader = Arc::new(ployz_test::FakeStateReader::new(cluster.registry()));
    let mut ports = cluster.ports();
    ports.state_reader = blind_reader;

    let err = apply(&deploy_plan, "m1", &ports, None, &ExecutorConfig::default(), &Cancel::new(), &Observability::default())
        .await
        .unwrap_err();

    assert_eq!(err.phase, DeployErrorPhase::Postcondition);

    let inspected = cluster.runtime.container_inspect("ployz-ns-api-a001").await.unwrap();
    assert!(inspected.exists, "container must still be present after a postcondition-only failure");
    assert!(inspected.running);

    let rows = cluster.container_store.list_by_namespace("ns").await.unwrap();
    assert_eq!(rows.len(), 1, "container row must still be present after a postcondition-only failure");
}

#[tokio::test]
async fn s4_start_first_recreate_with_health_failure() {
    let cluster = FakeCluster::new();
    let old_spec = ServiceSpec::new("api", "api:1");
    let mut new_spec = ServiceSpec::new("api", "api:2");
    new_spec.health_check = Some(basic_health_check());

    let incoming = DeploySpec {
        namespace: "frontend".into(),
        services: vec![ServiceDeployConfig::new(new_spec)],
    };
    let existing = row("frontend", "deploy-0", "api", "m1", "ployz-frontend-api-a001", &old_spec);

    cluster
        .runtime
        .container_create(build_config("ployz-frontend-api-a001", &old_spec, "frontend", "deploy-0", "m1"))
        .await
        .unwrap();
    cluster.runtime.container_start("ployz-frontend-api-a001").await.unwrap();
    cluster.container_store.insert(existing.clone()).await.unwrap();

    // No port overlap, single replica with no mount, default UpdateConfig:
    // update-order detection resolves to start-first, so the new container
    // coexists with the old one until it proves healthy.
    let mut schedule = BTreeMap::new();
    schedule.insert("api".to_string(), vec![assignment("m1", "ployz-frontend-api-a002")]);
    let deploy_plan = ployz_planner::plan(&incoming, &[existing], &schedule).unwrap();

    cluster.health.fail("ployz-frontend-api-a002");

    let err = apply(
        &deploy_plan,
        "m1",
        &cluster.ports(),
        None,
        &ExecutorConfig::default(),
        &Cancel::new(),
        &Observability::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.phase, DeployErrorPhase::Health);

    let old = cluster.runtime.container_inspect("ployz-frontend-api-a001").await.unwrap();
    assert!(old.exists && old.running, "the old container must be restored running");
    let new = cluster.runtime.container_inspect("ployz-frontend-api-a002").await.unwrap();
    assert!(!new.exists, "the failed new container must be removed");

    let rows = cluster.container_store.list_by_namespace("frontend").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].container_name, "ployz-frontend-api-a001");
}

#[tokio::test]
async fn s5_stop_first_recreate_shared_port_with_health_failure() {
    let cluster = FakeCluster::new();
    let port = PortMapping::new(8080, 80, Protocol::Tcp);
    let mut old_spec = ServiceSpec::new("api", "api:1");
    old_spec.ports = vec![port.clone()];
    let mut new_spec = ServiceSpec::new("api", "api:2");
    new_spec.ports = vec![port];
    new_spec.health_check = Some(basic_health_check());

    let incoming = DeploySpec {
        namespace: "frontend".into(),
        services: vec![ServiceDeployConfig::new(new_spec)],
    };
    let existing = row("frontend", "deploy-0", "api", "m1", "ployz-frontend-api-a001", &old_spec);

    cluster
        .runtime
        .container_create(build_config("ployz-frontend-api-a001", &old_spec, "frontend", "deploy-0", "m1"))
        .await
        .unwrap();
    cluster.runtime.container_start("ployz-frontend-api-a001").await.unwrap();
    cluster.container_store.insert(existing.clone()).await.unwrap();

    let mut schedule = BTreeMap::new();
    schedule.insert("api".to_string(), vec![assignment("m1", "ployz-frontend-api-a001")]);
    // Overlapping published host ports force stop-first: the old container
    // is gone before the new one is health-checked, so a health failure here
    // must restore the old container rather than merely remove a "new" one
    // that coexisted alongside it (the start-first case covered by S4).
    let deploy_plan = ployz_planner::plan(&incoming, &[existing], &schedule).unwrap();

    cluster.health.fail("ployz-frontend-api-a001");

    let err = apply(
        &deploy_plan,
        "m1",
        &cluster.ports(),
        None,
        &ExecutorConfig::default(),
        &Cancel::new(),
        &Observability::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.phase, DeployErrorPhase::Health);

    let restored = cluster.runtime.container_inspect("ployz-frontend-api-a001").await.unwrap();
    assert!(restored.exists && restored.running);
    assert_eq!(restored.image, "api:1", "the old image must be restored, not left on the new one");

    let rows = cluster.container_store.list_by_namespace("frontend").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].deploy_id, "deploy-0", "the restored row must belong to the old deploy");
}

#[tokio::test]
async fn s6_ownership_race_across_two_machines() {
    let m1 = FakeCluster::new();
    let m2 = FakeCluster::sharing_stores(&m1);

    let spec = ServiceSpec::new("api", "api:1");
    let incoming = DeploySpec {
        namespace: "ns".into(),
        services: vec![ServiceDeployConfig::new(spec)],
    };
    let mut schedule = BTreeMap::new();
    schedule.insert("api".to_string(), vec![assignment("m1", "ployz-ns-api-a001"), assignment("m2", "ployz-ns-api-a002")]);
    let deploy_plan = ployz_planner::plan(&incoming, &[], &schedule).unwrap();

    let (r1, r2) = tokio::join!(
        apply(&deploy_plan, "m1", &m1.ports(), None, &ExecutorConfig::default(), &Cancel::new(), &Observability::default()),
        apply(&deploy_plan, "m2", &m2.ports(), None, &ExecutorConfig::default(), &Cancel::new(), &Observability::default()),
    );

    let outcomes = [&r1, &r2];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert!(winners <= 1, "at most one machine may win the lease for the same deploy_id");

    for (result, cluster, container_name) in [(&r1, &m1, "ployz-ns-api-a001"), (&r2, &m2, "ployz-ns-api-a002")] {
        if result.is_err() {
            let err = result.as_ref().unwrap_err();
            assert_eq!(err.phase, DeployErrorPhase::Ownership);
        } else {
            let state = cluster.runtime.container_inspect(container_name).await.unwrap();
            assert!(state.exists && state.running);
        }
    }
}

#[tokio::test]
async fn s7_real_scheduler_output_drives_audit_and_metrics() {
    let cluster = FakeCluster::new();
    let spec = ServiceSpec::new("api", "api:1");
    let incoming = DeploySpec {
        namespace: "ns".into(),
        services: vec![ServiceDeployConfig::new(spec)],
    };
    let machines = vec![MachineInfo {
        id: "m1".to_string(),
        labels: Default::default(),
    }];

    // Unlike S1-S6, which hand-build the schedule, this drives the actual
    // scheduler so the container name carries its real random suffix.
    let schedule = ployz_scheduler::schedule("ns", &incoming.services, &machines, &[]).unwrap();
    let container_name = schedule["api"][0].container_name.clone();
    assert!(container_name.starts_with("ployz-ns-api-"));

    let deploy_plan = ployz_planner::plan(&incoming, &[], &schedule).unwrap();

    let audit_backend = Arc::new(InMemoryBackend::new());
    let audit = Arc::new(AuditLogger::builder().with_backend(audit_backend.clone()).build());
    let metrics = Arc::new(DeployMetrics::new("ployz_s7").unwrap());
    let observability = Observability::new(audit, metrics.clone());

    let result = apply(&deploy_plan, "m1", &cluster.ports(), None, &ExecutorConfig::default(), &Cancel::new(), &observability)
        .await
        .unwrap();

    assert_eq!(result.tiers.len(), 1);

    let state = cluster.state_reader.read_machine_state("m1", "ns").await.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].name, container_name);

    let events = audit_backend.events();
    assert!(!events.is_empty(), "a successful deploy must emit at least one audit event");

    let families = metrics.registry().gather();
    let names: Vec<_> = families.iter().map(|f| f.name().to_string()).collect();
    assert!(names.iter().any(|n| n.contains("deploys_total")), "the deploy outcome must be recorded");
    assert!(names.iter().any(|n| n.contains("tiers_total")), "the tier outcome must be recorded");
}

fn build_config(name: &str, spec: &ServiceSpec, namespace: &str, deploy_id: &str, machine_id: &str) -> ployz_executor::ports::CreateConfig {
    let mut labels = spec.labels.clone();
    labels.insert("ployz.namespace".to_string(), namespace.to_string());
    labels.insert("ployz.service".to_string(), spec.name.clone());
    labels.insert("ployz.deploy_id".to_string(), deploy_id.to_string());
    labels.insert("ployz.machine_id".to_string(), machine_id.to_string());
    ployz_executor::ports::CreateConfig {
        name: name.to_string(),
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
