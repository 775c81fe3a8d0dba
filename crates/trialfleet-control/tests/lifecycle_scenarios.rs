//! End-to-end lifecycle scenarios against a real store and the mock cloud.
//!
//! Run with:
//!   cargo test -p trialfleet-control --test lifecycle_scenarios

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use trialfleet_cloud::{resolve, ClusterPlan, MockCloud, ProviderRegistry};
use trialfleet_control::{ControlConfig, Phase, Reconciler, TickReport};
use trialfleet_core::CloudProvider;
use trialfleet_store::{
    ClusterSpec, Node, NodeSpec, NotifyCustomer, ResourceState, RocksStore, SpecState, Store,
    TrialRequest, TrialState,
};

struct Env {
    _dir: TempDir,
    store: Arc<RocksStore>,
    cloud: Arc<MockCloud>,
    reconciler: Reconciler<RocksStore, MockCloud>,
}

fn env() -> Env {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&cloud),
        ProviderRegistry::builtin().unwrap(),
        ControlConfig::default(),
    );
    Env {
        _dir: dir,
        store,
        cloud,
        reconciler,
    }
}

fn node_spec(store: &RocksStore, ttl_hours: u32, at: DateTime<Utc>) -> NodeSpec {
    store
        .create(|spec_id| NodeSpec {
            spec_id,
            cloud_provider: CloudProvider::Emr,
            region: "us-east-1".to_string(),
            user: "ops".to_string(),
            node_type: "r5.2xlarge".to_string(),
            storage_config: None,
            software_version: "4.5.5.0".to_string(),
            software_tarball: "unravel-4.5.5.0.tar.gz".to_string(),
            database_version: "5.7".to_string(),
            install_on_demand: true,
            extra: BTreeMap::new(),
            ttl_hours,
            trial_request_id: None,
            created_at: at,
            state: SpecState::Pending,
        })
        .unwrap()
}

// =============================================================================
// Scenario A: a fresh trial becomes one launched node
// =============================================================================

#[tokio::test]
async fn fresh_emr_trial_launches_one_node() {
    let env = env();
    let now = Utc::now();
    let trial: TrialRequest = env
        .store
        .create(|trial_id| TrialRequest {
            trial_id,
            first_name: "Katherine".to_string(),
            last_name: "Johnson".to_string(),
            email: "kj@orbital.example".to_string(),
            company: "Orbital Mechanics".to_string(),
            title: Some("Analyst".to_string()),
            source_ip: Some("192.0.2.10".to_string()),
            cloud_provider: "EMR".to_string(),
            create_cluster: false,
            notify_customer: NotifyCustomer::None,
            created_at: now,
            state: TrialState::Pending,
            decision_reason: None,
        })
        .unwrap();

    let mut report = TickReport::default();
    env.reconciler
        .run_phase(Phase::Admit, now, &mut report)
        .await
        .unwrap();
    assert_eq!(report.approved, 1);

    let trial: TrialRequest = env.store.get(trial.trial_id).unwrap().unwrap();
    assert_eq!(trial.state, TrialState::Approved);
    let specs = env.store.list_all::<NodeSpec>().unwrap();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].state, SpecState::Pending);
    assert_eq!(specs[0].trial_request_id, Some(trial.trial_id));
    assert!(env.store.list_all::<ClusterSpec>().unwrap().is_empty());

    env.reconciler
        .run_phase(Phase::Provision, now, &mut report)
        .await
        .unwrap();
    assert_eq!(report.nodes_launched, 1);

    let nodes = env.store.list_all::<Node>().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].state, ResourceState::Launched);
    assert_eq!(nodes[0].spec_id, specs[0].spec_id);
    assert_eq!(nodes[0].dates.launched, now);
    assert_eq!(nodes[0].dates.ready, None);

    let spec: NodeSpec = env.store.get(specs[0].spec_id).unwrap().unwrap();
    assert_eq!(spec.state, SpecState::Finished);
    assert_eq!(env.cloud.create_calls(), 0);
}

// =============================================================================
// Scenario B: a ready node expires after its TTL and is deleted a tick later
// =============================================================================

#[tokio::test]
async fn ready_node_expires_then_deletes() {
    let env = env();
    let t = Utc::now();
    node_spec(&env.store, 72, t);

    env.reconciler.tick_at(t).await.unwrap();
    let node = env.store.list_all::<Node>().unwrap().remove(0);
    assert_eq!(node.state, ResourceState::Ready);
    assert_eq!(node.dates.ready, Some(t));

    let report = env.reconciler.tick_at(t + Duration::hours(71)).await.unwrap();
    assert_eq!(report.expired, 0);
    let node: Node = env.store.get(node.node_id).unwrap().unwrap();
    assert_eq!(node.state, ResourceState::Ready);

    let expired_at = t + Duration::hours(73);
    let report = env.reconciler.tick_at(expired_at).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.deleted, 0);
    let node: Node = env.store.get(node.node_id).unwrap().unwrap();
    assert_eq!(node.state, ResourceState::Expired);
    assert_eq!(node.dates.expired, Some(expired_at));
    assert_eq!(node.dates.deleted, None);

    let deleted_at = expired_at + Duration::seconds(10);
    let report = env.reconciler.tick_at(deleted_at).await.unwrap();
    assert_eq!(report.deleted, 1);
    let node: Node = env.store.get(node.node_id).unwrap().unwrap();
    assert_eq!(node.state, ResourceState::Deleted);
    assert_eq!(node.dates.ready, Some(t));
    assert_eq!(node.dates.expired, Some(expired_at));
    assert_eq!(node.dates.deleted, Some(deleted_at));
}

// =============================================================================
// Scenario C: an undersized worker volume keeps the cluster spec pending
// =============================================================================

#[tokio::test]
async fn undersized_worker_volume_stays_pending() {
    let env = env();
    let now = Utc::now();
    let spec: ClusterSpec = env
        .store
        .create(|spec_id| {
            let mut spec = ClusterSpec::new(spec_id, "EMR", "ops", now);
            spec.services = "Hadoop,Hive".to_string();
            spec.worker_volume_gb = 3;
            spec
        })
        .unwrap();

    let mut plan = ClusterPlan::from_spec(&spec);
    resolve(&mut plan, &ProviderRegistry::builtin().unwrap()).unwrap();
    let err = plan.validate().unwrap_err();
    assert_eq!(err.field(), "worker_volume_size");

    let mut report = TickReport::default();
    env.reconciler
        .run_phase(Phase::Provision, now, &mut report)
        .await
        .unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(report.clusters_launched, 0);
    assert_eq!(env.cloud.create_calls(), 0);

    // Still pending after further ticks; never finished or removed.
    env.reconciler.tick_at(now + Duration::seconds(10)).await.unwrap();
    let spec: ClusterSpec = env.store.get(spec.spec_id).unwrap().unwrap();
    assert_eq!(spec.state, SpecState::Pending);
    assert_eq!(env.store.list_pending::<ClusterSpec>().unwrap().len(), 1);
}
