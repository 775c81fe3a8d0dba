//! The reconciliation loop.
//!
//! A [`Reconciler`] drives every entity one step per tick, in a fixed phase
//! order:
//!
//! 1. **Admit** pending trials, creating specs for approved ones.
//! 2. **Provision** pending node and cluster specs.
//! 3. **Monitor** launched resources and mark them ready.
//! 4. **Expire**: reap expired resources, then expire those past their TTL.
//!
//! Each entity is committed before the next is touched. A failure on one
//! entity is logged and the phase moves on; only an illegal transition
//! aborts the tick.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use trialfleet_cloud::{resolve, target_of, CloudError, CloudGateway, ClusterPlan, ProviderRegistry};
use trialfleet_core::CloudProvider;
use trialfleet_store::{
    Cluster, ClusterSpec, Node, NodeSpec, Resource, ResourceState, ResourceTimestamps, SpecState,
    Store, TrialRequest, TrialState,
};

use crate::admission::{self, AdmissionSnapshot};
use crate::config::ControlConfig;
use crate::error::{ControlError, Result};
use crate::lifecycle;

/// Tag linking a trial's cluster back to its request.
pub const TRIAL_TAG: &str = "TrialId";

/// The phases of a tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Decide pending trials.
    Admit,
    /// Turn pending specs into resources.
    Provision,
    /// Promote launched resources.
    Monitor,
    /// Reap and expire resources.
    Expire,
}

impl Phase {
    /// Every phase, in order.
    pub const ALL: [Self; 4] = [Self::Admit, Self::Provision, Self::Monitor, Self::Expire];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admit => "admit",
            Self::Provision => "provision",
            Self::Monitor => "monitor",
            Self::Expire => "expire",
        };
        f.write_str(name)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Trials approved.
    pub approved: usize,
    /// Trials denied.
    pub denied: usize,
    /// Nodes created from specs.
    pub nodes_launched: usize,
    /// Clusters created from specs.
    pub clusters_launched: usize,
    /// Resources marked ready.
    pub marked_ready: usize,
    /// Resources whose TTL elapsed.
    pub expired: usize,
    /// Resources deleted.
    pub deleted: usize,
    /// Entities left for the next tick after a failure.
    pub failures: usize,
    /// Whether shutdown cut the tick short.
    pub interrupted: bool,
}

/// Drives trials, specs, and resources through their lifecycles.
pub struct Reconciler<S: Store, G: CloudGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    registry: ProviderRegistry,
    config: ControlConfig,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl<S: Store, G: CloudGateway> Reconciler<S, G> {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        registry: ProviderRegistry,
        config: ControlConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            registry,
            config,
            last_tick: Mutex::new(None),
        }
    }

    /// The store this reconciler commits to.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Clock value of the last completed tick.
    #[must_use]
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.lock()
    }

    /// Run all four phases once as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::IllegalTransition` if a phase asked for a
    /// transition its state machine does not allow. Other failures are
    /// logged per entity and counted in the report.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        self.tick(now, None).await
    }

    /// Tick until `shutdown` turns true.
    ///
    /// The pause between ticks is measured from the end of one tick to the
    /// start of the next. Shutdown is honored between phases and during the
    /// pause, never in the middle of an entity.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_seconds = self.config.tick_interval_seconds,
            "Starting reconciliation loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            match self.tick(Utc::now(), Some(&shutdown)).await {
                Ok(report) => {
                    tracing::info!(elapsed = ?started.elapsed(), ?report, "Tick complete");
                }
                Err(e) => {
                    tracing::error!(elapsed = ?started.elapsed(), error = %e, "Tick aborted");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.tick_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reconciliation loop stopped");
    }

    /// Run a single phase as of `now`, adding to `report`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::IllegalTransition` on an invariant violation,
    /// or the error of a store query the phase could not start without.
    pub async fn run_phase(
        &self,
        phase: Phase,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        match phase {
            Phase::Admit => self.admit(now, report),
            Phase::Provision => self.provision(now, report).await,
            Phase::Monitor => self.monitor(now, report),
            Phase::Expire => self.expire(now, report).await,
        }
    }

    async fn tick(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<TickReport> {
        tracing::debug!(now = %now, "Starting tick");
        let mut report = TickReport::default();

        for phase in Phase::ALL {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!(phase = %phase, "Shutdown requested; ending tick early");
                report.interrupted = true;
                break;
            }

            if let Err(e) = self.run_phase(phase, now, &mut report).await {
                if e.is_invariant_violation() {
                    return Err(e);
                }
                tracing::error!(phase = %phase, error = %e, "Phase failed");
            }
        }

        *self.last_tick.lock() = Some(now);
        Ok(report)
    }

    // =========================================================================
    // Admit
    // =========================================================================

    fn admit(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        for trial in self.store.list_pending::<TrialRequest>()? {
            let entity = format!("trial {}", trial.trial_id);
            match self.admit_one(trial, now) {
                Ok(true) => report.approved += 1,
                Ok(false) => report.denied += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    fn admit_one(&self, mut trial: TrialRequest, now: DateTime<Utc>) -> Result<bool> {
        let snapshot = AdmissionSnapshot::capture(self.store.as_ref(), now)?;
        let decision = admission::evaluate(&trial, &snapshot, &self.config);

        if decision.approved {
            self.ensure_trial_specs(&trial, now)?;
            lifecycle::advance(&mut trial, TrialState::Approved)?;
        } else {
            tracing::warn!(
                trial_id = %trial.trial_id,
                email = %trial.email,
                company = %trial.company,
                reason = %decision.reason,
                "Trial denied"
            );
            lifecycle::advance(&mut trial, TrialState::Denied)?;
        }

        trial.decision_reason = Some(decision.reason);
        self.store.put(&trial)?;
        Ok(decision.approved)
    }

    /// Create the trial's specs unless an earlier, uncommitted attempt did.
    fn ensure_trial_specs(&self, trial: &TrialRequest, now: DateTime<Utc>) -> Result<()> {
        let provider: CloudProvider = trial.cloud_provider.parse()?;
        let profile = self.registry.get(provider).ok_or_else(|| {
            ControlError::Config(format!("no capability profile registered for {provider}"))
        })?;

        if self.store.list_by_trial::<NodeSpec>(trial.trial_id)?.is_empty() {
            let mut extra = BTreeMap::new();
            extra.insert("email".to_string(), trial.email.clone());
            extra.insert("company".to_string(), trial.company.clone());

            let spec: NodeSpec = self.store.create(|spec_id| NodeSpec {
                spec_id,
                cloud_provider: provider,
                region: profile.default_region.clone(),
                user: self.config.trial_user.clone(),
                node_type: profile.default_head_node_type.clone(),
                storage_config: None,
                software_version: self.config.software_version.clone(),
                software_tarball: self.config.software_tarball.clone(),
                database_version: self.config.database_version.clone(),
                install_on_demand: false,
                extra,
                ttl_hours: self.config.free_trial_ttl_hours,
                trial_request_id: Some(trial.trial_id),
                created_at: now,
                state: SpecState::Pending,
            })?;
            tracing::info!(trial_id = %trial.trial_id, spec_id = %spec.spec_id, "Created node spec");
        }

        if trial.create_cluster
            && self
                .store
                .list_by_trial::<ClusterSpec>(trial.trial_id)?
                .is_empty()
        {
            let spec: ClusterSpec = self.store.create(|spec_id| {
                let mut spec =
                    ClusterSpec::new(spec_id, provider.as_str(), &self.config.trial_user, now);
                spec.services.clone_from(&self.config.default_services);
                spec.ttl_hours = self.config.free_trial_ttl_hours;
                spec.trial_request_id = Some(trial.trial_id);
                spec.tags
                    .insert(TRIAL_TAG.to_string(), trial.trial_id.to_string());
                spec
            })?;
            tracing::info!(trial_id = %trial.trial_id, spec_id = %spec.spec_id, "Created cluster spec");
        }

        Ok(())
    }

    // =========================================================================
    // Provision
    // =========================================================================

    async fn provision(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        self.provision_nodes(now, report)?;
        self.provision_clusters(now, report).await
    }

    fn provision_nodes(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        for spec in self.store.list_pending::<NodeSpec>()? {
            let entity = format!("node spec {}", spec.spec_id);
            match self.launch_node(spec, now) {
                Ok(()) => report.nodes_launched += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    fn launch_node(&self, mut spec: NodeSpec, now: DateTime<Utc>) -> Result<()> {
        let ttl_hours = self.ttl_or_default(spec.ttl_hours);
        let node: Node = self.store.create(|node_id| Node {
            node_id,
            spec_id: spec.spec_id,
            cloud_provider: spec.cloud_provider,
            region: spec.region.clone(),
            node_type: spec.node_type.clone(),
            ip: None,
            ttl_hours,
            state: ResourceState::Launched,
            dates: ResourceTimestamps::launched_at(now),
        })?;

        lifecycle::advance(&mut spec, SpecState::Finished)?;
        self.store.put(&spec)?;
        tracing::info!(spec_id = %spec.spec_id, node_id = %node.node_id, "Launched node");
        Ok(())
    }

    async fn provision_clusters(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        for spec in self.store.list_pending::<ClusterSpec>()? {
            let entity = format!("cluster spec {}", spec.spec_id);
            match self.launch_cluster(spec, now).await {
                Ok(()) => report.clusters_launched += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    async fn launch_cluster(&self, mut spec: ClusterSpec, now: DateTime<Utc>) -> Result<()> {
        let mut plan = ClusterPlan::from_spec(&spec);
        resolve(&mut plan, &self.registry)?;
        plan.validate()?;

        let handle = self.gateway.create(&plan).await?;
        let (provider, region) = target_of(&plan)?;
        let ttl_hours = self.ttl_or_default(spec.ttl_hours);

        let cluster: Cluster = self.store.create(|cluster_id| Cluster {
            cluster_id,
            spec_id: spec.spec_id,
            cloud_provider: provider,
            region: region.to_string(),
            cluster_type: plan.cluster_type.clone(),
            stack_version: plan.stack_version.clone().unwrap_or_default(),
            head_node_type: plan.head_node_type.clone().unwrap_or_default(),
            worker_node_type: plan.worker_node_type.clone().unwrap_or_default(),
            head_node_count: plan.head_node_count,
            worker_node_count: plan.worker_node_count,
            provider_cluster_id: Some(handle.cluster_id.clone()),
            cluster_name: Some(handle.cluster_name.clone()),
            request_id: Some(handle.request_id.clone()),
            config: plan.to_config_json(),
            ttl_hours,
            state: ResourceState::Launched,
            dates: ResourceTimestamps::launched_at(now),
        })?;

        lifecycle::advance(&mut spec, SpecState::Finished)?;
        self.store.put(&spec)?;
        tracing::info!(
            spec_id = %spec.spec_id,
            cluster_id = %cluster.cluster_id,
            provider_cluster_id = %handle.cluster_id,
            "Launched cluster"
        );
        Ok(())
    }

    fn ttl_or_default(&self, ttl_hours: u32) -> u32 {
        if ttl_hours == 0 {
            self.config.default_ttl_hours
        } else {
            ttl_hours
        }
    }

    // =========================================================================
    // Monitor
    // =========================================================================

    fn monitor(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        self.mark_ready::<Node>(now, report)?;
        self.mark_ready::<Cluster>(now, report)
    }

    fn mark_ready<R: Resource>(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        for mut resource in self.store.list_pending::<R>()? {
            let entity = format!("{} {}", R::KIND, resource.id());
            match self.commit_resource(&mut resource, ResourceState::Ready, now) {
                Ok(_) => report.marked_ready += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Expire
    // =========================================================================

    async fn expire(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        // Reap before detecting so nothing skips the visible Expired window.
        self.reap_nodes(now, report)?;
        self.reap_clusters(now, report).await?;
        self.expire_elapsed::<Node>(now, report)?;
        self.expire_elapsed::<Cluster>(now, report)
    }

    fn reap_nodes(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        for mut node in self.store.list_by_state::<Node>(ResourceState::Expired)? {
            let entity = format!("node {}", node.node_id);
            match self.commit_resource(&mut node, ResourceState::Deleted, now) {
                Ok(_) => report.deleted += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    async fn reap_clusters(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        for cluster in self.store.list_by_state::<Cluster>(ResourceState::Expired)? {
            let entity = format!("cluster {}", cluster.cluster_id);
            match self.destroy_cluster(cluster, now).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    /// Tear the cluster down at the provider, then mark it deleted.
    async fn destroy_cluster(&self, mut cluster: Cluster, now: DateTime<Utc>) -> Result<()> {
        if let Some(provider_id) = cluster.provider_cluster_id.as_deref() {
            match self
                .gateway
                .destroy(cluster.cloud_provider, &cluster.region, provider_id)
                .await
            {
                Ok(request_id) => tracing::info!(
                    cluster_id = %cluster.cluster_id,
                    provider_cluster_id = provider_id,
                    request_id = %request_id,
                    "Requested cluster teardown"
                ),
                Err(CloudError::NotFound(_)) => tracing::warn!(
                    cluster_id = %cluster.cluster_id,
                    provider_cluster_id = provider_id,
                    "Cluster already gone at provider"
                ),
                Err(e) => return Err(e.into()),
            }
        }

        self.commit_resource(&mut cluster, ResourceState::Deleted, now)?;
        Ok(())
    }

    fn expire_elapsed<R: Resource>(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        let live = self
            .store
            .list_by_states::<R>(&[ResourceState::Launched, ResourceState::Ready])?;

        for mut resource in live.into_iter().filter(|r| ttl_elapsed(r, now)) {
            let entity = format!("{} {}", R::KIND, resource.id());
            match self.commit_resource(&mut resource, ResourceState::Expired, now) {
                Ok(_) => report.expired += 1,
                Err(e) => {
                    report.failures += 1;
                    contain(&entity, e)?;
                }
            }
        }
        Ok(())
    }

    fn commit_resource<R: Resource>(
        &self,
        resource: &mut R,
        to: ResourceState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = lifecycle::advance_resource(resource, to, now)?;
        if changed {
            self.store.put(resource)?;
        }
        Ok(changed)
    }
}

/// Returns true once a live resource has outlived its TTL.
///
/// Time counts from entering its current state: `dates.ready` for ready
/// resources, `dates.launched` for launched ones.
#[must_use]
pub fn ttl_elapsed<R: Resource>(resource: &R, now: DateTime<Utc>) -> bool {
    let dates = resource.timestamps();
    let since = match resource.state() {
        ResourceState::Ready => dates.ready.unwrap_or(dates.launched),
        _ => dates.launched,
    };
    now.signed_duration_since(since) > Duration::hours(i64::from(resource.ttl_hours()))
}

/// Log a per-entity failure so the phase can move on.
///
/// Invariant violations are handed back to abort the tick.
fn contain(entity: &str, err: ControlError) -> Result<()> {
    if err.is_invariant_violation() {
        return Err(err);
    }

    match &err {
        ControlError::Validation(v) => tracing::warn!(
            entity,
            field = v.field(),
            error = %err,
            "Validation failed; leaving pending"
        ),
        ControlError::Cloud(_) => tracing::error!(
            entity,
            retriable = err.is_retriable(),
            error = %err,
            "Provider call failed; will retry next tick"
        ),
        _ => tracing::error!(entity, error = %err, "Processing failed; will retry next tick"),
    }
    Ok(())
}
