//! Domain types stored in the database.
//!
//! These types represent the persisted state of trial requests, provisioning
//! specs, and the nodes and clusters realized from them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use trialfleet_core::{
    CloudProvider, ClusterId, ClusterSpecId, EntityId, NodeId, NodeSpecId, TrialId,
};

use crate::schema::{tables, Table};

/// Sentinel cluster type / instance type meaning "use the provider default".
pub const DEFAULT_SENTINEL: &str = "DEFAULT";

/// Sentinel stack version meaning "the provider's newest supported release".
pub const LATEST_VERSION: &str = "LATEST";

/// Sentinel stack version meaning "the provider's recommended release".
pub const STABLE_VERSION: &str = "STABLE";

// =============================================================================
// Record plumbing
// =============================================================================

/// A state enum that can be stored in a one-byte index key.
pub trait StateCode: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Convert the state to its numeric representation.
    fn code(self) -> u8;
}

/// A persisted entity.
///
/// The store is generic over this trait: it allocates `Id`s, keeps the
/// by-state and by-creation-time indexes in sync, and optionally indexes the
/// trial request a record was created for.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Identifier type.
    type Id: EntityId;
    /// Lifecycle state type.
    type State: StateCode;

    /// Column families holding this record type.
    const TABLE: Table;

    /// The state every new record starts in.
    const INITIAL: Self::State;

    /// The record's identifier.
    fn id(&self) -> Self::Id;

    /// The record's current state.
    fn state(&self) -> Self::State;

    /// When the record was created.
    fn created_at(&self) -> DateTime<Utc>;

    /// The trial request this record was created for, if any.
    fn trial_request_id(&self) -> Option<TrialId> {
        None
    }
}

// =============================================================================
// Trial requests
// =============================================================================

/// Lifecycle states for a trial request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TrialState {
    /// Waiting for admission.
    Pending = 1,
    /// Admitted; provisioning specs were created.
    Approved = 2,
    /// Rejected by the admission policy.
    Denied = 3,
}

impl TrialState {
    /// Convert the state to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `TrialState`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Pending),
            2 => Some(Self::Approved),
            3 => Some(Self::Denied),
            _ => None,
        }
    }
}

impl StateCode for TrialState {
    fn code(self) -> u8 {
        self.as_u8()
    }
}

/// Whether the customer should hear about their trial by email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyCustomer {
    /// The customer did not ask to be notified.
    #[default]
    None,
    /// A notification is owed but has not been sent.
    Pending,
    /// The notification went out.
    Sent,
}

impl NotifyCustomer {
    /// The intake value for a request that did or did not ask for email.
    #[must_use]
    pub const fn from_request(send_email: bool) -> Self {
        if send_email {
            Self::Pending
        } else {
            Self::None
        }
    }
}

/// A prospective customer's request to try the product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRequest {
    /// Unique identifier.
    pub trial_id: TrialId,
    /// Requester's first name.
    pub first_name: String,
    /// Requester's last name.
    pub last_name: String,
    /// Requester's email address.
    pub email: String,
    /// Requester's company.
    pub company: String,
    /// Requester's job title.
    pub title: Option<String>,
    /// Address the request came from.
    pub source_ip: Option<String>,
    /// Provider name as submitted; may name an unsupported provider.
    pub cloud_provider: String,
    /// Whether a cluster was requested in addition to a node.
    pub create_cluster: bool,
    /// Email notification status.
    pub notify_customer: NotifyCustomer,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: TrialState,
    /// Why the request was approved or denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
}

impl Record for TrialRequest {
    type Id = TrialId;
    type State = TrialState;

    const TABLE: Table = tables::TRIALS;
    const INITIAL: TrialState = TrialState::Pending;

    fn id(&self) -> TrialId {
        self.trial_id
    }

    fn state(&self) -> TrialState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// =============================================================================
// Specs
// =============================================================================

/// Lifecycle states for node and cluster specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SpecState {
    /// Not yet realized.
    Pending = 1,
    /// A resource was produced from this spec.
    Finished = 2,
}

impl SpecState {
    /// Convert the state to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `SpecState`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Pending),
            2 => Some(Self::Finished),
            _ => None,
        }
    }
}

impl StateCode for SpecState {
    fn code(self) -> u8 {
        self.as_u8()
    }
}

/// A request to provision a single standalone node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier.
    pub spec_id: NodeSpecId,
    /// Provider to provision on.
    pub cloud_provider: CloudProvider,
    /// Region to provision in.
    pub region: String,
    /// User the node is provisioned for.
    pub user: String,
    /// Instance type.
    pub node_type: String,
    /// Storage layout description.
    pub storage_config: Option<String>,
    /// Product release installed on the node.
    pub software_version: String,
    /// Location of the release tarball.
    pub software_tarball: String,
    /// Database release installed alongside the product.
    pub database_version: String,
    /// Whether the on-demand components are installed.
    pub install_on_demand: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    /// Hours the resulting node may live.
    pub ttl_hours: u32,
    /// Trial this spec was created for.
    pub trial_request_id: Option<TrialId>,
    /// Request timestamp.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: SpecState,
}

impl Record for NodeSpec {
    type Id = NodeSpecId;
    type State = SpecState;

    const TABLE: Table = tables::NODE_SPECS;
    const INITIAL: SpecState = SpecState::Pending;

    fn id(&self) -> NodeSpecId {
        self.spec_id
    }

    fn state(&self) -> SpecState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn trial_request_id(&self) -> Option<TrialId> {
        self.trial_request_id
    }
}

/// A request to provision a multi-node cluster.
///
/// Most fields are optional or carry sentinels; the resolver fills them in
/// from the provider's capability profile before provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Unique identifier.
    pub spec_id: ClusterSpecId,
    /// Provider name as requested.
    pub cloud_provider: String,
    /// Region, or `None` for the provider default.
    pub region: Option<String>,
    /// User the cluster is provisioned for.
    pub user: String,
    /// Requested cluster name.
    pub cluster_name: Option<String>,
    /// Cluster topology, or [`DEFAULT_SENTINEL`].
    pub cluster_type: String,
    /// Stack release, or [`LATEST_VERSION`] / [`STABLE_VERSION`].
    pub stack_version: String,
    /// Head node instance type.
    pub head_node_type: Option<String>,
    /// Worker node instance type.
    pub worker_node_type: Option<String>,
    /// Number of head nodes.
    pub head_node_count: u32,
    /// Number of worker nodes.
    pub worker_node_count: u32,
    /// Root volume size in GiB.
    pub root_volume_gb: u32,
    /// Master volume size in GiB.
    pub master_volume_gb: u32,
    /// Worker volume size in GiB.
    pub worker_volume_gb: u32,
    /// High availability.
    pub high_availability: bool,
    /// SSL.
    pub ssl: bool,
    /// Kerberos.
    pub kerberos: bool,
    /// Comma-delimited service names.
    pub services: String,
    /// Bootstrap action reference.
    pub bootstrap_action: Option<String>,
    /// Free-form tags applied to the cluster.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Hours the resulting cluster may live.
    pub ttl_hours: u32,
    /// Trial this spec was created for.
    pub trial_request_id: Option<TrialId>,
    /// Request timestamp.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: SpecState,
}

impl ClusterSpec {
    /// Create a pending spec with the stock topology and sentinel values.
    #[must_use]
    pub fn new(
        spec_id: ClusterSpecId,
        cloud_provider: impl Into<String>,
        user: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            spec_id,
            cloud_provider: cloud_provider.into(),
            region: None,
            user: user.into(),
            cluster_name: None,
            cluster_type: DEFAULT_SENTINEL.to_string(),
            stack_version: LATEST_VERSION.to_string(),
            head_node_type: None,
            worker_node_type: None,
            head_node_count: 1,
            worker_node_count: 2,
            root_volume_gb: 10,
            master_volume_gb: 20,
            worker_volume_gb: 20,
            high_availability: false,
            ssl: false,
            kerberos: false,
            services: String::new(),
            bootstrap_action: None,
            tags: BTreeMap::new(),
            ttl_hours: 72,
            trial_request_id: None,
            created_at,
            state: SpecState::Pending,
        }
    }
}

impl Record for ClusterSpec {
    type Id = ClusterSpecId;
    type State = SpecState;

    const TABLE: Table = tables::CLUSTER_SPECS;
    const INITIAL: SpecState = SpecState::Pending;

    fn id(&self) -> ClusterSpecId {
        self.spec_id
    }

    fn state(&self) -> SpecState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn trial_request_id(&self) -> Option<TrialId> {
        self.trial_request_id
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Lifecycle states shared by nodes and clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResourceState {
    /// Provisioning was requested.
    Launched = 1,
    /// The resource is usable.
    Ready = 2,
    /// The TTL elapsed; the resource is about to be torn down.
    Expired = 3,
    /// The resource is gone.
    Deleted = 4,
}

impl ResourceState {
    /// Convert the state to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `ResourceState`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Launched),
            2 => Some(Self::Ready),
            3 => Some(Self::Expired),
            4 => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl StateCode for ResourceState {
    fn code(self) -> u8 {
        self.as_u8()
    }
}

/// When a resource entered each of its lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTimestamps {
    /// Set at creation.
    pub launched: DateTime<Utc>,
    /// Set on entering `Ready`.
    pub ready: Option<DateTime<Utc>>,
    /// Set on entering `Expired`.
    pub expired: Option<DateTime<Utc>>,
    /// Set on entering `Deleted`.
    pub deleted: Option<DateTime<Utc>>,
}

impl ResourceTimestamps {
    /// Timestamps for a resource launched at `at`.
    #[must_use]
    pub const fn launched_at(at: DateTime<Utc>) -> Self {
        Self {
            launched: at,
            ready: None,
            expired: None,
            deleted: None,
        }
    }
}

/// Behaviour shared by nodes and clusters, which follow one lifecycle.
pub trait Resource: Record<State = ResourceState> {
    /// Short name used in logs and errors.
    const KIND: &'static str;

    /// Set the state field. Callers go through the lifecycle mutators.
    fn set_state(&mut self, state: ResourceState);

    /// State-entry timestamps.
    fn timestamps(&self) -> &ResourceTimestamps;

    /// Mutable state-entry timestamps.
    fn timestamps_mut(&mut self) -> &mut ResourceTimestamps;

    /// Hours the resource may live.
    fn ttl_hours(&self) -> u32;

    /// Change how many hours the resource may live.
    fn set_ttl_hours(&mut self, hours: u32);
}

/// A realized standalone node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier.
    pub node_id: NodeId,
    /// Spec this node was produced from.
    pub spec_id: NodeSpecId,
    /// Provider the node runs on.
    pub cloud_provider: CloudProvider,
    /// Region the node runs in.
    pub region: String,
    /// Instance type.
    pub node_type: String,
    /// Assigned address, once known.
    pub ip: Option<String>,
    /// Hours the node may live.
    pub ttl_hours: u32,
    /// Current lifecycle state.
    pub state: ResourceState,
    /// State-entry timestamps.
    pub dates: ResourceTimestamps,
}

impl Record for Node {
    type Id = NodeId;
    type State = ResourceState;

    const TABLE: Table = tables::NODES;
    const INITIAL: ResourceState = ResourceState::Launched;

    fn id(&self) -> NodeId {
        self.node_id
    }

    fn state(&self) -> ResourceState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.dates.launched
    }
}

impl Resource for Node {
    const KIND: &'static str = "node";

    fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    fn timestamps(&self) -> &ResourceTimestamps {
        &self.dates
    }

    fn timestamps_mut(&mut self) -> &mut ResourceTimestamps {
        &mut self.dates
    }

    fn ttl_hours(&self) -> u32 {
        self.ttl_hours
    }

    fn set_ttl_hours(&mut self, hours: u32) {
        self.ttl_hours = hours;
    }
}

/// A realized cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique identifier.
    pub cluster_id: ClusterId,
    /// Spec this cluster was produced from.
    pub spec_id: ClusterSpecId,
    /// Provider the cluster runs on.
    pub cloud_provider: CloudProvider,
    /// Region the cluster runs in.
    pub region: String,
    /// Resolved topology.
    pub cluster_type: String,
    /// Resolved stack release.
    pub stack_version: String,
    /// Head node instance type.
    pub head_node_type: String,
    /// Worker node instance type.
    pub worker_node_type: String,
    /// Number of head nodes.
    pub head_node_count: u32,
    /// Number of worker nodes.
    pub worker_node_count: u32,
    /// Identifier the provider assigned.
    pub provider_cluster_id: Option<String>,
    /// Name the cluster was created under.
    pub cluster_name: Option<String>,
    /// Provider request that created the cluster.
    pub request_id: Option<String>,
    /// JSON description of the resolved plan.
    pub config: String,
    /// Hours the cluster may live.
    pub ttl_hours: u32,
    /// Current lifecycle state.
    pub state: ResourceState,
    /// State-entry timestamps.
    pub dates: ResourceTimestamps,
}

impl Record for Cluster {
    type Id = ClusterId;
    type State = ResourceState;

    const TABLE: Table = tables::CLUSTERS;
    const INITIAL: ResourceState = ResourceState::Launched;

    fn id(&self) -> ClusterId {
        self.cluster_id
    }

    fn state(&self) -> ResourceState {
        self.state
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.dates.launched
    }
}

impl Resource for Cluster {
    const KIND: &'static str = "cluster";

    fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    fn timestamps(&self) -> &ResourceTimestamps {
        &self.dates
    }

    fn timestamps_mut(&mut self) -> &mut ResourceTimestamps {
        &mut self.dates
    }

    fn ttl_hours(&self) -> u32 {
        self.ttl_hours
    }

    fn set_ttl_hours(&mut self, hours: u32) {
        self.ttl_hours = hours;
    }
}
