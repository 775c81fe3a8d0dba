//! The Cloud Provisioning Gateway interface.
//!
//! This module provides the [`CloudGateway`] trait the reconciler provisions
//! through, the provider-agnostic types it exchanges, and an in-memory
//! [`mock::MockCloud`] for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trialfleet_core::CloudProvider;

use crate::error::Result;
use crate::plan::ClusterPlan;

/// Provider-agnostic cluster state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderClusterState {
    /// Being created or bootstrapped.
    Initializing,
    /// Running and accepting work.
    Ready,
    /// Being torn down.
    Deleting,
    /// Gone.
    Deleted,
    /// A state this gateway does not recognise.
    #[default]
    Unknown,
}

impl ProviderClusterState {
    /// Normalize a state string as the provider reports it.
    #[must_use]
    pub fn from_provider(provider: CloudProvider, raw: &str) -> Self {
        let raw = raw.trim().to_ascii_uppercase();
        match provider {
            CloudProvider::Emr => match raw.as_str() {
                "STARTING" | "BOOTSTRAPPING" => Self::Initializing,
                "RUNNING" | "WAITING" => Self::Ready,
                "TERMINATING" => Self::Deleting,
                "TERMINATED" | "TERMINATED_WITH_ERRORS" => Self::Deleted,
                _ => Self::Unknown,
            },
            CloudProvider::Hdi => match raw.as_str() {
                "ACCEPTED"
                | "CLUSTERSTORAGEPROVISIONED"
                | "AZUREVMCONFIGURATION"
                | "HDINSIGHTCONFIGURATION" => Self::Initializing,
                "OPERATIONAL" | "RUNNING" => Self::Ready,
                "DELETING" | "DELETEPENDING" => Self::Deleting,
                "DELETED" => Self::Deleted,
                _ => Self::Unknown,
            },
        }
    }

    /// Whether the cluster still exists or is coming up.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Initializing | Self::Ready)
    }
}

/// What a successful create returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHandle {
    /// Identifier the provider assigned.
    pub cluster_id: String,
    /// Name the cluster was created under.
    pub cluster_name: String,
    /// Provider request that created the cluster.
    pub request_id: String,
}

/// One entry of a cluster listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Identifier the provider assigned.
    pub cluster_id: String,
    /// Cluster name.
    pub cluster_name: String,
    /// Normalized state.
    pub state: ProviderClusterState,
}

/// Full description of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDetail {
    /// Identifier the provider assigned.
    pub cluster_id: String,
    /// Cluster name.
    pub cluster_name: String,
    /// Region the cluster runs in.
    pub region: String,
    /// Normalized state.
    pub state: ProviderClusterState,
    /// Address of the head node, once assigned.
    pub endpoint: Option<String>,
}

/// How to find a cluster for [`CloudGateway::describe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterLookup {
    /// By provider-assigned identifier.
    Id(String),
    /// By cluster name.
    Name(String),
}

/// Create, list, describe, and destroy clusters on the supported providers.
///
/// Implementations dispatch on the [`CloudProvider`] tag. `create` is never
/// retried internally.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Create a cluster from a resolved plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is unresolved or the provider rejects it.
    async fn create(&self, plan: &ClusterPlan) -> Result<ClusterHandle>;

    /// List clusters in a region.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached.
    async fn list(&self, provider: CloudProvider, region: &str) -> Result<Vec<ClusterSummary>>;

    /// Describe one cluster.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::NotFound` if no cluster matches, and
    /// `CloudError::Unsupported` for lookups the provider cannot do.
    async fn describe(
        &self,
        provider: CloudProvider,
        region: &str,
        lookup: &ClusterLookup,
    ) -> Result<ClusterDetail>;

    /// Tear a cluster down, returning the provider request id.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the request.
    async fn destroy(&self, provider: CloudProvider, region: &str, cluster_id: &str)
        -> Result<String>;
}

/// The provider and region of a resolved plan.
///
/// # Errors
///
/// Returns `CloudError::Config` if the plan was not resolved.
pub fn target_of(plan: &ClusterPlan) -> Result<(CloudProvider, &str)> {
    match (plan.provider, plan.region.as_deref()) {
        (Some(provider), Some(region)) => Ok((provider, region)),
        _ => Err(crate::CloudError::Config(format!(
            "cluster plan for spec {} has not been resolved",
            plan.spec_id
        ))),
    }
}

/// A mock gateway for testing without a provider.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::error::CloudError;

    /// A mock gateway that keeps clusters in memory.
    #[derive(Default)]
    pub struct MockCloud {
        clusters: Mutex<BTreeMap<String, MockCluster>>,
        create_calls: AtomicU64,
        destroy_calls: AtomicU64,
        fail_creates: Mutex<Option<String>>,
        fail_destroys: Mutex<Option<String>>,
    }

    #[derive(Clone)]
    struct MockCluster {
        provider: CloudProvider,
        region: String,
        name: String,
        state: ProviderClusterState,
        plan: ClusterPlan,
    }

    impl MockCloud {
        /// Create a new mock gateway.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent create fail with `message`.
        pub fn fail_creates(&self, message: impl Into<String>) {
            *self.fail_creates.lock() = Some(message.into());
        }

        /// Make every subsequent destroy fail with `message`.
        pub fn fail_destroys(&self, message: impl Into<String>) {
            *self.fail_destroys.lock() = Some(message.into());
        }

        /// Clear any injected failures.
        pub fn heal(&self) {
            *self.fail_creates.lock() = None;
            *self.fail_destroys.lock() = None;
        }

        /// Number of create calls, successful or not.
        #[must_use]
        pub fn create_calls(&self) -> u64 {
            self.create_calls.load(Ordering::SeqCst)
        }

        /// Number of destroy calls, successful or not.
        #[must_use]
        pub fn destroy_calls(&self) -> u64 {
            self.destroy_calls.load(Ordering::SeqCst)
        }

        /// Number of clusters not yet destroyed.
        #[must_use]
        pub fn active_count(&self) -> usize {
            self.clusters
                .lock()
                .values()
                .filter(|c| c.state.is_active())
                .count()
        }

        /// The plan a cluster was created from.
        #[must_use]
        pub fn plan_of(&self, cluster_id: &str) -> Option<ClusterPlan> {
            self.clusters.lock().get(cluster_id).map(|c| c.plan.clone())
        }

        fn detail(id: &str, cluster: &MockCluster) -> ClusterDetail {
            ClusterDetail {
                cluster_id: id.to_string(),
                cluster_name: cluster.name.clone(),
                region: cluster.region.clone(),
                state: cluster.state,
                endpoint: None,
            }
        }
    }

    #[async_trait]
    impl CloudGateway for MockCloud {
        async fn create(&self, plan: &ClusterPlan) -> Result<ClusterHandle> {
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(message) = self.fail_creates.lock().clone() {
                return Err(CloudError::Rejected {
                    status: 500,
                    message,
                });
            }

            let (provider, region) = target_of(plan)?;
            let cluster_id = format!("{}-{n:06}", provider.slug());
            self.clusters.lock().insert(
                cluster_id.clone(),
                MockCluster {
                    provider,
                    region: region.to_string(),
                    name: plan.cluster_name.clone(),
                    state: ProviderClusterState::Initializing,
                    plan: plan.clone(),
                },
            );

            Ok(ClusterHandle {
                cluster_id,
                cluster_name: plan.cluster_name.clone(),
                request_id: uuid::Uuid::new_v4().to_string(),
            })
        }

        async fn list(&self, provider: CloudProvider, region: &str) -> Result<Vec<ClusterSummary>> {
            Ok(self
                .clusters
                .lock()
                .iter()
                .filter(|(_, c)| c.provider == provider && c.region == region)
                .map(|(id, c)| ClusterSummary {
                    cluster_id: id.clone(),
                    cluster_name: c.name.clone(),
                    state: c.state,
                })
                .collect())
        }

        async fn describe(
            &self,
            provider: CloudProvider,
            region: &str,
            lookup: &ClusterLookup,
        ) -> Result<ClusterDetail> {
            let clusters = self.clusters.lock();
            let found = match lookup {
                ClusterLookup::Id(id) => clusters.get_key_value(id),
                ClusterLookup::Name(name) => {
                    if provider == CloudProvider::Emr {
                        return Err(CloudError::Unsupported(
                            "EMR clusters cannot be described by name".to_string(),
                        ));
                    }
                    clusters.iter().find(|(_, c)| &c.name == name)
                }
            };

            found
                .filter(|(_, c)| c.provider == provider && c.region == region)
                .map(|(id, c)| Self::detail(id, c))
                .ok_or_else(|| CloudError::NotFound(format!("{lookup:?}")))
        }

        async fn destroy(
            &self,
            provider: CloudProvider,
            region: &str,
            cluster_id: &str,
        ) -> Result<String> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.fail_destroys.lock().clone() {
                return Err(CloudError::Rejected {
                    status: 500,
                    message,
                });
            }

            let mut clusters = self.clusters.lock();
            let cluster = clusters
                .get_mut(cluster_id)
                .filter(|c| c.provider == provider && c.region == region)
                .ok_or_else(|| CloudError::NotFound(cluster_id.to_string()))?;
            cluster.state = ProviderClusterState::Deleted;

            Ok(uuid::Uuid::new_v4().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockCloud;
    use super::*;
    use crate::error::CloudError;
    use crate::plan::tests::sample_spec;
    use crate::profile::ProviderRegistry;
    use crate::resolver::resolve;

    fn resolved_plan() -> ClusterPlan {
        let mut plan = ClusterPlan::from_spec(&sample_spec());
        resolve(&mut plan, &ProviderRegistry::builtin().unwrap()).unwrap();
        plan
    }

    #[test]
    fn emr_state_mapping() {
        use ProviderClusterState::*;
        let emr = CloudProvider::Emr;
        assert_eq!(ProviderClusterState::from_provider(emr, "STARTING"), Initializing);
        assert_eq!(ProviderClusterState::from_provider(emr, "bootstrapping"), Initializing);
        assert_eq!(ProviderClusterState::from_provider(emr, "RUNNING"), Ready);
        assert_eq!(ProviderClusterState::from_provider(emr, "WAITING"), Ready);
        assert_eq!(ProviderClusterState::from_provider(emr, "TERMINATING"), Deleting);
        assert_eq!(ProviderClusterState::from_provider(emr, "TERMINATED"), Deleted);
        assert_eq!(
            ProviderClusterState::from_provider(emr, "TERMINATED_WITH_ERRORS"),
            Deleted
        );
        assert_eq!(ProviderClusterState::from_provider(emr, "???"), Unknown);
    }

    #[test]
    fn hdi_state_mapping() {
        use ProviderClusterState::*;
        let hdi = CloudProvider::Hdi;
        assert_eq!(ProviderClusterState::from_provider(hdi, "Accepted"), Initializing);
        assert_eq!(ProviderClusterState::from_provider(hdi, "Running"), Ready);
        assert_eq!(ProviderClusterState::from_provider(hdi, "Deleting"), Deleting);
    }

    #[test]
    fn target_requires_resolution() {
        let plan = ClusterPlan::from_spec(&sample_spec());
        assert!(matches!(target_of(&plan), Err(CloudError::Config(_))));

        let plan = resolved_plan();
        let (provider, region) = target_of(&plan).unwrap();
        assert_eq!(provider, CloudProvider::Emr);
        assert_eq!(region, "us-east-1");
    }

    #[tokio::test]
    async fn mock_lifecycle() {
        let cloud = MockCloud::new();
        let plan = resolved_plan();

        let handle = cloud.create(&plan).await.unwrap();
        assert_eq!(handle.cluster_name, "trialfleet-3");
        assert_eq!(cloud.active_count(), 1);

        let listed = cloud.list(CloudProvider::Emr, "us-east-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(cloud.list(CloudProvider::Emr, "us-west-2").await.unwrap().is_empty());

        let detail = cloud
            .describe(
                CloudProvider::Emr,
                "us-east-1",
                &ClusterLookup::Id(handle.cluster_id.clone()),
            )
            .await
            .unwrap();
        assert_eq!(detail.state, ProviderClusterState::Initializing);

        let by_name = cloud
            .describe(
                CloudProvider::Emr,
                "us-east-1",
                &ClusterLookup::Name(handle.cluster_name.clone()),
            )
            .await;
        assert!(matches!(by_name, Err(CloudError::Unsupported(_))));

        cloud
            .destroy(CloudProvider::Emr, "us-east-1", &handle.cluster_id)
            .await
            .unwrap();
        assert_eq!(cloud.active_count(), 0);

        let missing = cloud
            .describe(
                CloudProvider::Emr,
                "us-east-1",
                &ClusterLookup::Id("emr-999999".to_string()),
            )
            .await;
        assert!(matches!(missing, Err(CloudError::NotFound(_))));
    }

    #[tokio::test]
    async fn mock_injected_failures() {
        let cloud = MockCloud::new();
        let plan = resolved_plan();

        cloud.fail_creates("quota exceeded");
        assert!(cloud.create(&plan).await.is_err());
        assert_eq!(cloud.create_calls(), 1);
        assert_eq!(cloud.active_count(), 0);

        cloud.heal();
        let handle = cloud.create(&plan).await.unwrap();

        cloud.fail_destroys("throttled");
        assert!(cloud
            .destroy(CloudProvider::Emr, "us-east-1", &handle.cluster_id)
            .await
            .is_err());
        assert_eq!(cloud.active_count(), 1);
        assert_eq!(cloud.destroy_calls(), 1);
    }
}
