//! Spec resolution and cloud provisioning for trialfleet.
//!
//! This crate turns stored cluster specs into provider-ready plans and hands
//! them to a provisioning backend.
//!
//! # Architecture
//!
//! ```text
//!   ClusterSpec ──► ClusterPlan ──► resolve() ──► CloudGateway
//!                   (plan.rs)       (resolver.rs)  (gateway.rs / http.rs)
//!                                        │
//!                                        ▼
//!                                 ProviderRegistry
//!                                   (profile.rs)
//! ```
//!
//! Provider knowledge (regions, versions, instance types, network placement)
//! lives in [`ProviderProfile`] values, so supporting another provider means
//! registering another profile rather than adding branches.
//!
//! # Usage
//!
//! ```no_run
//! use trialfleet_cloud::{resolve, CloudGateway, ClusterPlan, HttpCloudGateway, ProviderRegistry};
//! # use trialfleet_store::ClusterSpec;
//!
//! # async fn example(spec: ClusterSpec) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProviderRegistry::builtin()?;
//! let gateway = HttpCloudGateway::new("http://broker:8080")?;
//!
//! let mut plan = ClusterPlan::from_spec(&spec);
//! resolve(&mut plan, &registry)?;
//! plan.validate()?;
//!
//! let handle = gateway.create(&plan).await?;
//! println!("Created cluster: {}", handle.cluster_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod gateway;
pub mod http;
pub mod plan;
pub mod profile;
pub mod resolver;

pub use error::{CloudError, Result, ValidationError};
pub use gateway::{
    target_of, CloudGateway, ClusterDetail, ClusterHandle, ClusterLookup, ClusterSummary,
    ProviderClusterState,
};
pub use http::HttpCloudGateway;
pub use plan::{parse_services, ClusterPlan, VersionKind, SERVICES};
pub use profile::{
    InstanceMatcher, NetworkPlacement, NetworkPlan, NodeRole, ProviderProfile, ProviderRegistry,
    Region,
};
pub use resolver::resolve;

#[cfg(any(test, feature = "test-utils"))]
pub use gateway::mock::MockCloud;
