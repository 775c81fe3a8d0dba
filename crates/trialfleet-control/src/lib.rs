//! Reconciliation engine for trialfleet trial resources.
//!
//! This crate owns the control loop that admits trial requests, provisions
//! the resources they ask for, and reclaims those resources when their TTL
//! runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Reconciler                            │
//! │  Admit ──► Provision ──► Monitor ──► Expire   (every tick)   │
//! │    │           │                        │                    │
//! │    ▼           ▼                        ▼                    │
//! │ admission   resolve + validate      lifecycle                │
//! └─────────────────────────────────────────────────────────────┘
//!                │                 │
//!                ▼                 ▼
//!         ┌──────────┐      ┌──────────────┐
//!         │  Store   │      │ CloudGateway │
//!         │ (RocksDB)│      │  (broker)    │
//!         └──────────┘      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use trialfleet_cloud::{HttpCloudGateway, ProviderRegistry};
//! use trialfleet_control::{ControlConfig, Reconciler};
//! use trialfleet_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/trialfleet")?);
//! let gateway = Arc::new(HttpCloudGateway::new("http://broker:8080")?);
//! let reconciler = Reconciler::new(
//!     store,
//!     gateway,
//!     ProviderRegistry::builtin()?,
//!     ControlConfig::from_env(),
//! );
//!
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! reconciler.run(shutdown_rx).await;
//! # Ok(())
//! # }
//! ```
//!
//! # State Machines
//!
//! - `TrialRequest`: `Pending` → `Approved` or `Denied`
//! - `NodeSpec` / `ClusterSpec`: `Pending` → `Finished`
//! - `Node` / `Cluster`: `Launched` → `Ready` → `Expired` → `Deleted`, with
//!   `Launched` → `Expired` for resources that never became ready
//!
//! See the [`lifecycle`] module for the guarded mutators.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod admission;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod resources;

pub use admission::{evaluate, AdmissionSnapshot, Decision};
pub use config::ControlConfig;
pub use error::{ControlError, Result};
pub use reconciler::{Phase, Reconciler, TickReport};
pub use resources::ResourceManager;

// Re-export commonly used types from dependencies for convenience
pub use trialfleet_core::{CloudProvider, ClusterId, NodeId, TrialId};
pub use trialfleet_store::{Cluster, Node, ResourceState, TrialRequest, TrialState};
