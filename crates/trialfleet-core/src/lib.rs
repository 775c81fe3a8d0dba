//! Core types and utilities for trialfleet.
//!
//! This crate provides the foundational types shared by every other trialfleet crate:
//!
//! - **Identifiers**: Strongly-typed integer IDs for trial requests, specs, and resources
//! - **Providers**: The closed set of supported cloud providers
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use trialfleet_core::{CloudProvider, NodeId, TrialId};
//!
//! let trial_id: TrialId = "42".parse().unwrap();
//! assert_eq!(trial_id.get(), 42);
//!
//! let provider: CloudProvider = "emr".parse().unwrap();
//! assert_eq!(provider, CloudProvider::Emr);
//! assert_eq!(NodeId::new(7).to_string(), "7");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod provider;

pub use error::{CoreError, Result};
pub use ids::{ClusterId, ClusterSpecId, EntityId, IdError, NodeId, NodeSpecId, TrialId};
pub use provider::CloudProvider;
