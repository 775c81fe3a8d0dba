//! `RocksDB` storage layer for trialfleet.
//!
//! This crate provides persistent storage for trial requests, node and cluster
//! specs, and realized nodes and clusters using `RocksDB` with column families
//! for efficient indexing.
//!
//! # Architecture
//!
//! Each record type has a primary column family keyed by its integer
//! identifier, a `<table>_by_state` index for lifecycle queries, and a
//! `<table>_by_created` index for time-window queries. Specs also carry a
//! `<table>_by_trial` index. Identifiers are allocated from the `sequences`
//! column family.
//!
//! Records are plain values: mutate a copy in memory, then [`Store::put`] it to
//! commit. Every commit rewrites the record and its index entries in a single
//! atomic write batch.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use trialfleet_store::{RocksStore, Store, TrialRequest, TrialState, NotifyCustomer};
//!
//! let store = RocksStore::open("/tmp/trialfleet-db").unwrap();
//!
//! let trial: TrialRequest = store
//!     .create(|trial_id| TrialRequest {
//!         trial_id,
//!         first_name: "Ada".into(),
//!         last_name: "Lovelace".into(),
//!         email: "ada@example.com".into(),
//!         company: "Analytical".into(),
//!         title: None,
//!         source_ip: None,
//!         cloud_provider: "EMR".into(),
//!         create_cluster: false,
//!         notify_customer: NotifyCustomer::None,
//!         created_at: Utc::now(),
//!         state: TrialState::Pending,
//!         decision_reason: None,
//!     })
//!     .unwrap();
//!
//! let pending = store.list_pending::<TrialRequest>().unwrap();
//! assert_eq!(pending[0].trial_id, trial.trial_id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    Cluster, ClusterSpec, Node, NodeSpec, NotifyCustomer, Record, Resource, ResourceState,
    ResourceTimestamps, SpecState, StateCode, TrialRequest, TrialState, DEFAULT_SENTINEL,
    LATEST_VERSION, STABLE_VERSION,
};

use chrono::{DateTime, Utc};
use trialfleet_core::TrialId;

/// The storage trait defining all database operations.
///
/// Operations are generic over [`Record`], so one implementation serves all
/// five entity types.
pub trait Store: Send + Sync {
    /// Allocate the next identifier for `R`, build the record, and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, or if `build`
    /// returns a record whose identifier differs from the one it was given.
    fn create<R, F>(&self, build: F) -> Result<R>
    where
        R: Record,
        F: FnOnce(R::Id) -> R;

    /// Commit an in-memory record, keeping all indexes in sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put<R: Record>(&self, record: &R) -> Result<()>;

    /// Get a record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get<R: Record>(&self, id: R::Id) -> Result<Option<R>>;

    /// List all records in a state, in identifier order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_by_state<R: Record>(&self, state: R::State) -> Result<Vec<R>>;

    /// List all records created strictly after `after`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_created_after<R: Record>(&self, after: DateTime<Utc>) -> Result<Vec<R>>;

    /// List the records that were created for a trial request.
    ///
    /// Always empty for record types that do not reference trials.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_by_trial<R: Record>(&self, trial_id: TrialId) -> Result<Vec<R>>;

    /// List all records of a type.
    ///
    /// Use with caution in production; prefer filtered queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all<R: Record>(&self) -> Result<Vec<R>>;

    /// List all records in any of the given states.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_by_states<R: Record>(&self, states: &[R::State]) -> Result<Vec<R>> {
        let mut records = Vec::new();
        for state in states {
            records.extend(self.list_by_state::<R>(*state)?);
        }
        Ok(records)
    }

    /// List all records still in their initial state.
    ///
    /// That is `Pending` for trials and specs, `Launched` for resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending<R: Record>(&self) -> Result<Vec<R>> {
        self.list_by_state::<R>(R::INITIAL)
    }
}
