//! Operator actions on provisioned resources.
//!
//! These go through the same guarded mutators as the reconciler, so an
//! operator can shorten or lengthen a resource's life without breaking its
//! state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use trialfleet_store::{Cluster, Node, Resource, ResourceState, Store};

use crate::error::{ControlError, Result};
use crate::lifecycle;

/// TTL and listing operations on nodes and clusters.
///
/// Operations are generic over the resource kind: `extend::<Node>(..)` or
/// `extend::<Cluster>(..)`.
pub struct ResourceManager<S: Store> {
    store: Arc<S>,
}

impl<S: Store> ResourceManager<S> {
    /// Create a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Add `extra_hours` to the TTL of a launched or ready resource.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotFound` for an unknown id and
    /// `ControlError::InvalidState` if the resource is expired or deleted.
    pub fn extend<R: Resource>(&self, id: R::Id, extra_hours: u32) -> Result<R> {
        let mut resource = self.load::<R>(id)?;
        if !lifecycle::is_live(resource.state()) {
            return Err(ControlError::InvalidState {
                entity: format!("{} {id}", R::KIND),
                state: format!("{:?}", resource.state()),
                action: "extend its TTL",
            });
        }

        let ttl_hours = resource.ttl_hours().saturating_add(extra_hours);
        resource.set_ttl_hours(ttl_hours);
        self.store.put(&resource)?;
        tracing::info!(kind = R::KIND, id = %id, extra_hours, ttl_hours, "Extended TTL");
        Ok(resource)
    }

    /// Expire a resource now; the next tick reaps it.
    ///
    /// Expiring an already expired resource is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotFound` for an unknown id and
    /// `ControlError::IllegalTransition` if the resource was deleted.
    pub fn expire_now<R: Resource>(&self, id: R::Id, now: DateTime<Utc>) -> Result<R> {
        let mut resource = self.load::<R>(id)?;
        if lifecycle::advance_resource(&mut resource, ResourceState::Expired, now)? {
            self.store.put(&resource)?;
        }
        Ok(resource)
    }

    /// Nodes that still exist at the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn active_nodes(&self) -> Result<Vec<Node>> {
        self.active::<Node>()
    }

    /// Clusters that still exist at the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn active_clusters(&self) -> Result<Vec<Cluster>> {
        self.active::<Cluster>()
    }

    fn active<R: Resource>(&self) -> Result<Vec<R>> {
        Ok(self.store.list_by_states::<R>(&lifecycle::ACTIVE_STATES)?)
    }

    fn load<R: Resource>(&self, id: R::Id) -> Result<R> {
        self.store.get::<R>(id)?.ok_or_else(|| ControlError::NotFound {
            kind: R::KIND,
            id: id.to_string(),
        })
    }
}
