//! Lifecycle state machines.
//!
//! Every stateful entity moves through a fixed transition table. The guarded
//! mutators here are the only code that writes a `state` field; requesting
//! the current state is a no-op, and anything outside the table is an
//! [`ControlError::IllegalTransition`].
//!
//! # State Machines
//!
//! ```text
//!   TrialRequest:  Pending ──► Approved
//!                     └─────► Denied
//!
//!   NodeSpec / ClusterSpec:  Pending ──► Finished
//!
//!   Node / Cluster:
//!        Launched ──► Ready ──► Expired ──► Deleted
//!            └──────────────────►┘
//! ```
//!
//! Resources stamp `dates.ready`, `dates.expired`, and `dates.deleted` when
//! they enter the matching state.

use chrono::{DateTime, Utc};
use trialfleet_store::{
    ClusterSpec, NodeSpec, Record, Resource, ResourceState, SpecState, StateCode, TrialRequest,
    TrialState,
};

use crate::error::{ControlError, Result};

/// A state enum with a transition table.
pub trait Lifecycle: StateCode {
    /// Every state, for exhaustive checks.
    const ALL: &'static [Self];

    /// States reachable in one step.
    fn reachable(self) -> &'static [Self];
}

impl Lifecycle for TrialState {
    const ALL: &'static [Self] = &[Self::Pending, Self::Approved, Self::Denied];

    fn reachable(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Approved, Self::Denied],
            Self::Approved | Self::Denied => &[],
        }
    }
}

impl Lifecycle for SpecState {
    const ALL: &'static [Self] = &[Self::Pending, Self::Finished];

    fn reachable(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Finished],
            Self::Finished => &[],
        }
    }
}

impl Lifecycle for ResourceState {
    const ALL: &'static [Self] = &[Self::Launched, Self::Ready, Self::Expired, Self::Deleted];

    fn reachable(self) -> &'static [Self] {
        match self {
            Self::Launched => &[Self::Ready, Self::Expired],
            Self::Ready => &[Self::Expired],
            Self::Expired => &[Self::Deleted],
            Self::Deleted => &[],
        }
    }
}

/// Check if a state transition is valid. Staying put always is.
#[must_use]
pub fn is_valid_transition<S: Lifecycle>(from: S, to: S) -> bool {
    from == to || from.reachable().contains(&to)
}

/// Returns true if no transition leaves the state.
#[must_use]
pub fn is_terminal<S: Lifecycle>(state: S) -> bool {
    state.reachable().is_empty()
}

/// Validate a transition for `entity` and return the target state.
///
/// # Errors
///
/// Returns `ControlError::IllegalTransition` naming both states if `to` is
/// neither `from` nor reachable from it.
pub fn validate_transition<S: Lifecycle>(entity: &str, from: S, to: S) -> Result<S> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::IllegalTransition {
            entity: entity.to_string(),
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        })
    }
}

/// A record whose state is moved only through [`advance`].
pub trait Guarded: Record<State: Lifecycle> {
    /// Short name used in logs and errors.
    const KIND: &'static str;

    /// Overwrite the state field.
    fn set_state(&mut self, state: Self::State);
}

impl Guarded for TrialRequest {
    const KIND: &'static str = "trial";

    fn set_state(&mut self, state: TrialState) {
        self.state = state;
    }
}

impl Guarded for NodeSpec {
    const KIND: &'static str = "node spec";

    fn set_state(&mut self, state: SpecState) {
        self.state = state;
    }
}

impl Guarded for ClusterSpec {
    const KIND: &'static str = "cluster spec";

    fn set_state(&mut self, state: SpecState) {
        self.state = state;
    }
}

/// Move a trial or spec to `to`.
///
/// Returns whether the state changed.
///
/// # Errors
///
/// Returns `ControlError::IllegalTransition` if the move is not allowed.
pub fn advance<R: Guarded>(record: &mut R, to: R::State) -> Result<bool> {
    let from = record.state();
    let entity = format!("{} {}", R::KIND, record.id());
    validate_transition(&entity, from, to)?;
    if from == to {
        return Ok(false);
    }
    record.set_state(to);
    tracing::info!(entity = %entity, from = ?from, to = ?to, "State transition");
    Ok(true)
}

/// Move a node or cluster to `to`, stamping the entry time.
///
/// Returns whether the state changed.
///
/// # Errors
///
/// Returns `ControlError::IllegalTransition` if the move is not allowed.
pub fn advance_resource<R: Resource>(
    resource: &mut R,
    to: ResourceState,
    at: DateTime<Utc>,
) -> Result<bool> {
    let from = resource.state();
    let entity = format!("{} {}", R::KIND, resource.id());
    validate_transition(&entity, from, to)?;
    if from == to {
        return Ok(false);
    }

    resource.set_state(to);
    let dates = resource.timestamps_mut();
    match to {
        ResourceState::Launched => {}
        ResourceState::Ready => dates.ready = Some(at),
        ResourceState::Expired => dates.expired = Some(at),
        ResourceState::Deleted => dates.deleted = Some(at),
    }
    tracing::info!(entity = %entity, from = ?from, to = ?to, "State transition");
    Ok(true)
}

/// Resource states that still hold provider capacity.
pub const ACTIVE_STATES: [ResourceState; 3] = [
    ResourceState::Launched,
    ResourceState::Ready,
    ResourceState::Expired,
];

/// Returns true if the resource's TTL may still be changed.
#[must_use]
pub const fn is_live(state: ResourceState) -> bool {
    matches!(state, ResourceState::Launched | ResourceState::Ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialfleet_core::{CloudProvider, NodeId, NodeSpecId, TrialId};
    use trialfleet_store::{Node, NotifyCustomer, ResourceTimestamps};

    fn exhaustive<S: Lifecycle>() {
        for &from in S::ALL {
            assert_eq!(validate_transition("x", from, from).ok(), Some(from));
            for &to in S::ALL {
                let allowed = from == to || from.reachable().contains(&to);
                let result = validate_transition("x 1", from, to);
                assert_eq!(result.is_ok(), allowed, "{from:?} -> {to:?}");
                if let Err(ControlError::IllegalTransition { from: f, to: t, .. }) = result {
                    assert_eq!(f, format!("{from:?}"));
                    assert_eq!(t, format!("{to:?}"));
                }
            }
        }
    }

    #[test]
    fn transition_tables_are_enforced() {
        exhaustive::<TrialState>();
        exhaustive::<SpecState>();
        exhaustive::<ResourceState>();
    }

    #[test]
    fn resource_table() {
        use ResourceState::*;

        assert!(is_valid_transition(Launched, Ready));
        assert!(is_valid_transition(Launched, Expired));
        assert!(is_valid_transition(Ready, Expired));
        assert!(is_valid_transition(Expired, Deleted));
        assert!(!is_valid_transition(Launched, Deleted));
        assert!(!is_valid_transition(Ready, Launched));
        assert!(!is_valid_transition(Expired, Ready));
        assert!(!is_valid_transition(Deleted, Launched));
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal(TrialState::Approved));
        assert!(is_terminal(TrialState::Denied));
        assert!(!is_terminal(TrialState::Pending));
        assert!(is_terminal(SpecState::Finished));
        assert!(is_terminal(ResourceState::Deleted));
        assert!(!is_terminal(ResourceState::Expired));
    }

    fn trial() -> TrialRequest {
        TrialRequest {
            trial_id: TrialId::new(1),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@navy.mil".to_string(),
            company: "Navy".to_string(),
            title: None,
            source_ip: None,
            cloud_provider: "EMR".to_string(),
            create_cluster: false,
            notify_customer: NotifyCustomer::None,
            created_at: Utc::now(),
            state: TrialState::Pending,
            decision_reason: None,
        }
    }

    fn node(at: DateTime<Utc>) -> Node {
        Node {
            node_id: NodeId::new(9),
            spec_id: NodeSpecId::new(4),
            cloud_provider: CloudProvider::Emr,
            region: "us-east-1".to_string(),
            node_type: "r5.2xlarge".to_string(),
            ip: None,
            ttl_hours: 72,
            state: ResourceState::Launched,
            dates: ResourceTimestamps::launched_at(at),
        }
    }

    #[test]
    fn advance_trial() {
        let mut trial = trial();
        assert!(advance(&mut trial, TrialState::Approved).unwrap());
        assert!(!advance(&mut trial, TrialState::Approved).unwrap());

        let err = advance(&mut trial, TrialState::Denied).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(
            err.to_string(),
            "illegal transition for trial 1: cannot transition from Approved to Denied"
        );
        assert_eq!(trial.state, TrialState::Approved);
    }

    #[test]
    fn resource_dates_follow_states() {
        let t0 = Utc::now();
        let mut node = node(t0);

        // No-op leaves dates alone.
        assert!(!advance_resource(&mut node, ResourceState::Launched, t0).unwrap());
        assert_eq!(node.dates, ResourceTimestamps::launched_at(t0));

        let t1 = t0 + chrono::Duration::minutes(1);
        advance_resource(&mut node, ResourceState::Ready, t1).unwrap();
        assert_eq!(node.dates.ready, Some(t1));
        assert_eq!(node.dates.expired, None);

        let t2 = t1 + chrono::Duration::hours(73);
        advance_resource(&mut node, ResourceState::Expired, t2).unwrap();
        let t3 = t2 + chrono::Duration::seconds(10);
        advance_resource(&mut node, ResourceState::Deleted, t3).unwrap();
        assert_eq!(node.dates.ready, Some(t1));
        assert_eq!(node.dates.expired, Some(t2));
        assert_eq!(node.dates.deleted, Some(t3));

        let err = advance_resource(&mut node, ResourceState::Ready, t3).unwrap_err();
        assert!(matches!(err, ControlError::IllegalTransition { .. }));
        assert_eq!(node.state, ResourceState::Deleted);
    }

    #[test]
    fn skipping_ready_leaves_ready_date_unset() {
        let t0 = Utc::now();
        let mut node = node(t0);
        advance_resource(&mut node, ResourceState::Expired, t0).unwrap();
        assert_eq!(node.dates.ready, None);
        assert_eq!(node.dates.expired, Some(t0));
    }

    #[test]
    fn activity_predicates() {
        assert!(ACTIVE_STATES.contains(&ResourceState::Expired));
        assert!(!ACTIVE_STATES.contains(&ResourceState::Deleted));
        assert!(is_live(ResourceState::Ready));
        assert!(!is_live(ResourceState::Expired));
    }
}
