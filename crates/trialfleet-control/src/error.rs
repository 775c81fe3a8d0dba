//! Error types for the reconciliation engine.
//!
//! Errors fall in two groups. Illegal transitions mean a phase asked a state
//! machine for a move it does not allow; they abort the tick. Everything else
//! is a per-entity failure that is logged before moving on.

use thiserror::Error;
use trialfleet_cloud::{CloudError, ValidationError};
use trialfleet_core::CoreError;
use trialfleet_store::StoreError;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A state machine was asked for a transition it does not allow.
    #[error("illegal transition for {entity}: cannot transition from {from} to {to}")]
    IllegalTransition {
        /// The entity being transitioned, e.g. `node 7`.
        entity: String,
        /// The current state.
        from: String,
        /// The requested target state.
        to: String,
    },

    /// The entity is in a state that does not allow the operation.
    #[error("{entity} is {state}; cannot {action}")]
    InvalidState {
        /// The entity addressed.
        entity: String,
        /// Its current state.
        state: String,
        /// What was attempted.
        action: &'static str,
    },

    /// The requested entity was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Identifier looked up.
        id: String,
    },

    /// A cluster spec failed resolution or validation.
    #[error("validation failed on {}: {0}", .0.field())]
    Validation(#[from] ValidationError),

    /// The provisioning gateway failed.
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Malformed identifier or provider name.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The engine is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ControlError {
    /// Returns true if this error signals a logic bug that must abort the tick.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. })
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Cloud(e) => e.is_retriable(),
            Self::Store(_) => true,
            _ => false,
        }
    }
}
