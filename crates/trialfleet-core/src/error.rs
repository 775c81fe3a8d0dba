//! Common error types for trialfleet.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the trialfleet system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The named cloud provider is not one of the supported providers.
    #[error("unsupported cloud provider: {0}")]
    UnsupportedProvider(String),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
