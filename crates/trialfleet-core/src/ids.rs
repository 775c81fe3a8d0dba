//! Core identifier types for trialfleet.
//!
//! Every persisted entity is identified by a positive integer assigned by the
//! entity store at creation time. Each entity type gets its own newtype so a
//! `NodeId` can never be passed where a `NodeSpecId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Common behaviour of the integer entity identifiers.
///
/// The store uses this to allocate identifiers and to encode them as keys
/// without knowing the concrete entity type.
pub trait EntityId:
    Copy + Eq + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Wrap a raw integer.
    fn from_raw(raw: u64) -> Self;

    /// Return the raw integer.
    fn raw(self) -> u64;

    /// Big-endian key bytes, so lexicographic order matches numeric order.
    fn to_key(self) -> [u8; 8] {
        self.raw().to_be_bytes()
    }

    /// Decode an identifier from big-endian key bytes.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidLength` if `bytes` is not exactly 8 bytes long.
    fn from_key(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; 8] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 8,
            got: bytes.len(),
        })?;
        Ok(Self::from_raw(u64::from_be_bytes(arr)))
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create an identifier from its integer value.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the integer value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl EntityId for $name {
            fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| IdError::InvalidNumber(s.to_string()))
            }
        }
    };
}

entity_id!(
    /// Identifier of a customer's trial request.
    TrialId
);

entity_id!(
    /// Identifier of a standalone node provisioning request.
    NodeSpecId
);

entity_id!(
    /// Identifier of a realized node.
    NodeId
);

entity_id!(
    /// Identifier of a cluster provisioning request.
    ClusterSpecId
);

entity_id!(
    /// Identifier of a realized cluster.
    ///
    /// This is the store's identity, not the identifier the cloud provider
    /// assigns to the cluster.
    ClusterId
);

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a non-negative integer.
    #[error("not a valid integer identifier: {0:?}")]
    InvalidNumber(String),

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let id: TrialId = "17".parse().unwrap();
        assert_eq!(id, TrialId::new(17));
        assert_eq!(id.to_string(), "17");
        assert_eq!(format!("{id:?}"), "TrialId(17)");
    }

    #[test]
    fn parse_rejects_garbage() {
        let result = "abc".parse::<NodeId>();
        assert!(matches!(result, Err(IdError::InvalidNumber(_))));

        let result = "-3".parse::<NodeId>();
        assert!(matches!(result, Err(IdError::InvalidNumber(_))));
    }

    #[test]
    fn key_order_matches_numeric_order() {
        let small = ClusterId::new(9).to_key();
        let large = ClusterId::new(256).to_key();
        assert!(small < large);
        assert_eq!(ClusterId::from_key(&large).unwrap(), ClusterId::new(256));
    }

    #[test]
    fn from_key_wrong_length() {
        let result = NodeSpecId::from_key(&[1, 2, 3]);
        assert!(matches!(
            result,
            Err(IdError::InvalidLength {
                expected: 8,
                got: 3
            })
        ));
    }

    #[test]
    fn serde_is_plain_integer() {
        let id = ClusterSpecId::new(5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "5");
        let parsed: ClusterSpecId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
