//! Key encoding utilities for `RocksDB`.
//!
//! All index keys end with the 8-byte big-endian record identifier, so prefix
//! scans return records in identifier order within a prefix.

use chrono::{DateTime, Utc};
use trialfleet_core::{EntityId, IdError, TrialId};

const ID_LEN: usize = 8;

/// Encode a primary record key.
#[must_use]
pub fn record_key<I: EntityId>(id: I) -> Vec<u8> {
    id.to_key().to_vec()
}

/// Encode a state index key: `state || id`.
#[must_use]
pub fn state_key<I: EntityId>(state: u8, id: I) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + ID_LEN);
    key.push(state);
    key.extend_from_slice(&id.to_key());
    key
}

/// Encode a state prefix for scanning all records in a state.
#[must_use]
pub fn state_prefix(state: u8) -> Vec<u8> {
    vec![state]
}

/// Order-preserving encoding of a timestamp's milliseconds.
///
/// Flipping the sign bit makes pre-epoch times sort before post-epoch ones.
#[must_use]
pub fn time_bytes(at: DateTime<Utc>) -> [u8; 8] {
    let millis = u64::from_be_bytes(at.timestamp_millis().to_be_bytes());
    (millis ^ (1 << 63)).to_be_bytes()
}

/// Encode a creation-time index key: `millis || id`.
#[must_use]
pub fn created_key<I: EntityId>(at: DateTime<Utc>, id: I) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(&time_bytes(at));
    key.extend_from_slice(&id.to_key());
    key
}

/// Encode a trial index key: `trial_id || id`.
#[must_use]
pub fn trial_key<I: EntityId>(trial_id: TrialId, id: I) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(&trial_id.to_key());
    key.extend_from_slice(&id.to_key());
    key
}

/// Encode a trial prefix for scanning all records created for a trial.
#[must_use]
pub fn trial_prefix(trial_id: TrialId) -> Vec<u8> {
    trial_id.to_key().to_vec()
}

/// Extract the trailing record identifier from an index key.
///
/// # Errors
///
/// Returns an error if the key is shorter than an identifier.
pub fn trailing_id<I: EntityId>(key: &[u8]) -> Result<I, IdError> {
    let start = key.len().checked_sub(ID_LEN).ok_or(IdError::InvalidLength {
        expected: ID_LEN,
        got: key.len(),
    })?;
    I::from_key(&key[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trialfleet_core::NodeId;

    #[test]
    fn state_key_layout() {
        let key = state_key(3, NodeId::new(258));
        assert_eq!(key, vec![3, 0, 0, 0, 0, 0, 0, 1, 2]);
        assert!(key.starts_with(&state_prefix(3)));
        assert_eq!(trailing_id::<NodeId>(&key).unwrap(), NodeId::new(258));
    }

    #[test]
    fn time_bytes_preserve_order() {
        let before_epoch = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        let epoch = Utc.timestamp_millis_opt(0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(time_bytes(before_epoch) < time_bytes(epoch));
        assert!(time_bytes(epoch) < time_bytes(later));
    }

    #[test]
    fn trial_key_prefix() {
        let trial = TrialId::new(7);
        let key = trial_key(trial, NodeId::new(1));
        assert!(key.starts_with(&trial_prefix(trial)));
        assert!(!key.starts_with(&trial_prefix(TrialId::new(8))));
    }

    #[test]
    fn trailing_id_short_key() {
        assert!(trailing_id::<NodeId>(&[1, 2]).is_err());
    }
}
