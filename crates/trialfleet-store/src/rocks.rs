//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use trialfleet_core::{EntityId, TrialId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{Record, StateCode};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes identifier allocation.
    sequence_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            sequence_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read the last identifier handed out for a table.
    fn current_sequence(&self, table: &str) -> Result<u64> {
        let cf_seq = self.cf(cf::SEQUENCES)?;
        let Some(bytes) = self
            .db
            .get_cf(&cf_seq, table.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(0);
        };

        let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            StoreError::Database(format!("corrupt sequence value for table {table}"))
        })?;
        Ok(u64::from_be_bytes(arr))
    }

    /// Add a record and its index entries to a batch.
    ///
    /// `old` is the currently persisted version, whose stale index entries are
    /// removed.
    fn stage<R: Record>(&self, batch: &mut WriteBatch, record: &R, old: Option<&R>) -> Result<()> {
        let table = R::TABLE;
        let id = record.id();

        let cf_records = self.cf(table.records)?;
        let cf_by_state = self.cf(table.by_state)?;
        let cf_by_created = self.cf(table.by_created)?;

        batch.put_cf(&cf_records, keys::record_key(id), Self::serialize(record)?);

        // State index
        if let Some(old) = old {
            if old.state() != record.state() {
                batch.delete_cf(&cf_by_state, keys::state_key(old.state().code(), id));
            }
        }
        batch.put_cf(&cf_by_state, keys::state_key(record.state().code(), id), []);

        // Creation-time index
        if let Some(old) = old {
            if old.created_at() != record.created_at() {
                batch.delete_cf(&cf_by_created, keys::created_key(old.created_at(), id));
            }
        }
        batch.put_cf(&cf_by_created, keys::created_key(record.created_at(), id), []);

        // Trial index
        if let Some(by_trial) = table.by_trial {
            let cf_by_trial = self.cf(by_trial)?;
            if let Some(old_trial) = old.and_then(<R as Record>::trial_request_id) {
                if Some(old_trial) != record.trial_request_id() {
                    batch.delete_cf(&cf_by_trial, keys::trial_key(old_trial, id));
                }
            }
            if let Some(trial_id) = record.trial_request_id() {
                batch.put_cf(&cf_by_trial, keys::trial_key(trial_id, id), []);
            }
        }

        Ok(())
    }

    /// Resolve every index key from `start` onwards that still has `prefix`.
    fn scan_index<R: Record>(&self, index: &str, start: &[u8], prefix: &[u8]) -> Result<Vec<R>> {
        let cf_index = self.cf(index)?;

        let mut records = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_index, IteratorMode::From(start, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            let id = keys::trailing_id::<R::Id>(&key)?;
            if let Some(record) = self.get::<R>(id)? {
                records.push(record);
            }
        }

        Ok(records)
    }
}

impl Store for RocksStore {
    fn create<R, F>(&self, build: F) -> Result<R>
    where
        R: Record,
        F: FnOnce(R::Id) -> R,
    {
        let table = R::TABLE;
        let cf_seq = self.cf(cf::SEQUENCES)?;

        let _guard = self.sequence_lock.lock();

        let next = self.current_sequence(table.name)? + 1;
        let id = R::Id::from_raw(next);
        let record = build(id);
        if record.id() != id {
            return Err(StoreError::Database(format!(
                "{} record built with id {} instead of allocated id {id}",
                table.name,
                record.id()
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_seq, table.name.as_bytes(), next.to_be_bytes());
        self.stage(&mut batch, &record, None)?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(table = table.name, id = %id, "Created record");
        Ok(record)
    }

    fn put<R: Record>(&self, record: &R) -> Result<()> {
        let old = self.get::<R>(record.id())?;

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, record, old.as_ref())?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get<R: Record>(&self, id: R::Id) -> Result<Option<R>> {
        let cf = self.cf(R::TABLE.records)?;

        self.db
            .get_cf(&cf, keys::record_key(id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_by_state<R: Record>(&self, state: R::State) -> Result<Vec<R>> {
        let prefix = keys::state_prefix(state.code());
        self.scan_index(R::TABLE.by_state, &prefix, &prefix)
    }

    fn list_created_after<R: Record>(&self, after: DateTime<Utc>) -> Result<Vec<R>> {
        // Index keys carry millisecond precision; drop sub-millisecond ties.
        let start = keys::time_bytes(after);
        let records = self.scan_index::<R>(R::TABLE.by_created, &start, &[])?;
        Ok(records
            .into_iter()
            .filter(|r| r.created_at() > after)
            .collect())
    }

    fn list_by_trial<R: Record>(&self, trial_id: TrialId) -> Result<Vec<R>> {
        let Some(by_trial) = R::TABLE.by_trial else {
            return Ok(Vec::new());
        };
        let prefix = keys::trial_prefix(trial_id);
        self.scan_index(by_trial, &prefix, &prefix)
    }

    fn list_all<R: Record>(&self) -> Result<Vec<R>> {
        let cf = self.cf(R::TABLE.records)?;

        let mut records = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            records.push(Self::deserialize(&value)?);
        }

        Ok(records)
    }
}
