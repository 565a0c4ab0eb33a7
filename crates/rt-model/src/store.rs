//! Offline persistence.
//!
//! The model writes through to a [`ModelStore`] at the same points it
//! changes its own state. Snapshot points (snapshot load, remote operations,
//! reconnect) save the tree together with the whole pending queue. Between
//! them, each local edit appends one pending entry and each acknowledgement
//! removes one, so a keystroke does not rewrite the document.
//!
//! The saved tree reflects every pending entry up to
//! [`StoredModel::applied_through`]; entries appended later are replayed on
//! top of it when the model is reopened.

use std::collections::{BTreeMap, HashMap};

use rt_ot::DataValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::concurrency::PendingOperation;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored model is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredModel {
    pub model_id: String,
    pub version: u64,
    pub data: DataValue,
    /// Highest sequence number already applied to `data`.
    #[serde(default)]
    pub applied_through: u64,
    pub pending: Vec<PendingOperation>,
}

pub trait ModelStore: Send {
    fn load(&self, model_id: &str) -> Result<Option<StoredModel>, StoreError>;
    /// Replace the stored snapshot and pending queue.
    fn save(&mut self, model: &StoredModel) -> Result<(), StoreError>;
    fn remove(&mut self, model_id: &str) -> Result<(), StoreError>;
    fn append_pending(&mut self, model_id: &str, entry: &PendingOperation) -> Result<(), StoreError>;
    /// Drop an acknowledged entry; `version` is the version the server
    /// assigned to it.
    fn remove_pending(&mut self, model_id: &str, seq: u64, version: u64) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRecord {
    version: u64,
    data: DataValue,
    applied_through: u64,
}

fn corrupt(e: serde_json::Error) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

/// Keeps models as serialized JSON in memory: one snapshot record per model
/// and one record per pending entry.
#[derive(Debug, Default, Clone)]
pub struct MemoryModelStore {
    snapshots: HashMap<String, String>,
    pending: HashMap<String, BTreeMap<u64, String>>,
    saves: usize,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Number of full snapshot writes so far.
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn pending_count(&self, model_id: &str) -> usize {
        self.pending.get(model_id).map_or(0, BTreeMap::len)
    }
}

impl ModelStore for MemoryModelStore {
    fn load(&self, model_id: &str) -> Result<Option<StoredModel>, StoreError> {
        let Some(raw) = self.snapshots.get(model_id) else {
            return Ok(None);
        };
        let record: SnapshotRecord = serde_json::from_str(raw).map_err(corrupt)?;
        let pending = self
            .pending
            .get(model_id)
            .into_iter()
            .flat_map(BTreeMap::values)
            .map(|raw| serde_json::from_str(raw).map_err(corrupt))
            .collect::<Result<Vec<PendingOperation>, _>>()?;
        Ok(Some(StoredModel {
            model_id: model_id.to_string(),
            version: record.version,
            data: record.data,
            applied_through: record.applied_through,
            pending,
        }))
    }

    fn save(&mut self, model: &StoredModel) -> Result<(), StoreError> {
        let record = SnapshotRecord {
            version: model.version,
            data: model.data.clone(),
            applied_through: model.applied_through,
        };
        let raw = serde_json::to_string(&record).map_err(corrupt)?;
        let pending = model
            .pending
            .iter()
            .map(|entry| Ok((entry.sequence_number(), serde_json::to_string(entry).map_err(corrupt)?)))
            .collect::<Result<BTreeMap<_, _>, StoreError>>()?;
        self.snapshots.insert(model.model_id.clone(), raw);
        self.pending.insert(model.model_id.clone(), pending);
        self.saves += 1;
        Ok(())
    }

    fn remove(&mut self, model_id: &str) -> Result<(), StoreError> {
        self.snapshots.remove(model_id);
        self.pending.remove(model_id);
        Ok(())
    }

    fn append_pending(&mut self, model_id: &str, entry: &PendingOperation) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry).map_err(corrupt)?;
        self.pending
            .entry(model_id.to_string())
            .or_default()
            .insert(entry.sequence_number(), raw);
        Ok(())
    }

    fn remove_pending(&mut self, model_id: &str, seq: u64, version: u64) -> Result<(), StoreError> {
        if let Some(entries) = self.pending.get_mut(model_id) {
            entries.remove(&seq);
        }
        if let Some(raw) = self.snapshots.get_mut(model_id) {
            let mut record: SnapshotRecord = serde_json::from_str(raw).map_err(corrupt)?;
            record.version = version;
            *raw = serde_json::to_string(&record).map_err(corrupt)?;
        }
        Ok(())
    }
}

impl<S: ModelStore + ?Sized> ModelStore for Box<S> {
    fn load(&self, model_id: &str) -> Result<Option<StoredModel>, StoreError> {
        (**self).load(model_id)
    }

    fn save(&mut self, model: &StoredModel) -> Result<(), StoreError> {
        (**self).save(model)
    }

    fn remove(&mut self, model_id: &str) -> Result<(), StoreError> {
        (**self).remove(model_id)
    }

    fn append_pending(&mut self, model_id: &str, entry: &PendingOperation) -> Result<(), StoreError> {
        (**self).append_pending(model_id, entry)
    }

    fn remove_pending(&mut self, model_id: &str, seq: u64, version: u64) -> Result<(), StoreError> {
        (**self).remove_pending(model_id, seq, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_ot::{DiscreteOperation, IdGenerator};
    use serde_json::json;

    fn entry(seq: u64) -> PendingOperation {
        PendingOperation::new(seq, 7, DiscreteOperation::number_add("s:0", 2.0).into(), Vec::new())
    }

    fn stored() -> StoredModel {
        let mut ids = IdGenerator::new("s");
        StoredModel {
            model_id: "m".into(),
            version: 7,
            data: ids.json(&json!({"n": 1})),
            applied_through: 1,
            pending: vec![entry(1)],
        }
    }

    #[test]
    fn round_trips_pending_queue() {
        let mut store = MemoryModelStore::new();
        store.save(&stored()).unwrap();
        assert_eq!(store.load("m").unwrap(), Some(stored()));
        assert_eq!(store.load("other").unwrap(), None);
        store.remove("m").unwrap();
        assert!(store.is_empty());
        assert_eq!(store.pending_count("m"), 0);
    }

    #[test]
    fn pending_entries_are_written_one_at_a_time() {
        let mut store = MemoryModelStore::new();
        store.save(&stored()).unwrap();
        store.append_pending("m", &entry(2)).unwrap();
        store.append_pending("m", &entry(3)).unwrap();
        store.remove_pending("m", 1, 8).unwrap();
        assert_eq!(store.save_count(), 1);

        let loaded = store.load("m").unwrap().unwrap();
        assert_eq!(loaded.version, 8);
        assert_eq!(loaded.applied_through, 1);
        let seqs: Vec<u64> = loaded.pending.iter().map(PendingOperation::sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
    }
}
