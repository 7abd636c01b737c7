//! In-memory table for fast key lookups.
//!
//! One record per key, last write wins. Backed by an ordered map so
//! snapshot output iterates deterministically and recovery is
//! reproducible.

use crate::record::Record;
use crate::wal::WalRecord;
use ringkv_common::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Memtable {
    data: BTreeMap<String, Record>,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.data.get(key)
    }

    pub fn put(&mut self, key: String, record: Record) {
        self.data.insert(key, record);
    }

    /// Remove a key. Returns the previous record if there was one.
    pub fn remove(&mut self, key: &str) -> Option<Record> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// All entries in key order, for snapshot output.
    pub fn entries(&self) -> Vec<(String, Record)> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Bulk-load from snapshot content, replacing any existing entry.
    pub fn load_entries(&mut self, entries: Vec<(String, Record)>) {
        for (k, r) in entries {
            self.data.insert(k, r);
        }
    }

    /// Re-apply one WAL entry during recovery. The latest entry for a
    /// key is the truth; deletes drop the key outright.
    pub fn apply_wal(&mut self, record: WalRecord, ts: u64) {
        match record {
            WalRecord::Put { key, value } => {
                let value = Value::from_wal_bytes(&value);
                self.data.insert(key, Record::with_ts(value, ts));
            }
            WalRecord::Delete { key } => {
                self.data.remove(&key);
            }
        }
    }
}
