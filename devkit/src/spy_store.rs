/*!
Spy record store

Keeps every successful upsert in order and can be told to fail given calls,
so tests can assert exactly what reached storage.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thermolog_collector::record::TIMESTAMP_FIELD;
use thermolog_collector::store::item_key;
use thermolog_collector::{PersistenceError, Record, RecordStore};

#[derive(Clone, Default)]
pub struct SpyRecordStore {
    writes: Arc<Mutex<Vec<Record>>>,
    attempts: Arc<Mutex<usize>>,
    failing_calls: Arc<Mutex<HashSet<usize>>>,
    fail_always: Arc<Mutex<bool>>,
}

impl SpyRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `n`-th upsert (1-based) fail.
    pub fn fail_on_call(&self, n: usize) -> &Self {
        self.failing_calls.lock().insert(n);
        self
    }

    pub fn fail_always(&self) -> &Self {
        *self.fail_always.lock() = true;
        self
    }

    /// Successful writes, oldest first.
    pub fn writes(&self) -> Vec<Record> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn last_write(&self) -> Option<Record> {
        self.writes.lock().last().cloned()
    }

    /// Upsert calls, failed ones included.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    /// Table contents as a keyed store would hold them: one item per
    /// timestamp, latest write wins.
    pub fn table(&self) -> BTreeMap<String, Record> {
        self.writes
            .lock()
            .iter()
            .filter_map(|rec| item_key(rec, TIMESTAMP_FIELD).ok().map(|key| (key, rec.clone())))
            .collect()
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
        *self.attempts.lock() = 0;
        self.failing_calls.lock().clear();
        *self.fail_always.lock() = false;
    }
}

#[async_trait]
impl RecordStore for SpyRecordStore {
    async fn upsert(&self, record: &Record) -> Result<(), PersistenceError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts
        };

        if *self.fail_always.lock() || self.failing_calls.lock().contains(&attempt) {
            tracing::debug!("[SPY] failing upsert #{}", attempt);
            return Err(PersistenceError::Unavailable(format!("spy store refused write #{attempt}")));
        }

        self.writes.lock().push(record.clone());
        tracing::debug!("[SPY] upsert #{} stored {} fields", attempt, record.len());
        Ok(())
    }
}
