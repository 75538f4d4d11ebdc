use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{item_key, RecordStore};
use crate::error::PersistenceError;
use crate::record::Record;

/// Table stored as a single JSON document (`<dir>/<region>/<table>.json`).
///
/// The whole table is cached in memory and the file is rewritten on every
/// upsert through a temp file + rename, so readers never see a half-written
/// document. Upserts are serialized: a snapshot is always written before any
/// later one is taken.
pub struct JsonFileStore {
    path: PathBuf,
    key_field: String,
    items: Mutex<BTreeMap<String, Record>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: &Path, region: &str, table: &str, key_field: &str) -> Result<Self, PersistenceError> {
        let table_dir = dir.join(region);
        tokio::fs::create_dir_all(&table_dir).await?;
        let path = table_dir.join(format!("{table}.json"));

        let items = match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let store = Self {
            path,
            key_field: key_field.to_string(),
            items: Mutex::new(items),
            write_lock: tokio::sync::Mutex::new(()),
        };
        info!("file store ready at {} ({} items)", store.path.display(), store.len());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.items.lock().get(key).cloned()
    }

    /// Every stored item, ordered by key.
    pub fn items(&self) -> Vec<Record> {
        self.items.lock().values().cloned().collect()
    }

    async fn save_to_disk(&self, snapshot: String) -> Result<(), PersistenceError> {
        let tmp = self.path.with_extension(format!("json.{}.tmp", std::process::id()));
        tokio::fs::write(&tmp, snapshot).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn upsert(&self, record: &Record) -> Result<(), PersistenceError> {
        let key = item_key(record, &self.key_field)?;

        // held until the file is renamed into place
        let _write = self.write_lock.lock().await;
        let snapshot = {
            let mut items = self.items.lock();
            items.insert(key.clone(), record.clone());
            serde_json::to_string_pretty(&*items)?
        };

        self.save_to_disk(snapshot).await?;
        debug!("upserted item {} into {}", key, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn reading(ts: i64, humidity: i64) -> Record {
        let mut rec = Record::new().with_timestamp(ts);
        rec.insert("humidity", json!(humidity));
        rec
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), "local", "readings", "timestamp").await.unwrap();

        store.upsert(&reading(100, 40)).await.unwrap();
        store.upsert(&reading(100, 41)).await.unwrap();
        store.upsert(&reading(200, 50)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("100").unwrap().get("humidity"), Some(&json!(41)));
        assert!(store.path().ends_with("local/readings.json"));
    }

    #[tokio::test]
    async fn test_reopen_reads_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path(), "eu", "t", "timestamp").await.unwrap();
            store.upsert(&reading(1, 10)).await.unwrap();
            store.upsert(&reading(2, 20)).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path(), "eu", "t", "timestamp").await.unwrap();
        assert_eq!(store.len(), 2);
        let items = store.items();
        assert_eq!(items[0].timestamp(), Some(1));
        assert_eq!(items[1].get("humidity"), Some(&json!(20)));

        // no temp files left behind
        let leftovers = std::fs::read_dir(dir.path().join("eu")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_all_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path(), "local", "t", "timestamp").await.unwrap());

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.upsert(&reading(1_000 + i, i)).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        assert_eq!(store.len(), 16);
        drop(store);

        let reopened = JsonFileStore::open(dir.path(), "local", "t", "timestamp").await.unwrap();
        assert_eq!(reopened.len(), 16);
        assert_eq!(reopened.get("1007").unwrap().get("humidity"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_missing_key_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), "local", "t", "thermostatId").await.unwrap();

        let err = store.upsert(&reading(1, 10)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::MissingKey(ref f) if f == "thermostatId"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("local")).unwrap();
        std::fs::write(dir.path().join("local/t.json"), "{not json").unwrap();

        let err = JsonFileStore::open(dir.path(), "local", "t", "timestamp").await.err().unwrap();
        assert!(matches!(err, PersistenceError::Serialization(_)));
    }
}
