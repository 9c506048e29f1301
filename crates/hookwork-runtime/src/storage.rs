use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;

const STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("hookwork_state");

/// Key-value persistence the hook manager stores its collection in
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn update(&self, key: &str, value: Value) -> Result<()>;
}

/// redb-backed state store. Values are stored as JSON text; transactions run
/// on the blocking pool so callers never stall the async runtime.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open the database at `path`, creating it and the state table if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path)
            .with_context(|| format!("Failed to open hook store at {:?}", path))?;

        let txn = db.begin_write()?;
        txn.open_table(STATE_TABLE)?;
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn write(db: &Database, key: &str, value: &Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(STATE_TABLE)?;
            table.insert(key, encoded.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn read(db: &Database, key: &str) -> Result<Option<Value>> {
        let txn = db.begin_read()?;
        let table = txn.open_table(STATE_TABLE)?;
        let Some(stored) = table.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(stored.value())
            .map(Some)
            .with_context(|| format!("Corrupt JSON stored under '{}'", key))
    }

    /// Every key currently stored, in key order
    pub fn keys(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STATE_TABLE)?;
        table
            .iter()?
            .map(|entry| -> Result<String> { Ok(entry?.0.value().to_string()) })
            .collect()
    }
}

#[async_trait]
impl StateStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::read(&db, &key))
            .await
            .context("Hook store read task failed")?
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::write(&db, &key, &value))
            .await
            .context("Hook store write task failed")?
    }
}

/// In-process state store; contents are lost on drop
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}
