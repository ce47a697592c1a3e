//! Embedded key-value store backing `/postman/store`.
//!
//! The spec treats the on-disk engine as an abstract ordered byte-map;
//! `redb` is used here because it was already an optional dependency of
//! the teacher's own storage layer.

use std::path::Path;
use std::sync::Mutex;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::KvError;

const TABLE: TableDefinition<&str, &str> = TableDefinition::new("postman_kv");

/// Narrow key-value contract the `store` command needs: get, set, has,
/// delete. Deliberately smaller than the teacher's `StorageEngine` trait,
/// which also covers cursor pagination and cost estimation this broker
/// has no use for.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    fn has(&self, key: &str) -> Result<bool, KvError>;
    fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// `redb`-backed store. Wrapped in a `Mutex` because `redb::Database`
/// transactions are not `Sync`-safe to share across a write/read race
/// without external serialization at this broker's throughput.
pub struct RedbKvStore {
    db: Mutex<Database>,
}

impl RedbKvStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// If opening an existing file fails (corruption), the file is
    /// removed and creation is retried once, matching the original
    /// broker's recovery behavior in `Prepare()`. If the retry also
    /// fails, the caller should fall back to a disabled store rather
    /// than propagate a panic.
    ///
    /// # Errors
    ///
    /// Returns an error if both the initial open and the recreate-once
    /// retry fail.
    pub fn open(path: &Path) -> Result<Self, KvError> {
        match Database::create(path) {
            Ok(db) => Ok(Self { db: Mutex::new(db) }),
            Err(_) => {
                let _ = std::fs::remove_file(path);
                let db = Database::create(path).map_err(|e| KvError::Backend(e.to_string()))?;
                Ok(Self { db: Mutex::new(db) })
            }
        }
    }
}

impl KvStore for RedbKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let db = self.db.lock().unwrap();
        let read_txn = db.begin_read().map_err(|e| KvError::Backend(e.to_string()))?;
        let table = match read_txn.open_table(TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(KvError::Backend(e.to_string())),
        };
        let value = table.get(key).map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(value.map(|v| v.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let db = self.db.lock().unwrap();
        let write_txn = db.begin_write().map_err(|e| KvError::Backend(e.to_string()))?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(|e| KvError::Backend(e.to_string()))?;
            table.insert(key, value).map_err(|e| KvError::Backend(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key)?.is_some())
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        let db = self.db.lock().unwrap();
        let write_txn = db.begin_write().map_err(|e| KvError::Backend(e.to_string()))?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(|e| KvError::Backend(e.to_string()))?;
            table.remove(key).map_err(|e| KvError::Backend(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Result of a dispatched store command, kept distinct from a plain
/// `Option<String>` so callers can tell a `get` that found nothing apart
/// from a `set`/`delete` that simply has no value to report -- the
/// original broker replies to each with a different wire shape
/// (`{"result":"<value>"}` vs a blank `{"result":""}` vs
/// `{"result":"success"}`).
pub enum KvOutcome {
    /// `get`/`has`: a string to place directly in the response's
    /// `result` field (the stored value, or `"true"`/`"false"`).
    Value(String),
    /// `get` against a key that isn't present.
    Missing,
    /// `set`/`delete`: completed with nothing to report.
    Done,
}

/// Dispatches a lowercased store command against `store`.
///
/// # Errors
///
/// Returns `KvError::UnknownCommand` for anything other than
/// `get`/`set`/`has`/`delete`.
pub fn dispatch(store: &dyn KvStore, command: &str, key: &str, value: Option<&str>) -> Result<KvOutcome, KvError> {
    match command.to_lowercase().as_str() {
        "get" => match store.get(key)? {
            Some(v) => Ok(KvOutcome::Value(v)),
            None => Ok(KvOutcome::Missing),
        },
        "set" => {
            store.set(key, value.unwrap_or_default())?;
            Ok(KvOutcome::Done)
        }
        "has" => Ok(KvOutcome::Value(store.has(key)?.to_string())),
        "delete" => {
            store.delete(key)?;
            Ok(KvOutcome::Done)
        }
        other => Err(KvError::UnknownCommand(other.to_string())),
    }
}
