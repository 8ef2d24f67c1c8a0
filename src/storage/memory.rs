//! In-process store
//!
//! Implements [`Store`] over ordered maps. Used for tests and for sessions
//! that must not touch disk. It counts writes so callers can check that an
//! operation was a no-op, and it can be switched into failure modes to
//! exercise error paths.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::gateway::{ScanStream, Store, Table};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type Tables = HashMap<Table, BTreeMap<String, Value>>;

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful put/delete/clear/replace_all calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every write fail with `TransactionFailed`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of a table's contents
    pub fn entries(&self, table: Table) -> Vec<(String, Value)> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .get(&table)
                    .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn read(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::StorageUnavailable(
                "memory store disabled".to_string(),
            ));
        }
        self.tables
            .lock()
            .map_err(|_| StorageError::TransactionFailed("table lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        let guard = self.read()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed(
                "injected write failure".to_string(),
            ));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(guard)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>> {
        let tables = self.read()?;
        Ok(tables.get(&table).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        let mut tables = self.write()?;
        tables.entry(table).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        let mut tables = self.write()?;
        if let Some(t) = tables.get_mut(&table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, table: Table) -> StorageResult<()> {
        let mut tables = self.write()?;
        tables.remove(&table);
        Ok(())
    }

    async fn scan(&self, table: Table) -> StorageResult<ScanStream> {
        let rows: Vec<(String, Value)> = {
            let tables = self.read()?;
            tables
                .get(&table)
                .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()
        };
        Ok(futures_util::stream::iter(rows.into_iter().map(Ok::<_, StorageError>)).boxed())
    }

    async fn replace_all(&self, batches: Vec<(Table, Vec<(String, Value)>)>) -> StorageResult<()> {
        let mut tables = self.write()?;
        for (table, entries) in batches {
            tables.insert(table, entries.into_iter().collect());
        }
        Ok(())
    }
}
