//! Storage Gateway
//!
//! The gateway is the only component that talks to the durable store. It
//! exposes two logical tables:
//!
//! - `records`: day values keyed by composite record key
//! - `directory`: a handful of named metadata blobs (`names`, `types`,
//!   `settings`, `lastUpdated`)
//!
//! Values are JSON. Every operation is async and may fail with
//! `StorageUnavailable` or `TransactionFailed`; nothing here retries.

use crate::storage::error::StorageResult;
use crate::storage::sqlite::SqliteStore;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Logical tables of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Day values keyed by composite key
    Records,
    /// Directory metadata blobs
    Directory,
}

impl Table {
    pub fn all() -> &'static [Table] {
        &[Table::Records, Table::Directory]
    }

    /// Table name in the backing store
    pub fn name(&self) -> &'static str {
        match self {
            Table::Records => "records",
            Table::Directory => "directory",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lazy sequence of `(key, value)` pairs produced by [`Store::scan`]
pub type ScanStream = BoxStream<'static, StorageResult<(String, Value)>>;

/// Async key-value store with two tables
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a single value
    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>>;

    /// Insert or overwrite a value
    async fn put(&self, table: Table, key: &str, value: Value) -> StorageResult<()>;

    /// Remove a value (no-op if absent)
    async fn delete(&self, table: Table, key: &str) -> StorageResult<()>;

    /// Remove every value in a table
    async fn clear(&self, table: Table) -> StorageResult<()>;

    /// Iterate every entry in a table, ordered by key
    async fn scan(&self, table: Table) -> StorageResult<ScanStream>;

    /// Clear each listed table and write its entries, all in one
    /// transaction. On failure no table changes.
    async fn replace_all(&self, batches: Vec<(Table, Vec<(String, Value)>)>) -> StorageResult<()>;
}

/// Configuration for opening the durable store
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Ask the host for durable (fully synced) writes
    pub durable: bool,
}

impl GatewayConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            durable: false,
        }
    }

    /// Builder: request durable writes
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }
}

/// Opens the durable store once and hands out the same live handle
pub struct StoreGateway {
    config: GatewayConfig,
    handle: OnceCell<Arc<SqliteStore>>,
}

impl StoreGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            handle: OnceCell::new(),
        }
    }

    /// Open (creating and upgrading if needed) the store.
    ///
    /// Repeated calls return the same handle; schema creation only runs
    /// on the first successful call.
    pub async fn open(&self) -> StorageResult<Arc<SqliteStore>> {
        let store = self
            .handle
            .get_or_try_init(|| async {
                let store = SqliteStore::open(&self.config.database_path)?;
                if self.config.durable {
                    store.request_durability();
                }
                Ok::<_, crate::storage::StorageError>(Arc::new(store))
            })
            .await?;
        Ok(Arc::clone(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_table_names() {
        assert_eq!(Table::Records.to_string(), "records");
        assert_eq!(Table::Directory.name(), "directory");
        assert_eq!(Table::all().len(), 2);
    }

    #[tokio::test]
    async fn test_open_returns_same_handle() {
        let dir = tempdir().unwrap();
        let gateway = StoreGateway::new(GatewayConfig::new(dir.path().join("streaks.db")));

        let first = gateway.open().await.unwrap();
        let second = gateway.open().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_open_unusable_path_is_unavailable() {
        let dir = tempdir().unwrap();
        // A directory where the database file should be
        let path = dir.path().join("taken");
        std::fs::create_dir_all(&path).unwrap();

        let gateway = StoreGateway::new(GatewayConfig::new(&path));
        match gateway.open().await {
            Err(err) => assert!(matches!(
                err,
                crate::storage::StorageError::StorageUnavailable(_)
            )),
            Ok(_) => panic!("opened a directory as a database"),
        }
    }
}
