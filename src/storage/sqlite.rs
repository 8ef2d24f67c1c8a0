//! SQLite-backed store
//!
//! One database file, two tables of `(key TEXT PRIMARY KEY, value TEXT)`
//! where `value` is JSON text. Table creation is the schema upgrade step:
//! it is gated on `PRAGMA user_version`, so it runs once per database and
//! is a no-op on every later open.
//!
//! A row whose text is not JSON reads as absent and is left in place.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::gateway::{ScanStream, Store, Table};
use async_trait::async_trait;
use futures_util::StreamExt;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Durable store over a single SQLite database
pub struct SqliteStore {
    /// std::sync::Mutex because rusqlite's Connection is !Sync
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    ///
    /// Any failure here means the host has no usable store.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;
        }

        let mut conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unavailable)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .map_err(unavailable)?;

        let upgraded = Self::upgrade(&mut conn).map_err(unavailable)?;
        if upgraded {
            tracing::info!(path = ?path, version = SCHEMA_VERSION, "Created store schema");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database (used by tests and dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let mut conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::upgrade(&mut conn).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create tables if the database predates the current schema
    fn upgrade(conn: &mut Connection) -> rusqlite::Result<bool> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version >= SCHEMA_VERSION {
            return Ok(false);
        }

        let tx = conn.transaction()?;
        for table in Table::all() {
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        key TEXT PRIMARY KEY NOT NULL,
                        value TEXT NOT NULL
                    )",
                    table.name()
                ),
                [],
            )?;
        }
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;
        Ok(true)
    }

    /// Best-effort request for fully synced writes; failures are ignored
    pub fn request_durability(&self) {
        let result = self
            .lock()
            .and_then(|conn| Ok(conn.execute_batch("PRAGMA synchronous = FULL;")?));
        match result {
            Ok(()) => tracing::debug!("Durable storage granted"),
            Err(e) => tracing::warn!(error = %e, "Durable storage request failed"),
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::TransactionFailed("connection lock poisoned".to_string()))
    }
}

fn unavailable(err: rusqlite::Error) -> StorageError {
    StorageError::StorageUnavailable(err.to_string())
}

fn decode_value(table: Table, key: &str, text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(table = %table, key = %key, error = %e, "Skipping undecodable stored value");
            None
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", table.name()),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw.and_then(|text| decode_value(table, key, &text)))
    }

    async fn put(&self, table: Table, key: &str, value: Value) -> StorageResult<()> {
        let text = serde_json::to_string(&value)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                table.name()
            ),
            params![key, text],
        )?;
        Ok(())
    }

    async fn delete(&self, table: Table, key: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", table.name()),
            params![key],
        )?;
        Ok(())
    }

    async fn clear(&self, table: Table) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
        Ok(())
    }

    async fn scan(&self, table: Table) -> StorageResult<ScanStream> {
        let rows: Vec<(String, String)> = {
            let conn = self.lock()?;
            let mut stmt =
                conn.prepare(&format!("SELECT key, value FROM {} ORDER BY key", table.name()))?;
            let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let collected: Vec<(String, String)> = mapped.collect::<Result<_, _>>()?;
            collected
        };

        let stream = futures_util::stream::iter(rows.into_iter().filter_map(move |(key, text)| {
            decode_value(table, &key, &text).map(|value| Ok::<_, StorageError>((key, value)))
        }));
        Ok(stream.boxed())
    }

    async fn replace_all(&self, batches: Vec<(Table, Vec<(String, Value)>)>) -> StorageResult<()> {
        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls every table back
        let tx = conn.transaction()?;
        for (table, entries) in &batches {
            tx.execute(&format!("DELETE FROM {}", table.name()), [])?;
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                table.name()
            ))?;
            for (key, value) in entries {
                stmt.execute(params![key, serde_json::to_string(value)?])?;
            }
        }
        tx.commit()?;

        for (table, entries) in &batches {
            tracing::debug!(table = %table, entries = entries.len(), "Replaced table contents");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.put(Table::Records, "a::2024-1-1", json!(2)).await.unwrap();
        assert_eq!(
            store.get(Table::Records, "a::2024-1-1").await.unwrap(),
            Some(json!(2))
        );
        // Tables are independent
        assert_eq!(store.get(Table::Directory, "a::2024-1-1").await.unwrap(), None);

        store.delete(Table::Records, "a::2024-1-1").await.unwrap();
        assert_eq!(store.get(Table::Records, "a::2024-1-1").await.unwrap(), None);

        // Deleting a missing key is fine
        store.delete(Table::Records, "missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_and_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(Table::Records, "b", json!(2)).await.unwrap();
        store.put(Table::Records, "a", json!(1)).await.unwrap();
        store.put(Table::Directory, "names", json!(["x"])).await.unwrap();

        let rows: Vec<(String, Value)> = store
            .scan(Table::Records)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))]);

        store.clear(Table::Records).await.unwrap();
        let rows: Vec<(String, Value)> = store
            .scan(Table::Records)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(store.get(Table::Directory, "names").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(Table::Records, "old", json!(1)).await.unwrap();

        store
            .replace_all(vec![(
                Table::Records,
                vec![("new1".into(), json!(2)), ("new2".into(), json!(3))],
            )])
            .await
            .unwrap();

        assert_eq!(store.get(Table::Records, "old").await.unwrap(), None);
        assert_eq!(store.get(Table::Records, "new2").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_replace_all_is_one_transaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("streaks.db");
        let store = SqliteStore::open(&path).unwrap();
        store.put(Table::Directory, "names", json!(["Old"])).await.unwrap();
        store.put(Table::Records, "Old::2024-1-1", json!(1)).await.unwrap();

        store
            .replace_all(vec![
                (Table::Directory, vec![("names".into(), json!(["New"]))]),
                (Table::Records, vec![("New::2024-1-1".into(), json!(2))]),
            ])
            .await
            .unwrap();
        assert_eq!(store.get(Table::Directory, "names").await.unwrap(), Some(json!(["New"])));
        assert_eq!(store.get(Table::Records, "Old::2024-1-1").await.unwrap(), None);

        // Make the second table unwritable; the first must roll back
        Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE records;")
            .unwrap();
        let result = store
            .replace_all(vec![
                (Table::Directory, vec![("names".into(), json!(["Lost"]))]),
                (Table::Records, vec![("Lost::2024-1-1".into(), json!(3))]),
            ])
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(Table::Directory, "names").await.unwrap(), Some(json!(["New"])));
    }

    #[tokio::test]
    async fn test_undecodable_values_read_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("streaks.db");
        let store = SqliteStore::open(&path).unwrap();
        store.put(Table::Records, "Run::2024-1-1", json!(2)).await.unwrap();

        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)",
            params!["Run::2024-1-2", "{not json"],
        )
        .unwrap();

        assert_eq!(store.get(Table::Records, "Run::2024-1-2").await.unwrap(), None);
        let rows: Vec<(String, Value)> = store
            .scan(Table::Records)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![("Run::2024-1-1".to_string(), json!(2))]);

        // Overwriting the bad row works as usual
        store.put(Table::Records, "Run::2024-1-2", json!(1)).await.unwrap();
        assert_eq!(store.get(Table::Records, "Run::2024-1-2").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_schema_upgrade_runs_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("streaks.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(Table::Records, "k", json!(1)).await.unwrap();
        }

        let mut conn = Connection::open(&path).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        assert!(!SqliteStore::upgrade(&mut conn).unwrap());
        drop(conn);

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(Table::Records, "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_request_durability_is_harmless() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("streaks.db")).unwrap();
        store.request_durability();
        store.put(Table::Directory, "names", json!([])).await.unwrap();
    }
}
