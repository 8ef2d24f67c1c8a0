//! Migration Engine
//!
//! Brings older on-disk shapes forward into the current schema. Runs at
//! every session start, in order:
//!
//! 1. **Flat legacy**: bare date entries in the legacy file with a valid
//!    color value move into the records table under the default streak,
//!    then leave the legacy file.
//! 2. **Unscoped keys**: bare date keys already in the records table (an
//!    earlier schema) are rewritten under the default streak.
//!
//! Both steps write nothing when there is nothing left to migrate. A value
//! already present under the target key is never overwritten. A failing
//! step is logged and skipped; the other step and the rest of setup still
//! run.

use crate::storage::legacy::legacy_int;
use crate::storage::{
    encode_key, is_bare_date_key, Color, DayKey, LegacyStore, StorageResult, Store, Table,
    DEFAULT_STREAK_NAME,
};
use futures_util::TryStreamExt;
use serde_json::{json, Value};

/// Outcome of one migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy entries written into the records table
    pub legacy_moved: usize,
    /// Legacy entries removed from the legacy file
    pub legacy_removed: usize,
    /// Bare record keys rewritten under the default streak
    pub unscoped_rewritten: usize,
    /// Bare record keys deleted
    pub unscoped_removed: usize,
    /// Steps that failed and were skipped
    pub failed_steps: Vec<&'static str>,
}

impl MigrationReport {
    /// Number of store and legacy writes performed
    pub fn writes(&self) -> usize {
        self.legacy_moved + self.legacy_removed + self.unscoped_rewritten + self.unscoped_removed
    }

    pub fn is_noop(&self) -> bool {
        self.writes() == 0 && self.failed_steps.is_empty()
    }
}

/// Runs the migration steps against a store
pub struct MigrationEngine<'a> {
    store: &'a dyn Store,
    legacy: Option<&'a dyn LegacyStore>,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            legacy: None,
        }
    }

    /// Builder: also drain a legacy flat store
    pub fn with_legacy(mut self, legacy: &'a dyn LegacyStore) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Run every step. Never fails; failed steps are listed in the report.
    pub async fn run(&self) -> MigrationReport {
        let mut report = MigrationReport::default();

        if let Some(legacy) = self.legacy {
            match self.migrate_flat_legacy(legacy, &mut report).await {
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Flat legacy migration failed");
                    report.failed_steps.push("flat-legacy");
                }
            }
        }

        if let Err(e) = self.migrate_unscoped_keys(&mut report).await {
            tracing::warn!(error = %e, "Unscoped key migration failed");
            report.failed_steps.push("unscoped-keys");
        }

        if report.writes() > 0 {
            tracing::info!(
                legacy_moved = report.legacy_moved,
                legacy_removed = report.legacy_removed,
                unscoped_rewritten = report.unscoped_rewritten,
                unscoped_removed = report.unscoped_removed,
                "Migrated legacy day records"
            );
        }

        report
    }

    async fn migrate_flat_legacy(
        &self,
        legacy: &dyn LegacyStore,
        report: &mut MigrationReport,
    ) -> StorageResult<()> {
        let mut drained = Vec::new();

        for (key, value) in legacy.entries()? {
            if !is_bare_date_key(&key) {
                continue;
            }
            let Some(day) = DayKey::parse(&key) else {
                continue;
            };
            let Some(color) = legacy_int(&value).and_then(Color::from_value) else {
                continue;
            };

            if color != Color::None
                && self
                    .put_if_absent(&encode_key(DEFAULT_STREAK_NAME, day), color.value() as i64)
                    .await?
            {
                report.legacy_moved += 1;
            }
            drained.push(key);
        }

        legacy.remove(&drained)?;
        report.legacy_removed += drained.len();
        Ok(())
    }

    async fn migrate_unscoped_keys(&self, report: &mut MigrationReport) -> StorageResult<()> {
        let bare: Vec<(String, Value)> = self
            .store
            .scan(Table::Records)
            .await?
            .try_filter(|(key, _)| futures_util::future::ready(is_bare_date_key(key)))
            .try_collect()
            .await?;

        for (key, value) in bare {
            let positive = legacy_int(&value).filter(|v| *v > 0);
            match (DayKey::parse(&key), positive) {
                (Some(day), Some(v)) => {
                    if self
                        .put_if_absent(&encode_key(DEFAULT_STREAK_NAME, day), v)
                        .await?
                    {
                        report.unscoped_rewritten += 1;
                    }
                }
                _ => tracing::debug!(key = %key, "Dropping unusable unscoped record"),
            }

            self.store.delete(Table::Records, &key).await?;
            report.unscoped_removed += 1;
        }

        Ok(())
    }

    /// Write `value` at `key` unless something is already there
    async fn put_if_absent(&self, key: &str, value: i64) -> StorageResult<bool> {
        if self.store.get(Table::Records, key).await?.is_some() {
            return Ok(false);
        }
        self.store.put(Table::Records, key, json!(value)).await?;
        Ok(true)
    }
}
