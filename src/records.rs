//! Day Record Store
//!
//! In-memory projection of every day value, grouped by streak, backed by
//! the records table. Writes update the projection first and then persist;
//! a failed persist leaves the projection ahead of the store (the caller
//! reports it, nothing is rolled back).
//!
//! A persisted value is always positive. Writing zero (or less) deletes the
//! record instead.

use crate::storage::legacy::legacy_int;
use crate::storage::{
    decode_key, encode_key, Color, DayKey, RecordKey, StorageResult, Store, Table,
};
use futures_util::TryStreamExt;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

/// Next color in the cycle None → Red → Green → Blue → None
pub fn cycle_color(current: Color) -> Color {
    Color::from_value((current.value() as i64 + 1) % 4).unwrap_or(Color::None)
}

/// Apply a delta to a count, never going below zero
pub fn adjust_count(current: u32, delta: i64) -> u32 {
    (current as i64)
        .saturating_add(delta)
        .clamp(0, u32::MAX as i64) as u32
}

/// Per-streak day values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayRecords {
    by_streak: HashMap<String, BTreeMap<DayKey, u32>>,
}

impl DayRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every composite-keyed record with a positive value
    pub async fn load(store: &dyn Store) -> StorageResult<Self> {
        let mut records = Self::new();
        let mut skipped = 0usize;

        let mut rows = store.scan(Table::Records).await?;
        while let Some((key, value)) = rows.try_next().await? {
            let decoded = decode_key(&key);
            let positive = legacy_int(&value).filter(|v| *v > 0);
            match (decoded, positive) {
                (Some(record), Some(v)) => {
                    records.insert(record, v.min(u32::MAX as i64) as u32);
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "Skipped records without a usable key or value");
        }
        tracing::debug!(records = records.len(), "Loaded day records");
        Ok(records)
    }

    fn insert(&mut self, record: RecordKey, value: u32) {
        self.by_streak
            .entry(record.streak)
            .or_default()
            .insert(record.day, value);
    }

    /// Value for a day; absent days are 0
    pub fn get(&self, streak: &str, day: DayKey) -> u32 {
        self.by_streak
            .get(streak)
            .and_then(|days| days.get(&day))
            .copied()
            .unwrap_or(0)
    }

    pub fn color(&self, streak: &str, day: DayKey) -> Color {
        Color::from_value(self.get(streak, day) as i64).unwrap_or(Color::None)
    }

    /// All recorded days of a streak, ordered by date
    pub fn days(&self, streak: &str) -> Option<&BTreeMap<DayKey, u32>> {
        self.by_streak.get(streak)
    }

    /// Streaks that have at least one record
    pub fn streaks(&self) -> impl Iterator<Item = &String> {
        self.by_streak
            .iter()
            .filter(|(_, days)| !days.is_empty())
            .map(|(name, _)| name)
    }

    pub fn latest_day(&self, streak: &str) -> Option<DayKey> {
        self.days(streak)
            .and_then(|days| days.keys().next_back())
            .copied()
    }

    /// Total number of records across all streaks
    pub fn len(&self) -> usize {
        self.by_streak.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update the projection only. Returns the value now held (0 = absent).
    fn set_local(&mut self, streak: &str, day: DayKey, value: i64) -> u32 {
        if value > 0 {
            let value = value.min(u32::MAX as i64) as u32;
            self.by_streak
                .entry(streak.to_string())
                .or_default()
                .insert(day, value);
            value
        } else {
            if let Some(days) = self.by_streak.get_mut(streak) {
                days.remove(&day);
                if days.is_empty() {
                    self.by_streak.remove(streak);
                }
            }
            0
        }
    }

    /// Write one day's value to the store: upsert if positive, else delete
    async fn persist(
        store: &dyn Store,
        streak: &str,
        day: DayKey,
        value: u32,
    ) -> StorageResult<()> {
        let key = encode_key(streak, day);
        if value > 0 {
            store.put(Table::Records, &key, json!(value)).await?;
        } else {
            store.delete(Table::Records, &key).await?;
        }
        tracing::debug!(key = %key, value, "Persisted day record");
        Ok(())
    }

    /// Update the projection, then persist.
    ///
    /// On a persist error the projection keeps the new value.
    pub async fn set_value(
        &mut self,
        store: &dyn Store,
        streak: &str,
        day: DayKey,
        value: i64,
    ) -> StorageResult<u32> {
        let stored = self.set_local(streak, day, value);
        Self::persist(store, streak, day, stored).await?;
        Ok(stored)
    }

    /// Move every record of `old` to `new`, in the store and in memory.
    ///
    /// New keys are written before old keys are deleted. Returns the
    /// number of stored records moved.
    pub async fn rename_streak(
        &mut self,
        store: &dyn Store,
        old: &str,
        new: &str,
    ) -> StorageResult<usize> {
        let stored = Self::stored_keys(store, old).await?;

        for (record, key, value) in &stored {
            store
                .put(Table::Records, &encode_key(new, record.day), value.clone())
                .await?;
            store.delete(Table::Records, key).await?;
        }

        if let Some(days) = self.by_streak.remove(old) {
            self.by_streak.insert(new.to_string(), days);
        }
        Ok(stored.len())
    }

    /// Delete every record of a streak. Returns the number deleted.
    pub async fn remove_streak(&mut self, store: &dyn Store, name: &str) -> StorageResult<usize> {
        let stored = Self::stored_keys(store, name).await?;
        for (_, key, _) in &stored {
            store.delete(Table::Records, key).await?;
        }
        self.by_streak.remove(name);
        Ok(stored.len())
    }

    async fn stored_keys(
        store: &dyn Store,
        streak: &str,
    ) -> StorageResult<Vec<(RecordKey, String, serde_json::Value)>> {
        let rows: Vec<(String, serde_json::Value)> = store.scan(Table::Records).await?.try_collect().await?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, value)| {
                decode_key(&key)
                    .filter(|record| record.streak == streak)
                    .map(|record| (record, key, value))
            })
            .collect())
    }
}
