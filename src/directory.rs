//! Streak Directory
//!
//! Owns the set of streak names and their per-name metadata:
//!
//! - `names`: ordered list (order survives renames; new names append)
//! - `types`: name → [`StreakType`], fixed at creation
//! - `settings`: name → sparse [`StreakSettings`]
//! - `lastUpdated`: name → last activity timestamp (ms)
//!
//! Each is stored as its own blob in the `directory` table and loaded
//! independently. An absent blob is a fresh install; a malformed blob (or
//! malformed entries inside one) is discarded with a warning.
//!
//! Maps are stored as arrays of `[name, value]` pairs.

use crate::error::{StreakError, StreakResult};
use crate::storage::{
    normalize_name, DayKey, StorageResult, Store, StreakSettings, StreakType, Table,
    DEFAULT_STREAK_NAME,
};
use serde_json::Value;
use std::collections::HashMap;

pub const NAMES_KEY: &str = "names";
pub const TYPES_KEY: &str = "types";
pub const SETTINGS_KEY: &str = "settings";
pub const LAST_UPDATED_KEY: &str = "lastUpdated";

/// Names, types, settings and activity of every streak
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    names: Vec<String>,
    types: HashMap<String, StreakType>,
    settings: HashMap<String, StreakSettings>,
    last_updated: HashMap<String, i64>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all four blobs from the store
    pub async fn load(store: &dyn Store) -> StorageResult<Self> {
        let names = store
            .get(Table::Directory, NAMES_KEY)
            .await?
            .map(|v| parse_names(&v))
            .unwrap_or_default();
        let types = store
            .get(Table::Directory, TYPES_KEY)
            .await?
            .map(|v| parse_types(&v))
            .unwrap_or_default();
        let settings = store
            .get(Table::Directory, SETTINGS_KEY)
            .await?
            .map(|v| parse_settings(&v))
            .unwrap_or_default();
        let last_updated = store
            .get(Table::Directory, LAST_UPDATED_KEY)
            .await?
            .map(|v| parse_last_updated(&v))
            .unwrap_or_default();

        let directory = Self::from_parts(names, types, settings, last_updated);
        tracing::debug!(streaks = directory.names.len(), "Loaded streak directory");
        Ok(directory)
    }

    /// Assemble a directory from already-validated parts.
    ///
    /// Settings are trimmed to what each streak's type can use.
    pub fn from_parts(
        names: Vec<String>,
        types: HashMap<String, StreakType>,
        settings: HashMap<String, StreakSettings>,
        last_updated: HashMap<String, i64>,
    ) -> Self {
        let settings = settings
            .into_iter()
            .filter_map(|(name, s)| {
                let ty = types.get(&name).copied().unwrap_or_default();
                s.sanitized(ty).map(|s| (name, s))
            })
            .collect();

        Self {
            names,
            types,
            settings,
            last_updated,
        }
    }

    // ==================== Queries ====================

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Type of a streak; streaks predating type tracking are Color
    pub fn streak_type(&self, name: &str) -> StreakType {
        self.types.get(name).copied().unwrap_or_default()
    }

    pub fn settings(&self, name: &str) -> StreakSettings {
        self.settings.get(name).cloned().unwrap_or_default()
    }

    pub fn last_activity(&self, name: &str) -> Option<i64> {
        self.last_updated.get(name).copied()
    }

    // ==================== In-memory maintenance ====================

    /// Assign Color to every listed name without a type.
    ///
    /// Returns how many names were assigned.
    pub fn migrate_types(&mut self) -> usize {
        let mut assigned = 0;
        for name in &self.names {
            if !self.types.contains_key(name) {
                self.types.insert(name.clone(), StreakType::Color);
                assigned += 1;
            }
        }
        assigned
    }

    /// Append names not yet listed (e.g. implied by stored day records).
    ///
    /// Returns how many were added.
    pub fn adopt<I>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for name in names {
            if !self.contains(&name) {
                tracing::info!(streak = %name, "Adopting streak found in day records");
                self.names.push(name);
                added += 1;
            }
        }
        added
    }

    // ==================== Persisted operations ====================

    /// Create a streak. No-op if the normalized name already exists.
    ///
    /// Returns the normalized name and whether it was created.
    pub async fn create(
        &mut self,
        store: &dyn Store,
        raw_name: &str,
        streak_type: StreakType,
    ) -> StorageResult<(String, bool)> {
        let name = normalize_name(raw_name);
        if self.contains(&name) {
            return Ok((name, false));
        }

        self.names.push(name.clone());
        self.types.insert(name.clone(), streak_type);
        self.save_names(store).await?;
        self.save_types(store).await?;

        tracing::info!(streak = %name, streak_type = %streak_type, "Created streak");
        Ok((name, true))
    }

    /// Validate a rename.
    ///
    /// Returns the normalized pair, or None when the names are equal.
    /// Fails with `NameCollision` if `new` names a different streak.
    pub fn check_rename(&self, old: &str, new: &str) -> StreakResult<Option<(String, String)>> {
        let old = normalize_name(old);
        let new = normalize_name(new);

        if !self.contains(&old) {
            return Err(StreakError::UnknownStreak(old));
        }
        if old == new {
            return Ok(None);
        }
        if self.contains(&new) {
            return Err(StreakError::NameCollision(new));
        }
        Ok(Some((old, new)))
    }

    /// Move type, settings and activity from `old` to `new`, keeping the
    /// name's position. Callers validate with [`Directory::check_rename`].
    pub async fn apply_rename(
        &mut self,
        store: &dyn Store,
        old: &str,
        new: &str,
    ) -> StorageResult<()> {
        for name in self.names.iter_mut().filter(|n| n.as_str() == old) {
            *name = new.to_string();
        }
        if let Some(ty) = self.types.remove(old) {
            self.types.insert(new.to_string(), ty);
        }
        if let Some(settings) = self.settings.remove(old) {
            self.settings.insert(new.to_string(), settings);
        }
        if let Some(ts) = self.last_updated.remove(old) {
            self.last_updated.insert(new.to_string(), ts);
        }

        self.save_all(store).await?;
        tracing::info!(from = %old, to = %new, "Renamed streak");
        Ok(())
    }

    /// Remove a streak's metadata. If no streak remains, a fresh default
    /// Color streak is created.
    ///
    /// Returns whether the default streak was recreated.
    pub async fn remove(&mut self, store: &dyn Store, name: &str) -> StorageResult<bool> {
        self.names.retain(|n| n != name);
        self.types.remove(name);
        self.settings.remove(name);
        self.last_updated.remove(name);

        let recreated = if self.names.is_empty() {
            self.names.push(DEFAULT_STREAK_NAME.to_string());
            self.types
                .insert(DEFAULT_STREAK_NAME.to_string(), StreakType::Color);
            true
        } else {
            false
        };

        self.save_all(store).await?;
        tracing::info!(streak = %name, recreated_default = recreated, "Deleted streak");
        Ok(recreated)
    }

    /// Set the last-activity timestamp and persist it immediately
    pub async fn record_activity(
        &mut self,
        store: &dyn Store,
        name: &str,
        timestamp: i64,
    ) -> StorageResult<()> {
        self.last_updated.insert(name.to_string(), timestamp);
        self.save_last_updated(store).await
    }

    /// Replace a streak's settings. Empty settings are removed.
    pub async fn update_settings(
        &mut self,
        store: &dyn Store,
        name: &str,
        settings: StreakSettings,
    ) -> StorageResult<()> {
        match settings.sanitized(self.streak_type(name)) {
            Some(clean) => {
                self.settings.insert(name.to_string(), clean);
            }
            None => {
                self.settings.remove(name);
            }
        }
        self.save_settings(store).await
    }

    /// Choose the streak to show at session start.
    ///
    /// An explicit name wins (created as Color if new). Otherwise the most
    /// recently active streak; ties or missing timestamps fall back to the
    /// streak whose latest day record is most recent, then to the last
    /// listed name. An empty directory gets the default streak.
    pub async fn resolve_initial<F>(
        &mut self,
        store: &dyn Store,
        explicit: Option<&str>,
        latest_day: F,
    ) -> StorageResult<String>
    where
        F: Fn(&str) -> Option<DayKey>,
    {
        if let Some(raw) = explicit {
            let (name, _) = self.create(store, raw, StreakType::Color).await?;
            return Ok(name);
        }

        if self.names.is_empty() {
            let (name, _) = self
                .create(store, DEFAULT_STREAK_NAME, StreakType::Color)
                .await?;
            return Ok(name);
        }

        Ok(self.most_recent(latest_day))
    }

    fn most_recent<F>(&self, latest_day: F) -> String
    where
        F: Fn(&str) -> Option<DayKey>,
    {
        let newest = self
            .names
            .iter()
            .filter_map(|n| self.last_updated.get(n))
            .max()
            .copied();

        let candidates: Vec<&String> = match newest {
            Some(ts) => self
                .names
                .iter()
                .filter(|n| self.last_updated.get(*n) == Some(&ts))
                .collect(),
            None => self.names.iter().collect(),
        };

        if let [only] = candidates.as_slice() {
            return (*only).clone();
        }

        let dated: Vec<(DayKey, &String)> = candidates
            .iter()
            .filter_map(|n| latest_day(n).map(|d| (d, *n)))
            .collect();
        if let Some(best) = dated.iter().map(|(d, _)| *d).max() {
            let winners: Vec<&String> = dated
                .iter()
                .filter(|(d, _)| *d == best)
                .map(|(_, n)| *n)
                .collect();
            if let [only] = winners.as_slice() {
                return (*only).clone();
            }
        }

        self.names
            .last()
            .cloned()
            .unwrap_or_else(|| DEFAULT_STREAK_NAME.to_string())
    }

    // ==================== Blobs ====================

    /// The four directory blobs as `(key, value)` pairs
    pub fn to_blobs(&self) -> Vec<(String, Value)> {
        vec![
            (NAMES_KEY.to_string(), self.names_blob()),
            (TYPES_KEY.to_string(), self.types_blob()),
            (SETTINGS_KEY.to_string(), self.settings_blob()),
            (LAST_UPDATED_KEY.to_string(), self.last_updated_blob()),
        ]
    }

    /// `(name, type)` pairs in list order, then any unlisted names sorted
    pub fn type_pairs(&self) -> Vec<(String, StreakType)> {
        ordered_pairs(&self.names, &self.types)
    }

    pub fn settings_pairs(&self) -> Vec<(String, StreakSettings)> {
        ordered_pairs(&self.names, &self.settings)
    }

    pub fn last_updated_pairs(&self) -> Vec<(String, i64)> {
        ordered_pairs(&self.names, &self.last_updated)
    }

    fn names_blob(&self) -> Value {
        serde_json::json!(self.names)
    }

    fn types_blob(&self) -> Value {
        serde_json::json!(self.type_pairs())
    }

    fn settings_blob(&self) -> Value {
        serde_json::json!(self.settings_pairs())
    }

    fn last_updated_blob(&self) -> Value {
        serde_json::json!(self.last_updated_pairs())
    }

    async fn save_names(&self, store: &dyn Store) -> StorageResult<()> {
        store
            .put(Table::Directory, NAMES_KEY, self.names_blob())
            .await
    }

    /// Persist the type map
    pub async fn save_types(&self, store: &dyn Store) -> StorageResult<()> {
        store
            .put(Table::Directory, TYPES_KEY, self.types_blob())
            .await
    }

    async fn save_settings(&self, store: &dyn Store) -> StorageResult<()> {
        store
            .put(Table::Directory, SETTINGS_KEY, self.settings_blob())
            .await
    }

    async fn save_last_updated(&self, store: &dyn Store) -> StorageResult<()> {
        store
            .put(Table::Directory, LAST_UPDATED_KEY, self.last_updated_blob())
            .await
    }

    /// Persist all four blobs
    pub async fn save_all(&self, store: &dyn Store) -> StorageResult<()> {
        self.save_names(store).await?;
        self.save_types(store).await?;
        self.save_settings(store).await?;
        self.save_last_updated(store).await
    }
}

fn ordered_pairs<T: Clone>(names: &[String], map: &HashMap<String, T>) -> Vec<(String, T)> {
    let mut pairs: Vec<(String, T)> = names
        .iter()
        .filter_map(|n| map.get(n).map(|v| (n.clone(), v.clone())))
        .collect();

    let mut rest: Vec<(String, T)> = map
        .iter()
        .filter(|(k, _)| !names.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));

    pairs.extend(rest);
    pairs
}

// ==================== Validation ====================
//
// Shared by directory loading and import: keep every well-formed entry,
// drop the rest with a warning.

/// Parse a name list: strings only, trimmed, non-blank, first occurrence wins
pub fn parse_names(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        tracing::warn!("Discarding malformed streak name list");
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    for item in items {
        match item.as_str().map(str::trim) {
            Some(name) if !name.is_empty() => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            _ => tracing::warn!(entry = %item, "Discarding malformed streak name"),
        }
    }
    names
}

/// Parse `[name, value]` pairs (an object map is accepted too)
fn parse_pairs(value: &Value, what: &str) -> Vec<(String, Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.as_array().map(Vec::as_slice) {
                Some([Value::String(name), v]) if !name.trim().is_empty() => {
                    Some((name.trim().to_string(), v.clone()))
                }
                _ => {
                    tracing::warn!(entry = %item, "Discarding malformed {} entry", what);
                    None
                }
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.clone()))
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        _ => {
            tracing::warn!("Discarding malformed {} blob", what);
            Vec::new()
        }
    }
}

pub fn parse_types(value: &Value) -> HashMap<String, StreakType> {
    parse_pairs(value, "type")
        .into_iter()
        .filter_map(|(name, v)| match serde_json::from_value(v) {
            Ok(ty) => Some((name, ty)),
            Err(e) => {
                tracing::warn!(streak = %name, error = %e, "Discarding unknown streak type");
                None
            }
        })
        .collect()
}

pub fn parse_settings(value: &Value) -> HashMap<String, StreakSettings> {
    parse_pairs(value, "settings")
        .into_iter()
        .filter_map(|(name, v)| match serde_json::from_value(v) {
            Ok(settings) => Some((name, settings)),
            Err(e) => {
                tracing::warn!(streak = %name, error = %e, "Discarding malformed settings");
                None
            }
        })
        .collect()
}

pub fn parse_last_updated(value: &Value) -> HashMap<String, i64> {
    parse_pairs(value, "activity")
        .into_iter()
        .filter_map(|(name, v)| {
            let ts = v
                .as_i64()
                .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64));
            if ts.is_none() {
                tracing::warn!(streak = %name, "Discarding malformed activity timestamp");
            }
            ts.map(|ts| (name, ts))
        })
        .collect()
}
