//! Legacy flat store
//!
//! Before streaks existed, day colors lived in a flat key-value file: one
//! JSON object mapping bare date keys (`2024-2-3`) to a color value, stored
//! either as a number or as a numeric string. The migration engine drains
//! it into the current store.

use crate::storage::error::{StorageError, StorageResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// The flat, unscoped key-value mechanism that predates the store
pub trait LegacyStore: Send + Sync {
    /// Every entry currently held
    fn entries(&self) -> StorageResult<Vec<(String, Value)>>;

    /// Remove the given keys (missing keys are ignored)
    fn remove(&self, keys: &[String]) -> StorageResult<()>;
}

/// Legacy entries kept in a JSON object file. A missing file is empty.
#[derive(Debug, Clone)]
pub struct LegacyFile {
    path: PathBuf,
}

impl LegacyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Serialization(format!(
                "legacy file {:?} is not a JSON object",
                self.path
            ))),
        }
    }

    fn save(&self, map: &Map<String, Value>) -> StorageResult<()> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl LegacyStore for LegacyFile {
    fn entries(&self) -> StorageResult<Vec<(String, Value)>> {
        Ok(self.load()?.into_iter().collect())
    }

    fn remove(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut map = self.load()?;
        let before = map.len();
        for key in keys {
            map.remove(key);
        }
        if map.len() != before {
            self.save(&map)?;
        }
        Ok(())
    }
}

/// Interpret a legacy value as an integer (numbers or numeric strings)
pub fn legacy_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
