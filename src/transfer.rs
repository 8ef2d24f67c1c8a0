//! Export/Import Codec
//!
//! The transfer payload is a single JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "names": ["Mood", "Pushups"],
//!   "types": [["Mood", "color"], ["Pushups", "count"]],
//!   "settings": [["Pushups", {"countZeroStartMode": "first-recorded"}]],
//!   "lastUpdated": [["Mood", 1706918400000]],
//!   "dayRecords": [["Mood::2024-2-3", 2], ["Pushups::2024-2-3", 15]]
//! }
//! ```
//!
//! Import rejects a payload with the wrong version (or one that is not
//! JSON at all) before touching anything. Every other field is sanitized
//! entry by entry: malformed entries are dropped, the rest are kept. Both
//! tables are then replaced wholesale in a single store transaction.

use crate::directory::{parse_last_updated, parse_names, parse_settings, parse_types, Directory};
use crate::error::{StreakError, StreakResult};
use crate::records::DayRecords;
use crate::storage::legacy::legacy_int;
use crate::storage::{
    decode_key, encode_key, normalize_name, StorageResult, Store, StreakSettings, StreakType,
    Table,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::io;

/// Supported payload version
pub const EXPORT_VERSION: u32 = 1;

/// Full snapshot of both tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub version: u32,
    pub names: Vec<String>,
    pub types: Vec<(String, StreakType)>,
    pub settings: Vec<(String, StreakSettings)>,
    pub last_updated: Vec<(String, i64)>,
    pub day_records: Vec<(String, u32)>,
}

impl ExportPayload {
    /// Build a payload from a directory and its day records.
    ///
    /// Records are ordered by streak name, then by date.
    pub fn snapshot(directory: &Directory, records: &DayRecords) -> Self {
        let mut streaks: Vec<&String> = records.streaks().collect();
        streaks.sort();

        let day_records = streaks
            .into_iter()
            .flat_map(|streak| {
                records
                    .days(streak)
                    .into_iter()
                    .flatten()
                    .map(move |(day, value)| (encode_key(streak, *day), *value))
            })
            .collect();

        Self {
            version: EXPORT_VERSION,
            names: directory.names().to_vec(),
            types: directory.type_pairs(),
            settings: directory.settings_pairs(),
            last_updated: directory.last_updated_pairs(),
            day_records,
        }
    }

    pub fn to_json(&self) -> StreakResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StreakError::Storage(e.into()))
    }
}

/// Snapshot every directory blob and day record held by the store.
///
/// Types are migrated first so every listed name carries one.
pub async fn export_all(store: &dyn Store) -> StorageResult<ExportPayload> {
    let mut directory = Directory::load(store).await?;
    directory.migrate_types();
    let records = DayRecords::load(store).await?;

    let payload = ExportPayload::snapshot(&directory, &records);
    tracing::info!(
        streaks = payload.names.len(),
        records = payload.day_records.len(),
        "Exported streak data"
    );
    Ok(payload)
}

// ==================== Import ====================

/// A validated import, ready to replace both tables
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    pub directory: Directory,
    /// Canonical composite keys with positive values
    pub records: Vec<(String, u32)>,
}

impl ImportPlan {
    pub fn streak_count(&self) -> usize {
        self.directory.names().len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Parse and sanitize raw import text.
///
/// Fails with `InvalidImportPayload` only for unparseable JSON, a
/// non-object document, or an unsupported version.
pub fn parse_import(raw: &str) -> StreakResult<ImportPlan> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|e| StreakError::InvalidImportPayload(format!("not valid JSON: {}", e)))?;

    let Value::Object(fields) = document else {
        return Err(StreakError::InvalidImportPayload(
            "expected a JSON object".to_string(),
        ));
    };

    match fields.get("version").and_then(Value::as_u64) {
        Some(v) if v == EXPORT_VERSION as u64 => {}
        Some(v) => {
            return Err(StreakError::InvalidImportPayload(format!(
                "unsupported version {} (expected {})",
                v, EXPORT_VERSION
            )))
        }
        None => {
            return Err(StreakError::InvalidImportPayload(
                "missing version".to_string(),
            ))
        }
    }

    let records = sanitize_records(field(&fields, "dayRecords"));

    let mut names = field(&fields, "names").map(parse_names).unwrap_or_default();
    for key in records.keys() {
        if let Some(record) = decode_key(key) {
            if !names.contains(&record.streak) {
                names.push(record.streak);
            }
        }
    }

    let listed = |name: &String| names.contains(name);
    let types: HashMap<String, StreakType> = field(&fields, "types")
        .map(parse_types)
        .unwrap_or_default()
        .into_iter()
        .filter(|(name, _)| listed(name))
        .collect();
    let settings: HashMap<String, StreakSettings> = field(&fields, "settings")
        .map(parse_settings)
        .unwrap_or_default()
        .into_iter()
        .filter(|(name, _)| listed(name))
        .collect();
    let last_updated: HashMap<String, i64> = field(&fields, "lastUpdated")
        .map(parse_last_updated)
        .unwrap_or_default()
        .into_iter()
        .filter(|(name, _)| listed(name))
        .collect();

    let mut directory = Directory::from_parts(names, types, settings, last_updated);
    directory.migrate_types();

    Ok(ImportPlan {
        directory,
        records: records.into_iter().collect(),
    })
}

fn field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

/// Keep `[compositeKey, positiveInteger]` pairs, re-encoded canonically
fn sanitize_records(value: Option<&Value>) -> BTreeMap<String, u32> {
    let mut records = BTreeMap::new();
    let Some(value) = value else {
        return records;
    };
    let Some(items) = value.as_array() else {
        tracing::warn!("Discarding malformed dayRecords field");
        return records;
    };

    let mut dropped = 0usize;
    for item in items {
        let entry = match item.as_array().map(Vec::as_slice) {
            Some([Value::String(key), v]) => decode_key(key)
                .filter(|record| normalize_name(&record.streak) == record.streak)
                .zip(legacy_int(v).filter(|v| *v > 0 && *v <= u32::MAX as i64)),
            _ => None,
        };
        match entry {
            Some((record, v)) => {
                records.insert(record.encode(), v as u32);
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "Discarded malformed day records from import");
    }
    records
}

/// Replace both tables with a validated import, in one transaction
pub async fn apply_import(store: &dyn Store, plan: &ImportPlan) -> StorageResult<()> {
    let records = plan
        .records
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::json!(value)))
        .collect();
    store
        .replace_all(vec![
            (Table::Directory, plan.directory.to_blobs()),
            (Table::Records, records),
        ])
        .await?;

    tracing::info!(
        streaks = plan.streak_count(),
        records = plan.record_count(),
        "Imported streak data"
    );
    Ok(())
}

/// Parse, sanitize and apply raw import text
pub async fn import_all(store: &dyn Store, raw: &str) -> StreakResult<ImportPlan> {
    let plan = parse_import(raw)?;
    apply_import(store, &plan).await?;
    Ok(plan)
}

// ==================== CSV ====================

#[derive(Serialize)]
struct CsvRow<'a> {
    streak: &'a str,
    date: String,
    value: u32,
}

/// Write day records as `streak,date,value` rows
pub fn write_csv<W: io::Write>(payload: &ExportPayload, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let decoded: Vec<_> = payload
        .day_records
        .iter()
        .filter_map(|(key, value)| decode_key(key).map(|r| (r, *value)))
        .collect();

    if decoded.is_empty() {
        wtr.write_record(["streak", "date", "value"])?;
    }
    for (record, value) in &decoded {
        wtr.serialize(CsvRow {
            streak: &record.streak,
            date: record.day.to_string(),
            value: *value,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CountStartMode, DayKey, MemoryStore};
    use serde_json::json;

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    async fn populated_store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut directory = Directory::new();
        directory.create(&store, "Mood", StreakType::Color).await.unwrap();
        directory.create(&store, "Push ups", StreakType::Count).await.unwrap();
        directory
            .update_settings(
                &store,
                "Push ups",
                StreakSettings::default().count_start(CountStartMode::FixedDate, Some(day("2024-2-3"))),
            )
            .await
            .unwrap();
        directory.record_activity(&store, "Mood", 1_000).await.unwrap();

        let mut records = DayRecords::new();
        records.set_value(&store, "Mood", day("2024-2-3"), 2).await.unwrap();
        records.set_value(&store, "Mood", day("2024-10-1"), 3).await.unwrap();
        records.set_value(&store, "Push ups", day("2024-2-5"), 12).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_export_shape() {
        let store = populated_store().await;
        let payload = export_all(&store).await.unwrap();

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["version"], json!(1));
        assert_eq!(value["names"], json!(["Mood", "Push ups"]));
        assert_eq!(value["types"], json!([["Mood", "color"], ["Push ups", "count"]]));
        assert_eq!(
            value["settings"],
            json!([["Push ups", {"countZeroStartMode": "fixed-date", "countZeroStartDate": "2024-2-3"}]])
        );
        assert_eq!(value["lastUpdated"], json!([["Mood", 1000]]));
        assert_eq!(
            value["dayRecords"],
            json!([
                ["Mood::2024-2-3", 2],
                ["Mood::2024-10-1", 3],
                ["Push%20ups::2024-2-5", 12]
            ])
        );
    }

    #[tokio::test]
    async fn test_round_trip() {
        let source = populated_store().await;
        let exported = export_all(&source).await.unwrap();
        let text = exported.to_json().unwrap();

        let target = MemoryStore::new();
        target.put(Table::Records, "Old::2020-1-1", json!(1)).await.unwrap();
        import_all(&target, &text).await.unwrap();

        assert_eq!(export_all(&target).await.unwrap(), exported);
        assert_eq!(
            target.entries(Table::Records),
            source.entries(Table::Records)
        );
    }

    #[tokio::test]
    async fn test_wrong_version_leaves_data_untouched() {
        let store = populated_store().await;
        let before = store.write_count();

        let err = import_all(&store, r#"{"version": 2, "names": []}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, StreakError::InvalidImportPayload(_)));

        let err = import_all(&store, "{not json").await.unwrap_err();
        assert!(matches!(err, StreakError::InvalidImportPayload(_)));

        let err = import_all(&store, r#"{"names": ["A"]}"#).await.unwrap_err();
        assert!(matches!(err, StreakError::InvalidImportPayload(_)));

        assert_eq!(store.write_count(), before);
    }

    #[tokio::test]
    async fn test_failed_import_write_changes_nothing() {
        let store = populated_store().await;
        let directory = store.entries(Table::Directory);
        let records = store.entries(Table::Records);

        let text = json!({
            "version": 1,
            "names": ["Other"],
            "dayRecords": [["Other::2024-3-1", 1]]
        })
        .to_string();

        store.set_fail_writes(true);
        let err = import_all(&store, &text).await.unwrap_err();
        assert!(matches!(err, StreakError::Storage(_)));

        assert_eq!(store.entries(Table::Directory), directory);
        assert_eq!(store.entries(Table::Records), records);
    }

    #[test]
    fn test_sanitize_drops_malformed_entries() {
        let raw = json!({
            "version": 1,
            "names": ["Mood", 42, ""],
            "types": [["Mood", "color"], ["Ghost", "count"], ["Mood"], "x"],
            "settings": [["Mood", {"redLabel": "Awful"}], ["Mood2", 7]],
            "lastUpdated": [["Mood", 5], ["Mood", "later"]],
            "dayRecords": [
                ["Mood::2024-2-3", 1],
                ["Mood::2024-02-04", 2],
                ["Run::2024-2-3", 4],
                ["2024-2-3", 1],
                ["Mood::2024-2-30", 1],
                ["Mood::2024-2-6", 0],
                ["Mood::2024-2-7", -3],
                ["Mood::2024-2-8"]
            ]
        })
        .to_string();

        let plan = parse_import(&raw).unwrap();
        assert_eq!(plan.directory.names(), &["Mood", "Run"]);
        // Run is implied by its records and typed Color
        assert_eq!(plan.directory.streak_type("Run"), StreakType::Color);
        assert_eq!(plan.directory.settings("Mood").red_label.as_deref(), Some("Awful"));
        assert_eq!(plan.directory.last_activity("Mood"), Some(5));
        assert_eq!(
            plan.records,
            vec![
                ("Mood::2024-2-3".to_string(), 1),
                ("Mood::2024-2-4".to_string(), 2),
                ("Run::2024-2-3".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let plan = parse_import(r#"{"version": 1}"#).unwrap();
        assert!(plan.directory.is_empty());
        assert_eq!(plan.record_count(), 0);
    }

    #[tokio::test]
    async fn test_csv_export() {
        let store = populated_store().await;
        let payload = export_all(&store).await.unwrap();

        let mut out = Vec::new();
        write_csv(&payload, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "streak,date,value\nMood,2024-2-3,2\nMood,2024-10-1,3\nPush ups,2024-2-5,12\n"
        );
    }

    #[test]
    fn test_csv_export_empty_has_header() {
        let payload = ExportPayload::snapshot(&Directory::new(), &DayRecords::new());
        let mut out = Vec::new();
        write_csv(&payload, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "streak,date,value\n");
    }
}
