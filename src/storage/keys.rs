//! Key Codec
//!
//! Day records live in a flat key space. A record key is the
//! percent-encoded streak name, a `::` separator and a `YYYY-M-D` date key:
//!
//! ```text
//! Morning%20run::2024-2-3
//! ```
//!
//! Percent-encoding removes `:` from names, so the first `::` always ends
//! the streak part. Keys without a streak prefix (`2024-2-3`) come from an
//! older schema and are rewritten by the migration engine.

use crate::storage::types::DayKey;
use regex::Regex;
use std::sync::OnceLock;

/// Separator between the encoded streak name and the date key
pub const KEY_SEPARATOR: &str = "::";

/// Decoded identity of a day record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub streak: String,
    pub day: DayKey,
}

impl RecordKey {
    pub fn new(streak: impl Into<String>, day: DayKey) -> Self {
        Self {
            streak: streak.into(),
            day,
        }
    }

    pub fn encode(&self) -> String {
        encode_key(&self.streak, self.day)
    }
}

fn composite_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+?)::([0-9]{4}-[0-9]{1,2}-[0-9]{1,2})$").expect("composite key pattern is valid")
    })
}

fn bare_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}$").expect("date key pattern is valid"))
}

/// Encode a streak name and date into a record key
pub fn encode_key(streak: &str, day: DayKey) -> String {
    format!("{}{}{}", urlencoding::encode(streak), KEY_SEPARATOR, day)
}

/// Decode a record key.
///
/// Returns None for anything that is not a composite key, including bare
/// legacy date keys and names that are not valid percent-encoding.
pub fn decode_key(key: &str) -> Option<RecordKey> {
    let caps = composite_pattern().captures(key)?;
    let streak = urlencoding::decode(&caps[1]).ok()?.into_owned();
    let day = DayKey::parse(&caps[2])?;
    Some(RecordKey { streak, day })
}

/// Whether `key` is a bare `YYYY-M-D` key with no streak prefix
pub fn is_bare_date_key(key: &str) -> bool {
    bare_date_pattern().is_match(key)
}

/// Parse a `YYYY-M-D` date key into a local-midnight timestamp (ms).
///
/// Returns None on malformed input.
pub fn date_key_to_time(date_key: &str) -> Option<i64> {
    DayKey::parse(date_key)?.to_time()
}
