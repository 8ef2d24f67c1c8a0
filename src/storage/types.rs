//! Core data types for the Streakbook storage layer
//!
//! This module defines the fundamental types used throughout the crate:
//! - `DayKey`: A calendar date with no time component
//! - `StreakType` and `Color`: What a streak tracks and the color states
//! - `StreakSettings`: Sparse, type-specific per-streak settings

use chrono::{Datelike, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Name used when no streak exists or a name normalizes to empty
pub const DEFAULT_STREAK_NAME: &str = "Streak";

/// Normalize a user-supplied streak name.
///
/// Surrounding whitespace is trimmed; an empty result becomes
/// [`DEFAULT_STREAK_NAME`]. Comparison after normalization is case-sensitive.
pub fn normalize_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_STREAK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A calendar day (year, month 1-12, day) with no time zone attached
///
/// Its text form is `YYYY-M-D` with unpadded month and day. Ordering follows
/// the calendar, never the text form. Years are limited to four digits so
/// every key survives the record key codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

const DAY_KEY_YEARS: RangeInclusive<i32> = 1000..=9999;

impl DayKey {
    /// Create a day key, returning None for dates that do not exist or whose
    /// year is not four digits
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        if !DAY_KEY_YEARS.contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Today's date on the local wall clock
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Parse `YYYY-M-D`.
    ///
    /// The year has exactly four ASCII digits, month and day one or two.
    /// The triple must name a real calendar date; anything else yields None.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let numeric = |p: &str, max: usize| {
            (1..=max).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit())
        };
        if year.len() != 4 || !(numeric(year, 4) && numeric(month, 2) && numeric(day, 2)) {
            return None;
        }

        Self::new(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
    }

    /// Local-midnight timestamp in milliseconds
    pub fn to_time(&self) -> Option<i64> {
        let midnight = self.0.and_hms_opt(0, 0, 0)?;
        Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.timestamp_millis())
    }

    /// The following calendar day
    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// First day of this key's month
    pub fn month_start(&self) -> Self {
        Self(self.0.with_day(1).unwrap_or(self.0))
    }

    /// Iterate every day from `self` through `end`, inclusive
    pub fn iter_through(self, end: DayKey) -> impl Iterator<Item = DayKey> {
        self.0
            .iter_days()
            .take_while(move |d| *d <= end.0)
            .map(DayKey)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.year(), self.month(), self.day())
    }
}

impl FromStr for DayKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid date key: {}", s))
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What a streak tracks; fixed permanently at creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreakType {
    /// One of four color states per day
    #[default]
    Color,
    /// A non-negative count per day
    Count,
}

impl fmt::Display for StreakType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreakType::Color => write!(f, "color"),
            StreakType::Count => write!(f, "count"),
        }
    }
}

impl FromStr for StreakType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "color" => Ok(StreakType::Color),
            "count" => Ok(StreakType::Count),
            other => Err(format!("Unknown streak type: {}", other)),
        }
    }
}

/// Daily state of a color streak. `None` is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    None = 0,
    Red = 1,
    Green = 2,
    Blue = 3,
}

impl Color {
    /// All persisted colors, in cycle order
    pub fn all() -> &'static [Color] {
        &[Color::Red, Color::Green, Color::Blue]
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Color::None),
            1 => Some(Color::Red),
            2 => Some(Color::Green),
            3 => Some(Color::Blue),
            _ => None,
        }
    }

    pub fn value(self) -> u32 {
        self as u32
    }

    /// Green or Blue; either keeps a success run alive
    pub fn is_success(self) -> bool {
        matches!(self, Color::Green | Color::Blue)
    }

    pub fn default_label(self) -> &'static str {
        match self {
            Color::None => "None",
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(Color::None),
            "red" | "1" => Ok(Color::Red),
            "green" | "2" => Ok(Color::Green),
            "blue" | "3" => Ok(Color::Blue),
            other => Err(format!("Unknown color: {}", other)),
        }
    }
}

/// Left edge of the date range used for count statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CountStartMode {
    /// Start at the earliest day with a positive value
    FirstRecorded,
    /// Start at `count_zero_start_date`
    FixedDate,
}

/// Sparse per-streak settings
///
/// Color streaks use the label fields, count streaks use the start mode
/// fields. Settings with no content are equivalent to absent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreakSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blue_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_zero_start_mode: Option<CountStartMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_zero_start_date: Option<DayKey>,
}

impl StreakSettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Builder: set a custom label for a color
    pub fn label(mut self, color: Color, label: impl Into<String>) -> Self {
        let label = Some(label.into());
        match color {
            Color::Red => self.red_label = label,
            Color::Green => self.green_label = label,
            Color::Blue => self.blue_label = label,
            Color::None => {}
        }
        self
    }

    /// Builder: set the count start mode and optional fixed date
    pub fn count_start(mut self, mode: CountStartMode, date: Option<DayKey>) -> Self {
        self.count_zero_start_mode = Some(mode);
        self.count_zero_start_date = date;
        self
    }

    /// Display label for a color, falling back to the default
    pub fn color_label(&self, color: Color) -> &str {
        let custom = match color {
            Color::Red => self.red_label.as_deref(),
            Color::Green => self.green_label.as_deref(),
            Color::Blue => self.blue_label.as_deref(),
            Color::None => None,
        };
        custom.unwrap_or_else(|| color.default_label())
    }

    /// Effective count start mode (first-recorded unless set)
    pub fn start_mode(&self) -> CountStartMode {
        self.count_zero_start_mode
            .unwrap_or(CountStartMode::FirstRecorded)
    }

    /// Keep only the fields meaningful for `streak_type`.
    ///
    /// Blank labels are dropped. Returns None when nothing remains.
    pub fn sanitized(self, streak_type: StreakType) -> Option<Self> {
        let keep_label = |label: Option<String>| {
            label
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
        };

        let clean = match streak_type {
            StreakType::Color => Self {
                red_label: keep_label(self.red_label),
                green_label: keep_label(self.green_label),
                blue_label: keep_label(self.blue_label),
                ..Self::default()
            },
            StreakType::Count => {
                let mode = self.count_zero_start_mode;
                Self {
                    count_zero_start_mode: mode,
                    count_zero_start_date: match mode {
                        Some(CountStartMode::FixedDate) => self.count_zero_start_date,
                        _ => None,
                    },
                    ..Self::default()
                }
            }
        };

        if clean.is_empty() {
            None
        } else {
            Some(clean)
        }
    }
}
