//! Statistics Engine
//!
//! Pure functions over a streak's day values. Nothing here touches storage
//! or the clock: "today" is always passed in.
//!
//! # Color streaks
//!
//! Per displayed month, over the days elapsed so far (a past month counts
//! all its days, the current month counts through today, a future month
//! counts none): for each of Red/Green/Blue the number of days and the
//! longest unbroken run, plus the longest "success" run where every day is
//! Green or Blue.
//!
//! # Count streaks
//!
//! A gap-filled sequence runs from a start date (first recorded day, or a
//! fixed date from settings) through today with 0 for missing days. Total,
//! median and mean are computed over it, or over the part of it that falls
//! in one month.

use crate::storage::{Color, CountStartMode, DayKey, StreakSettings};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Day values of one streak
pub type DayValues = BTreeMap<DayKey, u32>;

// ==================== Calendar helpers ====================

/// Number of days in a month (0 for an invalid month)
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(first) = DayKey::new(year, month, 1) else {
        return 0;
    };
    let next = if month == 12 {
        DayKey::new(year + 1, 1, 1)
    } else {
        DayKey::new(year, month + 1, 1)
    };
    next.map(|n| (n.date() - first.date()).num_days() as u32)
        .unwrap_or(31)
}

/// Days of a month that have elapsed as of `today`
pub fn elapsed_days_in_month(year: i32, month: u32, today: DayKey) -> u32 {
    let Some(first) = DayKey::new(year, month, 1) else {
        return 0;
    };
    if first > today {
        0
    } else if (year, month) == (today.year(), today.month()) {
        today.day()
    } else {
        days_in_month(year, month)
    }
}

// ==================== Color statistics ====================

/// Count and longest run of one color
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColorTally {
    pub days: u32,
    pub longest_run: u32,
}

/// Color statistics over a run of consecutive days
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColorStats {
    /// Days considered
    pub elapsed_days: u32,
    pub red: ColorTally,
    pub green: ColorTally,
    pub blue: ColorTally,
    /// Longest run of days that are each Green or Blue
    pub success_run: u32,
}

impl ColorStats {
    pub fn tally(&self, color: Color) -> ColorTally {
        match color {
            Color::Red => self.red,
            Color::Green => self.green,
            Color::Blue => self.blue,
            Color::None => ColorTally::default(),
        }
    }

    /// Fold a sequence of consecutive days' colors
    pub fn from_colors<I>(colors: I) -> Self
    where
        I: IntoIterator<Item = Color>,
    {
        let mut stats = Self::default();
        let mut current = [0u32; 4];
        let mut success = 0u32;

        for color in colors {
            stats.elapsed_days += 1;

            for c in Color::all() {
                let idx = c.value() as usize;
                if *c == color {
                    current[idx] += 1;
                } else {
                    current[idx] = 0;
                }
            }

            let tally = match color {
                Color::Red => Some(&mut stats.red),
                Color::Green => Some(&mut stats.green),
                Color::Blue => Some(&mut stats.blue),
                Color::None => None,
            };
            if let Some(tally) = tally {
                tally.days += 1;
                tally.longest_run = tally.longest_run.max(current[color.value() as usize]);
            }

            success = if color.is_success() { success + 1 } else { 0 };
            stats.success_run = stats.success_run.max(success);
        }

        stats
    }
}

fn color_on(values: Option<&DayValues>, day: DayKey) -> Color {
    values
        .and_then(|v| v.get(&day))
        .and_then(|v| Color::from_value(*v as i64))
        .unwrap_or(Color::None)
}

/// Color statistics for one month as of `today`
pub fn color_month_stats(
    values: Option<&DayValues>,
    year: i32,
    month: u32,
    today: DayKey,
) -> ColorStats {
    let elapsed = elapsed_days_in_month(year, month, today);
    let colors = (1..=elapsed)
        .filter_map(|d| DayKey::new(year, month, d))
        .map(|day| color_on(values, day));
    ColorStats::from_colors(colors)
}

/// Color statistics from the earliest record through `today`
pub fn color_overall_stats(values: Option<&DayValues>, today: DayKey) -> ColorStats {
    let Some(first) = values.and_then(|v| v.keys().next()).copied() else {
        return ColorStats::default();
    };
    ColorStats::from_colors(first.iter_through(today).map(|day| color_on(values, day)))
}

// ==================== Count statistics ====================

/// Total, median and mean over a gap-filled day sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CountStats {
    /// Days in the sequence
    pub days: usize,
    pub total: u64,
    pub median: f64,
    pub mean: f64,
}

impl CountStats {
    pub fn from_values(values: &[u32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let total: u64 = values.iter().map(|v| *v as u64).sum();
        let mut sorted = values.to_vec();
        sorted.sort_unstable();

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2] as f64
        } else {
            (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
        };

        Self {
            days: n,
            total,
            median,
            mean: total as f64 / n as f64,
        }
    }
}

impl fmt::Display for CountStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} Median: {} Mean: {}",
            self.total,
            format_stat(self.median),
            format_stat(self.mean)
        )
    }
}

/// Integers print without decimals, everything else with two
pub fn format_stat(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// First day of the count range, if any.
///
/// First-recorded mode uses the earliest day with a positive value; fixed
/// mode uses the configured date and has no start when it is unset.
pub fn resolve_count_start(values: Option<&DayValues>, settings: &StreakSettings) -> Option<DayKey> {
    match settings.start_mode() {
        CountStartMode::FirstRecorded => values
            .and_then(|v| v.iter().find(|(_, value)| **value > 0))
            .map(|(day, _)| *day),
        CountStartMode::FixedDate => settings.count_zero_start_date,
    }
}

/// Every day from `start` through `end` with its value (0 when absent)
pub fn gap_filled(values: Option<&DayValues>, start: DayKey, end: DayKey) -> Vec<(DayKey, u32)> {
    start
        .iter_through(end)
        .map(|day| {
            let value = values.and_then(|v| v.get(&day)).copied().unwrap_or(0);
            (day, value)
        })
        .collect()
}

fn count_range(values: Option<&DayValues>, settings: &StreakSettings, today: DayKey) -> Vec<(DayKey, u32)> {
    match resolve_count_start(values, settings) {
        Some(start) => gap_filled(values, start, today),
        None => Vec::new(),
    }
}

/// Count statistics for the days of one month inside the count range
pub fn count_month_stats(
    values: Option<&DayValues>,
    settings: &StreakSettings,
    year: i32,
    month: u32,
    today: DayKey,
) -> CountStats {
    let in_month: Vec<u32> = count_range(values, settings, today)
        .into_iter()
        .filter(|(day, _)| day.year() == year && day.month() == month)
        .map(|(_, v)| v)
        .collect();
    CountStats::from_values(&in_month)
}

/// Count statistics over the whole count range
pub fn count_overall_stats(
    values: Option<&DayValues>,
    settings: &StreakSettings,
    today: DayKey,
) -> CountStats {
    let all: Vec<u32> = count_range(values, settings, today)
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    CountStats::from_values(&all)
}

/// Statistics for either streak type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreakStats {
    Color(ColorStats),
    Count(CountStats),
}

impl fmt::Display for StreakStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreakStats::Count(stats) => write!(f, "{}", stats),
            StreakStats::Color(stats) => write!(
                f,
                "Red: {} (best {}) Green: {} (best {}) Blue: {} (best {}) Success run: {}",
                stats.red.days,
                stats.red.longest_run,
                stats.green.days,
                stats.green.longest_run,
                stats.blue.days,
                stats.blue.longest_run,
                stats.success_run
            ),
        }
    }
}
