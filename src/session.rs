//! Session
//!
//! The object the UI or CLI talks to. It owns the [`Directory`] and the
//! [`DayRecords`] projection for one logical session and resolves which
//! streak is active.
//!
//! ```text
//! setup(route_hint)
//!   ├─ MigrationEngine::run      (legacy → records, bare keys → scoped)
//!   ├─ Directory::load           (names, types, settings, lastUpdated)
//!   ├─ DayRecords::load          (records grouped by streak)
//!   ├─ adopt + migrate_types     (every name listed and typed)
//!   └─ resolve_initial           (route hint, latest activity, ...)
//! ```
//!
//! Day mutations are optimistic: the projection changes first, then the
//! record is persisted and the streak's activity is bumped. Failures of
//! either write go to the [`ErrorSink`] and are not rolled back. Two
//! mutations of the same day that do not await each other can race.

use crate::directory::Directory;
use crate::error::{StreakError, StreakResult};
use crate::migration::{MigrationEngine, MigrationReport};
use crate::records::{adjust_count, cycle_color, DayRecords};
use crate::stats::{
    color_month_stats, color_overall_stats, count_month_stats, count_overall_stats, StreakStats,
};
use crate::storage::{
    normalize_name, Color, DayKey, LegacyStore, Store, StreakSettings, StreakType,
};
use crate::transfer::{self, ExportPayload, ImportPlan};
use chrono::{Local, NaiveDateTime, NaiveTime, TimeZone};
use serde::Serialize;
use std::sync::{Arc, Mutex};

// ==================== Clock ====================

/// Wall-clock source ("now" on the local clock)
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> DayKey {
        DayKey::from_date(self.now().date())
    }

    /// Milliseconds since the epoch
    fn timestamp_ms(&self) -> i64 {
        let now = self.now();
        Local
            .from_local_datetime(&now)
            .earliest()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| now.and_utc().timestamp_millis())
    }
}

/// The machine's local clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Noon on the given day
    pub fn on(day: DayKey) -> Self {
        Self::new(noon(day))
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn set_day(&self, day: DayKey) {
        self.set(noon(day));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

fn noon(day: DayKey) -> NaiveDateTime {
    day.date()
        .and_hms_opt(12, 0, 0)
        .unwrap_or_else(|| day.date().and_time(NaiveTime::default()))
}

// ==================== Session ====================

/// Receives failures of optimistic writes
pub type ErrorSink = Arc<dyn Fn(&StreakError) + Send + Sync>;

fn log_sink() -> ErrorSink {
    Arc::new(|e: &StreakError| {
        tracing::error!(error = %e, "Failed to save change");
    })
}

/// What the UI needs to render the active streak
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveState {
    pub streak: String,
    pub streak_type: StreakType,
    pub today: DayKey,
    pub settings: StreakSettings,
    pub names: Vec<String>,
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    store: Arc<dyn Store>,
    legacy: Option<Arc<dyn LegacyStore>>,
    clock: Arc<dyn Clock>,
    sink: ErrorSink,
    route_hint: Option<String>,
}

impl SessionBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            legacy: None,
            clock: Arc::new(SystemClock),
            sink: log_sink(),
            route_hint: None,
        }
    }

    /// Drain this legacy flat store during setup
    pub fn legacy(mut self, legacy: Arc<dyn LegacyStore>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.sink = sink;
        self
    }

    /// Streak name supplied by the caller's routing
    pub fn route_hint(mut self, name: impl Into<String>) -> Self {
        self.route_hint = Some(name.into());
        self
    }

    /// Run migrations, load everything and resolve the active streak.
    ///
    /// Fails only when the store cannot be read.
    pub async fn setup(self) -> StreakResult<Session> {
        let store = self.store.as_ref();

        let mut engine = MigrationEngine::new(store);
        if let Some(legacy) = self.legacy.as_deref() {
            engine = engine.with_legacy(legacy);
        }
        let migration = engine.run().await;

        let mut directory = Directory::load(store).await?;
        let records = DayRecords::load(store).await?;

        let mut implied: Vec<String> = records.streaks().cloned().collect();
        implied.sort();
        let adopted = directory.adopt(implied);
        let typed = directory.migrate_types();
        let saved = if adopted > 0 {
            directory.save_all(store).await
        } else if typed > 0 {
            directory.save_types(store).await
        } else {
            Ok(())
        };
        if let Err(e) = saved {
            (self.sink)(&StreakError::from(e));
        }

        let active = directory
            .resolve_initial(store, self.route_hint.as_deref(), |name| {
                records.latest_day(name)
            })
            .await?;

        let mut session = Session {
            today: self.clock.today(),
            store: self.store,
            clock: self.clock,
            sink: self.sink,
            directory,
            records,
            active,
            migration,
        };
        session.touch_if_new().await;

        tracing::info!(
            streak = %session.active,
            streaks = session.directory.names().len(),
            records = session.records.len(),
            "Session ready"
        );
        Ok(session)
    }
}

/// One logical session over a store
pub struct Session {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    sink: ErrorSink,
    directory: Directory,
    records: DayRecords,
    active: String,
    today: DayKey,
    migration: MigrationReport,
}

impl Session {
    pub fn builder(store: Arc<dyn Store>) -> SessionBuilder {
        SessionBuilder::new(store)
    }

    // ==================== Accessors ====================

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn today(&self) -> DayKey {
        self.today
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn records(&self) -> &DayRecords {
        &self.records
    }

    /// What the migrations did during setup
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    pub fn active_state(&self) -> ActiveState {
        ActiveState {
            streak: self.active.clone(),
            streak_type: self.directory.streak_type(&self.active),
            today: self.today,
            settings: self.directory.settings(&self.active),
            names: self.directory.names().to_vec(),
        }
    }

    /// Value of a day in the active streak
    pub fn day_value(&self, day: DayKey) -> u32 {
        self.records.get(&self.active, day)
    }

    // ==================== Streak CRUD ====================

    /// Create a streak (no-op if the name exists). Returns the normalized
    /// name. The active streak does not change.
    pub async fn create_streak(&mut self, name: &str, streak_type: StreakType) -> StreakResult<String> {
        let (name, _) = self
            .directory
            .create(self.store.as_ref(), name, streak_type)
            .await?;
        Ok(name)
    }

    /// Make a streak active
    pub async fn select_streak(&mut self, name: &str) -> StreakResult<ActiveState> {
        let name = normalize_name(name);
        if !self.directory.contains(&name) {
            return Err(StreakError::UnknownStreak(name));
        }
        self.active = name;
        self.touch_if_new().await;
        Ok(self.active_state())
    }

    /// Rename a streak, moving its records and metadata.
    ///
    /// Rejected with `NameCollision` (and nothing changed) if the new name
    /// belongs to another streak. Returns the resulting name.
    pub async fn rename_streak(&mut self, old: &str, new: &str) -> StreakResult<String> {
        let Some((old, new)) = self.directory.check_rename(old, new)? else {
            return Ok(normalize_name(old));
        };

        let store = self.store.as_ref();
        self.records.rename_streak(store, &old, &new).await?;
        self.directory.apply_rename(store, &old, &new).await?;

        if self.active == old {
            self.active = new.clone();
        }
        Ok(new)
    }

    /// Delete a streak with all its records and metadata.
    ///
    /// Deleting the last streak recreates the default one. If the active
    /// streak is deleted the most recent remaining one becomes active.
    pub async fn delete_streak(&mut self, name: &str) -> StreakResult<()> {
        let name = normalize_name(name);
        if !self.directory.contains(&name) {
            return Err(StreakError::UnknownStreak(name));
        }

        let store = self.store.as_ref();
        let removed = self.records.remove_streak(store, &name).await?;
        self.directory.remove(store, &name).await?;
        tracing::debug!(streak = %name, records = removed, "Removed streak records");

        if self.active == name {
            let records = &self.records;
            self.active = self
                .directory
                .resolve_initial(store, None, |n| records.latest_day(n))
                .await?;
        }
        Ok(())
    }

    /// Replace the settings of a streak
    pub async fn update_settings(&mut self, name: &str, settings: StreakSettings) -> StreakResult<()> {
        let name = normalize_name(name);
        if !self.directory.contains(&name) {
            return Err(StreakError::UnknownStreak(name));
        }
        self.directory
            .update_settings(self.store.as_ref(), &name, settings)
            .await?;
        Ok(())
    }

    // ==================== Day mutations ====================

    fn require_type(&self, expected: StreakType) -> StreakResult<()> {
        let actual = self.directory.streak_type(&self.active);
        if actual != expected {
            return Err(StreakError::TypeMismatch {
                name: self.active.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Set a day of the active Color streak
    pub async fn set_color_day(&mut self, day: DayKey, color: Color) -> StreakResult<Color> {
        self.require_type(StreakType::Color)?;
        let stored = self.write_day(day, color.value() as i64).await;
        Ok(Color::from_value(stored as i64).unwrap_or(Color::None))
    }

    /// Advance a day of the active Color streak to the next color
    pub async fn click_color_day(&mut self, day: DayKey) -> StreakResult<Color> {
        self.require_type(StreakType::Color)?;
        let next = cycle_color(self.records.color(&self.active, day));
        self.set_color_day(day, next).await
    }

    /// Set a day of the active Count streak
    pub async fn set_count_day(&mut self, day: DayKey, value: u32) -> StreakResult<u32> {
        self.require_type(StreakType::Count)?;
        Ok(self.write_day(day, value as i64).await)
    }

    /// Add `delta` to a day of the active Count streak (floored at zero)
    pub async fn adjust_count_day(&mut self, day: DayKey, delta: i64) -> StreakResult<u32> {
        self.require_type(StreakType::Count)?;
        let next = adjust_count(self.records.get(&self.active, day), delta);
        Ok(self.write_day(day, next as i64).await)
    }

    /// Update the projection, persist, then bump activity. Write failures
    /// go to the sink.
    async fn write_day(&mut self, day: DayKey, value: i64) -> u32 {
        let streak = self.active.clone();
        let stored = match self
            .records
            .set_value(self.store.as_ref(), &streak, day, value)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                (self.sink)(&StreakError::from(e));
                self.records.get(&streak, day)
            }
        };
        self.touch(&streak).await;
        stored
    }

    async fn touch(&mut self, streak: &str) {
        let now = self.clock.timestamp_ms();
        if let Err(e) = self
            .directory
            .record_activity(self.store.as_ref(), streak, now)
            .await
        {
            (self.sink)(&StreakError::from(e));
        }
    }

    /// Bump activity of the active streak if it has never been active
    async fn touch_if_new(&mut self) {
        if self.directory.last_activity(&self.active).is_none() {
            let streak = self.active.clone();
            self.touch(&streak).await;
        }
    }

    // ==================== Statistics ====================

    /// Statistics of the active streak for one month
    pub fn compute_month_stats(&self, year: i32, month: u32) -> StreakStats {
        let values = self.records.days(&self.active);
        match self.directory.streak_type(&self.active) {
            StreakType::Color => {
                StreakStats::Color(color_month_stats(values, year, month, self.today))
            }
            StreakType::Count => StreakStats::Count(count_month_stats(
                values,
                &self.directory.settings(&self.active),
                year,
                month,
                self.today,
            )),
        }
    }

    /// Statistics of the active streak over its whole history
    pub fn compute_overall_stats(&self) -> StreakStats {
        let values = self.records.days(&self.active);
        match self.directory.streak_type(&self.active) {
            StreakType::Color => StreakStats::Color(color_overall_stats(values, self.today)),
            StreakType::Count => StreakStats::Count(count_overall_stats(
                values,
                &self.directory.settings(&self.active),
                self.today,
            )),
        }
    }

    // ==================== Transfer ====================

    pub async fn export_all(&self) -> StreakResult<ExportPayload> {
        Ok(transfer::export_all(self.store.as_ref()).await?)
    }

    /// Replace everything with an import payload.
    ///
    /// The active streak is kept if it survives the import.
    pub async fn import_all(&mut self, raw: &str) -> StreakResult<ImportPlan> {
        let store = self.store.as_ref();
        let plan = transfer::import_all(store, raw).await?;

        self.directory = plan.directory.clone();
        self.records = DayRecords::load(store).await?;

        if !self.directory.contains(&self.active) {
            let records = &self.records;
            self.active = self
                .directory
                .resolve_initial(store, None, |n| records.latest_day(n))
                .await?;
        }
        Ok(plan)
    }

    // ==================== Refresh ====================

    /// Re-sample "now". Returns whether the date changed.
    pub fn refresh(&mut self) -> bool {
        let today = self.clock.today();
        let changed = today != self.today;
        if changed {
            tracing::debug!(from = %self.today, to = %today, "Date rolled over");
        }
        self.today = today;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        CountStartMode, LegacyFile, MemoryStore, SqliteStore, StorageError, Table,
        DEFAULT_STREAK_NAME,
    };
    use serde_json::json;
    use tempfile::tempdir;

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    async fn session_on(store: &Arc<MemoryStore>, clock: &Arc<FixedClock>) -> Session {
        Session::builder(store.clone())
            .clock(clock.clone())
            .setup()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_setup_creates_default_streak() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-5")));
        let session = session_on(&store, &clock).await;

        let state = session.active_state();
        assert_eq!(state.streak, DEFAULT_STREAK_NAME);
        assert_eq!(state.streak_type, StreakType::Color);
        assert_eq!(state.today, day("2024-2-5"));
        // First selection counts as activity
        assert!(session.directory().last_activity(DEFAULT_STREAK_NAME).is_some());
    }

    #[tokio::test]
    async fn test_click_cycles_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-5")));
        let mut session = session_on(&store, &clock).await;
        session.create_streak("Mood", StreakType::Color).await.unwrap();
        session.select_streak("Mood").await.unwrap();

        let d1 = day("2024-2-1");
        assert_eq!(session.click_color_day(d1).await.unwrap(), Color::Red);
        assert_eq!(session.click_color_day(d1).await.unwrap(), Color::Green);
        assert_eq!(session.click_color_day(d1).await.unwrap(), Color::Blue);

        let reloaded = session_on(&store, &clock).await;
        assert_eq!(reloaded.active(), "Mood");
        assert_eq!(reloaded.records().color("Mood", d1), Color::Blue);

        let mut session = reloaded;
        assert_eq!(session.click_color_day(d1).await.unwrap(), Color::None);
        assert!(store.get(Table::Records, "Mood::2024-2-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_fixed_date_month_stats() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;

        session.create_streak("Pushups", StreakType::Count).await.unwrap();
        session.select_streak("Pushups").await.unwrap();
        session
            .update_settings(
                "Pushups",
                StreakSettings::default().count_start(CountStartMode::FixedDate, Some(day("2024-2-3"))),
            )
            .await
            .unwrap();

        session.adjust_count_day(day("2024-2-1"), 2).await.unwrap();
        session.adjust_count_day(day("2024-2-3"), 1).await.unwrap();
        session.adjust_count_day(day("2024-2-5"), 3).await.unwrap();

        clock.set_day(day("2024-2-5"));
        assert!(session.refresh());
        assert!(!session.refresh());

        let stats = session.compute_month_stats(2024, 2);
        assert_eq!(stats.to_string(), "Total: 4 Median: 1 Mean: 1.33");
    }

    #[tokio::test]
    async fn test_count_never_negative() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;
        session.create_streak("Reps", StreakType::Count).await.unwrap();
        session.select_streak("Reps").await.unwrap();

        let d = day("2024-2-1");
        assert_eq!(session.adjust_count_day(d, 2).await.unwrap(), 2);
        assert_eq!(session.adjust_count_day(d, -5).await.unwrap(), 0);
        assert!(store.entries(Table::Records).is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;

        let err = session.adjust_count_day(day("2024-2-1"), 1).await.unwrap_err();
        assert!(matches!(err, StreakError::TypeMismatch { .. }));
        assert!(session.records().is_empty());
    }

    #[tokio::test]
    async fn test_rename_collision_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;
        session.create_streak("A", StreakType::Color).await.unwrap();
        session.create_streak("B", StreakType::Color).await.unwrap();

        session.select_streak("A").await.unwrap();
        session.click_color_day(day("2024-2-1")).await.unwrap();
        session.select_streak("B").await.unwrap();
        session.click_color_day(day("2024-2-1")).await.unwrap();
        session.click_color_day(day("2024-2-1")).await.unwrap();

        let records_before = store.entries(Table::Records);
        let names_before = session.directory().names().to_vec();

        let err = session.rename_streak("A", " B ").await.unwrap_err();
        assert!(matches!(err, StreakError::NameCollision(name) if name == "B"));

        assert_eq!(store.entries(Table::Records), records_before);
        assert_eq!(session.directory().names(), names_before.as_slice());
        assert_eq!(session.active(), "B");
        assert_eq!(session.records().color("A", day("2024-2-1")), Color::Red);
        assert_eq!(session.records().color("B", day("2024-2-1")), Color::Green);
    }

    #[tokio::test]
    async fn test_rename_moves_data_and_follows_active() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;
        session.create_streak("Run", StreakType::Count).await.unwrap();
        session.select_streak("Run").await.unwrap();
        session.set_count_day(day("2024-2-1"), 5).await.unwrap();

        let name = session.rename_streak("Run", "Jog").await.unwrap();
        assert_eq!(name, "Jog");
        assert_eq!(session.active(), "Jog");
        assert_eq!(session.active_state().streak_type, StreakType::Count);
        assert_eq!(
            session.directory().names(),
            &[DEFAULT_STREAK_NAME.to_string(), "Jog".to_string()]
        );
        assert_eq!(
            store.entries(Table::Records),
            vec![("Jog::2024-2-1".to_string(), json!(5))]
        );
    }

    #[tokio::test]
    async fn test_delete_only_streak_recreates_default() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;
        session.click_color_day(day("2024-2-1")).await.unwrap();

        session.delete_streak(DEFAULT_STREAK_NAME).await.unwrap();

        assert_eq!(session.directory().names(), &[DEFAULT_STREAK_NAME]);
        assert_eq!(session.active(), DEFAULT_STREAK_NAME);
        assert!(session.records().is_empty());
        assert!(store.entries(Table::Records).is_empty());
    }

    #[tokio::test]
    async fn test_delete_active_selects_another() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let mut session = session_on(&store, &clock).await;
        session.create_streak("Other", StreakType::Color).await.unwrap();
        session.select_streak("Other").await.unwrap();

        session.delete_streak("Other").await.unwrap();
        assert_eq!(session.active(), DEFAULT_STREAK_NAME);
        assert!(matches!(
            session.delete_streak("Other").await,
            Err(StreakError::UnknownStreak(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_entry_migrated_on_setup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, r#"{"2024-1-15": "3"}"#).unwrap();

        let store = Arc::new(MemoryStore::new());
        let session = Session::builder(store.clone())
            .legacy(Arc::new(LegacyFile::new(&path)))
            .clock(Arc::new(FixedClock::on(day("2024-2-1"))))
            .setup()
            .await
            .unwrap();

        assert_eq!(session.active(), DEFAULT_STREAK_NAME);
        assert_eq!(
            session.records().color(DEFAULT_STREAK_NAME, day("2024-1-15")),
            Color::Blue
        );
        assert_eq!(session.migration_report().legacy_moved, 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_setup_adopts_streaks_from_records() {
        let store = Arc::new(MemoryStore::new());
        store.put(Table::Records, "Read::2024-1-3", json!(2)).await.unwrap();

        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let session = session_on(&store, &clock).await;
        assert_eq!(session.directory().names(), &["Read"]);
        assert_eq!(session.active(), "Read");
        assert_eq!(
            store.get(Table::Directory, "types").await.unwrap(),
            Some(json!([["Read", "color"]]))
        );
    }

    #[tokio::test]
    async fn test_route_hint_wins() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::builder(store.clone())
            .clock(Arc::new(FixedClock::on(day("2024-2-1"))))
            .route_hint("  Sleep ")
            .setup()
            .await
            .unwrap();
        assert_eq!(session.active(), "Sleep");
    }

    #[tokio::test]
    async fn test_failed_persist_goes_to_sink() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-1")));
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();

        let mut session = Session::builder(store.clone())
            .clock(clock)
            .error_sink(Arc::new(move |e: &StreakError| {
                captured.lock().unwrap().push(e.to_string());
            }))
            .setup()
            .await
            .unwrap();

        store.set_fail_writes(true);
        let color = session.click_color_day(day("2024-2-1")).await.unwrap();
        assert_eq!(color, Color::Red);
        assert_eq!(session.records().color(DEFAULT_STREAK_NAME, day("2024-2-1")), Color::Red);

        // Record write and activity write both failed
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_setup() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);

        let err = Session::builder(store.clone()).setup().await.err().unwrap();
        assert!(matches!(
            err,
            StreakError::Storage(StorageError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_import_replaces_and_keeps_active() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-5")));
        let mut session = session_on(&store, &clock).await;
        session.click_color_day(day("2024-2-1")).await.unwrap();
        let exported = session.export_all().await.unwrap();

        let other = Arc::new(MemoryStore::new());
        let mut target = session_on(&other, &clock).await;
        target.create_streak("Gone", StreakType::Count).await.unwrap();
        target.select_streak("Gone").await.unwrap();

        target.import_all(&exported.to_json().unwrap()).await.unwrap();
        assert_eq!(target.active(), DEFAULT_STREAK_NAME);
        assert!(!target.directory().contains("Gone"));
        assert_eq!(target.records().color(DEFAULT_STREAK_NAME, day("2024-2-1")), Color::Red);
        assert_eq!(target.export_all().await.unwrap(), exported);
    }

    #[tokio::test]
    async fn test_failed_import_leaves_session_and_store_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-5")));
        let mut session = session_on(&store, &clock).await;
        session.click_color_day(day("2024-2-1")).await.unwrap();

        let directory = store.entries(Table::Directory);
        let records = store.entries(Table::Records);
        let text = json!({
            "version": 1,
            "names": ["Other"],
            "dayRecords": [["Other::2024-3-1", 1]]
        })
        .to_string();

        store.set_fail_writes(true);
        let err = session.import_all(&text).await.err().unwrap();
        assert!(matches!(
            err,
            StreakError::Storage(StorageError::TransactionFailed(_))
        ));

        assert_eq!(session.active(), DEFAULT_STREAK_NAME);
        assert!(!session.directory().contains("Other"));
        assert_eq!(session.records().color(DEFAULT_STREAK_NAME, day("2024-2-1")), Color::Red);
        assert_eq!(store.entries(Table::Directory), directory);
        assert_eq!(store.entries(Table::Records), records);
    }

    #[tokio::test]
    async fn test_corrupt_stored_values_do_not_block_setup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("streaks.db");
        let store = Arc::new(SqliteStore::open(&path).unwrap());

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                r#"
                INSERT INTO directory (key, value) VALUES ('names', '["Mood"]');
                INSERT INTO directory (key, value) VALUES ('settings', '{not json');
                INSERT INTO records (key, value) VALUES ('Mood::2024-2-1', '2');
                INSERT INTO records (key, value) VALUES ('Mood::2024-2-2', 'garbage');
                "#,
            )
            .unwrap();

        let clock = Arc::new(FixedClock::on(day("2024-2-5")));
        let session = Session::builder(store)
            .clock(clock)
            .setup()
            .await
            .unwrap();

        assert_eq!(session.active(), "Mood");
        assert_eq!(session.directory().settings("Mood"), StreakSettings::default());
        assert_eq!(session.records().color("Mood", day("2024-2-1")), Color::Green);
        assert_eq!(session.records().color("Mood", day("2024-2-2")), Color::None);
    }

    #[tokio::test]
    async fn test_days_at_the_year_bounds_survive_reload() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-5")));
        let mut session = session_on(&store, &clock).await;

        assert!(DayKey::parse("999-1-1").is_none());
        for s in ["1000-1-1", "9999-12-31"] {
            session.set_color_day(day(s), Color::Green).await.unwrap();
        }

        let reloaded = session_on(&store, &clock).await;
        for s in ["1000-1-1", "9999-12-31"] {
            assert_eq!(reloaded.records().color(DEFAULT_STREAK_NAME, day(s)), Color::Green);
        }
        assert_eq!(store.entries(Table::Records).len(), 2);
    }

    #[tokio::test]
    async fn test_overall_color_stats() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::on(day("2024-2-3")));
        let mut session = session_on(&store, &clock).await;

        session.set_color_day(day("2024-2-1"), Color::Green).await.unwrap();
        session.set_color_day(day("2024-2-2"), Color::Blue).await.unwrap();

        match session.compute_overall_stats() {
            StreakStats::Color(stats) => {
                assert_eq!(stats.elapsed_days, 3);
                assert_eq!(stats.success_run, 2);
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }
}
