//! # Streakbook
//!
//! Local-first data and analytics layer for a personal habit tracker.
//! Every streak is a named, typed sequence of day values: a color
//! (None/Red/Green/Blue) or a non-negative count.
//!
//! ## Features
//!
//! - **Versioned local store**: SQLite-backed tables for day records and
//!   directory metadata, opened once per process
//! - **Forward migration**: legacy flat entries and unscoped keys are moved
//!   under the default streak at every start, idempotently
//! - **Streak directory**: create, rename (never merges), delete, and pick
//!   the most recently active streak
//! - **Statistics**: color runs and count total/median/mean over gap-filled
//!   day ranges
//! - **Transfer**: versioned JSON export/import and CSV export
//!
//! ## Modules
//!
//! - [`storage`]: store gateway, key codec, value types
//! - [`migration`]: legacy data migration
//! - [`directory`]: streak names, types, settings, activity
//! - [`records`]: in-memory day values backed by the store
//! - [`stats`]: statistics engine
//! - [`transfer`]: export/import codec
//! - [`session`]: the object a UI or CLI drives
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streakbook::storage::{DayKey, GatewayConfig, StoreGateway, StreakType};
//! use streakbook::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = StoreGateway::new(GatewayConfig::new("streakbook.db"));
//!     let store = gateway.open().await?;
//!
//!     let mut session = Session::builder(store).setup().await?;
//!
//!     session.create_streak("Pushups", StreakType::Count).await?;
//!     session.select_streak("Pushups").await?;
//!     session.adjust_count_day(DayKey::today(), 20).await?;
//!
//!     let today = session.today();
//!     println!("{}", session.compute_month_stats(today.year(), today.month()));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod migration;
pub mod records;
pub mod session;
pub mod stats;
pub mod storage;
pub mod transfer;

pub use config::{Config, ConfigError};
pub use directory::Directory;
pub use error::{StreakError, StreakResult};
pub use migration::{MigrationEngine, MigrationReport};
pub use records::{adjust_count, cycle_color, DayRecords};
pub use session::{ActiveState, Clock, ErrorSink, FixedClock, Session, SessionBuilder, SystemClock};
pub use stats::{ColorStats, ColorTally, CountStats, StreakStats};
pub use transfer::{ExportPayload, ImportPlan, EXPORT_VERSION};

pub use storage::{
    Color, CountStartMode, DayKey, StorageError, StorageResult, Store, StoreGateway,
    StreakSettings, StreakType,
};
