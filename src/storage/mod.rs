//! Streakbook Storage Layer
//!
//! This module provides the persistence primitives everything else sits on:
//!
//! - **gateway**: The async `Store` trait and the open-once `StoreGateway`
//! - **sqlite**: Durable SQLite backend
//! - **memory**: In-process backend (tests, failure injection)
//! - **legacy**: The flat pre-streak key-value file
//! - **keys**: Composite record key codec
//! - **types**: Core value types (DayKey, StreakType, Color, StreakSettings)
//! - **error**: Error types
//!
//! # Layout
//!
//! ```text
//! records table:    "<percent-encoded streak>::<YYYY-M-D>" → positive integer
//! directory table:  "names" | "types" | "settings" | "lastUpdated" → JSON blob
//! ```

pub mod error;
pub mod gateway;
pub mod keys;
pub mod legacy;
pub mod memory;
pub mod sqlite;
pub mod types;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use gateway::{GatewayConfig, ScanStream, Store, StoreGateway, Table};
pub use keys::{date_key_to_time, decode_key, encode_key, is_bare_date_key, RecordKey};
pub use legacy::{LegacyFile, LegacyStore};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
    normalize_name, Color, CountStartMode, DayKey, StreakSettings, StreakType,
    DEFAULT_STREAK_NAME,
};
