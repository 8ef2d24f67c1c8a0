//! Crate-level error types
//!
//! Every error here is recoverable at the call site. Storage failures keep
//! their own taxonomy in [`crate::storage::StorageError`]; the variants
//! added here are user-facing rejections that never change state.

use crate::storage::{StorageError, StreakType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreakError {
    /// Storage gateway failure (unavailable store or failed transaction)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Rename target already names a different streak
    #[error("A streak named \"{0}\" already exists")]
    NameCollision(String),

    /// Operation on a streak that is not in the directory
    #[error("Unknown streak: {0}")]
    UnknownStreak(String),

    /// Day mutation that does not match the streak's type
    #[error("Streak \"{name}\" is a {actual} streak, not {expected}")]
    TypeMismatch {
        name: String,
        expected: StreakType,
        actual: StreakType,
    },

    /// Import payload is unparseable or has an unsupported version
    #[error("Invalid import payload: {0}")]
    InvalidImportPayload(String),
}

/// Result type alias for streak operations
pub type StreakResult<T> = Result<T, StreakError>;
