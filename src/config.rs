//! Configuration types for the ring engine and its SQLite store.
//!
//! # Overview
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `EngineConfig` | Game mode, lock waits, reference timezone | `classic()`, `free_for_all()`, `strict()`, `testing()` |
//! | `StoreConfig` | SQLite file, busy timeout, journal mode | `new(path)`, `in_dir(dir)` |
//! | `GameMode` | Who a secret word may eliminate | `Classic`, `FreeForAll` |
//!
//! # Example
//!
//! ```
//! use sockwars_ring::{EngineBuilder, EngineConfig, MemoryStore};
//! use std::time::Duration;
//!
//! # fn main() -> sockwars_ring::EngineResult<()> {
//! let engine = EngineBuilder::new()
//!     .with_config(EngineConfig {
//!         utc_offset_seconds: -8 * 3600,
//!         exclusive_timeout: Duration::from_secs(10),
//!         ..EngineConfig::classic()
//!     })
//!     .build(MemoryStore::new())?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::{EngineError, EngineResult};

/// The largest reference offset chrono accepts, exclusive (one day).
const MAX_OFFSET_SECONDS: i32 = 86_400;

/// Which participant a presented secret word may eliminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// The word must belong to the caller's assigned target.
    #[default]
    Classic,
    /// The word may belong to any other active participant. The kill is recorded against the
    /// victim's ring predecessor, who inherits the victim's target.
    FreeForAll,
}

/// Engine-level configuration.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Construct instances with the
/// `..EngineConfig::default()` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[must_use = "EngineConfig has no effect unless passed to EngineBuilder::with_config()"]
pub struct EngineConfig {
    /// Which participant a secret word may eliminate.
    ///
    /// Default: [`GameMode::Classic`]
    pub mode: GameMode,

    /// Longest wait for the lock of a standard write transaction (eliminate, import, reset).
    /// Past it the operation fails with a retryable `Contention` error.
    ///
    /// Default: 5s
    pub write_timeout: Duration,

    /// Longest wait for the exclusive lock taken by undo and rollback.
    ///
    /// Default: 30s
    pub exclusive_timeout: Duration,

    /// Offset from UTC, in seconds, of the timezone in which kill-log calendar dates are
    /// evaluated. Positive is east of Greenwich.
    ///
    /// Default: 0 (UTC)
    pub utc_offset_seconds: i32,

    /// Load and verify the whole ring against the kill log before every mutation. When off,
    /// only the edges a mutation touches are checked.
    ///
    /// Default: true
    pub verify_ring_on_write: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Classic,
            write_timeout: Duration::from_secs(5),
            exclusive_timeout: Duration::from_secs(30),
            utc_offset_seconds: 0,
            verify_ring_on_write: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new `EngineConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard game: words must match the assigned target.
    pub fn classic() -> Self {
        Self::default()
    }

    /// Any active participant's word eliminates them.
    pub fn free_for_all() -> Self {
        Self {
            mode: GameMode::FreeForAll,
            ..Self::default()
        }
    }

    /// Short lock waits and full verification, for a busy game where a stuck caller is worse
    /// than a retry.
    pub fn strict() -> Self {
        Self {
            write_timeout: Duration::from_secs(1),
            exclusive_timeout: Duration::from_secs(5),
            verify_ring_on_write: true,
            ..Self::default()
        }
    }

    /// Millisecond lock waits so contention tests finish quickly.
    pub fn testing() -> Self {
        Self {
            write_timeout: Duration::from_millis(50),
            exclusive_timeout: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// The reference timezone as a chrono offset.
    ///
    /// Only fails for configurations that [`validate`](Self::validate) rejects.
    pub fn reference_offset(&self) -> EngineResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            EngineError::invalid(format!(
                "utc_offset_seconds must be within +/-{}, got {}",
                MAX_OFFSET_SECONDS - 1,
                self.utc_offset_seconds
            ))
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] if a timeout is zero or the offset is a day or
    /// more away from UTC.
    pub fn validate(&self) -> EngineResult<()> {
        if self.write_timeout.is_zero() {
            return Err(EngineError::invalid("write_timeout must be greater than zero"));
        }
        if self.exclusive_timeout.is_zero() {
            return Err(EngineError::invalid(
                "exclusive_timeout must be greater than zero",
            ));
        }
        self.reference_offset().map(|_| ())
    }
}

/// Configuration for [`SqliteStore`](crate::SqliteStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "StoreConfig has no effect unless passed to SqliteStore::open()"]
pub struct StoreConfig {
    /// The database file. Created, with its schema, if missing.
    pub path: PathBuf,

    /// Lock wait while [`SqliteStore::open`](crate::SqliteStore::open) sets the journal mode
    /// and creates the schema. Transactions, reads included, wait for the engine's
    /// [`EngineConfig::write_timeout`] or [`EngineConfig::exclusive_timeout`] instead.
    ///
    /// Default: 5s
    pub busy_timeout: Duration,

    /// Use the write-ahead log so readers are not blocked by a writer.
    ///
    /// Default: true
    pub wal: bool,
}

impl StoreConfig {
    /// Configuration for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
            wal: true,
        }
    }

    /// Configuration for `sockwars.db` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("sockwars.db"))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(EngineError::invalid("database path must not be empty"));
        }
        if self.is_in_memory() {
            return Err(EngineError::invalid(format!(
                "{} is an in-memory database; every transaction opens its own connection, so use \
                 a file or MemoryStore",
                self.path.display()
            )));
        }
        if self.busy_timeout.is_zero() {
            return Err(EngineError::invalid("busy_timeout must be greater than zero"));
        }
        Ok(())
    }

    /// `:memory:`, an empty `file:` URI, or a URI with `mode=memory`.
    fn is_in_memory(&self) -> bool {
        let raw = self.path.to_string_lossy();
        let raw = raw.trim();
        if raw == ":memory:" {
            return true;
        }
        match raw.strip_prefix("file:") {
            Some(uri) => {
                let (name, query) = uri.split_once('?').unwrap_or((uri, ""));
                name.is_empty()
                    || name == ":memory:"
                    || query.split('&').any(|param| param == "mode=memory")
            }
            None => false,
        }
    }
}
