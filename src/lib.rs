//! # Sockwars Ring
//!
//! The ring & audit engine behind an elimination ("assassin") game. Every active participant is
//! secretly assigned exactly one other active participant as their target; presenting that
//! target's secret word eliminates them and the hunter inherits the target's target.
//!
//! The engine keeps two pieces of durable state in lock-step:
//!
//! - the **assignment ring**, one `hunter -> target` edge per active participant, always forming
//!   a single cycle over the active set (a self-loop once one survivor remains), and
//! - the **kill log**, an append-only, strictly ordered record of eliminations whose ids are never
//!   reused, so that [`RingEngine::undo_last`] and [`RingEngine::rollback_to`] can replay it
//!   backwards exactly.
//!
//! Storage sits behind the [`RingStore`] seam: [`SqliteStore`] for a persisted game,
//! [`MemoryStore`] for tests and embedding. Every mutation runs in one all-or-nothing transaction
//! with a bounded lock wait.
//!
//! ```
//! use sockwars_ring::prelude::*;
//!
//! # fn main() -> EngineResult<()> {
//! let engine = EngineBuilder::new().build(MemoryStore::new())?;
//! engine.import_roster(&[
//!     RosterRow::new("a", "Ada", "red", "b", "wa"),
//!     RosterRow::new("b", "Bo", "red", "c", "wb"),
//!     RosterRow::new("c", "Cy", "blue", "a", "wc"),
//! ])?;
//!
//! let kill = engine.eliminate(&ParticipantId::new("a"), "WB ")?;
//! assert_eq!(kill.next_target, ParticipantId::new("c"));
//!
//! let undone = engine.undo_last()?;
//! assert_eq!(undone.id, kill.kill_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use config::{EngineConfig, GameMode, StoreConfig};
pub use engine::{EngineBuilder, Elimination, RingEngine};
pub use error::EngineError;
pub use kill_log::{DateRange, KillCause, KillEntry, KillSummary};
pub use participant::{Participant, ParticipantStatus, RosterRow, TargetInfo};
pub use ring::{Assignment, Ring, Shortcut, Splice};
pub use store::memory::MemoryStore;
pub use store::sqlite::SqliteStore;
pub use store::{RingStore, RingTx, TxMode};

pub mod config;
pub mod engine;
#[doc(hidden)]
pub mod error;
pub mod kill_log;
pub mod participant;
pub mod prelude;
pub mod ring;
pub mod store;
pub mod telemetry;

/// Internal module exposing implementation details for property tests and benches.
///
/// **This module is NOT part of the public API.** Nothing here is covered by semver.
#[doc(hidden)]
pub mod __internal {
    pub use crate::kill_log::UtcWindow;
    pub use crate::participant::words_match;
    pub use crate::store::memory::MemoryState;
}

/// Convenience alias used by every engine operation.
pub type EngineResult<T> = Result<T, EngineError>;

// #############
// #   TYPES   #
// #############

/// A participant's unique, stable identity (for example a chat handle).
///
/// Identities are compared exactly after trimming surrounding whitespace, which happens once on
/// construction and again when deserializing.
///
/// # Examples
///
/// ```
/// use sockwars_ring::ParticipantId;
///
/// let id = ParticipantId::new("  sock_master ");
/// assert_eq!(id.as_str(), "sock_master");
/// assert!(!id.is_blank());
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a new `ParticipantId`, trimming surrounding whitespace.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        ParticipantId(id.as_ref().trim().to_owned())
    }

    /// Returns the identity as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identity is empty after trimming.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        ParticipantId::new(value)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        ParticipantId::new(value)
    }
}

impl From<ParticipantId> for String {
    fn from(value: ParticipantId) -> Self {
        value.0
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a kill-log entry.
///
/// Ids are assigned at insertion from a counter that is never decremented, so a newly appended
/// entry always has a larger id than every surviving entry, and an undone id is never reissued.
/// Real ids start at 1; [`KillId::ORIGIN`] (0) sorts before all of them and is the natural
/// argument for "roll back everything".
///
/// # Examples
///
/// ```
/// use sockwars_ring::KillId;
///
/// let first = KillId::new(1);
/// assert!(first > KillId::ORIGIN);
/// assert!(first.is_assigned());
/// assert!(!KillId::ORIGIN.is_assigned());
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct KillId(i64);

impl KillId {
    /// The position before the first kill. Rolling back to it empties the log.
    pub const ORIGIN: KillId = KillId(0);

    /// Creates a new `KillId` from a raw row id.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        KillId(id)
    }

    /// Returns the underlying row id.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns `true` if this id could have been assigned to a real entry (ids start at 1).
    #[inline]
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 > 0
    }

    /// The id that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> KillId {
        KillId(self.0 + 1)
    }
}

impl std::fmt::Display for KillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for KillId {
    #[inline]
    fn from(value: i64) -> Self {
        KillId(value)
    }
}

impl From<KillId> for i64 {
    #[inline]
    fn from(id: KillId) -> Self {
        id.0
    }
}

// ###################
// # UNIT TESTS      #
// ###################
