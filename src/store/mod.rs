//! The storage seam.
//!
//! A [`RingStore`] hands out scoped transactions. Each transaction is a [`RingTx`] view over the
//! participant table, the assignment edges and the kill log. The closure passed to
//! [`RingStore::transaction`] either returns `Ok` and everything it wrote commits together, or
//! returns `Err` and nothing it wrote is kept. Lock waits are bounded by the timeout passed in;
//! when it elapses the store returns [`EngineError::Contention`](crate::EngineError::Contention).
//!
//! Stores only enforce what a schema can: one edge per hunter, one hunter per target, monotonic
//! kill ids. The single-cycle property is the engine's job.

use std::time::Duration;

use crate::kill_log::{KillEntry, NewKill, UtcWindow};
use crate::participant::Participant;
use crate::ring::Assignment;
use crate::{EngineResult, KillId, ParticipantId};

pub mod memory;
pub mod sqlite;

/// Isolation requested for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxMode {
    /// A consistent snapshot; writes are refused.
    Read,
    /// Standard write isolation. Concurrent writers are serialized.
    Write,
    /// Serialized against every other writer for the whole transaction, including the initial
    /// reads. Undo and rollback read the log tail and then write based on it.
    Exclusive,
}

impl TxMode {
    /// Returns `true` if the transaction may write.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl std::fmt::Display for TxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Operations available inside one transaction.
pub trait RingTx {
    /// The roster record for `id`.
    fn participant(&self, id: &ParticipantId) -> EngineResult<Option<Participant>>;

    /// Every roster record, ordered by id.
    fn participants(&self) -> EngineResult<Vec<Participant>>;

    /// Inserts or replaces a roster record.
    fn put_participant(&mut self, participant: &Participant) -> EngineResult<()>;

    /// Replaces a participant's secret word, returning the previous one.
    ///
    /// Returns [`EngineError::NotFound`](crate::EngineError::NotFound) for an unknown id.
    fn set_secret_word(&mut self, id: &ParticipantId, word: &str) -> EngineResult<String>;

    /// Who `hunter` is hunting.
    fn target_of(&self, hunter: &ParticipantId) -> EngineResult<Option<ParticipantId>>;

    /// Who is hunting `target`.
    fn hunter_of(&self, target: &ParticipantId) -> EngineResult<Option<ParticipantId>>;

    /// Every edge, ordered by hunter.
    fn assignments(&self) -> EngineResult<Vec<Assignment>>;

    /// Adds a new edge. Fails if `hunter` already has one or `target` is already hunted.
    fn insert_assignment(
        &mut self,
        hunter: &ParticipantId,
        target: &ParticipantId,
    ) -> EngineResult<()>;

    /// Re-points an existing edge. Fails if `hunter` has no edge or `target` is hunted by
    /// someone else.
    fn retarget(&mut self, hunter: &ParticipantId, target: &ParticipantId) -> EngineResult<()>;

    /// Deletes `hunter`'s edge. Fails if there is none.
    fn remove_assignment(&mut self, hunter: &ParticipantId) -> EngineResult<()>;

    /// Replaces the whole edge set.
    fn replace_assignments(&mut self, assignments: &[Assignment]) -> EngineResult<()>;

    /// Appends an entry, returning its freshly issued id.
    fn append_kill(&mut self, kill: NewKill) -> EngineResult<KillId>;

    /// The surviving entry with the highest id.
    fn last_kill(&self) -> EngineResult<Option<KillEntry>>;

    /// Deletes an entry. Its id is never issued again.
    fn delete_kill(&mut self, id: KillId) -> EngineResult<()>;

    /// Surviving entries in id order, optionally restricted to a time window.
    fn kills(&self, window: Option<&UtcWindow>) -> EngineResult<Vec<KillEntry>>;

    /// Returns `true` if a surviving entry eliminated `id`.
    fn is_eliminated(&self, id: &ParticipantId) -> EngineResult<bool>;

    /// Deletes participants, edges and entries. The kill-id counter is kept.
    fn clear_all(&mut self) -> EngineResult<()>;
}

/// A backing store for one game.
pub trait RingStore: Send + Sync {
    /// Runs `f` inside one transaction.
    ///
    /// Commits if `f` returns `Ok`; otherwise every write `f` made is discarded and its error is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::Contention`](crate::EngineError::Contention) if the lock for `mode` is not
    /// acquired within `timeout`, [`EngineError::Storage`](crate::EngineError::Storage) if the
    /// backend fails, or whatever `f` returned.
    fn transaction<R, F>(&self, mode: TxMode, timeout: Duration, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut dyn RingTx) -> EngineResult<R>;
}

impl<S: RingStore> RingStore for std::sync::Arc<S> {
    fn transaction<R, F>(&self, mode: TxMode, timeout: Duration, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut dyn RingTx) -> EngineResult<R>,
    {
        (**self).transaction(mode, timeout, f)
    }
}
