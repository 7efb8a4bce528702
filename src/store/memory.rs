//! In-process store with the same transactional contract as the SQLite one.
//!
//! Write transactions run against a copy of the state, which replaces the shared state only
//! when the closure returns `Ok`. A failed or panicking closure leaves nothing behind.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::kill_log::{KillEntry, NewKill, UtcWindow};
use crate::participant::Participant;
use crate::ring::Assignment;
use crate::store::{RingStore, RingTx, TxMode};
use crate::telemetry::InvariantViolation;
use crate::{EngineError, EngineResult, KillId, ParticipantId};

/// The full contents of a [`MemoryStore`].
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) so tests can seed states that
/// the engine itself would never produce. It is not part of the stable public API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    participants: BTreeMap<ParticipantId, Participant>,
    targets: BTreeMap<ParticipantId, ParticipantId>,
    kills: BTreeMap<KillId, KillEntry>,
    last_issued: KillId,
}

impl MemoryState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest id ever issued, including undone ones.
    #[must_use]
    pub fn last_issued(&self) -> KillId {
        self.last_issued
    }

    fn hunter_of_target(&self, target: &ParticipantId) -> Option<&ParticipantId> {
        self.targets
            .iter()
            .find_map(|(hunter, t)| (t == target).then_some(hunter))
    }
}

fn edge_violation(invariant: &str, details: String) -> EngineError {
    InvariantViolation::new("MemoryState", invariant)
        .with_details(details)
        .into()
}

impl RingTx for MemoryState {
    fn participant(&self, id: &ParticipantId) -> EngineResult<Option<Participant>> {
        Ok(self.participants.get(id).cloned())
    }

    fn participants(&self) -> EngineResult<Vec<Participant>> {
        Ok(self.participants.values().cloned().collect())
    }

    fn put_participant(&mut self, participant: &Participant) -> EngineResult<()> {
        self.participants
            .insert(participant.id.clone(), participant.clone());
        Ok(())
    }

    fn set_secret_word(&mut self, id: &ParticipantId, word: &str) -> EngineResult<String> {
        let participant = self
            .participants
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound {
                participant: id.clone(),
            })?;
        Ok(std::mem::replace(
            &mut participant.secret_word,
            word.to_owned(),
        ))
    }

    fn target_of(&self, hunter: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        Ok(self.targets.get(hunter).cloned())
    }

    fn hunter_of(&self, target: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        Ok(self.hunter_of_target(target).cloned())
    }

    fn assignments(&self) -> EngineResult<Vec<Assignment>> {
        Ok(self
            .targets
            .iter()
            .map(|(hunter, target)| Assignment::new(hunter.clone(), target.clone()))
            .collect())
    }

    fn insert_assignment(
        &mut self,
        hunter: &ParticipantId,
        target: &ParticipantId,
    ) -> EngineResult<()> {
        if self.targets.contains_key(hunter) {
            return Err(edge_violation(
                "hunter already has an edge",
                format!("hunter={}", hunter),
            ));
        }
        if let Some(existing) = self.hunter_of_target(target) {
            return Err(edge_violation(
                "target is already hunted",
                format!("target={}, hunter={}", target, existing),
            ));
        }
        self.targets.insert(hunter.clone(), target.clone());
        Ok(())
    }

    fn retarget(&mut self, hunter: &ParticipantId, target: &ParticipantId) -> EngineResult<()> {
        if let Some(existing) = self.hunter_of_target(target) {
            if existing != hunter {
                return Err(edge_violation(
                    "target is already hunted",
                    format!("target={}, hunter={}", target, existing),
                ));
            }
        }
        match self.targets.get_mut(hunter) {
            Some(slot) => {
                *slot = target.clone();
                Ok(())
            }
            None => Err(edge_violation(
                "retargeted hunter has no edge",
                format!("hunter={}", hunter),
            )),
        }
    }

    fn remove_assignment(&mut self, hunter: &ParticipantId) -> EngineResult<()> {
        self.targets.remove(hunter).map(|_| ()).ok_or_else(|| {
            edge_violation("removed hunter has no edge", format!("hunter={}", hunter))
        })
    }

    fn replace_assignments(&mut self, assignments: &[Assignment]) -> EngineResult<()> {
        self.targets.clear();
        for Assignment { hunter, target } in assignments {
            self.insert_assignment(hunter, target)?;
        }
        Ok(())
    }

    fn append_kill(&mut self, kill: NewKill) -> EngineResult<KillId> {
        let id = self.last_issued.next();
        self.kills.insert(id, KillEntry::from_new(id, kill));
        self.last_issued = id;
        Ok(id)
    }

    fn last_kill(&self) -> EngineResult<Option<KillEntry>> {
        Ok(self.kills.values().next_back().cloned())
    }

    fn delete_kill(&mut self, id: KillId) -> EngineResult<()> {
        self.kills.remove(&id).map(|_| ()).ok_or_else(|| {
            InvariantViolation::new("MemoryState", "deleted kill-log entry does not exist")
                .with_details(format!("kill_id={}", id))
                .into()
        })
    }

    fn kills(&self, window: Option<&UtcWindow>) -> EngineResult<Vec<KillEntry>> {
        Ok(self
            .kills
            .values()
            .filter(|kill| window.map_or(true, |w| w.contains(kill.at)))
            .cloned()
            .collect())
    }

    fn is_eliminated(&self, id: &ParticipantId) -> EngineResult<bool> {
        Ok(self.kills.values().any(|kill| &kill.eliminated == id))
    }

    fn clear_all(&mut self) -> EngineResult<()> {
        self.participants.clear();
        self.targets.clear();
        self.kills.clear();
        Ok(())
    }
}

/// Read-only view handed to [`TxMode::Read`] transactions.
struct Snapshot<'a>(&'a MemoryState);

fn read_only() -> EngineError {
    EngineError::Storage {
        context: "write attempted in a read-only transaction".to_owned(),
    }
}

impl RingTx for Snapshot<'_> {
    fn participant(&self, id: &ParticipantId) -> EngineResult<Option<Participant>> {
        self.0.participant(id)
    }

    fn participants(&self) -> EngineResult<Vec<Participant>> {
        self.0.participants()
    }

    fn put_participant(&mut self, _participant: &Participant) -> EngineResult<()> {
        Err(read_only())
    }

    fn set_secret_word(&mut self, _id: &ParticipantId, _word: &str) -> EngineResult<String> {
        Err(read_only())
    }

    fn target_of(&self, hunter: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        self.0.target_of(hunter)
    }

    fn hunter_of(&self, target: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        self.0.hunter_of(target)
    }

    fn assignments(&self) -> EngineResult<Vec<Assignment>> {
        self.0.assignments()
    }

    fn insert_assignment(
        &mut self,
        _hunter: &ParticipantId,
        _target: &ParticipantId,
    ) -> EngineResult<()> {
        Err(read_only())
    }

    fn retarget(&mut self, _hunter: &ParticipantId, _target: &ParticipantId) -> EngineResult<()> {
        Err(read_only())
    }

    fn remove_assignment(&mut self, _hunter: &ParticipantId) -> EngineResult<()> {
        Err(read_only())
    }

    fn replace_assignments(&mut self, _assignments: &[Assignment]) -> EngineResult<()> {
        Err(read_only())
    }

    fn append_kill(&mut self, _kill: NewKill) -> EngineResult<KillId> {
        Err(read_only())
    }

    fn last_kill(&self) -> EngineResult<Option<KillEntry>> {
        self.0.last_kill()
    }

    fn delete_kill(&mut self, _id: KillId) -> EngineResult<()> {
        Err(read_only())
    }

    fn kills(&self, window: Option<&UtcWindow>) -> EngineResult<Vec<KillEntry>> {
        self.0.kills(window)
    }

    fn is_eliminated(&self, id: &ParticipantId) -> EngineResult<bool> {
        self.0.is_eliminated(id)
    }

    fn clear_all(&mut self) -> EngineResult<()> {
        Err(read_only())
    }
}

/// A [`RingStore`] that lives in process memory.
///
/// Writers (standard and exclusive alike) take turns on a writer mutex and work on a private
/// copy; the shared state is write-locked only to swap a committed copy in. Readers therefore
/// see the last committed state and never wait for an open write transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    writer: Mutex<()>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `state`.
    #[must_use]
    pub fn from_state(state: MemoryState) -> Self {
        Self {
            state: RwLock::new(state),
            writer: Mutex::new(()),
        }
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> MemoryState {
        self.state.read().clone()
    }
}

fn lock_timeout(mode: TxMode, timeout: Duration) -> EngineError {
    EngineError::Contention {
        context: format!(
            "memory store {} lock not acquired within {:?}",
            mode, timeout
        ),
    }
}

impl RingStore for MemoryStore {
    fn transaction<R, F>(&self, mode: TxMode, timeout: Duration, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut dyn RingTx) -> EngineResult<R>,
    {
        if !mode.is_write() {
            let guard = self
                .state
                .try_read_for(timeout)
                .ok_or_else(|| lock_timeout(mode, timeout))?;
            return f(&mut Snapshot(&guard));
        }

        let _writer = self
            .writer
            .try_lock_for(timeout)
            .ok_or_else(|| lock_timeout(mode, timeout))?;
        let mut working = self
            .state
            .try_read_for(timeout)
            .ok_or_else(|| lock_timeout(mode, timeout))?
            .clone();
        let result = f(&mut working)?;
        *self
            .state
            .try_write_for(timeout)
            .ok_or_else(|| lock_timeout(mode, timeout))? = working;
        Ok(result)
    }
}
