//! The ring engine: eliminations, undo, rollback and the read accessors.
//!
//! Every operation is one store transaction. Mutations validate first and write second, and the
//! ring rewiring always goes through a [`Shortcut`] or [`Splice`] so the removal and the
//! reconnection land together with the kill-log change.
//!
//! Failures are returned as [`EngineError`]s. Before returning, the engine routes the ones an
//! operator must see (invariant violations, lock contention, storage faults) to its
//! [`ViolationObserver`]; ordinary refusals such as a wrong word are only logged at `debug`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{EngineConfig, GameMode};
use crate::kill_log::{self, DateRange, KillCause, KillEntry, KillSummary, NewKill, UtcWindow};
use crate::participant::{Participant, ParticipantStatus, RosterRow, TargetInfo};
use crate::ring::{Assignment, Ring, Shortcut, Splice};
use crate::store::{RingStore, RingTx, TxMode};
use crate::telemetry::{
    InvariantChecker, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{report_violation_to, EngineError, EngineResult, KillId, ParticipantId};

/// The outcome of a successful elimination or disqualification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Elimination {
    /// Id of the appended kill-log entry.
    pub kill_id: KillId,
    /// Hunter of record: the victim's ring predecessor, who inherits `next_target`.
    pub hunter: ParticipantId,
    /// The participant removed from the ring.
    pub eliminated: ParticipantId,
    /// `hunter`'s new target. Equal to `hunter` when they are the last one standing.
    pub next_target: ParticipantId,
    /// Who presented the secret word. Differs from `hunter` only in free-for-all games and is
    /// `None` for disqualifications.
    pub claimed_by: Option<ParticipantId>,
    /// Elimination or disqualification.
    pub cause: KillCause,
}

impl Elimination {
    /// Returns `true` if this removal left a single survivor.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.hunter == self.next_target
    }
}

/// Builds a [`RingEngine`] over a store.
///
/// ```
/// use sockwars_ring::prelude::*;
/// use sockwars_ring::telemetry::CollectingObserver;
/// use std::sync::Arc;
///
/// # fn main() -> EngineResult<()> {
/// let observer = Arc::new(CollectingObserver::new());
/// let engine = EngineBuilder::new()
///     .with_config(EngineConfig::free_for_all())
///     .with_violation_observer(observer.clone())
///     .build(MemoryStore::new())?;
/// assert_eq!(engine.config().mode, GameMode::FreeForAll);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
#[must_use = "EngineBuilder does nothing until build() is called"]
pub struct EngineBuilder {
    config: EngineConfig,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("has_violation_observer", &self.violation_observer.is_some())
            .finish()
    }
}

impl EngineBuilder {
    /// A builder with [`EngineConfig::default`] and the tracing observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets only the game mode.
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Routes violations to `observer` instead of the tracing log.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Validates the configuration and wraps `store`. The store is not touched.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] if the configuration is invalid.
    pub fn build<S: RingStore>(self, store: S) -> EngineResult<RingEngine<S>> {
        let offset = match self.config.validate().and_then(|()| self.config.reference_offset()) {
            Ok(offset) => offset,
            Err(err) => {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Configuration,
                    "rejected engine configuration: {}",
                    err
                );
                return Err(err);
            }
        };
        Ok(RingEngine {
            store,
            config: self.config,
            offset,
            violation_observer: self.violation_observer,
        })
    }
}

/// The ring and audit engine for one game.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self` and serializes through the
/// store's transactions.
pub struct RingEngine<S> {
    store: S,
    config: EngineConfig,
    offset: FixedOffset,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<S> std::fmt::Debug for RingEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingEngine")
            .field("config", &self.config)
            .field("has_violation_observer", &self.violation_observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: RingStore> RingEngine<S> {
    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configured violation observer, if any.
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    // ###################
    // # MUTATIONS       #
    // ###################

    /// Eliminates a participant on behalf of `caller`, who presents `claimed_word`.
    ///
    /// In [`GameMode::Classic`] the word must be the secret word of `caller`'s current target.
    /// In [`GameMode::FreeForAll`] it may be the word of any other active participant; the kill
    /// is then recorded against the victim's ring predecessor.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if `caller` is not in the roster
    /// - [`EngineError::NoTarget`] if `caller` was eliminated or has already won
    /// - [`EngineError::WordMismatch`] if the word matches nobody eligible; nothing is changed
    /// - [`EngineError::InvalidRequest`] in free-for-all, if the word is the caller's own or is
    ///   shared by several active participants
    /// - [`EngineError::InvariantViolation`], [`EngineError::Contention`],
    ///   [`EngineError::Storage`]
    pub fn eliminate(
        &self,
        caller: &ParticipantId,
        claimed_word: &str,
    ) -> EngineResult<Elimination> {
        self.eliminate_at(caller, claimed_word, Utc::now())
    }

    /// [`eliminate`](Self::eliminate) with an explicit timestamp for the log entry.
    pub fn eliminate_at(
        &self,
        caller: &ParticipantId,
        claimed_word: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<Elimination> {
        let result = self.write(TxMode::Write, |tx| {
            let shortcut = match self.config.mode {
                GameMode::Classic => self.plan_classic(tx, caller, claimed_word)?,
                GameMode::FreeForAll => self.plan_free_for_all(tx, caller, claimed_word)?,
            };
            self.remove(tx, shortcut, KillCause::Elimination, Some(caller.clone()), at)
        });
        if let Ok(kill) = &result {
            info!(
                kill_id = %kill.kill_id,
                hunter = %kill.hunter,
                eliminated = %kill.eliminated,
                next_target = %kill.next_target,
                claimed_by = %caller,
                "participant eliminated"
            );
        }
        self.observe("eliminate", result)
    }

    /// Removes `participant` from the ring without a secret word.
    ///
    /// The entry is attributed to the participant's ring predecessor so that
    /// [`undo_last`](Self::undo_last) restores them exactly; it never counts as a kill.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown participant, [`EngineError::NoTarget`] if they
    /// are already out, [`EngineError::InvalidRequest`] if they are the sole survivor.
    pub fn disqualify(&self, participant: &ParticipantId) -> EngineResult<Elimination> {
        self.disqualify_at(participant, Utc::now())
    }

    /// [`disqualify`](Self::disqualify) with an explicit timestamp for the log entry.
    pub fn disqualify_at(
        &self,
        participant: &ParticipantId,
        at: DateTime<Utc>,
    ) -> EngineResult<Elimination> {
        let result = self.write(TxMode::Write, |tx| {
            require_participant(tx, participant)?;
            match tx.target_of(participant)? {
                None => {
                    return Err(EngineError::NoTarget {
                        participant: participant.clone(),
                    })
                }
                Some(target) if &target == participant => {
                    return Err(EngineError::invalid(format!(
                        "{} is the sole survivor and cannot be disqualified",
                        participant
                    )))
                }
                Some(_) => {}
            }
            let shortcut = self.plan_removal(tx, participant)?;
            self.remove(tx, shortcut, KillCause::Disqualification, None, at)
        });
        if let Ok(kill) = &result {
            info!(
                kill_id = %kill.kill_id,
                hunter = %kill.hunter,
                eliminated = %kill.eliminated,
                "participant disqualified"
            );
        }
        self.observe("disqualify", result)
    }

    /// Undoes the most recent surviving kill-log entry, splicing its victim back in between
    /// the hunter of record and the hunter's current target.
    ///
    /// Runs under the exclusive lock. Returns the deleted entry.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyHistory`] if the log is empty; [`EngineError::InvariantViolation`] if
    /// the tail entry cannot be inverted against the current ring.
    pub fn undo_last(&self) -> EngineResult<KillEntry> {
        let result = self.write(TxMode::Exclusive, |tx| self.undo_step(tx));
        if let Ok(entry) = &result {
            info!(
                kill_id = %entry.id,
                hunter = %entry.hunter,
                eliminated = %entry.eliminated,
                "kill undone"
            );
        }
        self.observe("undo_last", result)
    }

    /// Undoes entries while the tail id is greater than `target`. Returns how many were
    /// undone; 0 when the tail is already at or before `target`, or the log is empty.
    ///
    /// All steps share one exclusive transaction and each re-validates the ring first. If any
    /// step fails the whole rollback is abandoned and nothing is undone.
    pub fn rollback_to(&self, target: KillId) -> EngineResult<usize> {
        let result = self.write(TxMode::Exclusive, |tx| {
            let mut undone = 0;
            while let Some(tail) = tx.last_kill()? {
                if tail.id <= target {
                    break;
                }
                let entry = self.undo_step(tx)?;
                debug!(kill_id = %entry.id, "rollback step");
                undone += 1;
            }
            Ok(undone)
        });
        if let Ok(undone) = result {
            info!(to = %target, undone, "rolled back kill log");
        }
        self.observe("rollback_to", result)
    }

    /// Seeds the roster and the initial ring.
    ///
    /// Every row's target must be another row (or the row itself for a one-person game) and
    /// the edges must form one cycle over all rows. The previous roster is replaced. Refused
    /// while the kill log has entries. Returns the number of participants imported.
    pub fn import_roster(&self, rows: &[RosterRow]) -> EngineResult<usize> {
        let rows: Vec<RosterRow> = rows.iter().map(RosterRow::normalized).collect();
        let result = validate_roster(&rows).and_then(|assignments| {
            self.write(TxMode::Write, |tx| {
                if let Some(tail) = tx.last_kill()? {
                    return Err(EngineError::invalid(format!(
                        "cannot import a roster while the kill log has entries (tail is {})",
                        tail.id
                    )));
                }
                tx.clear_all()?;
                for row in &rows {
                    tx.put_participant(&row.participant)?;
                }
                tx.replace_assignments(&assignments)?;
                Ok(rows.len())
            })
        });
        if let Ok(count) = result {
            info!(participants = count, "roster imported");
        }
        self.observe("import_roster", result)
    }

    /// Replaces a participant's secret word, returning the previous one.
    pub fn reset_secret_word(
        &self,
        participant: &ParticipantId,
        new_word: &str,
    ) -> EngineResult<String> {
        let new_word = new_word.trim();
        let result = if new_word.is_empty() {
            Err(EngineError::invalid("secret word must not be blank"))
        } else {
            self.write(TxMode::Write, |tx| tx.set_secret_word(participant, new_word))
        };
        if result.is_ok() {
            info!(participant = %participant, "secret word reset");
        }
        self.observe("reset_secret_word", result)
    }

    /// Deletes every participant, edge and kill-log entry. Kill ids keep counting up from where
    /// they were.
    pub fn clear_all(&self) -> EngineResult<()> {
        let result = self.write(TxMode::Exclusive, |tx| tx.clear_all());
        if result.is_ok() {
            info!("all game data cleared");
        }
        self.observe("clear_all", result)
    }

    // ###################
    // # READ ACCESSORS  #
    // ###################

    /// The roster record for `participant`.
    pub fn participant(&self, participant: &ParticipantId) -> EngineResult<Participant> {
        self.read("participant", |tx| require_participant(tx, participant))
    }

    /// `hunter`'s current target; `None` if they are out of the ring.
    pub fn target_of(&self, hunter: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        self.read("target_of", |tx| {
            require_participant(tx, hunter)?;
            tx.target_of(hunter)
        })
    }

    /// `hunter`'s current target with the target's roster record.
    pub fn target_info(&self, hunter: &ParticipantId) -> EngineResult<Option<TargetInfo>> {
        self.read("target_info", |tx| {
            require_participant(tx, hunter)?;
            let Some(target) = tx.target_of(hunter)? else {
                return Ok(None);
            };
            let record = tx.participant(&target)?.ok_or_else(|| {
                EngineError::from(
                    InvariantViolation::new("Roster", "target is not in the roster")
                        .with_details(format!("hunter={}, target={}", hunter, target)),
                )
            })?;
            Ok(Some(TargetInfo {
                hunter: hunter.clone(),
                target: record,
            }))
        })
    }

    /// Every current edge, ordered by hunter.
    pub fn assignments(&self) -> EngineResult<Vec<Assignment>> {
        self.read("assignments", |tx| tx.assignments())
    }

    /// The current ring as a graph. Only edge uniqueness is checked; see
    /// [`verify`](Self::verify) for the full check.
    pub fn ring(&self) -> EngineResult<Ring> {
        self.read("ring", |tx| Ok(Ring::from_assignments(tx.assignments()?)?))
    }

    /// Checks the ring is a single cycle over exactly the participants the kill log has not
    /// eliminated.
    pub fn verify(&self) -> EngineResult<()> {
        self.read("verify", |tx| verified_ring(tx).map(|_| ()))
    }

    /// The sole survivor, once the ring has collapsed to a self-loop.
    pub fn winner(&self) -> EngineResult<Option<Participant>> {
        self.read("winner", |tx| {
            let ring = Ring::from_assignments(tx.assignments()?)?;
            match ring.winner() {
                Some(id) => tx.participant(id),
                None => Ok(None),
            }
        })
    }

    /// Every participant with their elimination status, ordered by id.
    pub fn statuses(&self) -> EngineResult<Vec<ParticipantStatus>> {
        self.read("statuses", |tx| {
            let eliminated: BTreeSet<ParticipantId> = tx
                .kills(None)?
                .into_iter()
                .map(|kill| kill.eliminated)
                .collect();
            Ok(tx
                .participants()?
                .into_iter()
                .map(|participant| ParticipantStatus {
                    eliminated: eliminated.contains(&participant.id),
                    participant,
                })
                .collect())
        })
    }

    /// One participant's elimination status.
    pub fn status(&self, participant: &ParticipantId) -> EngineResult<ParticipantStatus> {
        self.read("status", |tx| {
            let record = require_participant(tx, participant)?;
            Ok(ParticipantStatus {
                eliminated: tx.is_eliminated(participant)?,
                participant: record,
            })
        })
    }

    /// The whole surviving kill log, in id order.
    pub fn kill_log(&self) -> EngineResult<Vec<KillEntry>> {
        self.read("kill_log", |tx| tx.kills(None))
    }

    /// The current tail of the kill log.
    pub fn last_kill(&self) -> EngineResult<Option<KillEntry>> {
        self.read("last_kill", |tx| tx.last_kill())
    }

    /// Entries whose calendar date (in the reference timezone) is `date`.
    pub fn kills_on(&self, date: NaiveDate) -> EngineResult<Vec<KillEntry>> {
        self.kills_between(DateRange::on(date))
    }

    /// Entries whose calendar date falls inside `range`.
    pub fn kills_between(&self, range: DateRange) -> EngineResult<Vec<KillEntry>> {
        let window = self.window(range);
        self.read("kills_between", |tx| {
            let window = window?;
            tx.kills(Some(&window))
        })
    }

    /// Kill counts for every participant, zero counts included. Disqualifications are not kills.
    pub fn kill_counts(&self) -> EngineResult<Vec<KillSummary>> {
        self.read("kill_counts", |tx| {
            Ok(kill_log::summarize(&tx.participants()?, &tx.kills(None)?))
        })
    }

    /// [`kill_counts`](Self::kill_counts) restricted to kills inside `range`.
    pub fn kill_counts_between(&self, range: DateRange) -> EngineResult<Vec<KillSummary>> {
        let window = self.window(range);
        self.read("kill_counts_between", |tx| {
            let window = window?;
            Ok(kill_log::summarize(
                &tx.participants()?,
                &tx.kills(Some(&window))?,
            ))
        })
    }

    // ###################
    // # INTERNALS       #
    // ###################

    fn window(&self, range: DateRange) -> EngineResult<UtcWindow> {
        if let Some(end) = range.end {
            if end < range.start {
                return Err(EngineError::invalid(format!(
                    "date range ends ({}) before it starts ({})",
                    end, range.start
                )));
            }
        }
        range.to_utc_window(self.offset)
    }

    fn timeout(&self, mode: TxMode) -> Duration {
        match mode {
            TxMode::Exclusive => self.config.exclusive_timeout,
            TxMode::Read | TxMode::Write => self.config.write_timeout,
        }
    }

    fn write<R>(
        &self,
        mode: TxMode,
        f: impl FnOnce(&mut dyn RingTx) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.store.transaction(mode, self.timeout(mode), f)
    }

    fn read<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn RingTx) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let result = self.store.transaction(TxMode::Read, self.timeout(TxMode::Read), f);
        self.observe(operation, result)
    }

    /// Classic mode: the word must be the caller's current target's.
    fn plan_classic(
        &self,
        tx: &mut dyn RingTx,
        caller: &ParticipantId,
        claimed_word: &str,
    ) -> EngineResult<Shortcut> {
        require_participant(tx, caller)?;
        let target = tx
            .target_of(caller)?
            .filter(|target| target != caller)
            .ok_or_else(|| EngineError::NoTarget {
                participant: caller.clone(),
            })?;
        let victim = tx.participant(&target)?.ok_or_else(|| {
            EngineError::from(
                InvariantViolation::new("Roster", "target is not in the roster")
                    .with_details(format!("hunter={}, target={}", caller, target)),
            )
        })?;
        if !victim.word_matches(claimed_word) {
            return Err(EngineError::WordMismatch {
                participant: caller.clone(),
            });
        }

        let shortcut = self.plan_removal(tx, &target)?;
        if &shortcut.hunter != caller {
            return Err(InvariantViolation::new("Ring", "target's hunter is not the caller")
                .with_details(format!(
                    "caller={}, target={}, hunter={}",
                    caller, target, shortcut.hunter
                ))
                .into());
        }
        Ok(shortcut)
    }

    /// Free-for-all mode: the word picks the victim among the other active participants.
    fn plan_free_for_all(
        &self,
        tx: &mut dyn RingTx,
        caller: &ParticipantId,
        claimed_word: &str,
    ) -> EngineResult<Shortcut> {
        require_participant(tx, caller)?;
        match tx.target_of(caller)? {
            Some(target) if &target != caller => {}
            _ => {
                return Err(EngineError::NoTarget {
                    participant: caller.clone(),
                })
            }
        }

        let active: BTreeSet<ParticipantId> = tx
            .assignments()?
            .into_iter()
            .map(|edge| edge.hunter)
            .collect();
        let matches: Vec<Participant> = tx
            .participants()?
            .into_iter()
            .filter(|p| active.contains(&p.id) && p.word_matches(claimed_word))
            .collect();

        let victim = match matches.as_slice() {
            [] => {
                return Err(EngineError::WordMismatch {
                    participant: caller.clone(),
                })
            }
            [only] if &only.id == caller => {
                return Err(EngineError::invalid(format!(
                    "{} presented their own secret word",
                    caller
                )))
            }
            [only] => only.id.clone(),
            several => {
                return Err(EngineError::invalid(format!(
                    "secret word is shared by {} active participants",
                    several.len()
                )))
            }
        };
        self.plan_removal(tx, &victim)
    }

    /// Plans removing `eliminated`, from the verified ring or from the two edges it touches.
    fn plan_removal(
        &self,
        tx: &mut dyn RingTx,
        eliminated: &ParticipantId,
    ) -> EngineResult<Shortcut> {
        if self.config.verify_ring_on_write {
            return Ok(verified_ring(tx)?.plan_shortcut(eliminated)?);
        }
        let successor = tx.target_of(eliminated)?.ok_or_else(|| {
            EngineError::from(
                InvariantViolation::new("Ring", "eliminated participant has no outgoing edge")
                    .with_details(format!("eliminated={}", eliminated)),
            )
        })?;
        let hunter = tx.hunter_of(eliminated)?.ok_or_else(|| {
            EngineError::from(
                InvariantViolation::new("Ring", "eliminated participant has no hunter")
                    .with_details(format!("eliminated={}", eliminated)),
            )
        })?;
        Ok(Shortcut {
            hunter,
            eliminated: eliminated.clone(),
            successor,
        })
    }

    /// Appends the log entry and applies the shortcut in the same transaction.
    fn remove(
        &self,
        tx: &mut dyn RingTx,
        shortcut: Shortcut,
        cause: KillCause,
        claimed_by: Option<ParticipantId>,
        at: DateTime<Utc>,
    ) -> EngineResult<Elimination> {
        let kill_id = tx.append_kill(NewKill {
            hunter: shortcut.hunter.clone(),
            eliminated: shortcut.eliminated.clone(),
            cause,
            at,
        })?;
        shortcut.apply_to(tx)?;
        self.audit_ring(&*tx, "after removal");
        let Shortcut {
            hunter,
            eliminated,
            successor,
        } = shortcut;
        Ok(Elimination {
            kill_id,
            hunter,
            eliminated,
            next_target: successor,
            claimed_by,
            cause,
        })
    }

    /// Inverts the tail entry. Shared by undo and each rollback step.
    fn undo_step(&self, tx: &mut dyn RingTx) -> EngineResult<KillEntry> {
        let entry = tx.last_kill()?.ok_or(EngineError::EmptyHistory)?;
        let splice = if self.config.verify_ring_on_write {
            verified_ring(tx)?
                .plan_splice(&entry.hunter, &entry.eliminated)
                .map_err(|violation| with_kill(violation, &entry))?
        } else {
            if tx.target_of(&entry.eliminated)?.is_some() {
                return Err(with_kill(
                    InvariantViolation::new("KillLog", "victim of tail entry still has an edge"),
                    &entry,
                ));
            }
            let successor = tx.target_of(&entry.hunter)?.ok_or_else(|| {
                with_kill(
                    InvariantViolation::new("KillLog", "hunter of tail entry is not active"),
                    &entry,
                )
            })?;
            Splice {
                hunter: entry.hunter.clone(),
                restored: entry.eliminated.clone(),
                successor,
            }
        };
        splice.apply_to(tx)?;
        tx.delete_kill(entry.id)?;
        Ok(entry)
    }

    /// Reports operator-relevant failures to the observer and logs expected refusals.
    /// Debug-build audit of the ring a mutation left behind. Failures go to the engine's
    /// observer; the mutation's outcome is the same as in a release build.
    #[cfg(any(debug_assertions, feature = "paranoid"))]
    fn audit_ring(&self, tx: &dyn RingTx, stage: &'static str) {
        let assignments = match tx.assignments() {
            Ok(assignments) => assignments,
            Err(err) => {
                debug!(stage, error = %err, "ring audit skipped");
                return;
            }
        };
        match Ring::from_assignments(assignments) {
            Ok(ring) => crate::debug_check_invariants!(&self.violation_observer, ring, stage),
            Err(broken) => report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Critical,
                kind_of(&broken),
                "{} ({})",
                broken,
                stage
            ),
        }
    }

    #[cfg(not(any(debug_assertions, feature = "paranoid")))]
    fn audit_ring(&self, _tx: &dyn RingTx, _stage: &'static str) {}

    fn observe<R>(&self, operation: &'static str, result: EngineResult<R>) -> EngineResult<R> {
        if let Err(err) = &result {
            match err {
                EngineError::InvariantViolation { violation } => {
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Critical,
                        kind_of(violation),
                        "{} refused: {}",
                        operation,
                        violation
                    );
                }
                EngineError::Contention { context } => {
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Warning,
                        ViolationKind::Contention,
                        "{} timed out waiting for its lock: {}",
                        operation,
                        context
                    );
                }
                EngineError::Storage { context } => {
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Error,
                        ViolationKind::Storage,
                        "{} failed in storage: {}",
                        operation,
                        context
                    );
                }
                _ => debug!(operation, error = %err, "request refused"),
            }
        }
        result
    }
}

fn kind_of(violation: &InvariantViolation) -> ViolationKind {
    match violation.type_name {
        "Ring" => ViolationKind::Ring,
        "KillLog" => ViolationKind::KillLog,
        "Roster" => ViolationKind::Roster,
        _ => ViolationKind::Invariant,
    }
}

fn with_kill(violation: InvariantViolation, entry: &KillEntry) -> EngineError {
    let details = format!(
        "kill_id={}, hunter={}, eliminated={}",
        entry.id, entry.hunter, entry.eliminated
    );
    let details = match violation.details {
        Some(ref existing) => format!("{}; {}", existing, details),
        None => details,
    };
    violation.with_details(details).into()
}

fn require_participant(tx: &dyn RingTx, id: &ParticipantId) -> EngineResult<Participant> {
    tx.participant(id)?.ok_or_else(|| EngineError::NotFound {
        participant: id.clone(),
    })
}

/// Loads the ring and checks it against the roster and the kill log:
/// a single cycle whose nodes are exactly the roster minus everyone the log eliminated.
fn verified_ring(tx: &dyn RingTx) -> EngineResult<Ring> {
    let ring = Ring::from_assignments(tx.assignments()?)?;
    ring.check_invariants()?;

    let roster = tx.participants()?;
    let known: BTreeSet<&ParticipantId> = roster.iter().map(|p| &p.id).collect();
    let mut eliminated = BTreeMap::new();
    for kill in tx.kills(None)? {
        if let Some(earlier) = eliminated.insert(kill.eliminated.clone(), kill.id) {
            return Err(InvariantViolation::new("KillLog", "participant eliminated twice")
                .with_details(format!(
                    "eliminated={}, kill_ids={} and {}",
                    kill.eliminated, earlier, kill.id
                ))
                .into());
        }
        if !known.contains(&kill.eliminated) {
            return Err(InvariantViolation::new("Roster", "kill-log victim is not in the roster")
                .with_details(format!("kill_id={}, eliminated={}", kill.id, kill.eliminated))
                .into());
        }
    }

    let active: BTreeSet<ParticipantId> = roster
        .into_iter()
        .map(|p| p.id)
        .filter(|id| !eliminated.contains_key(id))
        .collect();
    if let Err(violation) = ring.check_active_set(&active) {
        return Err(InvariantViolation::new("KillLog", violation.invariant)
            .with_details(violation.details.unwrap_or_default())
            .into());
    }
    Ok(ring)
}

/// Checks roster rows and returns the initial edges.
fn validate_roster(rows: &[RosterRow]) -> EngineResult<Vec<Assignment>> {
    if rows.is_empty() {
        return Err(EngineError::invalid("roster is empty"));
    }
    let mut ids = BTreeSet::new();
    for row in rows {
        let id = &row.participant.id;
        if id.is_blank() {
            return Err(EngineError::invalid("roster row with a blank participant id"));
        }
        if row.participant.secret_word.trim().is_empty() {
            return Err(EngineError::invalid(format!(
                "participant {} has a blank secret word",
                id
            )));
        }
        if !ids.insert(id) {
            return Err(EngineError::invalid(format!(
                "participant {} appears twice in the roster",
                id
            )));
        }
    }
    if let Some(row) = rows.iter().find(|row| !ids.contains(&row.target)) {
        return Err(EngineError::invalid(format!(
            "participant {} targets {}, who is not in the roster",
            row.participant.id, row.target
        )));
    }

    let assignments: Vec<Assignment> = rows
        .iter()
        .map(|row| Assignment::new(row.participant.id.clone(), row.target.clone()))
        .collect();
    let ring = Ring::from_assignments(assignments.iter().cloned())
        .map_err(|violation| EngineError::invalid(format!("roster ring: {}", violation)))?;
    ring.check_invariants()
        .map_err(|violation| EngineError::invalid(format!("roster ring: {}", violation)))?;
    Ok(assignments)
}
