//! Undo and rollback integration tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{abc, assert_consistent, id, memory_engine, pid, roster, target_word};
use sockwars_ring::__internal::MemoryState;
use sockwars_ring::prelude::*;
use sockwars_ring::telemetry::{CollectingObserver, ViolationKind, ViolationSeverity};
use sockwars_ring::{assert_violation, Assignment, RingTx};
use std::sync::Arc;

#[test]
fn test_undo_twice_restores_original_ring() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let original = engine.assignments()?;

    let first = engine.eliminate(&id("a"), "wb")?;
    let second = engine.eliminate(&id("a"), "wc")?;

    let undone = engine.undo_last()?;
    assert_eq!(undone.id, second.kill_id);
    assert_eq!(undone.hunter, id("a"));
    assert_eq!(undone.eliminated, id("c"));
    assert_eq!(
        engine.assignments()?,
        vec![Assignment::new("a", "c"), Assignment::new("c", "a")]
    );
    assert_eq!(engine.kill_log()?.len(), 1);

    let undone = engine.undo_last()?;
    assert_eq!(undone.id, first.kill_id);
    assert_eq!(engine.assignments()?, original);
    assert!(engine.kill_log()?.is_empty());
    Ok(())
}

#[test]
fn test_undo_on_empty_log() {
    let (engine, observer) = memory_engine(EngineConfig::testing(), &abc());
    let err = engine.undo_last().unwrap_err();
    assert_eq!(err, EngineError::EmptyHistory);
    assert!(err.is_expected());
    assert!(observer.is_empty());
}

#[test]
fn test_rollback_to_first_kill_undoes_the_rest() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(5));
    let hunter = pid(0);
    let mut ids = Vec::new();
    for _ in 0..3 {
        let word = target_word(&engine, &hunter);
        ids.push(engine.eliminate(&hunter, &word)?.kill_id);
    }

    assert_eq!(engine.rollback_to(ids[0])?, 2);
    let log = engine.kill_log()?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].id, ids[0]);
    assert_eq!(engine.target_of(&hunter)?, Some(pid(2)));
    assert_consistent(&engine);
    Ok(())
}

#[test]
fn test_rollback_is_idempotent() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(4));
    let first = engine.eliminate(&pid(0), &target_word(&engine, &pid(0)))?;
    engine.eliminate(&pid(2), &target_word(&engine, &pid(2)))?;

    assert_eq!(engine.rollback_to(first.kill_id)?, 1);
    let snapshot = engine.store().snapshot();
    assert_eq!(engine.rollback_to(first.kill_id)?, 0);
    assert_eq!(engine.store().snapshot(), snapshot);
    Ok(())
}

#[test]
fn test_rollback_past_the_tail_is_a_no_op() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let kill = engine.eliminate(&id("a"), "wb")?;
    assert_eq!(engine.rollback_to(kill.kill_id)?, 0);
    assert_eq!(engine.rollback_to(KillId::new(1_000))?, 0);
    assert_eq!(engine.kill_log()?.len(), 1);
    Ok(())
}

#[test]
fn test_rollback_on_empty_log_returns_zero() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    assert_eq!(engine.rollback_to(KillId::ORIGIN)?, 0);
    Ok(())
}

#[test]
fn test_rollback_to_unissued_id_between_entries() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(4));
    // Issue ids 1..=3, undo 2 and 3, then kill again so the log holds ids 1 and 4.
    for _ in 0..3 {
        engine.eliminate(&pid(0), &target_word(&engine, &pid(0)))?;
    }
    engine.rollback_to(KillId::new(1))?;
    let fourth = engine.eliminate(&pid(0), &target_word(&engine, &pid(0)))?;
    assert_eq!(fourth.kill_id, KillId::new(4));

    // Rolling back to the gap at 2 undoes only the entry above it.
    assert_eq!(engine.rollback_to(KillId::new(2))?, 1);
    let ids: Vec<KillId> = engine.kill_log()?.into_iter().map(|k| k.id).collect();
    assert_eq!(ids, vec![KillId::new(1)]);
    Ok(())
}

#[test]
fn test_interleaved_hunters_unwind_in_reverse() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(8));
    let original = engine.assignments()?;

    for hunter in [0, 4, 2, 6, 0] {
        let hunter = pid(hunter);
        let word = target_word(&engine, &hunter);
        engine.eliminate(&hunter, &word)?;
        assert_consistent(&engine);
    }
    engine.disqualify(&pid(6))?;

    while engine.last_kill()?.is_some() {
        engine.undo_last()?;
        assert_consistent(&engine);
    }
    assert_eq!(engine.assignments()?, original);
    Ok(())
}

/// Seeds a store whose tail entry cannot be inverted: the victim still holds an edge.
fn corrupt_state() -> MemoryState {
    let mut state = MemoryState::new();
    for row in abc() {
        state.put_participant(&row.participant).unwrap();
    }
    let edges = [("a", "b"), ("b", "c"), ("c", "a")];
    for (hunter, target) in edges {
        state.insert_assignment(&id(hunter), &id(target)).unwrap();
    }
    state
        .append_kill(sockwars_ring::kill_log::NewKill {
            hunter: id("a"),
            eliminated: id("b"),
            cause: KillCause::Elimination,
            at: chrono::Utc::now(),
        })
        .unwrap();
    state
}

#[test]
fn test_undo_refuses_inconsistent_log_and_alerts() {
    for verify in [true, false] {
        let observer = Arc::new(CollectingObserver::new());
        let state = corrupt_state();
        let engine = EngineBuilder::new()
            .with_config(EngineConfig {
                verify_ring_on_write: verify,
                ..EngineConfig::testing()
            })
            .with_violation_observer(observer.clone())
            .build(MemoryStore::from_state(state.clone()))
            .unwrap();

        let err = engine.undo_last().unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation { .. }));
        assert!(err.requires_operator());
        assert!(!err.is_retryable());
        assert_eq!(engine.store().snapshot(), state, "verify={}", verify);
        assert!(observer.has_severity(ViolationSeverity::Critical));
        assert_violation!(observer, ViolationKind::KillLog);
    }
}

#[test]
fn test_failed_rollback_step_aborts_whole_rollback() -> EngineResult<()> {
    // A valid first kill followed by a corrupt second entry.
    let (seed, _) = memory_engine(EngineConfig::testing(), &roster(4));
    seed.eliminate(&pid(0), &target_word(&seed, &pid(0)))?;
    let mut state = seed.store().snapshot();
    state.append_kill(sockwars_ring::kill_log::NewKill {
        hunter: pid(2),
        eliminated: pid(3),
        cause: KillCause::Elimination,
        at: chrono::Utc::now(),
    })?;

    let observer = Arc::new(CollectingObserver::new());
    let engine = EngineBuilder::new()
        .with_config(EngineConfig::testing())
        .with_violation_observer(observer.clone())
        .build(MemoryStore::from_state(state.clone()))?;

    assert!(matches!(
        engine.rollback_to(KillId::ORIGIN),
        Err(EngineError::InvariantViolation { .. })
    ));
    assert_eq!(engine.store().snapshot(), state);
    assert!(!observer.is_empty());
    Ok(())
}
