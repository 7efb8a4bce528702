//! Elimination scenarios on small rings.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{
    abc, assert_consistent, id, init_tracing, memory_engine, pid, roster, target_word,
};
use sockwars_ring::prelude::*;
use sockwars_ring::{assert_no_violations, Assignment};

#[test]
fn test_three_ring_to_winner() -> EngineResult<()> {
    init_tracing();
    let (engine, observer) = memory_engine(EngineConfig::testing(), &abc());

    // A hunts B; B's word moves A onto C.
    let first = engine.eliminate(&id("a"), "wb")?;
    assert_eq!(first.eliminated, id("b"));
    assert_eq!(
        engine.assignments()?,
        vec![Assignment::new("a", "c"), Assignment::new("c", "a")]
    );
    assert_eq!(engine.kill_log()?.len(), 1);

    // On the two-cycle, C's word leaves A targeting themselves.
    let second = engine.eliminate(&id("a"), "wc")?;
    assert!(second.kill_id > first.kill_id);
    assert!(second.is_final());
    assert_eq!(engine.assignments()?, vec![Assignment::new("a", "a")]);
    assert_eq!(engine.kill_log()?.len(), 2);
    assert_eq!(engine.winner()?.map(|p| p.id), Some(id("a")));

    assert_consistent(&engine);
    assert_no_violations!(observer);
    Ok(())
}

#[test]
fn test_wrong_word_leaves_everything_unchanged() -> EngineResult<()> {
    let (engine, observer) = memory_engine(EngineConfig::testing(), &abc());
    let ring_before = engine.assignments()?;

    let err = engine.eliminate(&id("a"), "wrong").unwrap_err();
    assert_eq!(err, EngineError::WordMismatch { participant: id("a") });
    assert!(err.is_expected());
    assert!(!err.requires_operator());

    assert_eq!(engine.assignments()?, ring_before);
    assert!(engine.kill_log()?.is_empty());
    assert!(observer.is_empty());
    Ok(())
}

#[test]
fn test_words_compare_trimmed_and_case_insensitive() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    assert!(engine.eliminate(&id("a"), "\t WB \n").is_ok());
    Ok(())
}

#[test]
fn test_blank_word_never_matches() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    assert!(matches!(
        engine.eliminate(&id("a"), "   "),
        Err(EngineError::WordMismatch { .. })
    ));
}

#[test]
fn test_presenting_a_non_target_word_fails_in_classic_mode() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    // C is alive, but A's target is B.
    assert!(matches!(
        engine.eliminate(&id("a"), "wc"),
        Err(EngineError::WordMismatch { .. })
    ));
}

#[test]
fn test_unknown_caller() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    assert_eq!(
        engine.eliminate(&id("mallory"), "wb"),
        Err(EngineError::NotFound {
            participant: id("mallory")
        })
    );
}

#[test]
fn test_eliminated_caller_has_no_target() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    engine.eliminate(&id("a"), "wb")?;
    let err = engine.eliminate(&id("b"), "wc").unwrap_err();
    assert_eq!(err, EngineError::NoTarget { participant: id("b") });
    assert!(err.is_expected());
    Ok(())
}

#[test]
fn test_inherited_target_chain() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(6));
    let hunter = pid(0);

    // p000 sweeps the ring in order.
    for victim in 1..6 {
        let word = target_word(&engine, &hunter);
        let kill = engine.eliminate(&hunter, &word)?;
        assert_eq!(kill.eliminated, pid(victim));
        let expected_next = if victim == 5 { pid(0) } else { pid(victim + 1) };
        assert_eq!(kill.next_target, expected_next);
        assert_consistent(&engine);
    }
    assert_eq!(engine.winner()?.map(|p| p.id), Some(hunter.clone()));
    assert!(matches!(
        engine.eliminate(&hunter, "anything"),
        Err(EngineError::NoTarget { .. })
    ));
    Ok(())
}

#[test]
fn test_one_person_game_is_already_won() -> EngineResult<()> {
    let (engine, _) = memory_engine(
        EngineConfig::testing(),
        &[RosterRow::new("solo", "Solo", "red", "solo", "ws")],
    );
    assert_eq!(engine.winner()?.map(|p| p.id), Some(id("solo")));
    assert!(matches!(
        engine.eliminate(&id("solo"), "ws"),
        Err(EngineError::NoTarget { .. })
    ));
    Ok(())
}

#[test]
fn test_ids_strictly_increase_across_undo() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let first = engine.eliminate(&id("a"), "wb")?;
    engine.undo_last()?;
    let again = engine.eliminate(&id("a"), "wb")?;
    assert!(again.kill_id > first.kill_id);
    Ok(())
}

#[test]
fn test_kill_is_timestamped_with_supplied_instant() -> EngineResult<()> {
    use chrono::{TimeZone, Utc};

    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let at = Utc.with_ymd_and_hms(2024, 3, 5, 21, 15, 0).unwrap();
    let kill = engine.eliminate_at(&id("a"), "wb", at)?;
    let entry = engine.last_kill()?.unwrap();
    assert_eq!(entry.id, kill.kill_id);
    assert_eq!(entry.at, at);
    assert_eq!(entry.cause, KillCause::Elimination);
    Ok(())
}
