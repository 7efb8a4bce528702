//! Read accessor tests: statuses, targets, kill counts and date windows.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{abc, id, memory_engine, pid, roster, target_word};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sockwars_ring::prelude::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[test]
fn test_participant_record_and_target_info() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let bo = engine.participant(&id("b"))?;
    assert_eq!(bo.name, "Bo");
    assert_eq!(bo.group, "red");
    assert_eq!(bo.secret_word, "wb");

    let info = engine.target_info(&id("a"))?.unwrap();
    assert_eq!(info.target.id, id("b"));
    assert!(!info.is_self());

    engine.eliminate(&id("a"), "wb")?;
    assert_eq!(engine.target_info(&id("b"))?, None);
    assert!(matches!(
        engine.target_info(&id("nobody")),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.participant(&id("nobody")),
        Err(EngineError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_statuses_follow_the_log() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    assert!(engine.statuses()?.iter().all(|s| !s.eliminated));

    engine.eliminate(&id("a"), "wb")?;
    let statuses = engine.statuses()?;
    let eliminated: Vec<_> = statuses
        .iter()
        .filter(|s| s.eliminated)
        .map(|s| s.participant.id.clone())
        .collect();
    assert_eq!(eliminated, vec![id("b")]);
    assert!(engine.status(&id("b"))?.eliminated);

    engine.undo_last()?;
    assert!(!engine.status(&id("b"))?.eliminated);
    Ok(())
}

#[test]
fn test_kill_counts_include_zero_and_order_by_count() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(6));
    // p000 gets two kills, p003 one.
    engine.eliminate(&pid(0), &target_word(&engine, &pid(0)))?;
    engine.eliminate(&pid(3), &target_word(&engine, &pid(3)))?;
    engine.eliminate(&pid(0), &target_word(&engine, &pid(0)))?;

    let counts = engine.kill_counts()?;
    assert_eq!(counts.len(), 6);
    assert_eq!(counts[0].participant, pid(0));
    assert_eq!(counts[0].kills, 2);
    assert_eq!(counts[1].participant, pid(3));
    assert_eq!(counts[1].kills, 1);
    assert!(counts[2..].iter().all(|c| c.kills == 0));
    Ok(())
}

#[test]
fn test_tied_counts_favour_who_got_there_first() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(6));
    engine.eliminate(&pid(4), &target_word(&engine, &pid(4)))?;
    engine.eliminate(&pid(0), &target_word(&engine, &pid(0)))?;

    let counts = engine.kill_counts()?;
    assert_eq!(counts[0].participant, pid(4));
    assert_eq!(counts[1].participant, pid(0));
    Ok(())
}

#[test]
fn test_kills_on_a_local_date() -> EngineResult<()> {
    // UTC-5: 2024-03-06T03:00Z is still the evening of March 5th locally.
    let config = EngineConfig {
        utc_offset_seconds: -5 * 3600,
        ..EngineConfig::testing()
    };
    let (engine, _) = memory_engine(config, &roster(6));
    engine.eliminate_at(&pid(0), &target_word(&engine, &pid(0)), utc(2024, 3, 5, 14, 0))?;
    engine.eliminate_at(&pid(2), &target_word(&engine, &pid(2)), utc(2024, 3, 6, 3, 0))?;
    engine.eliminate_at(&pid(4), &target_word(&engine, &pid(4)), utc(2024, 3, 6, 6, 0))?;

    let march_5 = engine.kills_on(date(2024, 3, 5))?;
    assert_eq!(march_5.len(), 2);
    assert_eq!(march_5[1].hunter, pid(2));

    let march_6 = engine.kills_on(date(2024, 3, 6))?;
    assert_eq!(march_6.len(), 1);
    assert_eq!(march_6[0].hunter, pid(4));
    Ok(())
}

#[test]
fn test_date_ranges_are_inclusive_and_open_ended() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(8));
    for (hunter, day) in [(0, 1), (2, 3), (4, 5), (6, 7)] {
        engine.eliminate_at(
            &pid(hunter),
            &target_word(&engine, &pid(hunter)),
            utc(2024, 4, day, 23, 59),
        )?;
    }

    let range = DateRange::between(date(2024, 4, 3), date(2024, 4, 5))?;
    assert_eq!(engine.kills_between(range)?.len(), 2);
    assert_eq!(engine.kills_between(DateRange::since(date(2024, 4, 5)))?.len(), 2);
    assert_eq!(engine.kills_between(DateRange::since(date(2024, 4, 8)))?.len(), 0);

    let windowed = engine.kill_counts_between(DateRange::since(date(2024, 4, 4)))?;
    assert_eq!(windowed.len(), 8);
    assert_eq!(windowed.iter().map(|c| c.kills).sum::<usize>(), 2);
    assert_eq!(windowed[0].participant, pid(4));
    Ok(())
}

#[test]
fn test_inverted_range_is_rejected() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let inverted = DateRange {
        start: date(2024, 4, 5),
        end: Some(date(2024, 4, 1)),
    };
    assert!(matches!(
        engine.kills_between(inverted),
        Err(EngineError::InvalidRequest { .. })
    ));
}

#[test]
fn test_ring_accessor_exposes_the_cycle() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(4));
    let ring = engine.ring()?;
    assert_eq!(ring.len(), 4);
    assert_eq!(ring.walk_from(&pid(2)), vec![pid(2), pid(3), pid(0), pid(1)]);
    assert_eq!(ring.hunter_of(&pid(0)), Some(&pid(3)));
    Ok(())
}
