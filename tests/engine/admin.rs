//! Roster import, disqualification, secret-word reset and full reset.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{abc, assert_consistent, id, memory_engine, pid, roster, target_word};
use sockwars_ring::prelude::*;
use sockwars_ring::Assignment;

#[test]
fn test_import_trims_fields_and_builds_ring() -> EngineResult<()> {
    let rows = vec![
        RosterRow::new(" a ", " Ada ", "red", " b", " wa "),
        RosterRow::new("b", "Bo", " red ", "a ", "wb"),
    ];
    let (engine, _) = memory_engine(EngineConfig::testing(), &rows);
    assert_eq!(
        engine.assignments()?,
        vec![Assignment::new("a", "b"), Assignment::new("b", "a")]
    );
    let ada = engine.participant(&id("a"))?;
    assert_eq!(ada.name, "Ada");
    assert_eq!(ada.secret_word, "wa");
    Ok(())
}

#[test]
fn test_reimport_replaces_previous_roster() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(5));
    assert_eq!(engine.import_roster(&abc())?, 3);
    assert_eq!(engine.statuses()?.len(), 3);
    assert!(matches!(
        engine.participant(&pid(0)),
        Err(EngineError::NotFound { .. })
    ));
    assert_consistent(&engine);
    Ok(())
}

#[test]
fn test_import_rejects_broken_rings() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let cases: Vec<Vec<RosterRow>> = vec![
        // two cycles
        vec![
            RosterRow::new("a", "Ada", "red", "b", "wa"),
            RosterRow::new("b", "Bo", "red", "a", "wb"),
            RosterRow::new("c", "Cy", "blue", "d", "wc"),
            RosterRow::new("d", "Di", "blue", "c", "wd"),
        ],
        // target hunted twice
        vec![
            RosterRow::new("a", "Ada", "red", "c", "wa"),
            RosterRow::new("b", "Bo", "red", "c", "wb"),
            RosterRow::new("c", "Cy", "blue", "a", "wc"),
        ],
        // unknown target
        vec![
            RosterRow::new("a", "Ada", "red", "b", "wa"),
            RosterRow::new("b", "Bo", "red", "z", "wb"),
        ],
        // blank id
        vec![RosterRow::new("  ", "Nobody", "red", "  ", "w")],
        // blank word
        vec![RosterRow::new("a", "Ada", "red", "a", " ")],
        // empty
        vec![],
    ];
    for rows in cases {
        assert!(
            matches!(
                engine.import_roster(&rows),
                Err(EngineError::InvalidRequest { .. })
            ),
            "accepted {:?}",
            rows
        );
    }
    // The original game is untouched.
    assert_eq!(engine.statuses().unwrap().len(), 3);
}

#[test]
fn test_import_refused_once_game_started() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    engine.eliminate(&id("a"), "wb")?;
    assert!(matches!(
        engine.import_roster(&roster(4)),
        Err(EngineError::InvalidRequest { .. })
    ));

    engine.undo_last()?;
    assert_eq!(engine.import_roster(&roster(4))?, 4);
    Ok(())
}

#[test]
fn test_disqualification_removes_without_word() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &roster(4));
    let dq = engine.disqualify(&pid(2))?;
    assert_eq!(dq.hunter, pid(1));
    assert_eq!(dq.next_target, pid(3));
    assert_eq!(dq.cause, KillCause::Disqualification);
    assert_eq!(engine.target_of(&pid(1))?, Some(pid(3)));
    assert!(engine.status(&pid(2))?.eliminated);
    assert_eq!(engine.last_kill()?.unwrap().cause, KillCause::Disqualification);
    assert!(engine.kill_counts()?.iter().all(|c| c.kills == 0));
    assert_consistent(&engine);
    Ok(())
}

#[test]
fn test_disqualify_unknown_participant() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    assert!(matches!(
        engine.disqualify(&id("ghost")),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn test_reset_secret_word() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let previous = engine.reset_secret_word(&id("b"), "  Marmalade ")?;
    assert_eq!(previous, "wb");
    assert_eq!(target_word(&engine, &id("a")), "Marmalade");
    assert!(engine.eliminate(&id("a"), "marmalade").is_ok());
    Ok(())
}

#[test]
fn test_clear_all_keeps_counting_ids() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let before = engine.eliminate(&id("a"), "wb")?;
    engine.clear_all()?;
    assert!(engine.statuses()?.is_empty());
    assert!(engine.assignments()?.is_empty());
    assert!(engine.kill_log()?.is_empty());

    engine.import_roster(&abc())?;
    let after = engine.eliminate(&id("a"), "wb")?;
    assert!(after.kill_id > before.kill_id);
    Ok(())
}

#[test]
fn test_import_normalizes_deserialized_rows() -> EngineResult<()> {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    let rows: Vec<RosterRow> = serde_json::from_str(
        r#"[
            {"participant":{"id":" a ","name":"Ada","group":"red","secret_word":" wa "},"target":"b "},
            {"participant":{"id":"b","name":" Bo","group":"red","secret_word":"wb"},"target":" a"}
        ]"#,
    )
    .unwrap();
    assert_eq!(engine.import_roster(&rows)?, 2);
    assert_eq!(engine.participant(&id("a"))?.secret_word, "wa");
    assert_eq!(engine.participant(&id("b"))?.name, "Bo");
    assert!(engine.eliminate(&id("b"), "WA").is_ok());
    Ok(())
}

#[test]
fn test_import_rejects_deserialized_blank_fields() {
    let (engine, _) = memory_engine(EngineConfig::testing(), &abc());
    for json in [
        r#"[{"participant":{"id":"a","name":"Ada","group":"red","secret_word":"   "},"target":"a"}]"#,
        r#"[{"participant":{"id":"  ","name":"Ada","group":"red","secret_word":"wa"},"target":"  "}]"#,
    ] {
        let rows: Vec<RosterRow> = serde_json::from_str(json).unwrap();
        assert!(
            matches!(
                engine.import_roster(&rows),
                Err(EngineError::InvalidRequest { .. })
            ),
            "accepted {}",
            json
        );
    }
    assert_eq!(engine.statuses().unwrap().len(), 3);
}
