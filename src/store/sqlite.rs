//! Durable store backed by a SQLite file.
//!
//! Every transaction opens its own connection, so nothing is shared between callers except the
//! file and SQLite's locks. The lock wait is the connection's busy timeout; when it elapses
//! SQLite reports `SQLITE_BUSY`, which surfaces as [`EngineError::Contention`].
//!
//! | [`TxMode`] | SQLite |
//! |------------|--------|
//! | `Read` | `BEGIN DEFERRED` with `query_only` |
//! | `Write` | `BEGIN IMMEDIATE` |
//! | `Exclusive` | `BEGIN EXCLUSIVE` |

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::kill_log::{KillCause, KillEntry, NewKill, UtcWindow};
use crate::participant::Participant;
use crate::ring::Assignment;
use crate::store::{RingStore, RingTx, TxMode};
use crate::telemetry::InvariantViolation;
use crate::{EngineError, EngineResult, KillId, ParticipantId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS participants (
        participant_id TEXT PRIMARY KEY NOT NULL,
        display_name   TEXT NOT NULL,
        group_name     TEXT NOT NULL,
        secret_word    TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS assignments (
        hunter_id TEXT PRIMARY KEY NOT NULL,
        target_id TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS kill_log (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        hunter_id     TEXT NOT NULL,
        eliminated_id TEXT NOT NULL,
        cause         TEXT NOT NULL,
        timestamp_ms  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS kill_log_timestamp ON kill_log (timestamp_ms);
    CREATE INDEX IF NOT EXISTS kill_log_eliminated ON kill_log (eliminated_id);
";

/// A [`RingStore`] persisted in one SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: StoreConfig,
}

impl SqliteStore {
    /// Opens (creating if needed) the database described by `config` and ensures the schema.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for an invalid config, [`EngineError::Storage`] if the
    /// file cannot be opened or migrated.
    pub fn open(config: StoreConfig) -> EngineResult<Self> {
        config.validate()?;
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;
        if config.wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "journal mode set");
        }
        conn.execute_batch(SCHEMA)?;
        info!(path = %config.path.display(), "opened sqlite ring store");
        Ok(Self { config })
    }

    /// The configuration this store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn connect(&self, mode: TxMode, timeout: Duration) -> EngineResult<Connection> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(timeout)?;
        if !mode.is_write() {
            conn.pragma_update(None, "query_only", true)?;
        }
        Ok(conn)
    }
}

impl RingStore for SqliteStore {
    fn transaction<R, F>(&self, mode: TxMode, timeout: Duration, f: F) -> EngineResult<R>
    where
        F: FnOnce(&mut dyn RingTx) -> EngineResult<R>,
    {
        let behavior = match mode {
            TxMode::Read => TransactionBehavior::Deferred,
            TxMode::Write => TransactionBehavior::Immediate,
            TxMode::Exclusive => TransactionBehavior::Exclusive,
        };
        let mut conn = self.connect(mode, timeout)?;
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(|err| with_context(err, mode))?;

        let result = f(&mut SqliteTx { conn: &tx })?;
        tx.commit().map_err(|err| with_context(err, mode))?;
        Ok(result)
    }
}

/// Adds the transaction mode to lock errors so contention reports say which lock timed out.
fn with_context(err: rusqlite::Error, mode: TxMode) -> EngineError {
    match EngineError::from(err) {
        EngineError::Contention { context } => EngineError::Contention {
            context: format!("sqlite {} transaction: {}", mode, context),
        },
        other => other,
    }
}

struct SqliteTx<'c> {
    conn: &'c Connection,
}

fn edge_violation(invariant: &str, details: String) -> EngineError {
    InvariantViolation::new("SqliteStore", invariant)
        .with_details(details)
        .into()
}

fn is_constraint(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: ParticipantId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        group: row.get(2)?,
        secret_word: row.get(3)?,
    })
}

/// Raw kill-log columns; converted outside the row callback so bad data becomes a
/// [`EngineError::Storage`] rather than a rusqlite conversion error.
type KillRow = (i64, String, String, String, i64);

fn kill_row(row: &Row<'_>) -> rusqlite::Result<KillRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn kill_from_row((id, hunter, eliminated, cause, timestamp_ms): KillRow) -> EngineResult<KillEntry> {
    let cause = KillCause::from_label(&cause).ok_or_else(|| EngineError::Storage {
        context: format!("kill-log entry {} has unknown cause {:?}", id, cause),
    })?;
    let at = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
        EngineError::Storage {
            context: format!("kill-log entry {} has out-of-range timestamp {}", id, timestamp_ms),
        }
    })?;
    Ok(KillEntry {
        id: KillId::new(id),
        hunter: ParticipantId::new(hunter),
        eliminated: ParticipantId::new(eliminated),
        cause,
        at,
    })
}

const KILL_COLUMNS: &str = "id, hunter_id, eliminated_id, cause, timestamp_ms";

impl RingTx for SqliteTx<'_> {
    fn participant(&self, id: &ParticipantId) -> EngineResult<Option<Participant>> {
        Ok(self
            .conn
            .query_row(
                "SELECT participant_id, display_name, group_name, secret_word
                 FROM participants WHERE participant_id = ?1",
                params![id.as_str()],
                participant_from_row,
            )
            .optional()?)
    }

    fn participants(&self) -> EngineResult<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT participant_id, display_name, group_name, secret_word
             FROM participants ORDER BY participant_id",
        )?;
        let rows = stmt.query_map([], participant_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn put_participant(&mut self, participant: &Participant) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO participants (participant_id, display_name, group_name, secret_word)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (participant_id) DO UPDATE SET
                display_name = excluded.display_name,
                group_name = excluded.group_name,
                secret_word = excluded.secret_word",
            params![
                participant.id.as_str(),
                participant.name,
                participant.group,
                participant.secret_word
            ],
        )?;
        Ok(())
    }

    fn set_secret_word(&mut self, id: &ParticipantId, word: &str) -> EngineResult<String> {
        let previous: Option<String> = self
            .conn
            .query_row(
                "SELECT secret_word FROM participants WHERE participant_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let previous = previous.ok_or_else(|| EngineError::NotFound {
            participant: id.clone(),
        })?;
        self.conn.execute(
            "UPDATE participants SET secret_word = ?2 WHERE participant_id = ?1",
            params![id.as_str(), word],
        )?;
        Ok(previous)
    }

    fn target_of(&self, hunter: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        let target: Option<String> = self
            .conn
            .query_row(
                "SELECT target_id FROM assignments WHERE hunter_id = ?1",
                params![hunter.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target.map(ParticipantId::new))
    }

    fn hunter_of(&self, target: &ParticipantId) -> EngineResult<Option<ParticipantId>> {
        let hunter: Option<String> = self
            .conn
            .query_row(
                "SELECT hunter_id FROM assignments WHERE target_id = ?1",
                params![target.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hunter.map(ParticipantId::new))
    }

    fn assignments(&self) -> EngineResult<Vec<Assignment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT hunter_id, target_id FROM assignments ORDER BY hunter_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Assignment::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_assignment(
        &mut self,
        hunter: &ParticipantId,
        target: &ParticipantId,
    ) -> EngineResult<()> {
        match self.conn.execute(
            "INSERT INTO assignments (hunter_id, target_id) VALUES (?1, ?2)",
            params![hunter.as_str(), target.as_str()],
        ) {
            Ok(_) => Ok(()),
            Err(err) if is_constraint(&err) => Err(edge_violation(
                "inserted edge duplicates a hunter or target",
                format!("{} -> {}: {}", hunter, target, err),
            )),
            Err(err) => Err(err.into()),
        }
    }

    fn retarget(&mut self, hunter: &ParticipantId, target: &ParticipantId) -> EngineResult<()> {
        let updated = match self.conn.execute(
            "UPDATE assignments SET target_id = ?2 WHERE hunter_id = ?1",
            params![hunter.as_str(), target.as_str()],
        ) {
            Ok(updated) => updated,
            Err(err) if is_constraint(&err) => {
                return Err(edge_violation(
                    "target is already hunted",
                    format!("{} -> {}: {}", hunter, target, err),
                ))
            }
            Err(err) => return Err(err.into()),
        };
        if updated == 0 {
            return Err(edge_violation(
                "retargeted hunter has no edge",
                format!("hunter={}", hunter),
            ));
        }
        Ok(())
    }

    fn remove_assignment(&mut self, hunter: &ParticipantId) -> EngineResult<()> {
        let removed = self.conn.execute(
            "DELETE FROM assignments WHERE hunter_id = ?1",
            params![hunter.as_str()],
        )?;
        if removed == 0 {
            return Err(edge_violation(
                "removed hunter has no edge",
                format!("hunter={}", hunter),
            ));
        }
        Ok(())
    }

    fn replace_assignments(&mut self, assignments: &[Assignment]) -> EngineResult<()> {
        self.conn.execute("DELETE FROM assignments", [])?;
        for Assignment { hunter, target } in assignments {
            self.insert_assignment(hunter, target)?;
        }
        Ok(())
    }

    fn append_kill(&mut self, kill: NewKill) -> EngineResult<KillId> {
        self.conn.execute(
            "INSERT INTO kill_log (hunter_id, eliminated_id, cause, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                kill.hunter.as_str(),
                kill.eliminated.as_str(),
                kill.cause.as_str(),
                kill.at.timestamp_millis()
            ],
        )?;
        Ok(KillId::new(self.conn.last_insert_rowid()))
    }

    fn last_kill(&self) -> EngineResult<Option<KillEntry>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM kill_log ORDER BY id DESC LIMIT 1", KILL_COLUMNS),
                [],
                kill_row,
            )
            .optional()?;
        row.map(kill_from_row).transpose()
    }

    fn delete_kill(&mut self, id: KillId) -> EngineResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM kill_log WHERE id = ?1", params![id.as_i64()])?;
        if removed == 0 {
            return Err(InvariantViolation::new(
                "SqliteStore",
                "deleted kill-log entry does not exist",
            )
            .with_details(format!("kill_id={}", id))
            .into());
        }
        Ok(())
    }

    fn kills(&self, window: Option<&UtcWindow>) -> EngineResult<Vec<KillEntry>> {
        let start = window.map(|w| w.start.timestamp_millis());
        let end = window.and_then(|w| w.end).map(|end| end.timestamp_millis());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM kill_log
             WHERE (?1 IS NULL OR timestamp_ms >= ?1)
               AND (?2 IS NULL OR timestamp_ms < ?2)
             ORDER BY id",
            KILL_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![start, end], kill_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(kill_from_row).collect()
    }

    fn is_eliminated(&self, id: &ParticipantId) -> EngineResult<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM kill_log WHERE eliminated_id = ?1)",
            params![id.as_str()],
            |row| row.get(0),
        )?)
    }

    fn clear_all(&mut self) -> EngineResult<()> {
        // sqlite_sequence is left alone so AUTOINCREMENT never reissues an id.
        self.conn.execute_batch(
            "DELETE FROM kill_log;
             DELETE FROM assignments;
             DELETE FROM participants;",
        )?;
        Ok(())
    }
}
