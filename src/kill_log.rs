//! Kill-log records, calendar-date windows and kill-count summaries.
//!
//! Timestamps are stored in UTC. Calendar dates ("kills on 2024-03-05") are evaluated in a fixed
//! reference offset from [`EngineConfig`](crate::EngineConfig), so a kill at 23:30 local time
//! belongs to that local day regardless of the UTC date.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::participant::Participant;
use crate::{EngineError, EngineResult, KillId, ParticipantId};

/// Why a participant left the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillCause {
    /// Their hunter presented their secret word.
    Elimination,
    /// An administrator removed them. Attributed to their ring predecessor so undo can splice
    /// them back, but never counted as a kill.
    Disqualification,
}

impl KillCause {
    /// Storage label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Elimination => "elimination",
            Self::Disqualification => "disqualification",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "elimination" => Some(Self::Elimination),
            "disqualification" => Some(Self::Disqualification),
            _ => None,
        }
    }
}

impl std::fmt::Display for KillCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry about to be appended; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKill {
    /// Hunter of record (inherits the victim's target).
    pub hunter: ParticipantId,
    /// The participant removed from the ring.
    pub eliminated: ParticipantId,
    /// Elimination or disqualification.
    pub cause: KillCause,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// A surviving kill-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillEntry {
    /// Never-reused, strictly increasing id.
    pub id: KillId,
    /// Hunter of record.
    pub hunter: ParticipantId,
    /// The participant removed from the ring.
    pub eliminated: ParticipantId,
    /// Elimination or disqualification.
    pub cause: KillCause,
    /// When the entry was appended (UTC).
    pub at: DateTime<Utc>,
}

impl KillEntry {
    /// Builds the stored entry for `kill` under `id`.
    #[must_use]
    pub fn from_new(id: KillId, kill: NewKill) -> Self {
        Self {
            id,
            hunter: kill.hunter,
            eliminated: kill.eliminated,
            cause: kill.cause,
            at: kill.at,
        }
    }

    /// The entry's calendar date in the reference offset.
    #[must_use]
    pub fn local_date(&self, offset: FixedOffset) -> NaiveDate {
        self.at.with_timezone(&offset).date_naive()
    }

    /// Whether this entry counts towards the hunter's kill count.
    #[must_use]
    pub fn counts_as_kill(&self) -> bool {
        self.cause == KillCause::Elimination
    }
}

/// An inclusive range of calendar dates. An open `end` means "from `start` onwards".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date included.
    pub start: NaiveDate,
    /// Last date included, if bounded.
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// A single day.
    #[must_use]
    pub const fn on(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: Some(date),
        }
    }

    /// `start..=end`. Rejected if `end` precedes `start`.
    pub fn between(start: NaiveDate, end: NaiveDate) -> EngineResult<Self> {
        if end < start {
            return Err(EngineError::invalid(format!(
                "date range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// `start` and every later day.
    #[must_use]
    pub const fn since(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    /// Returns `true` if `date` falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date <= end)
    }

    /// Converts the local calendar range into a half-open UTC instant window.
    pub fn to_utc_window(&self, offset: FixedOffset) -> EngineResult<UtcWindow> {
        let start = local_midnight(self.start, offset)?;
        let end = match self.end {
            Some(end) => {
                let next = end.succ_opt().ok_or_else(|| {
                    EngineError::invalid(format!("date {} is out of range", end))
                })?;
                Some(local_midnight(next, offset)?)
            }
            None => None,
        };
        Ok(UtcWindow { start, end })
    }
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> EngineResult<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| EngineError::invalid(format!("no local midnight for {}", date)))
}

/// A half-open window of UTC instants, `start <= t < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcWindow {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound, if any.
    pub end: Option<DateTime<Utc>>,
}

impl UtcWindow {
    /// Returns `true` if `at` lies inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.map_or(true, |end| at < end)
    }
}

/// A participant's kill count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillSummary {
    /// The hunter.
    pub participant: ParticipantId,
    /// Eliminations credited to them (disqualifications excluded).
    pub kills: usize,
}

/// Rolls `kills` up into one summary per roster participant, zero counts included.
///
/// Ordered by count (descending), then by who reached their count first, then by id.
#[must_use]
pub fn summarize(roster: &[Participant], kills: &[KillEntry]) -> Vec<KillSummary> {
    let mut tally: BTreeMap<&ParticipantId, (usize, Option<KillId>)> =
        roster.iter().map(|p| (&p.id, (0, None))).collect();
    for kill in kills.iter().filter(|k| k.counts_as_kill()) {
        let entry = tally.entry(&kill.hunter).or_insert((0, None));
        entry.0 += 1;
        entry.1 = entry.1.max(Some(kill.id));
    }

    let mut rows: Vec<_> = tally.into_iter().collect();
    rows.sort_by(|(a_id, (a_kills, a_last)), (b_id, (b_kills, b_last))| {
        b_kills
            .cmp(a_kills)
            .then_with(|| a_last.cmp(b_last))
            .then_with(|| a_id.cmp(b_id))
    });
    rows.into_iter()
        .map(|(id, (kills, _))| KillSummary {
            participant: id.clone(),
            kills,
        })
        .collect()
}
