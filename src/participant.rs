//! Participant records and secret-word matching.

use serde::{Deserialize, Serialize};

use crate::ParticipantId;

/// A participant as stored in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique, stable identity.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Group affiliation (team, dorm, class...).
    pub group: String,
    /// The word that eliminates this participant when presented by their hunter.
    pub secret_word: String,
}

impl Participant {
    /// Creates a participant record, trimming every field.
    #[must_use]
    pub fn new(
        id: impl AsRef<str>,
        name: impl AsRef<str>,
        group: impl AsRef<str>,
        secret_word: impl AsRef<str>,
    ) -> Self {
        Self {
            id: ParticipantId::new(id),
            name: name.as_ref().trim().to_owned(),
            group: group.as_ref().trim().to_owned(),
            secret_word: secret_word.as_ref().trim().to_owned(),
        }
    }

    /// Returns `true` if `claimed` is this participant's secret word.
    #[must_use]
    pub fn word_matches(&self, claimed: &str) -> bool {
        words_match(&self.secret_word, claimed)
    }
}

/// Compares a stored secret word with a claimed one, ignoring surrounding whitespace and case.
///
/// A blank claim never matches, even against a blank stored word.
#[must_use]
pub fn words_match(stored: &str, claimed: &str) -> bool {
    let claimed = claimed.trim();
    !claimed.is_empty() && stored.trim().to_lowercase() == claimed.to_lowercase()
}

/// A participant together with their elimination status.
///
/// A participant is eliminated iff they are the victim of at least one surviving kill-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantStatus {
    /// The roster record.
    pub participant: Participant,
    /// Whether a surviving log entry eliminated them.
    pub eliminated: bool,
}

/// A hunter's current target, joined with the target's roster record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    /// The hunter the lookup was made for.
    pub hunter: ParticipantId,
    /// The target's roster record.
    pub target: Participant,
}

impl TargetInfo {
    /// Returns `true` if the hunter is targeting themselves, i.e. they won.
    #[must_use]
    pub fn is_self(&self) -> bool {
        self.hunter == self.target.id
    }
}

/// One row of the initial roster supplied by bulk import:
/// `(participant_id, name, group, initial_target_id, secret_word)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRow {
    /// The participant's record.
    pub participant: Participant,
    /// Who they hunt at the start of the game.
    pub target: ParticipantId,
}

impl RosterRow {
    /// Builds a row from raw (untrimmed) import fields.
    #[must_use]
    pub fn new(
        id: impl AsRef<str>,
        name: impl AsRef<str>,
        group: impl AsRef<str>,
        target: impl AsRef<str>,
        secret_word: impl AsRef<str>,
    ) -> Self {
        Self {
            participant: Participant::new(id, name, group, secret_word),
            target: ParticipantId::new(target),
        }
    }

    /// The same row with every field trimmed, for rows that did not come through [`new`](Self::new).
    #[must_use]
    pub fn normalized(&self) -> Self {
        let p = &self.participant;
        Self::new(&p.id, &p.name, &p.group, &self.target, &p.secret_word)
    }
}
