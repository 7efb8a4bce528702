use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::telemetry::InvariantViolation;
use crate::ParticipantId;

/// This enum contains all error messages the engine can return. Every engine operation returns an
/// [`EngineResult`], and every failure is recovered at the operation boundary into one of these.
///
/// [`EngineResult`]: crate::EngineResult
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The participant is not in the roster.
    NotFound {
        /// The identity that was looked up.
        participant: ParticipantId,
    },
    /// The participant has no active target: they were already eliminated, or they are the sole
    /// survivor.
    NoTarget {
        /// The participant without a target.
        participant: ParticipantId,
    },
    /// The presented secret word does not match. Nothing was mutated.
    WordMismatch {
        /// The participant who presented the word.
        participant: ParticipantId,
    },
    /// Undo or rollback was requested but the kill log is empty.
    EmptyHistory,
    /// The transaction lock could not be acquired within the configured timeout. Retrying later
    /// is safe; no state was changed.
    Contention {
        /// Which operation or lock timed out.
        context: String,
    },
    /// The ring or the kill log was found in an inconsistent state before a mutation. The
    /// operation was aborted and nothing was repaired.
    InvariantViolation {
        /// The broken invariant.
        violation: InvariantViolation,
    },
    /// You made an invalid request, usually by passing malformed arguments.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// The backing store failed for a reason other than lock contention.
    Storage {
        /// A description of the storage failure.
        context: String,
    },
}

impl EngineError {
    /// Returns `true` for the ordinary, user-facing outcomes of a game: unknown caller, no
    /// target, wrong word, nothing to undo. These are not faults and are never logged as errors.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::NoTarget { .. }
                | Self::WordMismatch { .. }
                | Self::EmptyHistory
        )
    }

    /// Returns `true` if the same call may succeed when retried unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    /// Returns `true` if an operator should be alerted instead of showing the caller a generic
    /// message.
    #[must_use]
    pub const fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::Contention { .. } | Self::InvariantViolation { .. } | Self::Storage { .. }
        )
    }

    pub(crate) fn invalid(info: impl Into<String>) -> Self {
        Self::InvalidRequest { info: info.into() }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotFound { participant } => {
                write!(f, "No such participant: {}", participant)
            }
            EngineError::NoTarget { participant } => {
                write!(
                    f,
                    "Participant {} has no target (already eliminated or already won)",
                    participant
                )
            }
            EngineError::WordMismatch { participant } => {
                write!(f, "Wrong secret word presented by {}", participant)
            }
            EngineError::EmptyHistory => {
                write!(f, "Nothing to undo: the kill log is empty.")
            }
            EngineError::Contention { context } => {
                write!(f, "Timed out waiting for the transaction lock: {}", context)
            }
            EngineError::InvariantViolation { violation } => {
                write!(f, "Invariant violation (operator attention required): {}", violation)
            }
            EngineError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            EngineError::Storage { context } => {
                write!(f, "Storage error: {}", context)
            }
        }
    }
}

impl Error for EngineError {}

impl From<InvariantViolation> for EngineError {
    fn from(violation: InvariantViolation) -> Self {
        EngineError::InvariantViolation { violation }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                EngineError::Contention {
                    context: err.to_string(),
                }
            }
            _ => EngineError::Storage {
                context: err.to_string(),
            },
        }
    }
}
