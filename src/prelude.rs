//! Convenient re-exports for common usage.
//!
//! ```rust
//! use sockwars_ring::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Engine**: [`RingEngine`], [`EngineBuilder`], [`Elimination`]
//! - **Stores**: [`RingStore`], [`MemoryStore`], [`SqliteStore`]
//! - **Configuration**: [`EngineConfig`], [`StoreConfig`], [`GameMode`]
//! - **Records**: [`Participant`], [`ParticipantStatus`], [`TargetInfo`], [`RosterRow`],
//!   [`KillEntry`], [`KillSummary`], [`KillCause`], [`DateRange`], [`Assignment`]
//! - **Identifiers**: [`ParticipantId`], [`KillId`]
//! - **Error handling**: [`EngineError`], [`EngineResult`]
//!
//! # Example
//!
//! ```rust
//! use sockwars_ring::prelude::*;
//!
//! # fn main() -> EngineResult<()> {
//! let engine = EngineBuilder::new().build(MemoryStore::new())?;
//! engine.import_roster(&[
//!     RosterRow::new("a", "Ada", "red", "b", "wa"),
//!     RosterRow::new("b", "Bo", "blue", "a", "wb"),
//! ])?;
//!
//! let kill = engine.eliminate(&ParticipantId::new("a"), "wb")?;
//! assert!(kill.is_final());
//! assert_eq!(engine.winner()?.map(|p| p.name), Some("Ada".to_owned()));
//! # Ok(())
//! # }
//! ```

pub use crate::{
    Assignment, DateRange, Elimination, EngineBuilder, EngineConfig, EngineError, EngineResult,
    GameMode, KillCause, KillEntry, KillId, KillSummary, MemoryStore, Participant, ParticipantId,
    ParticipantStatus, RingEngine, RingStore, RosterRow, SqliteStore, StoreConfig, TargetInfo,
};
