//! The assignment ring as an explicit graph.
//!
//! The store keeps the ring as independent `hunter -> target` rows; nothing in a schema can say
//! "these rows form one cycle". [`Ring`] loads those rows into an adjacency map so the cycle can be
//! checked, and the two mutations the game needs are modelled as values:
//!
//! - [`Shortcut`]: remove a node by pointing its predecessor at its successor (an elimination),
//! - [`Splice`]: the exact inverse, putting the node back between the same two neighbours.
//!
//! Both apply the removal and the reconnection together, either to an in-memory [`Ring`] or to a
//! store transaction, so no caller ever sees a ring with a dangling edge.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::store::RingTx;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::{EngineResult, ParticipantId};

/// One `hunter -> target` edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// The participant doing the hunting.
    pub hunter: ParticipantId,
    /// Who they are hunting.
    pub target: ParticipantId,
}

impl Assignment {
    /// Creates an edge.
    #[must_use]
    pub fn new(hunter: impl Into<ParticipantId>, target: impl Into<ParticipantId>) -> Self {
        Self {
            hunter: hunter.into(),
            target: target.into(),
        }
    }
}

/// Removal of `eliminated` from the ring: `hunter -> eliminated -> successor` becomes
/// `hunter -> successor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortcut {
    /// The predecessor that inherits the successor.
    pub hunter: ParticipantId,
    /// The node leaving the ring.
    pub eliminated: ParticipantId,
    /// The node `eliminated` was hunting.
    pub successor: ParticipantId,
}

impl Shortcut {
    /// The splice that undoes this shortcut.
    #[must_use]
    pub fn inverse(&self) -> Splice {
        Splice {
            hunter: self.hunter.clone(),
            restored: self.eliminated.clone(),
            successor: self.successor.clone(),
        }
    }

    /// Applies the shortcut to a store transaction.
    ///
    /// The victim's edge is deleted before the hunter is re-pointed, so a store enforcing
    /// unique targets never sees two edges into `successor`.
    pub fn apply_to(&self, tx: &mut dyn RingTx) -> EngineResult<()> {
        tx.remove_assignment(&self.eliminated)?;
        tx.retarget(&self.hunter, &self.successor)
    }
}

/// Re-insertion of `restored` between `hunter` and `successor`: `hunter -> successor` becomes
/// `hunter -> restored -> successor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Splice {
    /// The node whose edge is redirected back to `restored`.
    pub hunter: ParticipantId,
    /// The node re-entering the ring.
    pub restored: ParticipantId,
    /// The node `hunter` currently targets, which `restored` will target again.
    pub successor: ParticipantId,
}

impl Splice {
    /// Applies the splice to a store transaction.
    pub fn apply_to(&self, tx: &mut dyn RingTx) -> EngineResult<()> {
        tx.retarget(&self.hunter, &self.restored)?;
        tx.insert_assignment(&self.restored, &self.successor)
    }
}

/// The current ring, loaded into memory.
///
/// Keeps both directions of every edge so predecessor lookups are as cheap as successor ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ring {
    targets: BTreeMap<ParticipantId, ParticipantId>,
    hunters: BTreeMap<ParticipantId, ParticipantId>,
}

impl Ring {
    /// Creates an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ring from edges. Fails if a hunter has two edges or a target is hunted twice;
    /// it does not check the single-cycle property (use [`InvariantChecker::check_invariants`]).
    pub fn from_assignments(
        assignments: impl IntoIterator<Item = Assignment>,
    ) -> Result<Self, InvariantViolation> {
        let mut ring = Self::new();
        for Assignment { hunter, target } in assignments {
            if ring.targets.contains_key(&hunter) {
                return Err(InvariantViolation::new("Ring", "hunter has two outgoing edges")
                    .with_details(format!("hunter={}", hunter)));
            }
            if let Some(existing) = ring.hunters.get(&target) {
                return Err(InvariantViolation::new("Ring", "target is hunted twice")
                    .with_details(format!(
                        "target={}, hunters={} and {}",
                        target, existing, hunter
                    )));
            }
            ring.hunters.insert(target.clone(), hunter.clone());
            ring.targets.insert(hunter, target);
        }
        Ok(ring)
    }

    /// Number of active participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` if nobody is in the ring.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns `true` if `id` has an outgoing edge.
    #[must_use]
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.targets.contains_key(id)
    }

    /// Who `hunter` is hunting.
    #[must_use]
    pub fn target_of(&self, hunter: &ParticipantId) -> Option<&ParticipantId> {
        self.targets.get(hunter)
    }

    /// Who is hunting `target`.
    #[must_use]
    pub fn hunter_of(&self, target: &ParticipantId) -> Option<&ParticipantId> {
        self.hunters.get(target)
    }

    /// The sole survivor, if the ring has collapsed to a self-loop.
    #[must_use]
    pub fn winner(&self) -> Option<&ParticipantId> {
        match self.targets.iter().next() {
            Some((hunter, target)) if self.targets.len() == 1 && hunter == target => Some(hunter),
            _ => None,
        }
    }

    /// All edges, ordered by hunter.
    #[must_use]
    pub fn assignments(&self) -> Vec<Assignment> {
        self.targets
            .iter()
            .map(|(hunter, target)| Assignment::new(hunter.clone(), target.clone()))
            .collect()
    }

    /// The participants reached by following targets from `start`, starting with `start` and
    /// stopping before it repeats (or at a missing edge). Bounded by the ring size.
    #[must_use]
    pub fn walk_from(&self, start: &ParticipantId) -> Vec<ParticipantId> {
        let mut visited = Vec::new();
        if !self.contains(start) {
            return visited;
        }
        let mut current = start;
        for _ in 0..self.len() {
            visited.push(current.clone());
            match self.targets.get(current) {
                Some(next) if next != start => current = next,
                _ => break,
            }
        }
        visited
    }

    /// Plans the removal of `eliminated`.
    ///
    /// The sole survivor cannot be removed: with a self-loop there is nobody to inherit.
    pub fn plan_shortcut(&self, eliminated: &ParticipantId) -> Result<Shortcut, InvariantViolation> {
        let successor = self.targets.get(eliminated).ok_or_else(|| {
            InvariantViolation::new("Ring", "eliminated participant has no outgoing edge")
                .with_details(format!("eliminated={}", eliminated))
        })?;
        let hunter = self.hunters.get(eliminated).ok_or_else(|| {
            InvariantViolation::new("Ring", "eliminated participant has no hunter")
                .with_details(format!("eliminated={}", eliminated))
        })?;
        if hunter == eliminated {
            return Err(InvariantViolation::new("Ring", "cannot remove the sole survivor")
                .with_details(format!("survivor={}", eliminated)));
        }
        Ok(Shortcut {
            hunter: hunter.clone(),
            eliminated: eliminated.clone(),
            successor: successor.clone(),
        })
    }

    /// Applies a shortcut, after checking that it matches the current edges.
    pub fn apply_shortcut(&mut self, shortcut: &Shortcut) -> Result<(), InvariantViolation> {
        let Shortcut {
            hunter,
            eliminated,
            successor,
        } = shortcut;
        if self.targets.get(hunter) != Some(eliminated) {
            return Err(InvariantViolation::new("Ring", "shortcut hunter does not target victim")
                .with_details(format!("hunter={}, eliminated={}", hunter, eliminated)));
        }
        if self.targets.get(eliminated) != Some(successor) || hunter == eliminated {
            return Err(InvariantViolation::new("Ring", "shortcut successor mismatch")
                .with_details(format!("eliminated={}, successor={}", eliminated, successor)));
        }
        self.targets.remove(eliminated);
        self.hunters.remove(successor);
        self.hunters.remove(eliminated);
        self.targets.insert(hunter.clone(), successor.clone());
        self.hunters.insert(successor.clone(), hunter.clone());
        Ok(())
    }

    /// Plans the re-insertion of `restored` right after `hunter`.
    pub fn plan_splice(
        &self,
        hunter: &ParticipantId,
        restored: &ParticipantId,
    ) -> Result<Splice, InvariantViolation> {
        if self.contains(restored) {
            return Err(InvariantViolation::new("Ring", "restored participant is still active")
                .with_details(format!("restored={}", restored)));
        }
        let successor = self.targets.get(hunter).ok_or_else(|| {
            InvariantViolation::new("Ring", "hunter of undone kill is not active")
                .with_details(format!("hunter={}", hunter))
        })?;
        Ok(Splice {
            hunter: hunter.clone(),
            restored: restored.clone(),
            successor: successor.clone(),
        })
    }

    /// Applies a splice, after checking that it matches the current edges.
    pub fn apply_splice(&mut self, splice: &Splice) -> Result<(), InvariantViolation> {
        let Splice {
            hunter,
            restored,
            successor,
        } = splice;
        if self.contains(restored) || self.targets.get(hunter) != Some(successor) {
            return Err(InvariantViolation::new("Ring", "splice does not match current edges")
                .with_details(format!(
                    "hunter={}, restored={}, successor={}",
                    hunter, restored, successor
                )));
        }
        self.targets.insert(hunter.clone(), restored.clone());
        self.hunters.insert(restored.clone(), hunter.clone());
        self.targets.insert(restored.clone(), successor.clone());
        self.hunters.insert(successor.clone(), restored.clone());
        Ok(())
    }

    /// Checks that the ring's nodes are exactly `active`: nobody eliminated still holds an edge,
    /// and nobody still alive has lost theirs.
    pub fn check_active_set(
        &self,
        active: &BTreeSet<ParticipantId>,
    ) -> Result<(), InvariantViolation> {
        if let Some(extra) = self.targets.keys().find(|id| !active.contains(*id)) {
            return Err(
                InvariantViolation::new("Ring", "eliminated or unknown participant holds an edge")
                    .with_details(format!("participant={}", extra)),
            );
        }
        if let Some(missing) = active.iter().find(|id| !self.targets.contains_key(*id)) {
            return Err(
                InvariantViolation::new("Ring", "active participant has no outgoing edge")
                    .with_details(format!("participant={}", missing)),
            );
        }
        Ok(())
    }
}

impl InvariantChecker for Ring {
    /// Checks the invariants of the ring.
    ///
    /// # Invariants
    ///
    /// 1. The reverse index mirrors the forward edges (in-degree 1 for every node)
    /// 2. Every target is itself a node (no edge leaves the active set)
    /// 3. Following targets from any node visits every node exactly once before returning
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.hunters.len() != self.targets.len() {
            return Err(InvariantViolation::new("Ring", "in-degree and out-degree disagree")
                .with_details(format!(
                    "edges={}, hunted={}",
                    self.targets.len(),
                    self.hunters.len()
                )));
        }

        if let Some((hunter, target)) = self
            .targets
            .iter()
            .find(|(_, target)| !self.targets.contains_key(*target))
        {
            return Err(InvariantViolation::new("Ring", "edge points outside the active set")
                .with_details(format!("{} -> {}", hunter, target)));
        }

        let Some(start) = self.targets.keys().next() else {
            return Ok(());
        };
        let cycle = self.walk_from(start);
        if cycle.len() != self.len() {
            return Err(InvariantViolation::new("Ring", "ring is not a single cycle")
                .with_details(format!(
                    "cycle through {} covers {} of {} participants",
                    start,
                    cycle.len(),
                    self.len()
                )));
        }
        Ok(())
    }
}
