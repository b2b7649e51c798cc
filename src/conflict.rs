//! Conflict resolution: which enemy structures a new placement captures, and
//! what the placing player is awarded.
//!
//! The comparison rule is gameplay tuning, not mechanism — it lives behind
//! [`CapturePolicy`] so balance changes never touch the resolver itself.
//! Resolution is fully deterministic: no randomness, same inputs, same outcome.

use crate::catalog::Structure;
use crate::error::EngineError;
use crate::state::GameState;
use crate::types::{Position, StructureId};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Decides capture eligibility and award size for one attacker/defender pair.
pub trait CapturePolicy: Send + Sync {
    /// Should `defender` fall to the newly placed `attacker`? Only called
    /// for structures on a different team that touch the new footprint.
    fn captures(&self, attacker: &Structure, defender: &Structure) -> bool;

    /// Resources awarded to the placing player for one captured structure.
    fn award(&self, captured: &Structure) -> u64;
}

/// Default rule: the new structure captures any touching enemy structure
/// whose value does not exceed its own; each capture awards half the
/// captured structure's value, rounded down.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuePolicy;

impl CapturePolicy for ValuePolicy {
    fn captures(&self, attacker: &Structure, defender: &Structure) -> bool {
        attacker.value >= defender.value
    }

    fn award(&self, captured: &Structure) -> u64 {
        captured.value / 2
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// What one placement resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Structures whose ownership flipped to the capturer.
    pub captured: Vec<StructureId>,
    /// Captured structures that ended with no positions and were removed.
    pub removed: Vec<StructureId>,
    /// Total resources credited to the placing player.
    pub award: u64,
}

/// Resolve captures caused by the structure just inserted into the grid.
///
/// Scans only cells coincident with or neighboring the new footprint —
/// never the whole grid. Each capture flips the structure's team/player and
/// every one of its cells' controllers in one mutation section.
pub fn resolve_capture(
    state: &mut GameState,
    placed_id: &str,
    policy: &dyn CapturePolicy,
    now: u64,
) -> Result<CaptureOutcome, EngineError> {
    let attacker = state
        .structures
        .get(placed_id)
        .ok_or_else(|| EngineError::not_found("structure", placed_id))?
        .clone();

    // Footprint plus its 8-neighborhood.
    let mut scan: HashSet<Position> = attacker.positions.iter().copied().collect();
    for pos in &attacker.positions {
        scan.extend(pos.neighbors8());
    }

    // Distinct touching structures, deterministic order.
    let mut candidates: Vec<StructureId> = scan
        .iter()
        .filter_map(|pos| state.grid.get(*pos))
        .filter_map(|cell| cell.structure.clone())
        .filter(|id| id != placed_id)
        .collect();
    candidates.sort();
    candidates.dedup();

    let mut outcome = CaptureOutcome::default();
    for id in candidates {
        let Some(defender) = state.structures.get(&id) else {
            continue;
        };
        if defender.team == attacker.team || !policy.captures(&attacker, defender) {
            continue;
        }

        outcome.award += policy.award(defender);
        let emptied = defender.positions.is_empty();
        state.capture_structure(&id, &attacker.team, &attacker.player, now)?;
        log::debug!(
            "structure {id} captured by {} (game {})",
            attacker.player,
            state.id
        );

        if emptied {
            // Fully overlapped/destroyed: the structures map is the single
            // source of truth, so removal there clears any grid remnants.
            state.remove_structure(&id)?;
            outcome.removed.push(id.clone());
        }
        outcome.captured.push(id);
    }

    if outcome.award > 0 {
        if let Some(player) = state.players.get_mut(&attacker.player) {
            player.resources = player.resources.saturating_add(outcome.award);
        }
    }

    Ok(outcome)
}
