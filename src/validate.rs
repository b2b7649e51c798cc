//! Placement validation: a pure decision function over the current state.
//!
//! Validation never mutates anything, so it can be invoked speculatively —
//! the mutation happens only in the resolver/manager step after acceptance.

use crate::catalog::{normalize_shape, rotate_shape, StructureCatalog, StructureKind, StructureTemplate};
use crate::error::RejectReason;
use crate::state::GameState;
use crate::types::Position;

/// Generic sanity bound: coordinates beyond this magnitude are rejected
/// regardless of map size, guarding against integer abuse.
pub const COORDINATE_LIMIT: i32 = 1_000_000;

/// Maximum chat message length in characters.
pub const CHAT_MAX_CHARS: usize = 500;

/// Decide whether a place-structure action is legal. Every check must pass;
/// on success the matched template is returned for the manager to instantiate.
pub fn validate_placement<'a>(
    state: &GameState,
    catalog: &'a StructureCatalog,
    player_id: &str,
    kind: StructureKind,
    positions: &[Position],
    rotation: u8,
) -> Result<&'a StructureTemplate, RejectReason> {
    let player = state
        .players
        .get(player_id)
        .ok_or_else(|| RejectReason::PlayerNotFound(player_id.into()))?;
    if !player.online {
        return Err(RejectReason::PlayerOffline(player_id.into()));
    }

    if rotation > 3 {
        return Err(RejectReason::InvalidRotation(rotation));
    }

    let template = catalog
        .get(kind)
        .ok_or(RejectReason::UnknownStructureType)?;

    if positions.is_empty() {
        return Err(RejectReason::MalformedAction("no target positions".into()));
    }

    let (w, h) = (
        state.settings.map_width as i64,
        state.settings.map_height as i64,
    );
    for &pos in positions {
        if pos.x.unsigned_abs() > COORDINATE_LIMIT as u32
            || pos.y.unsigned_abs() > COORDINATE_LIMIT as u32
        {
            return Err(RejectReason::CoordinateOverflow(pos));
        }
        if pos.x < 0 || pos.y < 0 || i64::from(pos.x) >= w || i64::from(pos.y) >= h {
            return Err(RejectReason::OutOfBounds(pos));
        }
    }

    // The requested rotation's transform of the canonical shape must equal
    // the requested target set once both are origin-normalized. Duplicate
    // targets collapse under normalization and fail the length comparison.
    let requested = normalize_shape(positions);
    let expected = rotate_shape(&template.shape, rotation);
    if requested != expected {
        return Err(RejectReason::ShapeMismatch);
    }

    // Overlap with any existing structure. Occupied-by-self is impossible
    // here: this is a create action.
    for &pos in positions {
        if state.grid.get(pos).is_some() {
            return Err(RejectReason::CellOccupied(pos));
        }
    }

    if player.resources < template.cost {
        return Err(RejectReason::InsufficientResources {
            have: player.resources,
            need: template.cost,
        });
    }

    Ok(template)
}

/// Chat constraints: non-empty, at most [`CHAT_MAX_CHARS`] characters.
/// Delivery itself is outside this core.
pub fn validate_chat(message: &str) -> Result<(), RejectReason> {
    if message.trim().is_empty() {
        return Err(RejectReason::MalformedAction("empty chat message".into()));
    }
    if message.chars().count() > CHAT_MAX_CHARS {
        return Err(RejectReason::MalformedAction(format!(
            "chat message exceeds {CHAT_MAX_CHARS} characters"
        )));
    }
    Ok(())
}
