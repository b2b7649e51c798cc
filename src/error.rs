//! Engine error taxonomy.
//!
//! Validator and resolver report structured outcomes rather than panicking;
//! the manager maps every failure to a caller-visible rejection carrying a
//! machine-readable code plus a human-readable message.

use crate::types::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a placement (or other action) was rejected. Produces zero mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("player {0} not found in this game")]
    PlayerNotFound(String),
    #[error("player {0} is not online")]
    PlayerOffline(String),
    #[error("rotation {0} is outside 0..=3")]
    InvalidRotation(u8),
    #[error("unknown structure type")]
    UnknownStructureType,
    #[error("position {0} is outside the map bounds")]
    OutOfBounds(Position),
    #[error("position {0} exceeds the supported coordinate range")]
    CoordinateOverflow(Position),
    #[error("target positions do not match the template shape at the requested rotation")]
    ShapeMismatch,
    #[error("position {0} is already occupied")]
    CellOccupied(Position),
    #[error("insufficient resources: have {have}, need {need}")]
    InsufficientResources { have: u64, need: u64 },
    #[error("malformed action: {0}")]
    MalformedAction(String),
}

impl RejectReason {
    /// Stable machine-readable code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlayerNotFound(_) => "player_not_found",
            Self::PlayerOffline(_) => "player_offline",
            Self::InvalidRotation(_) => "invalid_rotation",
            Self::UnknownStructureType => "unknown_structure_type",
            Self::OutOfBounds(_) => "out_of_bounds",
            Self::CoordinateOverflow(_) => "coordinate_overflow",
            Self::ShapeMismatch => "shape_mismatch",
            Self::CellOccupied(_) => "cell_occupied",
            Self::InsufficientResources { .. } => "insufficient_resources",
            Self::MalformedAction(_) => "malformed_action",
        }
    }
}

/// Top-level engine failure classes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Recoverable; reported to the acting session only.
    #[error("validation failed: {0}")]
    Validation(#[from] RejectReason),

    /// Referenced game, structure, or player is absent.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Action targets a resource the acting player does not own.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Join rejected: game at its configured player cap.
    #[error("game {game} is full ({max} players)")]
    Capacity { game: String, max: usize },

    /// Broken cell/structure cross-reference found by the integrity sweep.
    /// Indicates a programming defect; the offending operation halts.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Write-through persistence failed after bounded retries; the
    /// in-memory mutation has been rolled back.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Machine-readable reason code mirrored onto the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(r) => r.code(),
            Self::NotFound { .. } => "not_found",
            Self::Authorization(_) => "not_authorized",
            Self::Capacity { .. } => "game_full",
            Self::Consistency(_) => "consistency_violation",
            Self::Persistence(_) => "persistence_failed",
        }
    }
}
