//! Client ↔ engine wire vocabulary.
//!
//! This module owns every logical message that crosses the engine boundary.
//! Framing and encoding belong to the transport layer; these types only fix
//! the message shapes and their ordering/consistency guarantees.
//!
//! ## Message flow
//!
//! | Direction       | Type                  | Carried as            |
//! |-----------------|-----------------------|-----------------------|
//! | client → engine | [`Action`]            | tagged union, `kind`  |
//! | engine → client | [`EventEnvelope`]     | per-game, seq-stamped |
//! | engine → client | [`ActionAck`]         | acting session only   |
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. The action vocabulary is a closed tagged union — the validator handles
//!    every kind exhaustively at compile time.
//! 3. Every outbound event carries the game id and the mutation `seq` that
//!    produced it, so per-session delivery order can mirror mutation order.

use crate::catalog::Structure;
use crate::state::SnapshotEnvelope;
use crate::types::{GameId, GameMetadata, PlayerId, Position, StructureId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Actions (client → engine)
// ---------------------------------------------------------------------------

/// Everything a client can ask the engine to do to a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    PlaceStructure {
        structure_type: crate::catalog::StructureKind,
        positions: Vec<Position>,
        rotation: u8,
    },
    RemoveStructure {
        structure_id: StructureId,
    },
    /// Validated here (non-empty, ≤ 500 chars); delivery is the transport's.
    ChatMessage {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Acknowledgement (engine → acting session)
// ---------------------------------------------------------------------------

/// Definitive success/failure response for one submitted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    pub accepted: bool,
    /// Mutation sequence assigned on acceptance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Machine-readable rejection code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable rejection message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionAck {
    pub fn accepted(seq: u64) -> Self {
        Self {
            accepted: true,
            seq: Some(seq),
            reason: None,
            message: None,
        }
    }

    pub fn rejected(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            seq: None,
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }

    /// Map an engine failure to its definitive rejection response: the
    /// machine-readable code plus the human-readable message.
    pub fn from_error(error: &crate::error::EngineError) -> Self {
        Self::rejected(error.code(), error.to_string())
    }
}

// ---------------------------------------------------------------------------
// Events (engine → subscribers)
// ---------------------------------------------------------------------------

/// Every outbound message is wrapped in this envelope.
///
/// `seq` is the per-game mutation counter at emission time; a session must
/// observe envelopes for one game in non-decreasing `seq` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub game: GameId,
    pub seq: u64,
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn new(game: impl Into<GameId>, seq: u64, payload: EventPayload) -> Self {
        Self {
            game: game.into(),
            seq,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full-state snapshot, sent once when a session newly joins a game.
    /// Includes the dense terrain array.
    Snapshot { snapshot: Box<SnapshotEnvelope> },
    /// A structure was placed; lists any captures it caused.
    StructurePlaced {
        structure: Structure,
        captured: Vec<StructureId>,
        award: u64,
    },
    StructureRemoved { structure_id: StructureId },
    PlayerJoined { player: PlayerId },
    PlayerLeft { player: PlayerId },
    /// Lightweight delta for game rooms and the lobby.
    Metadata { metadata: GameMetadata },
    Chat { player: PlayerId, message: String },
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

/// Transport subjects used by the engine protocol, as constants.
pub mod subjects {
    pub const SNAPSHOT: &str = "game.snapshot";

    pub const STRUCTURE_PLACED: &str = "game.structure.placed";
    pub const STRUCTURE_REMOVED: &str = "game.structure.removed";

    pub const PLAYER_JOINED: &str = "game.player.joined";
    pub const PLAYER_LEFT: &str = "game.player.left";

    pub const METADATA: &str = "game.metadata";
    pub const CHAT: &str = "game.chat";

    pub const ACTION_ACK: &str = "game.action.ack";
}
