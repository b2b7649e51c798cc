//! Territory Engine
//!
//! Authoritative game state & territory conflict core for the shared-grid
//! strategy server.
//!
//! ## Architecture
//!
//! ```text
//! Broadcaster  (broadcast.rs)  ← rooms, lobby, session fan-out
//!   └── GameManager  (manager.rs)  ← per-game serialization, persistence
//!         ├── validate_placement  (validate.rs)
//!         ├── resolve_capture  (conflict.rs)
//!         └── GameState  (state.rs)  ← aggregate root
//!               ├── TerrainGrid  (terrain.rs)
//!               ├── SpatialGrid  (grid.rs)
//!               └── StructureCatalog  (catalog.rs)
//! ```
//!
//! `GameManager` owns one authoritative state per active game and is the
//! only mutation path; persistence is write-through to the
//! [`store::SnapshotCache`] collaborator. `Broadcaster` translates accepted
//! mutations into events for exactly the subscribed sessions.

// Protocol and simulation types are always available (no server feature
// needed) so clients can embed them.
pub mod catalog;
pub mod conflict;
pub mod error;
pub mod grid;
pub mod protocol;
pub mod state;
pub mod terrain;
pub mod types;
pub mod validate;

// Server-side modules require the `server` feature.
#[cfg(feature = "server")]
pub mod broadcast;
#[cfg(feature = "server")]
pub mod manager;
#[cfg(feature = "server")]
pub mod store;

// Convenience re-exports
pub use catalog::{Structure, StructureCatalog, StructureKind, StructureTemplate};
pub use conflict::{CapturePolicy, ValuePolicy};
pub use error::{EngineError, RejectReason};
pub use grid::SpatialGrid;
pub use protocol::{Action, ActionAck, EventEnvelope, EventPayload};
pub use state::{GameState, SnapshotEnvelope};
pub use terrain::{TerrainGenerator, TerrainGrid};
pub use types::{
    GameId, GameMetadata, GamePhase, GameSettings, GridCell, Player, PlayerId, Position, Team,
    TeamId, TerrainType, TerrainWeights,
};

// Server-only re-exports
#[cfg(feature = "server")]
pub use broadcast::{BroadcastTransport, Broadcaster, ChannelTransport};
#[cfg(feature = "server")]
pub use manager::{EngineConfig, GameManager};
#[cfg(feature = "server")]
pub use store::{DurableStore, MemoryCache, MemoryStore, SnapshotCache};
