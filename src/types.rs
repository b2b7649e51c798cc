//! Core engine types shared across all modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub type GameId = String;
pub type PlayerId = String;
pub type TeamId = String;
pub type StructureId = String;

// ---------------------------------------------------------------------------
// Grid position
// ---------------------------------------------------------------------------

/// Integer cell coordinate on the game grid.
///
/// Serializes structurally; [`Position::key`] produces the stable
/// `"{x},{y}"` form used as a map key in snapshots.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Stable, collision-free map key for the supported coordinate range.
    pub fn key(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// Parse a `"{x},{y}"` key back into a position.
    pub fn from_key(key: &str) -> Option<Self> {
        let (x, y) = key.split_once(',')?;
        Some(Self {
            x: x.parse().ok()?,
            y: y.parse().ok()?,
        })
    }

    /// The eight surrounding cells (Chebyshev distance 1).
    pub fn neighbors8(&self) -> [Position; 8] {
        let (x, y) = (self.x, self.y);
        [
            Position::new(x - 1, y - 1),
            Position::new(x, y - 1),
            Position::new(x + 1, y - 1),
            Position::new(x - 1, y),
            Position::new(x + 1, y),
            Position::new(x - 1, y + 1),
            Position::new(x, y + 1),
            Position::new(x + 1, y + 1),
        ]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// Closed set of terrain types a generated cell can hold.
///
/// Immutable once generated for a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainType {
    #[default]
    Plains,
    Forest,
    Hills,
    Mountain,
    Desert,
    Swamp,
    River,
    Ocean,
}

impl TerrainType {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Plains => "Plains",
            Self::Forest => "Forest",
            Self::Hills => "Hills",
            Self::Mountain => "Mountain",
            Self::Desert => "Desert",
            Self::Swamp => "Swamp",
            Self::River => "River",
            Self::Ocean => "Ocean",
        }
    }

    pub fn is_water(self) -> bool {
        matches!(self, Self::River | Self::Ocean)
    }

    pub const fn all() -> [Self; 8] {
        [
            Self::Plains,
            Self::Forest,
            Self::Hills,
            Self::Mountain,
            Self::Desert,
            Self::Swamp,
            Self::River,
            Self::Ocean,
        ]
    }
}

/// Per-biome frequency knobs, 0–200 scale.
///
/// 50 = standard frequency, 100 = doubled, 200 = quadrupled. 0 is a hard
/// exclusion: the terrain type never appears, regardless of noise values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainWeights {
    pub forest: u32,
    pub hills: u32,
    pub mountain: u32,
    pub desert: u32,
    pub swamp: u32,
    pub water: u32,
}

impl TerrainWeights {
    pub const MAX: u32 = 200;

    /// Clamp every knob into the documented 0–200 range.
    pub fn clamped(self) -> Self {
        Self {
            forest: self.forest.min(Self::MAX),
            hills: self.hills.min(Self::MAX),
            mountain: self.mountain.min(Self::MAX),
            desert: self.desert.min(Self::MAX),
            swamp: self.swamp.min(Self::MAX),
            water: self.water.min(Self::MAX),
        }
    }

    /// Convert a knob value to its frequency multiplier (50 → 1.0).
    pub fn multiplier(weight: u32) -> f64 {
        f64::from(weight) / 50.0
    }
}

impl Default for TerrainWeights {
    fn default() -> Self {
        Self {
            forest: 50,
            hills: 50,
            mountain: 50,
            desert: 50,
            swamp: 50,
            water: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Grid cells & bounds
// ---------------------------------------------------------------------------

/// Sparse occupancy entry for one grid position.
///
/// Cells with no entity are simply absent from the grid map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub structure: Option<StructureId>,
    pub team: TeamId,
    pub visible: bool,
}

impl GridCell {
    pub fn occupied(structure: impl Into<StructureId>, team: impl Into<TeamId>) -> Self {
        Self {
            structure: Some(structure.into()),
            team: team.into(),
            visible: true,
        }
    }
}

/// Running min/max of ever-occupied cells.
///
/// Grows monotonically outward; used for display and statistics, never for
/// validity enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl GridBounds {
    pub fn at(pos: Position) -> Self {
        Self {
            min_x: pos.x,
            min_y: pos.y,
            max_x: pos.x,
            max_y: pos.y,
        }
    }

    pub fn extend(&mut self, pos: Position) {
        self.min_x = self.min_x.min(pos.x);
        self.min_y = self.min_y.min(pos.y);
        self.max_x = self.max_x.max(pos.x);
        self.max_y = self.max_y.max(pos.y);
    }
}

// ---------------------------------------------------------------------------
// Players & teams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub team: TeamId,
    pub color: String,
    /// Resource balance. Never goes below zero: placement costs are
    /// validated before subtraction, capture awards only add.
    pub resources: u64,
    pub online: bool,
    pub last_seen: u64,
}

impl Player {
    pub fn new(
        id: impl Into<PlayerId>,
        display_name: impl Into<String>,
        team: impl Into<TeamId>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            team: team.into(),
            color: "#ffffff".into(),
            resources: 0,
            online: true,
            last_seen: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    /// Kept sorted so serialized membership is order-stable.
    pub members: BTreeSet<PlayerId>,
}

impl Team {
    pub fn new(id: impl Into<TeamId>) -> Self {
        Self {
            id: id.into(),
            members: BTreeSet::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Game lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Waiting,
    Active,
    Paused,
    Ended,
}

impl GamePhase {
    /// Legal phase transitions: waiting → active ⇄ paused → ended.
    pub fn can_transition(self, next: GamePhase) -> bool {
        matches!(
            (self, next),
            (GamePhase::Waiting, GamePhase::Active)
                | (GamePhase::Active, GamePhase::Paused)
                | (GamePhase::Paused, GamePhase::Active)
                | (GamePhase::Active, GamePhase::Ended)
                | (GamePhase::Paused, GamePhase::Ended)
        )
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    pub name: String,
    pub map_width: u32,
    pub map_height: u32,
    /// Terrain seed; fixed at game creation, terrain is never regenerated.
    pub seed: u64,
    pub weights: TerrainWeights,
    /// Metadata refresh cadence in milliseconds.
    pub tick_interval_ms: u64,
    pub max_players: usize,
    /// Minutes of active play before the win condition is evaluated.
    pub win_condition_minutes: u32,
    /// Resources granted to a player on join.
    pub starting_resources: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            name: "game".into(),
            map_width: 100,
            map_height: 100,
            seed: 42,
            weights: TerrainWeights::default(),
            tick_interval_ms: 5_000,
            max_players: 64,
            win_condition_minutes: 30,
            starting_resources: 100,
        }
    }
}

/// Lightweight per-game metadata delta sent to game rooms and the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub game_id: GameId,
    pub player_count: usize,
    pub active_player_count: usize,
    pub status: GamePhase,
    pub map_width: u32,
    pub map_height: u32,
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
