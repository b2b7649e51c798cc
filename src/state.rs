//! Authoritative per-game state: the aggregate root owning players, teams,
//! structures, the sparse grid, and the dense terrain array — plus the
//! explicit versioned snapshot schema used by write-through persistence.

use crate::catalog::Structure;
use crate::error::EngineError;
use crate::grid::SpatialGrid;
use crate::terrain::TerrainGrid;
use crate::types::{
    GameId, GameMetadata, GamePhase, GameSettings, GridBounds, GridCell, Player, PlayerId,
    Position, StructureId, Team, TeamId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Bump when the snapshot schema changes shape.
pub const SNAPSHOT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// One game's authoritative in-memory state.
///
/// Exclusively owns its players, teams, structures, and grid. Structures are
/// referenced by grid cells but their lifetime is governed solely by the
/// structures map: removal from that map is the single deletion point, and
/// grid cells are cleared as a consequence.
#[derive(Debug, Clone)]
pub struct GameState {
    pub id: GameId,
    pub phase: GamePhase,
    pub settings: GameSettings,
    pub players: HashMap<PlayerId, Player>,
    pub teams: HashMap<TeamId, Team>,
    pub structures: HashMap<StructureId, Structure>,
    pub grid: SpatialGrid,
    /// Generated once at creation, immutable thereafter.
    pub terrain: TerrainGrid,
    pub created_at: u64,
    pub updated_at: u64,
    /// Mutation counter; stamps every broadcast so delivery order can match
    /// server-side mutation order.
    pub seq: u64,
}

impl GameState {
    pub fn new(id: impl Into<GameId>, settings: GameSettings, terrain: TerrainGrid, now: u64) -> Self {
        Self {
            id: id.into(),
            phase: GamePhase::Waiting,
            settings,
            players: HashMap::new(),
            teams: HashMap::new(),
            structures: HashMap::new(),
            grid: SpatialGrid::new(),
            terrain,
            created_at: now,
            updated_at: now,
            seq: 0,
        }
    }

    pub fn metadata(&self) -> GameMetadata {
        GameMetadata {
            game_id: self.id.clone(),
            player_count: self.players.len(),
            active_player_count: self.players.values().filter(|p| p.online).count(),
            status: self.phase,
            map_width: self.settings.map_width,
            map_height: self.settings.map_height,
        }
    }

    pub fn touch(&mut self, now: u64) {
        self.updated_at = now;
        self.seq += 1;
    }

    // -----------------------------------------------------------------------
    // Phase
    // -----------------------------------------------------------------------

    pub fn set_phase(&mut self, next: GamePhase) -> Result<(), EngineError> {
        if !self.phase.can_transition(next) {
            return Err(EngineError::Validation(
                crate::error::RejectReason::MalformedAction(format!(
                    "illegal phase transition {} -> {}",
                    self.phase, next
                )),
            ));
        }
        self.phase = next;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Players & teams
    // -----------------------------------------------------------------------

    /// Insert a player and register them with their team, creating the team
    /// on first sight. Capacity is the manager's concern, not this method's.
    pub fn add_player(&mut self, player: Player) {
        self.teams
            .entry(player.team.clone())
            .or_insert_with(|| Team::new(player.team.clone()))
            .members
            .insert(player.id.clone());
        self.players.insert(player.id.clone(), player);
    }

    pub fn set_player_online(&mut self, player: &str, online: bool, now: u64) -> bool {
        match self.players.get_mut(player) {
            Some(p) => {
                p.online = online;
                p.last_seen = now;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Structures
    // -----------------------------------------------------------------------

    /// Insert a placed structure, writing every footprint cell.
    pub fn insert_structure(&mut self, structure: Structure) {
        for &pos in &structure.positions {
            self.grid
                .set(pos, GridCell::occupied(structure.id.clone(), structure.team.clone()));
        }
        self.grid.bounds_update(&structure.positions);
        self.structures.insert(structure.id.clone(), structure);
    }

    /// Remove a structure. Grid cells are cleared as a consequence of the
    /// map removal, never the other way around.
    pub fn remove_structure(&mut self, id: &str) -> Result<Structure, EngineError> {
        let structure = self
            .structures
            .remove(id)
            .ok_or_else(|| EngineError::not_found("structure", id))?;
        for &pos in &structure.positions {
            self.grid.delete(pos);
        }
        Ok(structure)
    }

    /// Transfer a structure to a new team/player and retarget every one of
    /// its occupied cells in the same operation, so no reader can observe
    /// the two halves disagreeing.
    pub fn capture_structure(
        &mut self,
        id: &str,
        team: &TeamId,
        player: &PlayerId,
        now: u64,
    ) -> Result<(), EngineError> {
        let structure = self
            .structures
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("structure", id))?;
        structure.team = team.clone();
        structure.player = player.clone();
        structure.updated_at = now;
        let positions = structure.positions.clone();
        for pos in positions {
            if let Some(cell) = self.grid.get(pos).cloned() {
                self.grid.set(
                    pos,
                    GridCell {
                        team: team.clone(),
                        ..cell
                    },
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    /// Full referential-integrity sweep: grid ↔ structures plus player ↔
    /// team membership, in one pass.
    pub fn validate_referential_integrity(&self) -> Result<(), EngineError> {
        self.grid.validate_consistency(&self.structures)?;

        let mut violations = Vec::new();
        for (id, player) in &self.players {
            match self.teams.get(&player.team) {
                None => violations.push(format!("player {id} references missing team {}", player.team)),
                Some(team) if !team.members.contains(id) => {
                    violations.push(format!("team {} does not list member {id}", player.team))
                }
                Some(_) => {}
            }
        }
        for (id, team) in &self.teams {
            for member in &team.members {
                if !self.players.contains_key(member) {
                    violations.push(format!("team {id} lists missing player {member}"));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Consistency(violations.join("; ")))
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn to_snapshot(&self) -> SnapshotEnvelope {
        let state = StateSnapshot {
            id: self.id.clone(),
            phase: self.phase,
            settings: self.settings.clone(),
            players: self.players.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            teams: self.teams.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            structures: self
                .structures
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            grid: self
                .grid
                .iter()
                .map(|(pos, cell)| (pos.key(), cell.clone()))
                .collect(),
            grid_bounds: self.grid.bounds(),
            terrain: self.terrain.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            seq: self.seq,
        };
        SnapshotEnvelope::seal(state)
    }

    pub fn from_snapshot(envelope: SnapshotEnvelope) -> Result<Self, EngineError> {
        envelope.verify()?;
        let state = envelope.state;

        let mut grid = SpatialGrid::new();
        for (key, cell) in state.grid {
            let pos = Position::from_key(&key).ok_or_else(|| {
                EngineError::Persistence(format!("unparseable grid key {key:?}"))
            })?;
            grid.set(pos, cell);
        }
        if let Some(bounds) = state.grid_bounds {
            grid.bounds_update(&[
                Position::new(bounds.min_x, bounds.min_y),
                Position::new(bounds.max_x, bounds.max_y),
            ]);
        }

        Ok(Self {
            id: state.id,
            phase: state.phase,
            settings: state.settings,
            players: state.players.into_iter().collect(),
            teams: state.teams.into_iter().collect(),
            structures: state.structures.into_iter().collect(),
            grid,
            terrain: state.terrain,
            created_at: state.created_at,
            updated_at: state.updated_at,
            seq: state.seq,
        })
    }
}

// ---------------------------------------------------------------------------
// Snapshot schema
// ---------------------------------------------------------------------------

/// Serialized game state. Map-like fields use order-irrelevant string-keyed
/// objects (grid cells keyed by `"{x},{y}"`); `BTreeMap` keeps the encoded
/// form byte-stable so the envelope checksum is reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: GameId,
    pub phase: GamePhase,
    pub settings: GameSettings,
    pub players: BTreeMap<String, Player>,
    pub teams: BTreeMap<String, Team>,
    pub structures: BTreeMap<String, Structure>,
    pub grid: BTreeMap<String, GridCell>,
    pub grid_bounds: Option<GridBounds>,
    pub terrain: TerrainGrid,
    pub created_at: u64,
    pub updated_at: u64,
    pub seq: u64,
}

/// Versioned snapshot envelope written to the cache collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub version: u32,
    /// md5 of the serialized `state` payload.
    pub checksum: String,
    pub state: StateSnapshot,
}

impl SnapshotEnvelope {
    fn seal(state: StateSnapshot) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            checksum: Self::digest(&state),
            state,
        }
    }

    fn digest(state: &StateSnapshot) -> String {
        let payload = serde_json::to_vec(state).unwrap_or_default();
        format!("{:x}", md5::compute(payload))
    }

    /// Check version and payload checksum before rehydration.
    pub fn verify(&self) -> Result<(), EngineError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(EngineError::Persistence(format!(
                "snapshot version {} unsupported (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        let actual = Self::digest(&self.state);
        if actual != self.checksum {
            return Err(EngineError::Persistence(format!(
                "snapshot checksum mismatch for game {}",
                self.state.id
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(self).map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        serde_json::from_slice(bytes).map_err(|e| EngineError::Persistence(e.to_string()))
    }
}
