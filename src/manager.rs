//! GameManager – owns every resident game state, orchestrates validation and
//! conflict resolution, and enforces the write-through persistence contract.
//!
//! All mutating access to a single game is serialized through that game's
//! own `tokio::sync::Mutex`; unrelated games never block on each other. The
//! lock is held across the persistence write, so no second action against
//! the same game is admitted while a write is outstanding.

use crate::catalog::{Structure, StructureCatalog};
use crate::conflict::{resolve_capture, CapturePolicy, ValuePolicy};
use crate::error::EngineError;
use crate::protocol::{Action, ActionAck, EventEnvelope, EventPayload};
use crate::state::{GameState, SnapshotEnvelope};
use crate::store::{DurableStore, GameRecord, SnapshotCache};
use crate::terrain::TerrainGenerator;
use crate::types::{now_millis, GameId, GameMetadata, GamePhase, GameSettings, Player};
use crate::validate::{validate_chat, validate_placement};
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL on every cache snapshot, so abandoned games are reclaimed.
    pub snapshot_ttl: Duration,
    /// Bounded attempts for one write-through persistence step.
    pub persist_attempts: u32,
    /// Delay between persistence retries.
    pub persist_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(3600),
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(50),
        }
    }
}

// ---------------------------------------------------------------------------
// Action results
// ---------------------------------------------------------------------------

/// What one accepted action produced: the definitive ack for the acting
/// session plus the events to fan out to the game's room.
#[derive(Debug, Clone)]
pub struct ActionApplied {
    pub ack: ActionAck,
    pub events: Vec<EventEnvelope>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct GameManager {
    config: EngineConfig,
    catalog: Arc<StructureCatalog>,
    policy: Arc<dyn CapturePolicy>,
    cache: Arc<dyn SnapshotCache>,
    store: Arc<dyn DurableStore>,
    games: RwLock<HashMap<GameId, Arc<Mutex<GameState>>>>,
    id_counter: AtomicU64,
}

impl GameManager {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<StructureCatalog>,
        cache: Arc<dyn SnapshotCache>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self::with_policy(config, catalog, Arc::new(ValuePolicy), cache, store)
    }

    pub fn with_policy(
        config: EngineConfig,
        catalog: Arc<StructureCatalog>,
        policy: Arc<dyn CapturePolicy>,
        cache: Arc<dyn SnapshotCache>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            config,
            catalog,
            policy,
            cache,
            store,
            games: RwLock::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
        }
    }

    /// Fresh id for a game or structure. A new digest per call, so repeated
    /// creates never collide.
    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let digest = md5::compute(format!("{prefix}:{}:{n}", now_millis()));
        let hex = format!("{digest:x}");
        format!("{prefix}-{}", &hex[..12])
    }

    // -----------------------------------------------------------------------
    // Game lifecycle
    // -----------------------------------------------------------------------

    /// Create a game: generate terrain once from the settings, persist the
    /// initial snapshot and durable record, and make the state resident.
    /// Returns a copy of the new authoritative state.
    pub async fn create_game(&self, settings: GameSettings) -> Result<GameState, EngineError> {
        let id = self.fresh_id("g");
        let now = now_millis();
        let settings = GameSettings {
            weights: settings.weights.clamped(),
            ..settings
        };
        let terrain = TerrainGenerator::generate(
            settings.map_width,
            settings.map_height,
            settings.seed,
            &settings.weights,
        );
        let state = GameState::new(id.clone(), settings.clone(), terrain.clone(), now);

        self.store
            .upsert_game(GameRecord {
                id: id.clone(),
                name: settings.name.clone(),
                settings,
                status: state.phase,
                terrain,
                created_at: now,
            })
            .await?;
        self.persist(&state).await?;

        info!(
            "created game {id} ({}x{}, seed {})",
            state.settings.map_width, state.settings.map_height, state.settings.seed
        );
        let copy = state.clone();
        self.games.write().insert(id, Arc::new(Mutex::new(state)));
        Ok(copy)
    }

    /// Authoritative copy of a game's state: resident if available,
    /// otherwise rehydrated from the cache collaborator. A cache miss after
    /// a resident miss is a genuine not-found.
    pub async fn game_state(&self, id: &str) -> Result<GameState, EngineError> {
        let handle = self.resident_or_rehydrate(id).await?;
        let state = handle.lock().await;
        Ok(state.clone())
    }

    /// Games currently resident in memory. Listing persisted-but-not-resident
    /// games is the durable store's responsibility.
    pub fn active_games(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.games.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a game everywhere: resident map, cache, durable store.
    pub async fn remove_game(&self, id: &str) -> Result<(), EngineError> {
        self.games.write().remove(id);
        self.cache.delete(id).await?;
        self.store.delete_game(id).await?;
        info!("removed game {id}");
        Ok(())
    }

    /// Move a game to a new phase, enforcing the legal transition order.
    pub async fn set_phase(&self, id: &str, phase: GamePhase) -> Result<GameMetadata, EngineError> {
        let handle = self.resident_or_rehydrate(id).await?;
        let mut state = handle.lock().await;
        let backup = state.clone();
        state.set_phase(phase)?;
        state.touch(now_millis());
        if let Err(e) = self.persist(&state).await {
            *state = backup;
            return Err(e);
        }
        if let Err(e) = self.store.set_status(id, phase).await {
            warn!("durable status update for game {id} failed: {e}");
        }
        Ok(state.metadata())
    }

    // -----------------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------------

    /// Add (or re-admit) a player. Rejected when the game is at its player
    /// cap. Returns the refreshed metadata for broadcast.
    pub async fn add_player(&self, id: &str, player: Player) -> Result<GameMetadata, EngineError> {
        let handle = self.resident_or_rehydrate(id).await?;
        let mut state = handle.lock().await;

        let rejoining = state.players.contains_key(&player.id);
        if !rejoining && state.players.len() >= state.settings.max_players {
            return Err(EngineError::Capacity {
                game: id.to_string(),
                max: state.settings.max_players,
            });
        }

        let now = now_millis();
        let backup = state.clone();
        let player_id = player.id.clone();
        if rejoining {
            state.set_player_online(&player_id, true, now);
        } else {
            let starting_resources = state.settings.starting_resources;
            state.add_player(Player {
                resources: starting_resources,
                last_seen: now,
                online: true,
                ..player
            });
        }
        state.touch(now);

        if let Err(e) = self.persist(&state).await {
            *state = backup;
            return Err(e);
        }
        // Durable membership is recoverable metadata; a failed row write is
        // logged rather than failing the admitted join.
        if let Err(e) = self.store.upsert_membership(id, &player_id, true).await {
            warn!("membership upsert for {player_id} in game {id} failed: {e}");
        }
        Ok(state.metadata())
    }

    /// Mark a player offline. Idempotent: marking an absent or already
    /// offline player is a no-op.
    pub async fn mark_player_offline(&self, id: &str, player: &str) -> Result<GameMetadata, EngineError> {
        let handle = self.resident_or_rehydrate(id).await?;
        let mut state = handle.lock().await;
        let now = now_millis();
        let backup = state.clone();
        if state.set_player_online(player, false, now) {
            state.touch(now);
            if let Err(e) = self.persist(&state).await {
                *state = backup;
                return Err(e);
            }
            if let Err(e) = self.store.upsert_membership(id, player, false).await {
                warn!("membership upsert for {player} in game {id} failed: {e}");
            }
        }
        Ok(state.metadata())
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Validate and apply one action. All-or-nothing: a rejected validation
    /// or an exhausted persistence retry produces no observable mutation.
    pub async fn process_action(
        &self,
        id: &str,
        player_id: &str,
        action: Action,
    ) -> Result<ActionApplied, EngineError> {
        let handle = self.resident_or_rehydrate(id).await?;
        let mut state = handle.lock().await;
        let now = now_millis();

        match action {
            Action::PlaceStructure {
                structure_type,
                positions,
                rotation,
            } => {
                let template =
                    validate_placement(&state, &self.catalog, player_id, structure_type, &positions, rotation)?;
                let cost = template.cost;
                let structure = Structure::from_template(
                    self.fresh_id("st"),
                    template,
                    player_id,
                    state.players[player_id].team.clone(),
                    positions,
                    now,
                );
                let placed_id = structure.id.clone();

                let backup = state.clone();
                // Cost was validated against the balance above; the subtract
                // cannot underflow.
                if let Some(p) = state.players.get_mut(player_id) {
                    p.resources -= cost;
                }
                state.insert_structure(structure.clone());
                let outcome = match resolve_capture(&mut state, &placed_id, self.policy.as_ref(), now) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        *state = backup;
                        return Err(e);
                    }
                };
                state.touch(now);
                if let Err(e) = self.persist(&state).await {
                    *state = backup;
                    return Err(e);
                }

                debug!(
                    "game {id}: {player_id} placed {placed_id} ({} captures, award {})",
                    outcome.captured.len(),
                    outcome.award
                );
                let placed = state.structures[&placed_id].clone();
                Ok(ActionApplied {
                    ack: ActionAck::accepted(state.seq),
                    events: vec![EventEnvelope::new(
                        id,
                        state.seq,
                        EventPayload::StructurePlaced {
                            structure: placed,
                            captured: outcome.captured,
                            award: outcome.award,
                        },
                    )],
                })
            }

            Action::RemoveStructure { structure_id } => {
                let owner = state
                    .structures
                    .get(&structure_id)
                    .map(|s| s.player.clone())
                    .ok_or_else(|| EngineError::not_found("structure", structure_id.clone()))?;
                if owner != player_id {
                    return Err(EngineError::Authorization(format!(
                        "structure {structure_id} belongs to {owner}"
                    )));
                }

                let backup = state.clone();
                state.remove_structure(&structure_id)?;
                state.touch(now);
                if let Err(e) = self.persist(&state).await {
                    *state = backup;
                    return Err(e);
                }

                Ok(ActionApplied {
                    ack: ActionAck::accepted(state.seq),
                    events: vec![EventEnvelope::new(
                        id,
                        state.seq,
                        EventPayload::StructureRemoved { structure_id },
                    )],
                })
            }

            Action::ChatMessage { message } => {
                if !state.players.contains_key(player_id) {
                    return Err(EngineError::not_found("player", player_id));
                }
                validate_chat(&message)?;
                // Chat mutates nothing; no snapshot write, no seq bump.
                Ok(ActionApplied {
                    ack: ActionAck::accepted(state.seq),
                    events: vec![EventEnvelope::new(
                        id,
                        state.seq,
                        EventPayload::Chat {
                            player: player_id.to_string(),
                            message,
                        },
                    )],
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Periodic work
    // -----------------------------------------------------------------------

    /// Metadata refresh for every resident game, published by the caller.
    pub async fn tick(&self) -> Vec<GameMetadata> {
        let handles: Vec<Arc<Mutex<GameState>>> = self.games.read().values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let state = handle.lock().await;
            out.push(state.metadata());
        }
        out
    }

    /// Referential-integrity sweep over every resident game. A violation
    /// halts the sweep for that game and is surfaced; nothing is repaired.
    pub async fn run_integrity_sweep(&self) -> Result<(), EngineError> {
        let entries: Vec<(GameId, Arc<Mutex<GameState>>)> = self
            .games
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (id, handle) in entries {
            let state = handle.lock().await;
            if let Err(e) = state.validate_referential_integrity() {
                warn!("integrity sweep failed for game {id}: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence plumbing
    // -----------------------------------------------------------------------

    async fn persist(&self, state: &GameState) -> Result<(), EngineError> {
        let bytes = Bytes::from(state.to_snapshot().to_bytes()?);
        let mut last_err = None;
        for attempt in 0..self.config.persist_attempts {
            match self.cache.put(&state.id, bytes.clone(), self.config.snapshot_ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "snapshot write for game {} failed (attempt {}/{}): {e}",
                        state.id,
                        attempt + 1,
                        self.config.persist_attempts
                    );
                    last_err = Some(e);
                }
            }
            if attempt + 1 < self.config.persist_attempts {
                tokio::time::sleep(self.config.persist_backoff).await;
            }
        }
        Err(last_err
            .unwrap_or_else(|| EngineError::Persistence("no persistence attempts configured".into())))
    }

    async fn resident_or_rehydrate(&self, id: &str) -> Result<Arc<Mutex<GameState>>, EngineError> {
        if let Some(handle) = self.games.read().get(id) {
            return Ok(handle.clone());
        }

        let bytes = self
            .cache
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("game", id))?;
        let state = GameState::from_snapshot(SnapshotEnvelope::from_bytes(&bytes)?)?;
        debug!("rehydrated game {id} from cache (seq {})", state.seq);

        let mut games = self.games.write();
        // Another task may have rehydrated while we were reading the cache.
        let handle = games
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(state)))
            .clone();
        Ok(handle)
    }
}
