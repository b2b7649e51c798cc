//! Persistence collaborators: the TTL snapshot cache and the durable store.
//!
//! The engine only speaks these traits; real backends (Redis, Postgres, …)
//! plug in behind them. In-memory implementations ship here for the default
//! server build and for tests. Concurrent writers for the same game are
//! precluded by the manager's per-game serialization, so last-writer-wins
//! at the storage layer is safe.

use crate::error::EngineError;
use crate::types::{GameId, GamePhase, GameSettings, PlayerId};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Boxed future returned by store collaborators; persistence calls are the
/// engine's only suspension points.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

fn ready<'a, T: Send + 'a>(value: Result<T, EngineError>) -> StoreFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

// ---------------------------------------------------------------------------
// Snapshot cache
// ---------------------------------------------------------------------------

/// Write-through snapshot cache keyed by game id. Entries carry a TTL so
/// abandoned games are reclaimed.
pub trait SnapshotCache: Send + Sync {
    fn put(&self, game: &str, snapshot: Bytes, ttl: Duration) -> StoreFuture<'_, ()>;
    fn get(&self, game: &str) -> StoreFuture<'_, Option<Bytes>>;
    fn delete(&self, game: &str) -> StoreFuture<'_, ()>;
}

/// Process-local cache with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<GameId, (Bytes, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SnapshotCache for MemoryCache {
    fn put(&self, game: &str, snapshot: Bytes, ttl: Duration) -> StoreFuture<'_, ()> {
        let expires = Instant::now() + ttl;
        self.entries
            .write()
            .insert(game.to_string(), (snapshot, expires));
        ready(Ok(()))
    }

    fn get(&self, game: &str) -> StoreFuture<'_, Option<Bytes>> {
        let mut entries = self.entries.write();
        let result = match entries.get(game) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(game);
                None
            }
            Some((bytes, _)) => Some(bytes.clone()),
            None => None,
        };
        ready(Ok(result))
    }

    fn delete(&self, game: &str) -> StoreFuture<'_, ()> {
        self.entries.write().remove(game);
        ready(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

/// Durable game metadata, independent of the TTL cache. Terrain is generated
/// once at creation and persisted here — never regenerated for the same game.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub id: GameId,
    pub name: String,
    pub settings: GameSettings,
    pub status: GamePhase,
    pub terrain: crate::terrain::TerrainGrid,
    pub created_at: u64,
}

/// Participant membership row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub player: PlayerId,
    pub active: bool,
}

pub trait DurableStore: Send + Sync {
    fn upsert_game(&self, record: GameRecord) -> StoreFuture<'_, ()>;
    fn set_status(&self, game: &str, status: GamePhase) -> StoreFuture<'_, ()>;
    fn load_game(&self, game: &str) -> StoreFuture<'_, Option<GameRecord>>;
    fn list_games(&self) -> StoreFuture<'_, Vec<GameId>>;
    fn delete_game(&self, game: &str) -> StoreFuture<'_, ()>;
    fn upsert_membership(&self, game: &str, player: &str, active: bool) -> StoreFuture<'_, ()>;
    fn memberships(&self, game: &str) -> StoreFuture<'_, Vec<Membership>>;
}

/// Process-local durable store.
#[derive(Default)]
pub struct MemoryStore {
    games: RwLock<HashMap<GameId, GameRecord>>,
    members: RwLock<HashMap<GameId, HashMap<PlayerId, bool>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn upsert_game(&self, record: GameRecord) -> StoreFuture<'_, ()> {
        self.games.write().insert(record.id.clone(), record);
        ready(Ok(()))
    }

    fn set_status(&self, game: &str, status: GamePhase) -> StoreFuture<'_, ()> {
        let mut games = self.games.write();
        let result = match games.get_mut(game) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(EngineError::not_found("game", game)),
        };
        ready(result)
    }

    fn load_game(&self, game: &str) -> StoreFuture<'_, Option<GameRecord>> {
        ready(Ok(self.games.read().get(game).cloned()))
    }

    fn list_games(&self) -> StoreFuture<'_, Vec<GameId>> {
        let mut ids: Vec<GameId> = self.games.read().keys().cloned().collect();
        ids.sort();
        ready(Ok(ids))
    }

    fn delete_game(&self, game: &str) -> StoreFuture<'_, ()> {
        self.games.write().remove(game);
        self.members.write().remove(game);
        ready(Ok(()))
    }

    fn upsert_membership(&self, game: &str, player: &str, active: bool) -> StoreFuture<'_, ()> {
        self.members
            .write()
            .entry(game.to_string())
            .or_default()
            .insert(player.to_string(), active);
        ready(Ok(()))
    }

    fn memberships(&self, game: &str) -> StoreFuture<'_, Vec<Membership>> {
        let mut rows: Vec<Membership> = self
            .members
            .read()
            .get(game)
            .map(|m| {
                m.iter()
                    .map(|(player, active)| Membership {
                        player: player.clone(),
                        active: *active,
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.player.cmp(&b.player));
        ready(Ok(rows))
    }
}
