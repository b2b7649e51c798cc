//! Synchronization broadcaster – fans state mutations out to exactly the
//! sessions that should see them.
//!
//! ## Audiences
//!
//! | Event                      | Audience                          |
//! |----------------------------|-----------------------------------|
//! | full snapshot              | the newly joined session only     |
//! | action events              | the game's room                   |
//! | metadata delta             | the game's room + the lobby       |
//! | action ack                 | the acting session only           |
//!
//! ## Session rules
//!
//! One session per identity: a new connection for an already-connected
//! identity forcibly terminates the prior session (completing its leave,
//! including broadcast side effects) before proceeding. Leave is idempotent —
//! a double-leave or a leave-then-disconnect emits nothing twice.

use crate::protocol::{subjects, ActionAck, EventEnvelope, EventPayload};
use crate::types::{GameId, GameMetadata, PlayerId};
use bytes::Bytes;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type SessionId = String;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Delivery boundary. Guarantees at-least-once delivery to the
/// currently-connected sessions in the audience; the broadcaster does not
/// retry failed sends itself.
pub trait BroadcastTransport: Send + Sync {
    fn deliver(&self, audience: &[SessionId], subject: &str, payload: Bytes);

    /// Forcibly close one session (identity takeover, shutdown).
    fn terminate(&self, session: &SessionId);
}

/// One message handed to a session's outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// In-process transport backed by one unbounded channel per session.
/// Channel FIFO preserves per-session delivery order.
#[derive(Default)]
pub struct ChannelTransport {
    senders: RwLock<HashMap<SessionId, mpsc::UnboundedSender<OutboundMessage>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session and return its outbound receiver.
    pub fn register(&self, session: impl Into<SessionId>) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().insert(session.into(), tx);
        rx
    }

    pub fn is_connected(&self, session: &str) -> bool {
        self.senders.read().contains_key(session)
    }
}

impl BroadcastTransport for ChannelTransport {
    fn deliver(&self, audience: &[SessionId], subject: &str, payload: Bytes) {
        let senders = self.senders.read();
        for session in audience {
            if let Some(tx) = senders.get(session) {
                let _ = tx.send(OutboundMessage {
                    subject: subject.to_string(),
                    payload: payload.clone(),
                });
            }
        }
    }

    fn terminate(&self, session: &SessionId) {
        self.senders.write().remove(session);
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Rooms {
    /// Active session per identity — the one-socket-per-identity registry.
    identity_session: HashMap<PlayerId, SessionId>,
    session_identity: HashMap<SessionId, PlayerId>,
    game_rooms: HashMap<GameId, HashSet<SessionId>>,
    session_game: HashMap<SessionId, GameId>,
    lobby: HashSet<SessionId>,
}

pub struct Broadcaster {
    transport: Arc<dyn BroadcastTransport>,
    rooms: Mutex<Rooms>,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn BroadcastTransport>) -> Self {
        Self {
            transport,
            rooms: Mutex::new(Rooms::default()),
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Register a verified (identity, session) pair and place the session in
    /// the lobby. If the identity already has a live session, that session's
    /// leave completes (with its broadcasts) and it is terminated first.
    ///
    /// Returns the terminated prior session, if any.
    pub fn connect(&self, identity: &str, session: &str) -> Option<SessionId> {
        let prior = {
            let rooms = self.rooms.lock();
            rooms.identity_session.get(identity).cloned()
        };
        let evicted = match prior {
            Some(prior) if prior != session => {
                debug!("identity {identity}: session {prior} displaced by {session}");
                self.disconnect(&prior);
                self.transport.terminate(&prior);
                Some(prior)
            }
            _ => None,
        };

        let mut rooms = self.rooms.lock();
        rooms
            .identity_session
            .insert(identity.to_string(), session.to_string());
        rooms
            .session_identity
            .insert(session.to_string(), identity.to_string());
        rooms.lobby.insert(session.to_string());
        evicted
    }

    /// Session drop: runs the same leave-cleanup path as an explicit leave,
    /// idempotently, then forgets the session.
    pub fn disconnect(&self, session: &str) {
        self.leave_game(session, None);
        let mut rooms = self.rooms.lock();
        rooms.lobby.remove(session);
        if let Some(identity) = rooms.session_identity.remove(session) {
            // Only clear the identity slot if this session still owns it.
            if rooms.identity_session.get(&identity).map(String::as_str) == Some(session) {
                rooms.identity_session.remove(&identity);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Room membership
    // -----------------------------------------------------------------------

    /// Put a session in a game's room. Any in-progress membership in a
    /// different game is left — including its broadcast side effects —
    /// before the join proceeds. The joiner receives the full snapshot;
    /// the room and lobby receive the metadata delta.
    pub fn join_game(&self, session: &str, snapshot: EventEnvelope, metadata: GameMetadata) {
        let game = snapshot.game.clone();
        self.leave_game(session, None);

        let identity = {
            let mut rooms = self.rooms.lock();
            rooms
                .game_rooms
                .entry(game.clone())
                .or_default()
                .insert(session.to_string());
            rooms.session_game.insert(session.to_string(), game.clone());
            rooms.session_identity.get(session).cloned()
        };

        let seq = snapshot.seq;
        self.send_to(&[session.to_string()], subjects::SNAPSHOT, &snapshot);
        if let Some(player) = identity {
            let event = EventEnvelope::new(game.clone(), seq, EventPayload::PlayerJoined { player });
            self.send_to(&self.room_audience(&game), subjects::PLAYER_JOINED, &event);
        }
        self.publish_metadata(metadata);
    }

    /// Remove a session from its game room. Idempotent: a session in no
    /// room produces no membership change and no broadcast. Pass the
    /// refreshed metadata to notify the room and lobby of the departure.
    pub fn leave_game(&self, session: &str, metadata: Option<GameMetadata>) {
        let left = {
            let mut rooms = self.rooms.lock();
            match rooms.session_game.remove(session) {
                Some(game) => {
                    if let Some(members) = rooms.game_rooms.get_mut(&game) {
                        members.remove(session);
                        if members.is_empty() {
                            rooms.game_rooms.remove(&game);
                        }
                    }
                    Some(game)
                }
                None => None,
            }
        };

        if let Some(game) = left {
            let identity = self.rooms.lock().session_identity.get(session).cloned();
            if let Some(player) = identity {
                let audience = self.room_audience(&game);
                if !audience.is_empty() {
                    let event =
                        EventEnvelope::new(game.clone(), 0, EventPayload::PlayerLeft { player });
                    self.send_to(&audience, subjects::PLAYER_LEFT, &event);
                }
            }
            if let Some(metadata) = metadata {
                self.publish_metadata(metadata);
            }
        }
    }

    /// Sessions currently subscribed to a game's room.
    pub fn connected_count(&self, game: &str) -> usize {
        self.rooms
            .lock()
            .game_rooms
            .get(game)
            .map_or(0, HashSet::len)
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Deliver action events to the originating game's room, in order.
    pub fn publish_events(&self, events: &[EventEnvelope]) {
        for event in events {
            let audience = self.room_audience(&event.game);
            if audience.is_empty() {
                continue;
            }
            self.send_to(&audience, subject_for(&event.payload), event);
        }
    }

    /// Metadata delta: the game's room plus the lobby, so lobby observers
    /// see live counts without joining.
    pub fn publish_metadata(&self, metadata: GameMetadata) {
        let mut audience = self.room_audience(&metadata.game_id);
        {
            let rooms = self.rooms.lock();
            audience.extend(rooms.lobby.iter().cloned());
        }
        audience.sort();
        audience.dedup();
        if audience.is_empty() {
            return;
        }
        let game = metadata.game_id.clone();
        let event = EventEnvelope::new(game, 0, EventPayload::Metadata { metadata });
        self.send_to(&audience, subjects::METADATA, &event);
    }

    /// Definitive per-action response, delivered to the acting session only.
    pub fn send_ack(&self, session: &str, ack: &ActionAck) {
        self.send_to(&[session.to_string()], subjects::ACTION_ACK, ack);
    }

    fn room_audience(&self, game: &str) -> Vec<SessionId> {
        let rooms = self.rooms.lock();
        let mut audience: Vec<SessionId> = rooms
            .game_rooms
            .get(game)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        audience.sort();
        audience
    }

    /// Serialize and hand off to the transport. A failed serialization is
    /// logged and swallowed — a single bad payload must not stall the fan-out.
    fn send_to<T: Serialize>(&self, audience: &[SessionId], subject: &str, payload: &T) {
        match serde_json::to_vec(payload) {
            Ok(bytes) => self.transport.deliver(audience, subject, Bytes::from(bytes)),
            Err(e) => warn!("failed to serialize payload for {subject}: {e}"),
        }
    }
}

fn subject_for(payload: &EventPayload) -> &'static str {
    match payload {
        EventPayload::Snapshot { .. } => subjects::SNAPSHOT,
        EventPayload::StructurePlaced { .. } => subjects::STRUCTURE_PLACED,
        EventPayload::StructureRemoved { .. } => subjects::STRUCTURE_REMOVED,
        EventPayload::PlayerJoined { .. } => subjects::PLAYER_JOINED,
        EventPayload::PlayerLeft { .. } => subjects::PLAYER_LEFT,
        EventPayload::Metadata { .. } => subjects::METADATA,
        EventPayload::Chat { .. } => subjects::CHAT,
    }
}
