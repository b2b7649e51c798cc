//! Broadcaster tests: audiences, session takeover, idempotent leave, ordering.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use territory_engine::broadcast::{Broadcaster, ChannelTransport, OutboundMessage};
    use territory_engine::protocol::{subjects, ActionAck, EventEnvelope, EventPayload};
    use territory_engine::terrain::TerrainGenerator;
    use territory_engine::types::{GameMetadata, GamePhase, GameSettings, TerrainWeights};
    use territory_engine::GameState;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn make_broadcaster() -> (Arc<ChannelTransport>, Broadcaster) {
        let transport = Arc::new(ChannelTransport::new());
        let broadcaster = Broadcaster::new(transport.clone());
        (transport, broadcaster)
    }

    fn snapshot_event(game: &str) -> EventEnvelope {
        let settings = GameSettings {
            map_width: 8,
            map_height: 8,
            ..Default::default()
        };
        let terrain = TerrainGenerator::generate(8, 8, 1, &TerrainWeights::default());
        let state = GameState::new(game, settings, terrain, 0);
        EventEnvelope::new(
            game,
            state.seq,
            EventPayload::Snapshot {
                snapshot: Box::new(state.to_snapshot()),
            },
        )
    }

    fn metadata(game: &str) -> GameMetadata {
        GameMetadata {
            game_id: game.into(),
            player_count: 1,
            active_player_count: 1,
            status: GamePhase::Waiting,
            map_width: 8,
            map_height: 8,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    // -----------------------------------------------------------------------
    // Join: snapshot to the joiner, metadata to room + lobby
    // -----------------------------------------------------------------------

    #[test]
    fn join_sends_snapshot_to_joiner_and_metadata_to_lobby() {
        let (transport, broadcaster) = make_broadcaster();
        let mut rx1 = transport.register("s1");
        let mut rx2 = transport.register("s2");
        broadcaster.connect("alice", "s1");
        broadcaster.connect("bob", "s2");

        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));

        let got1 = drain(&mut rx1);
        assert_eq!(got1.len(), 3, "joiner: snapshot, join event, metadata");
        assert_eq!(got1[0].subject, subjects::SNAPSHOT);
        assert_eq!(got1[1].subject, subjects::PLAYER_JOINED);
        assert_eq!(got1[2].subject, subjects::METADATA);

        let got2 = drain(&mut rx2);
        assert_eq!(got2.len(), 1, "lobby observer: metadata only");
        assert_eq!(got2[0].subject, subjects::METADATA);

        assert_eq!(broadcaster.connected_count("g1"), 1);
    }

    #[test]
    fn snapshot_payload_round_trips() {
        let (transport, broadcaster) = make_broadcaster();
        let mut rx = transport.register("s1");
        broadcaster.connect("alice", "s1");
        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));

        let msg = rx.try_recv().expect("snapshot message");
        let envelope: EventEnvelope = serde_json::from_slice(&msg.payload).expect("decode");
        match envelope.payload {
            EventPayload::Snapshot { snapshot } => {
                assert_eq!(snapshot.state.id, "g1");
                snapshot.verify().expect("checksum holds over the wire");
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Idempotent leave
    // -----------------------------------------------------------------------

    #[test]
    fn double_leave_broadcasts_once() {
        let (transport, broadcaster) = make_broadcaster();
        let _rx1 = transport.register("s1");
        let mut rx2 = transport.register("s2");
        broadcaster.connect("alice", "s1");
        broadcaster.connect("bob", "s2");
        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));
        drain(&mut rx2);

        broadcaster.leave_game("s1", Some(metadata("g1")));
        broadcaster.leave_game("s1", Some(metadata("g1")));

        let got = drain(&mut rx2);
        assert_eq!(got.len(), 1, "second leave must not rebroadcast");
        assert_eq!(broadcaster.connected_count("g1"), 0);
    }

    #[test]
    fn disconnect_runs_the_same_leave_cleanup() {
        let (transport, broadcaster) = make_broadcaster();
        let _rx1 = transport.register("s1");
        broadcaster.connect("alice", "s1");
        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));
        assert_eq!(broadcaster.connected_count("g1"), 1);

        broadcaster.disconnect("s1");
        assert_eq!(broadcaster.connected_count("g1"), 0);

        // Leave after disconnect is a no-op, not an error.
        broadcaster.leave_game("s1", Some(metadata("g1")));
        assert_eq!(broadcaster.connected_count("g1"), 0);
    }

    // -----------------------------------------------------------------------
    // One session per identity
    // -----------------------------------------------------------------------

    #[test]
    fn new_session_displaces_the_previous_one() {
        let (transport, broadcaster) = make_broadcaster();
        let _rx1 = transport.register("s1");
        let _rx2 = transport.register("s2");
        broadcaster.connect("alice", "s1");
        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));

        let evicted = broadcaster.connect("alice", "s2");
        assert_eq!(evicted.as_deref(), Some("s1"));
        assert!(!transport.is_connected("s1"), "old session terminated");
        assert!(transport.is_connected("s2"));
        assert_eq!(
            broadcaster.connected_count("g1"),
            0,
            "old session's room membership cleaned before the new session proceeds"
        );
    }

    #[test]
    fn reconnecting_the_same_session_id_is_stable() {
        let (transport, broadcaster) = make_broadcaster();
        let _rx = transport.register("s1");
        broadcaster.connect("alice", "s1");
        let evicted = broadcaster.connect("alice", "s1");
        assert!(evicted.is_none());
        assert!(transport.is_connected("s1"));
    }

    // -----------------------------------------------------------------------
    // Delivery order & targeted sends
    // -----------------------------------------------------------------------

    #[test]
    fn events_arrive_in_mutation_order() {
        let (transport, broadcaster) = make_broadcaster();
        let mut rx = transport.register("s1");
        broadcaster.connect("alice", "s1");
        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));
        drain(&mut rx);

        let events: Vec<EventEnvelope> = (1..=5)
            .map(|seq| {
                EventEnvelope::new(
                    "g1",
                    seq,
                    EventPayload::StructureRemoved {
                        structure_id: format!("st-{seq}"),
                    },
                )
            })
            .collect();
        broadcaster.publish_events(&events);

        let got = drain(&mut rx);
        let seqs: Vec<u64> = got
            .iter()
            .map(|m| serde_json::from_slice::<EventEnvelope>(&m.payload).expect("decode").seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn events_do_not_leak_outside_the_room() {
        let (transport, broadcaster) = make_broadcaster();
        let _rx1 = transport.register("s1");
        let mut rx2 = transport.register("s2");
        broadcaster.connect("alice", "s1");
        broadcaster.connect("bob", "s2");
        broadcaster.join_game("s1", snapshot_event("g1"), metadata("g1"));
        drain(&mut rx2);

        broadcaster.publish_events(&[EventEnvelope::new(
            "g1",
            1,
            EventPayload::StructureRemoved {
                structure_id: "st-1".into(),
            },
        )]);
        assert!(
            drain(&mut rx2).is_empty(),
            "lobby-only session must not see room events"
        );
    }

    #[test]
    fn ack_goes_to_the_acting_session_only() {
        let (transport, broadcaster) = make_broadcaster();
        let mut rx1 = transport.register("s1");
        let mut rx2 = transport.register("s2");
        broadcaster.connect("alice", "s1");
        broadcaster.connect("bob", "s2");

        broadcaster.send_ack("s1", &ActionAck::accepted(3));

        let got1 = drain(&mut rx1);
        assert_eq!(got1.len(), 1);
        assert_eq!(got1[0].subject, subjects::ACTION_ACK);
        let ack: ActionAck = serde_json::from_slice(&got1[0].payload).expect("decode");
        assert!(ack.accepted);
        assert_eq!(ack.seq, Some(3));
        assert!(drain(&mut rx2).is_empty());
    }
}
