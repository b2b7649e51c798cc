//! GameManager integration tests: the full validate → resolve → persist path.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use territory_engine::error::{EngineError, RejectReason};
    use territory_engine::manager::{EngineConfig, GameManager};
    use territory_engine::protocol::{Action, EventPayload};
    use territory_engine::store::{MemoryCache, MemoryStore, SnapshotCache, StoreFuture};
    use territory_engine::types::{GameSettings, Player, Position};
    use territory_engine::{GameState, StructureCatalog, StructureKind};
    use tokio_test::block_on;

    fn make_manager() -> (Arc<GameManager>, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let manager = Arc::new(GameManager::new(
            EngineConfig::default(),
            Arc::new(StructureCatalog::standard()),
            cache.clone(),
            Arc::new(MemoryStore::new()),
        ));
        (manager, cache)
    }

    fn settings() -> GameSettings {
        GameSettings {
            seed: 12345,
            ..Default::default()
        }
    }

    async fn game_with_two_teams(manager: &GameManager) -> String {
        let game = manager.create_game(settings()).await.expect("create");
        manager
            .add_player(&game.id, Player::new("alice", "Alice", "red"))
            .await
            .expect("add alice");
        manager
            .add_player(&game.id, Player::new("bob", "Bob", "blue"))
            .await
            .expect("add bob");
        game.id
    }

    fn place(kind: StructureKind, positions: &[(i32, i32)], rotation: u8) -> Action {
        Action::PlaceStructure {
            structure_type: kind,
            positions: positions.iter().map(|&(x, y)| Position::new(x, y)).collect(),
            rotation,
        }
    }

    fn fingerprint(state: &GameState) -> Vec<u8> {
        state.to_snapshot().to_bytes().expect("serialize")
    }

    // -----------------------------------------------------------------------
    // Creation & lookup
    // -----------------------------------------------------------------------

    #[test]
    fn create_game_generates_terrain_once() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = manager.create_game(settings()).await.expect("create");
            assert_eq!(game.terrain.width(), 100);
            assert_eq!(game.terrain.height(), 100);

            let again = manager.game_state(&game.id).await.expect("lookup");
            assert_eq!(game.terrain, again.terrain, "terrain must never regenerate");
            assert_eq!(manager.active_games(), vec![game.id.clone()]);
        });
    }

    #[test]
    fn unknown_game_is_not_found() {
        block_on(async {
            let (manager, _) = make_manager();
            let err = manager.game_state("g-missing").await.unwrap_err();
            assert!(matches!(err, EngineError::NotFound { .. }));
        });
    }

    #[test]
    fn fresh_ids_do_not_collide() {
        block_on(async {
            let (manager, _) = make_manager();
            let a = manager.create_game(settings()).await.expect("a");
            let b = manager.create_game(settings()).await.expect("b");
            assert_ne!(a.id, b.id);
        });
    }

    // -----------------------------------------------------------------------
    // The reference scenario: place, then capture
    // -----------------------------------------------------------------------

    #[test]
    fn place_then_capture_scenario() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;

            // Alice: 1-cell basic structure at (5,5), cost 5, balance 100 -> 95.
            let applied = manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(5, 5)], 0))
                .await
                .expect("alice place");
            assert!(applied.ack.accepted);
            let placed_id = match &applied.events[0].payload {
                EventPayload::StructurePlaced { structure, captured, .. } => {
                    assert!(captured.is_empty());
                    structure.id.clone()
                }
                other => panic!("unexpected payload {other:?}"),
            };

            let state = manager.game_state(&game).await.expect("state");
            assert_eq!(state.players["alice"].resources, 95);
            let cell = state.grid.get(Position::new(5, 5)).expect("cell (5,5)");
            assert_eq!(cell.structure.as_deref(), Some(placed_id.as_str()));
            assert_eq!(cell.team, "red");
            assert_eq!(state.players["bob"].resources, 100, "bob unaffected");

            // Bob: adjacent placement captures alice's structure (equal value),
            // awarding half its value.
            let applied = manager
                .process_action(&game, "bob", place(StructureKind::Basic, &[(5, 6)], 0))
                .await
                .expect("bob place");
            let (captured, award) = match &applied.events[0].payload {
                EventPayload::StructurePlaced { captured, award, .. } => (captured.clone(), *award),
                other => panic!("unexpected payload {other:?}"),
            };
            assert_eq!(captured, vec![placed_id.clone()]);
            assert_eq!(award, 5);

            let state = manager.game_state(&game).await.expect("state");
            let flipped = &state.structures[&placed_id];
            assert_eq!(flipped.team, "blue");
            assert_eq!(flipped.player, "bob");
            // Captured structure's cells and ownership must agree.
            for pos in &flipped.positions {
                assert_eq!(state.grid.get(*pos).expect("cell").team, "blue");
            }
            assert_eq!(state.players["alice"].resources, 95, "capture does not touch alice");
            assert_eq!(state.players["bob"].resources, 100, "cost 5, award 5");

            state.validate_referential_integrity().expect("consistent");
            manager.run_integrity_sweep().await.expect("sweep");
        });
    }

    // -----------------------------------------------------------------------
    // Placement atomicity
    // -----------------------------------------------------------------------

    #[test]
    fn rejected_placements_mutate_nothing() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(5, 5)], 0))
                .await
                .expect("seed placement");
            let before = fingerprint(&manager.game_state(&game).await.unwrap());

            let rejected: Vec<(Action, &str)> = vec![
                (place(StructureKind::Basic, &[(5, 5)], 0), "occupied"),
                (place(StructureKind::Basic, &[(200, 5)], 0), "out of bounds"),
                (place(StructureKind::Basic, &[(-3, 5)], 0), "negative"),
                (place(StructureKind::Basic, &[(7, 7)], 4), "rotation"),
                (place(StructureKind::Wall, &[(7, 7)], 0), "shape mismatch"),
                (place(StructureKind::Fortress, &[], 0), "empty"),
            ];
            for (action, label) in rejected {
                let err = manager
                    .process_action(&game, "bob", action)
                    .await
                    .expect_err(label);
                assert!(matches!(err, EngineError::Validation(_)), "{label}: {err}");
                let after = fingerprint(&manager.game_state(&game).await.unwrap());
                assert_eq!(before, after, "{label} left a mutation behind");
            }
        });
    }

    #[test]
    fn insufficient_resources_is_rejected_before_subtraction() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = manager
                .create_game(GameSettings {
                    starting_resources: 3,
                    ..settings()
                })
                .await
                .expect("create")
                .id;
            manager
                .add_player(&game, Player::new("alice", "Alice", "red"))
                .await
                .expect("add");

            let err = manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(1, 1)], 0))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                EngineError::Validation(RejectReason::InsufficientResources { have: 3, need: 5 })
            ));
            let state = manager.game_state(&game).await.unwrap();
            assert_eq!(state.players["alice"].resources, 3);
            assert!(state.structures.is_empty());
        });
    }

    #[test]
    fn rotated_shape_placement_is_accepted() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            // Wall is canonically horizontal; rotation 1 makes it vertical.
            let applied = manager
                .process_action(
                    &game,
                    "alice",
                    place(StructureKind::Wall, &[(4, 4), (4, 5), (4, 6)], 1),
                )
                .await
                .expect("vertical wall");
            assert!(applied.ack.accepted);

            let err = manager
                .process_action(
                    &game,
                    "bob",
                    place(StructureKind::Wall, &[(8, 8), (9, 8), (10, 8)], 1),
                )
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                EngineError::Validation(RejectReason::ShapeMismatch)
            ));
        });
    }

    #[test]
    fn offline_players_cannot_place() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            manager.mark_player_offline(&game, "alice").await.expect("offline");
            let err = manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(2, 2)], 0))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                EngineError::Validation(RejectReason::PlayerOffline(_))
            ));
        });
    }

    // -----------------------------------------------------------------------
    // Removal & authorization
    // -----------------------------------------------------------------------

    #[test]
    fn owner_can_remove_and_cells_clear() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            let applied = manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(5, 5)], 0))
                .await
                .expect("place");
            let id = match &applied.events[0].payload {
                EventPayload::StructurePlaced { structure, .. } => structure.id.clone(),
                _ => unreachable!(),
            };

            manager
                .process_action(&game, "alice", Action::RemoveStructure { structure_id: id.clone() })
                .await
                .expect("remove");
            let state = manager.game_state(&game).await.unwrap();
            assert!(state.structures.is_empty());
            assert!(state.grid.get(Position::new(5, 5)).is_none());
            state.validate_referential_integrity().expect("consistent");
        });
    }

    #[test]
    fn removing_someone_elses_structure_is_not_authorized() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            let applied = manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(5, 5)], 0))
                .await
                .expect("place");
            let id = match &applied.events[0].payload {
                EventPayload::StructurePlaced { structure, .. } => structure.id.clone(),
                _ => unreachable!(),
            };

            let err = manager
                .process_action(&game, "bob", Action::RemoveStructure { structure_id: id })
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Authorization(_)));
            let state = manager.game_state(&game).await.unwrap();
            assert_eq!(state.structures.len(), 1, "structure survives");
        });
    }

    // -----------------------------------------------------------------------
    // Capacity
    // -----------------------------------------------------------------------

    #[test]
    fn join_respects_player_cap_but_rejoin_passes() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = manager
                .create_game(GameSettings {
                    max_players: 1,
                    ..settings()
                })
                .await
                .expect("create")
                .id;
            manager
                .add_player(&game, Player::new("alice", "Alice", "red"))
                .await
                .expect("first join");

            let err = manager
                .add_player(&game, Player::new("bob", "Bob", "blue"))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Capacity { max: 1, .. }));

            // Rejoin of a known player is not a capacity violation and
            // keeps the earned balance.
            let meta = manager
                .add_player(&game, Player::new("alice", "Alice", "red"))
                .await
                .expect("rejoin");
            assert_eq!(meta.player_count, 1);
        });
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    #[test]
    fn chat_is_validated_but_mutates_nothing() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            let before = fingerprint(&manager.game_state(&game).await.unwrap());

            let applied = manager
                .process_action(&game, "alice", Action::ChatMessage { message: "gg".into() })
                .await
                .expect("chat");
            assert!(matches!(
                applied.events[0].payload,
                EventPayload::Chat { .. }
            ));

            let err = manager
                .process_action(&game, "alice", Action::ChatMessage { message: "  ".into() })
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
            let ack = territory_engine::ActionAck::from_error(&err);
            assert!(!ack.accepted);
            assert_eq!(ack.reason.as_deref(), Some("malformed_action"));

            let err = manager
                .process_action(&game, "alice", Action::ChatMessage { message: "x".repeat(501) })
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));

            let after = fingerprint(&manager.game_state(&game).await.unwrap());
            assert_eq!(before, after);
        });
    }

    // -----------------------------------------------------------------------
    // Snapshots, rehydration, persistence failure
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_round_trip_is_lossless() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            manager
                .process_action(&game, "alice", place(StructureKind::Outpost, &[(10, 10), (11, 10), (10, 11), (11, 11)], 0))
                .await
                .expect("place");

            let state = manager.game_state(&game).await.unwrap();
            let bytes = state.to_snapshot().to_bytes().expect("encode");
            let envelope = territory_engine::SnapshotEnvelope::from_bytes(&bytes).expect("decode");
            let restored = GameState::from_snapshot(envelope).expect("rehydrate");

            assert_eq!(fingerprint(&state), fingerprint(&restored));
            assert_eq!(state.players, restored.players);
            assert_eq!(state.structures, restored.structures);
            assert_eq!(state.grid.len(), restored.grid.len());
            assert_eq!(state.grid.bounds(), restored.grid.bounds());
            restored.validate_referential_integrity().expect("consistent");
        });
    }

    #[test]
    fn second_manager_rehydrates_from_shared_cache() {
        block_on(async {
            let (manager, cache) = make_manager();
            let game = game_with_two_teams(&manager).await;
            manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(5, 5)], 0))
                .await
                .expect("place");
            let authoritative = manager.game_state(&game).await.unwrap();

            let other = GameManager::new(
                EngineConfig::default(),
                Arc::new(StructureCatalog::standard()),
                cache,
                Arc::new(MemoryStore::new()),
            );
            assert!(other.active_games().is_empty());
            let rehydrated = other.game_state(&game).await.expect("rehydrate");
            assert_eq!(fingerprint(&authoritative), fingerprint(&rehydrated));
            assert_eq!(other.active_games(), vec![game]);
        });
    }

    /// Cache that can be switched to refuse writes.
    struct FlakyCache {
        inner: MemoryCache,
        fail_puts: AtomicBool,
    }

    impl FlakyCache {
        fn new() -> Self {
            Self {
                inner: MemoryCache::new(),
                fail_puts: AtomicBool::new(false),
            }
        }
    }

    impl SnapshotCache for FlakyCache {
        fn put(&self, game: &str, snapshot: Bytes, ttl: Duration) -> StoreFuture<'_, ()> {
            if self.fail_puts.load(Ordering::Relaxed) {
                Box::pin(std::future::ready(Err(EngineError::Persistence(
                    "cache unavailable".into(),
                ))))
            } else {
                self.inner.put(game, snapshot, ttl)
            }
        }

        fn get(&self, game: &str) -> StoreFuture<'_, Option<Bytes>> {
            self.inner.get(game)
        }

        fn delete(&self, game: &str) -> StoreFuture<'_, ()> {
            self.inner.delete(game)
        }
    }

    #[test]
    fn exhausted_persistence_rolls_the_mutation_back() {
        block_on(async {
            let cache = Arc::new(FlakyCache::new());
            let manager = GameManager::new(
                EngineConfig {
                    persist_attempts: 2,
                    persist_backoff: Duration::from_millis(1),
                    ..Default::default()
                },
                Arc::new(StructureCatalog::standard()),
                cache.clone(),
                Arc::new(MemoryStore::new()),
            );
            let game = manager.create_game(settings()).await.expect("create").id;
            manager
                .add_player(&game, Player::new("alice", "Alice", "red"))
                .await
                .expect("join");
            let before = fingerprint(&manager.game_state(&game).await.unwrap());

            cache.fail_puts.store(true, Ordering::Relaxed);
            let err = manager
                .process_action(&game, "alice", place(StructureKind::Basic, &[(5, 5)], 0))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Persistence(_)));
            cache.fail_puts.store(false, Ordering::Relaxed);

            let state = manager.game_state(&game).await.unwrap();
            assert_eq!(state.players["alice"].resources, 100, "cost refunded");
            assert!(state.structures.is_empty(), "placement rolled back");
            assert_eq!(before, fingerprint(&state));
        });
    }

    // -----------------------------------------------------------------------
    // Phase & deletion
    // -----------------------------------------------------------------------

    #[test]
    fn phase_transitions_follow_the_lifecycle() {
        block_on(async {
            let (manager, _) = make_manager();
            let game = game_with_two_teams(&manager).await;
            use territory_engine::GamePhase;

            let meta = manager.set_phase(&game, GamePhase::Active).await.expect("start");
            assert_eq!(meta.status, GamePhase::Active);
            manager.set_phase(&game, GamePhase::Paused).await.expect("pause");
            manager.set_phase(&game, GamePhase::Active).await.expect("resume");

            let err = manager.set_phase(&game, GamePhase::Waiting).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        });
    }

    #[test]
    fn remove_game_clears_cache_and_residency() {
        block_on(async {
            let (manager, cache) = make_manager();
            let game = game_with_two_teams(&manager).await;
            manager.remove_game(&game).await.expect("remove");
            assert!(manager.active_games().is_empty());
            assert!(cache.is_empty(), "cache entry deleted");
            let err = manager.game_state(&game).await.unwrap_err();
            assert!(matches!(err, EngineError::NotFound { .. }));
        });
    }
}
