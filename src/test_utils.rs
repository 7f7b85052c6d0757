//! Shared fixtures for unit tests.

#![cfg(test)]

pub(crate) mod harness {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::clock::ManualClock;
    use crate::events::{Dispatcher, GameEvent};
    use crate::gather::Gather;
    use crate::notify::{Notice, Notifier};
    use crate::rating::{GaussianSkill, Rating};
    use crate::store::{MemoryStore, Store};
    use crate::transport::{MapChange, PlayerInfo, ServerControl};
    use crate::types::{DiscordId, GameMode, PlayfabId, Team};

    /// Records every notice for later assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub fn notices(&self) -> Vec<Notice> {
            self.notices.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap_or_else(|e| e.into_inner()).push(notice);
        }
    }

    /// Answers every command locally and records map changes.
    #[derive(Debug, Default)]
    pub struct RecordingControl {
        map_changes: Mutex<Vec<(String, GameMode)>>,
        players: Mutex<Vec<PlayerInfo>>,
    }

    impl RecordingControl {
        pub fn map_changes(&self) -> Vec<(String, GameMode)> {
            self.map_changes.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn add_player(&self, name: &str, playfab: &str) {
            self.players.lock().unwrap_or_else(|e| e.into_inner()).push(PlayerInfo {
                name: name.to_string(),
                playfab_id: PlayfabId::new(playfab),
                ping: 40,
            });
        }
    }

    #[async_trait]
    impl ServerControl for RecordingControl {
        async fn ping(&self) -> bool {
            true
        }

        async fn change_map(&self, map: &str, mode: GameMode) -> Option<MapChange> {
            self.map_changes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((map.to_string(), mode));
            Some(MapChange::Found)
        }

        async fn restart(&self) -> bool {
            true
        }

        async fn player_info(&self, name: &str) -> Option<PlayerInfo> {
            self.players
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|p| p.name == name)
                .cloned()
        }
    }

    /// A gather wired to in-memory collaborators, with four seeded players:
    /// Alice/Bob at (60, 2) and Carol/Dave at (30, 2), playfabs PF1..PF4.
    /// Matchmaking therefore yields blue = [Alice, Carol], red = [Bob, Dave].
    pub struct TestHarness {
        pub gather: Gather,
        pub dispatcher: Dispatcher,
        pub clock: Arc<ManualClock>,
        pub store: Arc<MemoryStore>,
        pub control: Arc<RecordingControl>,
        pub notifier: Arc<RecordingNotifier>,
        pub seeded_identities: usize,
    }

    pub const PLAYERS: [(&str, &str, u64); 4] = [
        ("Alice", "PF1", 1),
        ("Bob", "PF2", 2),
        ("Carol", "PF3", 3),
        ("Dave", "PF4", 4),
    ];

    impl TestHarness {
        pub async fn new(mode: GameMode) -> Self {
            let clock = ManualClock::new(1000);
            let store = MemoryStore::new();
            let control = Arc::new(RecordingControl::default());
            let notifier = Arc::new(RecordingNotifier::default());

            for &(name, playfab, id) in &PLAYERS {
                control.add_player(name, playfab);
                store
                    .map_identity(PlayfabId::new(playfab), DiscordId(id))
                    .await
                    .expect("memory store");
                let mu = if id <= 2 { 60.0 } else { 30.0 };
                store.set_rating(DiscordId(id), Rating::new(mu, 2.0)).await;
            }

            let gather = Gather::new(
                mode,
                store.clone(),
                Arc::new(GaussianSkill::default()),
                notifier.clone(),
                control.clone(),
                clock.clone(),
            );
            let dispatcher = Dispatcher::new(clock.clone());

            Self {
                gather,
                dispatcher,
                clock,
                store,
                control,
                notifier,
                seeded_identities: PLAYERS.len(),
            }
        }

        pub async fn start_default_game(&mut self) {
            let ids: Vec<DiscordId> = PLAYERS.iter().map(|&(_, _, id)| DiscordId(id)).collect();
            self.gather.start_new_game(&ids).await.expect("start game");
        }

        /// Load `map`, score one flag cap per entry of `caps`, then end the
        /// round. Advances the clock as it goes.
        pub async fn play_round(&mut self, map: &str, caps: &[Team]) {
            self.clock.advance(1000);
            self.gather
                .apply(GameEvent::MapLoading { map: map.to_string() })
                .await
                .expect("map load");
            for &team in caps {
                self.clock.advance(500);
                let (name, playfab) = match team {
                    Team::Blue => ("Alice", "PF1"),
                    Team::Red => ("Bob", "PF2"),
                };
                self.gather
                    .apply(GameEvent::FlagCaptured {
                        flag: team.opponent(),
                        player_name: name.to_string(),
                        playfab: PlayfabId::new(playfab),
                        team,
                    })
                    .await
                    .expect("flag cap");
            }
            self.clock.advance(1000);
            self.gather.apply(GameEvent::RoundEnded).await.expect("round end");
        }
    }
}
