//! End-to-end lifecycle tests over the public API.
//!
//! Raw log lines go in one side, persisted games and rating history come
//! out the other. Everything runs against in-memory collaborators: a
//! `MemoryStore`, a manual clock, and scripted server control.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use muster::{
    best_match, process_line, ClientConfig, DiscordId, Dispatcher, Engine, GameMode,
    GaussianSkill, Gather, InGameState, ManualClock, MapChange, MemoryStore, Notice, Notifier,
    PlayerInfo, PlayfabId, Rating, RoundEvent, ServerControl, Store, Team, WebRconClient, Winner,
};

#[derive(Debug, Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Debug, Default)]
struct ScriptedControl {
    map_changes: Mutex<Vec<(String, GameMode)>>,
    players: Mutex<Vec<PlayerInfo>>,
}

impl ScriptedControl {
    fn map_changes(&self) -> Vec<(String, GameMode)> {
        self.map_changes.lock().unwrap().clone()
    }

    fn add_player(&self, name: &str, playfab: &str) {
        self.players.lock().unwrap().push(PlayerInfo {
            name: name.to_string(),
            playfab_id: PlayfabId::new(playfab),
            ping: 30,
        });
    }
}

#[async_trait]
impl ServerControl for ScriptedControl {
    async fn ping(&self) -> bool {
        true
    }

    async fn change_map(&self, map: &str, mode: GameMode) -> Option<MapChange> {
        self.map_changes.lock().unwrap().push((map.to_string(), mode));
        Some(MapChange::Found)
    }

    async fn restart(&self) -> bool {
        true
    }

    async fn player_info(&self, name: &str) -> Option<PlayerInfo> {
        self.players.lock().unwrap().iter().find(|p| p.name == name).cloned()
    }
}

struct Fixture {
    gather: Gather,
    dispatcher: Dispatcher,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    control: Arc<ScriptedControl>,
    notifier: Arc<RecordingNotifier>,
}

const ROSTER: [(&str, &str, u64, f64); 4] = [
    ("Alice", "PF_A", 1, 60.0),
    ("Bob", "PF_B", 2, 60.0),
    ("Carol", "PF_C", 3, 30.0),
    ("Dave", "PF_D", 4, 30.0),
];

async fn fixture(mode: GameMode) -> Fixture {
    let clock = ManualClock::new(1000);
    let store = MemoryStore::new();
    let control = Arc::new(ScriptedControl::default());
    let notifier = Arc::new(RecordingNotifier::default());

    for &(name, playfab, id, mu) in &ROSTER {
        control.add_player(name, playfab);
        store
            .map_identity(PlayfabId::new(playfab), DiscordId(id))
            .await
            .expect("seed identity");
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
    Fixture { gather, dispatcher, clock, store, control, notifier }
}

impl Fixture {
    async fn feed(&mut self, line: &str) {
        process_line(&mut self.dispatcher, &mut self.gather, line).await;
    }
}

/// The reference three-round CTF game: a tie, a blue win, and a scoreless
/// tiebreaker, decided Blue overall.
#[tokio::test]
async fn full_ctf_game_lifecycle() -> Result<()> {
    let mut f = fixture(GameMode::Ctf).await;
    let ids: Vec<DiscordId> = ROSTER.iter().map(|&(_, _, id, _)| DiscordId(id)).collect();
    f.gather.start_new_game(&ids).await?;

    {
        let m = f.gather.current_match().expect("match snapshot");
        assert_eq!(m.blue, vec![DiscordId(1), DiscordId(3)]);
        assert_eq!(m.red, vec![DiscordId(2), DiscordId(4)]);
        assert!((m.match_quality - 0.9724).abs() < 2e-4);
        assert!((m.blue_win_probability - 0.5).abs() < 1e-6);
    }

    // Round 1 on ctf_ash: one kill and one cap each way -> tie, 1000..5000.
    f.feed("[10:00:00] Popup: Loading... ctf_ash").await;
    f.clock.set(2000);
    f.feed("[10:00:10] Alice [PF_A] (Blue) killed Bob [PF_B] (Red) with revolver").await;
    f.clock.set(2500);
    f.feed("[10:00:15] Red flag captured by  Alice [PF_A] (Blue)").await;
    f.clock.set(3000);
    f.feed("[10:00:20] Bob [PF_B] (Red) killed Alice [PF_A] (Blue) with shotgun").await;
    f.clock.set(3500);
    f.feed("[10:00:25] Blue flag captured by  Bob [PF_B] (Red)").await;
    f.clock.set(5000);
    f.feed("[10:00:40] Match state: Ended").await;

    assert_eq!(f.gather.round_wins(), (0, 0));
    assert_eq!(f.gather.ended_rounds().len(), 1);
    let round1 = &f.gather.ended_rounds()[0];
    assert_eq!(round1.winner, Some(Winner::Tie));
    assert_eq!((round1.start_time, round1.end_time), (1000, Some(5000)));
    assert_eq!(round1.events.len(), 4);
    assert_eq!(round1.events[0].at, 2000, "ingestion-time stamps, not log time");

    // Round 2 on ctf_division: two blue caps -> Blue, 6000..8000.
    f.clock.set(6000);
    f.feed("[10:01:00] Popup: Loading... ctf_division").await;
    f.clock.set(7000);
    f.feed("[10:01:10] Red flag captured by  Carol [PF_C] (Blue)").await;
    f.clock.set(7500);
    f.feed("[10:01:15] Red flag captured by  Alice [PF_A] (Blue)").await;
    f.clock.set(8000);
    f.feed("[10:01:20] Match state: Ended").await;

    assert_eq!(f.gather.round_wins(), (1, 0));
    assert_eq!(f.gather.state(), InGameState::GatherStarted, "1-0 is not decided yet");

    // Round three needed: the tiebreaker map gets commanded.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        f.control
            .map_changes()
            .contains(&("ctf_magpie".to_string(), GameMode::Ctf)),
        "tiebreaker map must be commanded, saw {:?}",
        f.control.map_changes()
    );

    // Round 3 on ctf_magpie: nobody scores -> tie, and the game closes.
    f.clock.set(9000);
    f.feed("[10:02:00] Popup: Loading... ctf_magpie").await;
    f.clock.set(10_000);
    f.feed("[10:02:30] Match state: Ended").await;

    assert_eq!(f.gather.state(), InGameState::NoGather);

    let games = f.store.games().await;
    assert_eq!(games.len(), 1);
    let game = &games[0];
    assert_eq!(game.winner, Winner::Blue);
    assert_eq!(game.start_time, 1000);
    assert_eq!(game.end_time, 10_000);
    assert_eq!(game.size, 4);
    assert_eq!(game.blue, vec![DiscordId(1), DiscordId(3)]);
    assert_eq!(game.red, vec![DiscordId(2), DiscordId(4)]);
    assert_eq!(game.rounds.len(), 3);
    assert_eq!(game.rounds[0].map_name, "ctf_ash");
    assert_eq!(game.rounds[1].map_name, "ctf_division");
    assert_eq!(game.rounds[2].map_name, "ctf_magpie");
    assert_eq!(game.rounds[2].winner, Some(Winner::Tie));
    assert!(game.rounds[2].events.is_empty(), "scoreless round is a valid tie");
    assert!((game.match_quality - 0.9724).abs() < 2e-4);
    assert!(game.rounds[0]
        .events
        .iter()
        .any(|e| matches!(e.event, RoundEvent::PlayerKill { weapon: ref w, .. } if w == "revolver")));

    // One rating update per participant per round, in chronological order.
    let history = f.store.rating_history().await;
    assert_eq!(history.len(), 12);
    let starts: Vec<u64> = history.iter().map(|u| u.round_start).collect();
    assert_eq!(&starts[0..4], &[1000; 4]);
    assert_eq!(&starts[4..8], &[6000; 4]);
    assert_eq!(&starts[8..12], &[9000; 4]);
    assert!(history.iter().all(|u| u.game_start == 1000));

    // Blue took the game, so blue players end above their seeds.
    let alice = f.store.rating(DiscordId(1)).await?.expect("rated");
    let bob = f.store.rating(DiscordId(2)).await?.expect("rated");
    assert!(alice.mu > 60.0);
    assert!(bob.mu < 60.0);

    assert!(f
        .notifier
        .notices()
        .contains(&Notice::GameFinished { winner: Winner::Blue, size: 4 }));
    Ok(())
}

#[tokio::test]
async fn matchmaker_reference_values() -> Result<()> {
    let engine = GaussianSkill::default();
    let roster = vec![
        (DiscordId(1), Rating::new(60.0, 2.0)),
        (DiscordId(2), Rating::new(60.0, 2.0)),
        (DiscordId(3), Rating::new(30.0, 2.0)),
        (DiscordId(4), Rating::new(30.0, 2.0)),
    ];
    let candidate = best_match(&engine, &roster)?;
    assert_eq!(candidate.blue, vec![DiscordId(1), DiscordId(3)]);
    assert_eq!(candidate.red, vec![DiscordId(2), DiscordId(4)]);
    assert!((candidate.match_quality - 0.9724).abs() < 2e-4);
    assert!((candidate.blue_win_probability - 0.5).abs() < 1e-6);
    assert!((candidate.red_win_probability - 0.5).abs() < 1e-6);
    Ok(())
}

/// CTB: decisive rounds only, decided 2-0 here by the server's own win
/// announcements.
#[tokio::test]
async fn ctb_game_is_decided_by_win_announcements() -> Result<()> {
    let mut f = fixture(GameMode::Ctb).await;
    let ids: Vec<DiscordId> = ROSTER.iter().map(|&(_, _, id, _)| DiscordId(id)).collect();
    f.gather.start_new_game(&ids).await?;

    f.feed("[11:00:00] Popup: Loading... ctb_crane").await;
    f.clock.set(2000);
    f.feed("[11:00:10] RPC_Capture 3 1 flag 2").await;
    f.clock.set(3000);
    f.feed("[11:00:20] Red WON!").await;
    assert_eq!(f.gather.round_wins(), (0, 1));

    f.clock.set(4000);
    f.feed("[11:01:00] Popup: Loading... ctb_outpost").await;
    f.clock.set(5000);
    f.feed("[11:01:30] Red WON!").await;

    assert_eq!(f.gather.state(), InGameState::NoGather);
    let games = f.store.games().await;
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].winner, Winner::Red);
    assert_eq!(games[0].rounds.len(), 2);
    assert_eq!(games[0].rounds[0].winner, Some(Winner::Red));
    Ok(())
}

/// The `!auth` flow through the spawned engine: code round-trip under a
/// display name full of regex metacharacters.
#[tokio::test]
async fn auth_flow_binds_identity_exactly_once() -> Result<()> {
    let clock = ManualClock::new(1000);
    let store = MemoryStore::new();
    let control = Arc::new(ScriptedControl::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let hostile_name = "We[ird} Name*";
    control.add_player(hostile_name, "PF_WEIRD");

    let mut gather = Gather::new(
        GameMode::Ctf,
        store.clone(),
        Arc::new(GaussianSkill::default()),
        notifier.clone(),
        control.clone(),
        clock.clone(),
    );
    let code = gather.request_authentication(DiscordId(500));
    let dispatcher = Dispatcher::new(clock.clone());

    let (line_tx, line_rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Engine::spawn(gather, dispatcher, line_rx);

    line_tx.send(format!("[12:00:00] [{hostile_name}] !auth {code}"))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Replaying the same code must not bind anything further.
    line_tx.send(format!("[12:00:05] [Somebody Else] !auth {code}"))?;
    line_tx.send("[12:00:06] [Somebody Else] !auth WRONG0".to_string())?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop(line_tx);
    let _gather = engine.await?;

    let identities = store.identity_map().await?;
    assert_eq!(identities.len(), 1, "exactly one binding persisted");
    assert_eq!(identities.get(&PlayfabId::new("PF_WEIRD")), Some(&DiscordId(500)));
    assert!(notifier.notices().contains(&Notice::AuthAccepted {
        external: DiscordId(500),
        playfab: PlayfabId::new("PF_WEIRD"),
    }));
    Ok(())
}

/// The whole pipe at once: duplex transport -> engine -> store.
#[tokio::test]
async fn transport_to_store_round_trip() -> Result<()> {
    use muster::{MessageType, MessageWriter, RawFrame};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (client_io, mut server) = tokio::io::duplex(8192);

    async fn read_frame(server: &mut tokio::io::DuplexStream) -> RawFrame {
        let mut header = [0u8; 2];
        server.read_exact(&mut header).await.expect("header");
        let mut body = vec![0u8; u16::from_be_bytes(header) as usize];
        server.read_exact(&mut body).await.expect("body");
        RawFrame { code: body[0], payload: body.split_off(1) }
    }

    async fn send_line(server: &mut tokio::io::DuplexStream, line: &str) {
        let mut writer = MessageWriter::new();
        writer.write_string(line);
        let frame = writer.into_frame(MessageType::LogLine).expect("frame");
        server.write_all(&frame).await.expect("write");
    }

    let server_task = tokio::spawn(async move {
        let login = read_frame(&mut server).await;
        assert_eq!(login.kind(), Some(MessageType::Login));
        let mut writer = MessageWriter::new();
        let ok = writer.into_frame(MessageType::LoginOk).expect("frame");
        server.write_all(&ok).await.expect("write");

        let probe = read_frame(&mut server).await;
        let echo = probe.text().expect("probe");
        send_line(&mut server, &echo).await;
        server
    });

    let client = Arc::new(
        WebRconClient::handshake(client_io, ClientConfig::new("s", "k")).await?,
    );
    let mut server = server_task.await?;

    let store = MemoryStore::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(1000);
    for &(_, playfab, id, mu) in &ROSTER {
        store.map_identity(PlayfabId::new(playfab), DiscordId(id)).await?;
        store.set_rating(DiscordId(id), Rating::new(mu, 2.0)).await;
    }

    let mut gather = Gather::new(
        GameMode::Ctf,
        store.clone(),
        Arc::new(GaussianSkill::default()),
        notifier.clone(),
        client.clone() as Arc<dyn ServerControl>,
        clock.clone(),
    );
    let ids: Vec<DiscordId> = ROSTER.iter().map(|&(_, _, id, _)| DiscordId(id)).collect();
    gather.start_new_game(&ids).await?;

    let dispatcher = Dispatcher::new(clock.clone());
    let lines = client.take_log_lines().expect("log stream");
    let engine = Engine::spawn(gather, dispatcher, lines);

    // A short decisive game: two straight blue-cap rounds.
    for (map, cap_line) in [
        ("ctf_ash", "[t] Red flag captured by  Alice [PF_A] (Blue)"),
        ("ctf_division", "[t] Red flag captured by  Carol [PF_C] (Blue)"),
    ] {
        send_line(&mut server, &format!("[t] Popup: Loading... {map}")).await;
        send_line(&mut server, cap_line).await;
        send_line(&mut server, "[t] Match state: Ended").await;
    }

    // Closing the socket ends the engine.
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(server);
    let gather = engine.await?;

    assert_eq!(gather.state(), InGameState::NoGather);
    let games = store.games().await;
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].winner, Winner::Blue);
    assert_eq!(games[0].rounds.len(), 2);
    assert_eq!(store.rating_history().await.len(), 8);
    Ok(())
}

/// Team::opponent is used by the fixtures; keep its contract pinned here
/// where the integration suite can see it.
#[test]
fn team_labels_are_symmetric() {
    assert_eq!(Team::Blue.opponent(), Team::Red);
    assert_eq!(Team::Red.opponent(), Team::Blue);
}
