//! Gather orchestrator: the top-level match lifecycle.
//!
//! One [`Gather`] per managed server, cycling `NoGather → GatherStarted →
//! NoGather` once per game. It owns the current round exclusively,
//! translates server-side playfab ids into external ids through the match's
//! identity snapshot before anything reaches the round state machine, and
//! assembles the persisted [`Game`] when the cycle closes.
//!
//! All collaborators are injected at construction: store, rating engine,
//! notification sink, server control, clock. There are no ambient globals.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::auth::AuthSessions;
use crate::clock::Clock;
use crate::events::GameEvent;
use crate::ledger;
use crate::matchmaking;
use crate::notify::{Notice, Notifier};
use crate::rating::RatingEngine;
use crate::rounds::Round;
use crate::store::Store;
use crate::transport::{MapChange, ServerControl};
use crate::types::{DiscordId, Game, GameMode, Match, PlayfabId, Winner};
use crate::{GatherError, Result};

/// Lifecycle state of a managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InGameState {
    NoGather,
    GatherStarted,
}

/// Internal messages re-entering the engine task from spawned work.
///
/// Handlers that need a correlated server reply (the auth lookup) must not
/// suspend the dispatch loop, so they run detached and feed their results
/// back through this queue; every state mutation stays on the engine task.
#[derive(Debug)]
pub enum EngineMsg {
    /// A player presented an auth code and their playfab id resolved.
    Authenticate { playfab: PlayfabId, code: String, player: String },
    /// The playfab lookup for an `!auth` attempt got no answer.
    AuthLookupFailed { player: String },
}

/// One complete multi-round match cycle for a single managed server.
pub struct Gather {
    mode: GameMode,
    state: InGameState,
    current_round: Round,
    ended_rounds: Vec<Round>,
    current_match: Option<Match>,
    auth: AuthSessions,
    store: Arc<dyn Store>,
    rating: Arc<dyn RatingEngine>,
    notifier: Arc<dyn Notifier>,
    control: Arc<dyn ServerControl>,
    clock: Arc<dyn Clock>,
    engine_tx: Option<UnboundedSender<EngineMsg>>,
}

impl Gather {
    pub fn new(
        mode: GameMode,
        store: Arc<dyn Store>,
        rating: Arc<dyn RatingEngine>,
        notifier: Arc<dyn Notifier>,
        control: Arc<dyn ServerControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mode,
            state: InGameState::NoGather,
            current_round: Round::new(mode),
            ended_rounds: Vec::new(),
            current_match: None,
            auth: AuthSessions::new(),
            store,
            rating,
            notifier,
            control,
            clock,
            engine_tx: None,
        }
    }

    pub fn state(&self) -> InGameState {
        self.state
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn current_round(&self) -> &Round {
        &self.current_round
    }

    pub fn ended_rounds(&self) -> &[Round] {
        &self.ended_rounds
    }

    pub fn current_match(&self) -> Option<&Match> {
        self.current_match.as_ref()
    }

    /// The clock this gather stamps events with. Dispatchers attached to
    /// the same connection share it so the dedup window moves in step.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Round wins so far as `(blue, red)`. Ties count for neither side.
    pub fn round_wins(&self) -> (u32, u32) {
        let mut blue = 0;
        let mut red = 0;
        for round in &self.ended_rounds {
            match round.winner {
                Some(Winner::Blue) => blue += 1,
                Some(Winner::Red) => red += 1,
                _ => {}
            }
        }
        (blue, red)
    }

    pub(crate) fn attach_engine(&mut self, tx: UnboundedSender<EngineMsg>) {
        self.engine_tx = Some(tx);
    }

    /// Start a new game: rate the roster, matchmake, snapshot the match,
    /// and open round one.
    pub async fn start_new_game(&mut self, participants: &[DiscordId]) -> Result<()> {
        if self.state == InGameState::GatherStarted {
            return Err(GatherError::state("a gather is already in progress"));
        }

        let mut roster = Vec::with_capacity(participants.len());
        for &id in participants {
            let rating = match self.store.rating(id).await? {
                Some(rating) => rating,
                None => self.rating.create(),
            };
            roster.push((id, rating));
        }

        let candidate = matchmaking::best_match(self.rating.as_ref(), &roster)?;
        let identities = self.store.identity_map().await?;

        info!(
            blue = ?candidate.blue,
            red = ?candidate.red,
            quality = candidate.match_quality,
            "starting new game"
        );

        self.current_match = Some(Match::new(
            candidate.blue,
            candidate.red,
            roster.into_iter().collect::<HashMap<_, _>>(),
            candidate.match_quality,
            candidate.blue_win_probability,
            candidate.red_win_probability,
            self.mode.tiebreaker_map().to_string(),
            identities,
        ));
        self.ended_rounds.clear();
        self.current_round = Round::new(self.mode);
        self.state = InGameState::GatherStarted;
        Ok(())
    }

    /// Apply one typed event. Identifier translation happens here, before
    /// anything touches the round state machine.
    pub async fn apply(&mut self, event: GameEvent) -> Result<()> {
        let now = self.clock.now_ms();
        match event {
            GameEvent::PlayerCommand { player, command, arg } => {
                self.player_command(player, &command, arg);
            }
            GameEvent::RoundEnded => {
                self.end_round(None).await?;
            }
            GameEvent::CtbWon { team } => {
                self.end_round(Some(team.into())).await?;
            }
            GameEvent::MapLoading { map } => {
                info!(%map, "round begins");
                self.current_round.change_map(&map, now);
            }
            GameEvent::FlagCaptured { playfab, team, .. } => {
                match self.translate(&playfab) {
                    Some(player) => self.current_round.flag_captured(team, player, now),
                    None => debug!(%playfab, "flag cap by unknown player, dropped"),
                }
            }
            GameEvent::BaseCaptured { team } => {
                self.current_round.base_captured(team, now);
            }
            GameEvent::PlayerKilled { killer, killer_team, victim, victim_team, weapon, .. } => {
                match (self.translate(&killer), self.translate(&victim)) {
                    (Some(k), Some(v)) => {
                        self.current_round.player_kill(k, killer_team, v, victim_team, &weapon, now);
                    }
                    _ => debug!(%killer, %victim, "kill involving unknown player, dropped"),
                }
            }
        }
        Ok(())
    }

    /// Handle a message re-entering from spawned work.
    pub async fn handle_msg(&mut self, msg: EngineMsg) -> Result<()> {
        match msg {
            EngineMsg::Authenticate { playfab, code, player } => {
                self.authenticate(playfab, &code, &player).await?;
            }
            EngineMsg::AuthLookupFailed { player } => {
                debug!(%player, "auth lookup got no player info");
                self.notifier.notify(Notice::AuthRejected { player });
            }
        }
        Ok(())
    }

    /// Mint an auth code for an external identity.
    pub fn request_authentication(&mut self, external: DiscordId) -> String {
        self.auth.request(external)
    }

    /// Redeem an auth code for a resolved playfab id. Unknown codes are
    /// reported as rejections and mutate nothing.
    pub async fn authenticate(
        &mut self,
        playfab: PlayfabId,
        code: &str,
        player: &str,
    ) -> Result<bool> {
        match self.auth.take(code) {
            None => {
                debug!(player, "unknown auth code");
                self.notifier.notify(Notice::AuthRejected { player: player.to_string() });
                Ok(false)
            }
            Some(external) => {
                self.store.map_identity(playfab.clone(), external).await?;
                info!(%external, %playfab, "identity authenticated");
                self.notifier.notify(Notice::AuthAccepted { external, playfab });
                Ok(true)
            }
        }
    }

    /// Finalize the current round and either continue the game or close it.
    pub async fn end_round(&mut self, explicit: Option<Winner>) -> Result<()> {
        if self.state != InGameState::GatherStarted {
            return Err(GatherError::state("no gather in progress"));
        }
        let now = self.clock.now_ms();
        // End in place first: a failed end (CTB without a winner) must leave
        // the live round untouched.
        let winner = self.current_round.end(now, explicit)?;
        let round = std::mem::replace(&mut self.current_round, Round::new(self.mode));
        info!(map = %round.map_name, %winner, "round ended");
        self.ended_rounds.push(round);

        let (blue_wins, red_wins) = self.round_wins();
        if blue_wins >= 2 || red_wins >= 2 || self.ended_rounds.len() >= 3 {
            self.end_game().await
        } else {
            if self.ended_rounds.len() == 2 {
                self.command_tiebreaker_map();
            }
            Ok(())
        }
    }

    /// Close the game: persist the record, run the rating ledger, reset.
    async fn end_game(&mut self) -> Result<()> {
        let m = self
            .current_match
            .take()
            .ok_or_else(|| GatherError::state("game ending without a match snapshot"))?;

        let (blue_wins, red_wins) = self.round_wins();
        let winner = if blue_wins > red_wins {
            Winner::Blue
        } else if red_wins > blue_wins {
            Winner::Red
        } else {
            Winner::Tie
        };

        let now = self.clock.now_ms();
        let start_time = self.ended_rounds.first().map_or(now, |r| r.start_time);
        let end_time = self.ended_rounds.last().and_then(|r| r.end_time).unwrap_or(now);

        let game = Game {
            start_time,
            end_time,
            mode: self.mode,
            winner,
            blue: m.blue.clone(),
            red: m.red.clone(),
            rounds: self.ended_rounds.clone(),
            match_quality: m.match_quality,
            blue_win_probability: m.blue_win_probability,
            red_win_probability: m.red_win_probability,
            size: m.size(),
        };

        info!(%winner, rounds = game.rounds.len(), "game over");
        self.store.insert_game(&game).await?;
        ledger::apply_game(self.store.as_ref(), self.rating.as_ref(), &game).await?;
        self.notifier.notify(Notice::GameFinished { winner, size: game.size });

        self.ended_rounds.clear();
        self.current_round = Round::new(self.mode);
        self.state = InGameState::NoGather;
        Ok(())
    }

    /// Switch the server's game mode and load that mode's seed map.
    /// Rejected while a gather is in progress: no state corruption
    /// mid-match.
    pub async fn change_game_mode(&mut self, mode: GameMode) -> Result<()> {
        if self.state == InGameState::GatherStarted {
            return Err(GatherError::state("cannot change mode while a gather is in progress"));
        }
        self.mode = mode;
        self.current_round = Round::new(mode);
        let map = mode.seed_map();
        match self.control.change_map(map, mode).await {
            Some(MapChange::Found) => info!(%mode, map, "game mode changed"),
            outcome => {
                warn!(%mode, map, ?outcome, "seed map load unconfirmed");
                self.notifier.notify(Notice::MapChangeFailed { map: map.to_string() });
            }
        }
        Ok(())
    }

    fn translate(&self, playfab: &PlayfabId) -> Option<DiscordId> {
        self.current_match.as_ref()?.external_id(playfab)
    }

    fn player_command(&mut self, player: String, command: &str, arg: Option<String>) {
        match command {
            "auth" => {
                let Some(code) = arg else {
                    debug!(%player, "auth command without a code");
                    self.notifier.notify(Notice::AuthRejected { player });
                    return;
                };
                let Some(tx) = self.engine_tx.clone() else {
                    debug!(%player, "auth command with no engine attached, dropped");
                    return;
                };
                // The playfab lookup awaits a correlated reply; it must not
                // stall the dispatch loop, so it runs detached and re-enters
                // through the engine queue.
                let control = Arc::clone(&self.control);
                tokio::spawn(async move {
                    let lookup = control.player_info(&player).await;
                    let msg = match lookup {
                        Some(info) => EngineMsg::Authenticate {
                            playfab: info.playfab_id,
                            code,
                            player,
                        },
                        None => EngineMsg::AuthLookupFailed { player },
                    };
                    let _ = tx.send(msg);
                });
            }
            other => {
                debug!(%player, command = other, "unhandled player command");
            }
        }
    }

    fn command_tiebreaker_map(&self) {
        let Some(m) = self.current_match.as_ref() else { return };
        let map = m.tiebreaker_map.clone();
        let mode = self.mode;
        let control = Arc::clone(&self.control);
        let notifier = Arc::clone(&self.notifier);
        info!(%map, "round three needed, commanding tiebreaker map");
        tokio::spawn(async move {
            match control.change_map(&map, mode).await {
                Some(MapChange::Found) => {}
                outcome => {
                    warn!(%map, ?outcome, "tiebreaker map load unconfirmed");
                    notifier.notify(Notice::MapChangeFailed { map });
                }
            }
        });
    }
}
