//! Round state machine.
//!
//! A round is *active* from the map load that starts it until `end()`, which
//! fixes its winner and end time: terminal, no further mutation. The two
//! game modes share the structure but differ in how a winner is derived:
//! CTF compares capture counters (ties allowed), CTB is told its winner by
//! the server's own win announcement (no ties).
//!
//! Mode-specific data is a tagged union, dispatched in [`Round::end`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{DiscordId, GameMode, Team, Winner};
use crate::{GatherError, Result};

/// Something that happened during a round, in internal identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoundEvent {
    FlagCap {
        team: Team,
        player: DiscordId,
    },
    BaseCapture {
        team: Team,
    },
    PlayerKill {
        killer: DiscordId,
        killer_team: Team,
        victim: DiscordId,
        victim_team: Team,
        weapon: String,
    },
}

/// A [`RoundEvent`] stamped with its ingestion time (milliseconds). The
/// server's own log timestamps are local time and unreliable; they are never
/// used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub at: u64,
    pub event: RoundEvent,
}

/// Mode-specific round counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeData {
    Ctf { red_caps: u32, blue_caps: u32 },
    Ctb { red_caps: u32, blue_caps: u32 },
}

impl ModeData {
    fn new(mode: GameMode) -> Self {
        match mode {
            GameMode::Ctf => ModeData::Ctf { red_caps: 0, blue_caps: 0 },
            GameMode::Ctb => ModeData::Ctb { red_caps: 0, blue_caps: 0 },
        }
    }
}

/// One map's worth of play within a gather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub map_name: String,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub winner: Option<Winner>,
    pub events: Vec<TimedEvent>,
    pub mode: ModeData,
}

/// Serializable round detail embedded in a persisted game.
pub type RoundRecord = Round;

impl Round {
    /// A fresh round awaiting its map load.
    pub fn new(mode: GameMode) -> Self {
        Self {
            map_name: String::new(),
            start_time: 0,
            end_time: None,
            winner: None,
            events: Vec::new(),
            mode: ModeData::new(mode),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.winner.is_some()
    }

    pub fn blue_caps(&self) -> u32 {
        match self.mode {
            ModeData::Ctf { blue_caps, .. } | ModeData::Ctb { blue_caps, .. } => blue_caps,
        }
    }

    pub fn red_caps(&self) -> u32 {
        match self.mode {
            ModeData::Ctf { red_caps, .. } | ModeData::Ctb { red_caps, .. } => red_caps,
        }
    }

    /// Start (or restart) the round on a newly loaded map. The server
    /// signals new rounds with a map-load message, so this doubles as
    /// "round N+1 begins": counters and the event log reset.
    pub fn change_map(&mut self, map: &str, now: u64) {
        self.map_name = map.to_string();
        self.start_time = now;
        self.end_time = None;
        self.winner = None;
        self.events.clear();
        self.mode = match self.mode {
            ModeData::Ctf { .. } => ModeData::Ctf { red_caps: 0, blue_caps: 0 },
            ModeData::Ctb { .. } => ModeData::Ctb { red_caps: 0, blue_caps: 0 },
        };
    }

    fn push_event(&mut self, event: RoundEvent, now: u64) {
        if self.is_ended() {
            debug!(?event, "dropping event for ended round");
            return;
        }
        self.events.push(TimedEvent { at: now, event });
    }

    /// A flag capture credited to `team`.
    pub fn flag_captured(&mut self, team: Team, player: DiscordId, now: u64) {
        if self.is_ended() {
            debug!(%team, "dropping flag cap for ended round");
            return;
        }
        if let ModeData::Ctf { red_caps, blue_caps } = &mut self.mode {
            match team {
                Team::Blue => *blue_caps += 1,
                Team::Red => *red_caps += 1,
            }
        }
        self.push_event(RoundEvent::FlagCap { team, player }, now);
    }

    /// A base capture credited to `team` (CTB bookkeeping; the winner still
    /// comes from the server's announcement).
    pub fn base_captured(&mut self, team: Team, now: u64) {
        if self.is_ended() {
            debug!(%team, "dropping base capture for ended round");
            return;
        }
        if let ModeData::Ctb { red_caps, blue_caps } = &mut self.mode {
            match team {
                Team::Blue => *blue_caps += 1,
                Team::Red => *red_caps += 1,
            }
        }
        self.push_event(RoundEvent::BaseCapture { team }, now);
    }

    pub fn player_kill(
        &mut self,
        killer: DiscordId,
        killer_team: Team,
        victim: DiscordId,
        victim_team: Team,
        weapon: &str,
        now: u64,
    ) {
        self.push_event(
            RoundEvent::PlayerKill {
                killer,
                killer_team,
                victim,
                victim_team,
                weapon: weapon.to_string(),
            },
            now,
        );
    }

    /// Finalize the round.
    ///
    /// CTF derives the winner from the capture counters (strictly greater
    /// wins, equal is a tie: a round with no action at all is a legitimate
    /// tie). CTB requires the explicit winner from the server's win
    /// announcement; ending a CTB round without one is a caller error.
    pub fn end(&mut self, now: u64, explicit: Option<Winner>) -> Result<Winner> {
        if let Some(winner) = self.winner {
            return Err(GatherError::state(format!(
                "round already ended with winner {winner}"
            )));
        }
        let winner = match self.mode {
            ModeData::Ctf { red_caps, blue_caps } => {
                if blue_caps > red_caps {
                    Winner::Blue
                } else if red_caps > blue_caps {
                    Winner::Red
                } else {
                    Winner::Tie
                }
            }
            ModeData::Ctb { .. } => match explicit {
                Some(Winner::Tie) | None => {
                    return Err(GatherError::state(
                        "CTB rounds require an explicit, non-tie winner",
                    ));
                }
                Some(winner) => winner,
            },
        };
        self.winner = Some(winner);
        self.end_time = Some(now);
        Ok(winner)
    }
}
