//! Core domain types shared across the gather lifecycle.
//!
//! Identifier hygiene matters here: the game server only ever speaks in
//! playfab ids, while matchmaking, ratings, and persistence are keyed by the
//! external (Discord) identity. The two are distinct newtypes so they cannot
//! be confused, and the only bridge between them is the identity snapshot
//! carried by a [`Match`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rating::Rating;

/// External (Discord) identity. The key for ratings and persisted games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscordId(pub u64);

impl fmt::Display for DiscordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The game server's native player identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayfabId(pub String);

impl PlayfabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PlayfabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Blue,
    Red,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::Blue => Team::Red,
            Team::Red => Team::Blue,
        }
    }
}

impl FromStr for Team {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("blue") {
            Ok(Team::Blue)
        } else if s.eq_ignore_ascii_case("red") {
            Ok(Team::Red)
        } else {
            Err(())
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Blue => f.write_str("Blue"),
            Team::Red => f.write_str("Red"),
        }
    }
}

/// Outcome of a round or a whole game. CTB rounds never produce `Tie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Blue,
    Red,
    Tie,
}

impl From<Team> for Winner {
    fn from(team: Team) -> Self {
        match team {
            Team::Blue => Winner::Blue,
            Team::Red => Winner::Red,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Blue => f.write_str("Blue"),
            Winner::Red => f.write_str("Red"),
            Winner::Tie => f.write_str("Tie"),
        }
    }
}

/// Game mode of the managed server. Determines the win-condition rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    /// Capture the flag: round winner from cap comparison, ties possible.
    Ctf,
    /// Capture the base: round winner announced by the server, no ties.
    Ctb,
}

impl GameMode {
    /// Argument form used by the `loadmap <name> <mode>` command.
    pub fn command_name(self) -> &'static str {
        match self {
            GameMode::Ctf => "CTF",
            GameMode::Ctb => "CTB",
        }
    }

    /// The rotation pool for this mode. The server cycles these in order.
    pub fn map_pool(self) -> &'static [&'static str] {
        match self {
            GameMode::Ctf => &["ctf_ash", "ctf_division", "ctf_magpie", "ctf_citadel"],
            GameMode::Ctb => &["ctb_crane", "ctb_outpost", "ctb_meridian"],
        }
    }

    /// Map loaded when switching a server to this mode.
    pub fn seed_map(self) -> &'static str {
        self.map_pool()[0]
    }

    /// Map commanded when a third round is needed. The first two rounds come
    /// from the rotation; the third slot is reserved for the decider.
    pub fn tiebreaker_map(self) -> &'static str {
        self.map_pool()[2]
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Immutable snapshot of a matchmade team assignment.
///
/// Created by [`Gather::start_new_game`](crate::Gather::start_new_game) and
/// never mutated afterwards; consumed when the finished [`Game`] is built.
#[derive(Debug, Clone)]
pub struct Match {
    pub blue: Vec<DiscordId>,
    pub red: Vec<DiscordId>,
    /// Per-participant rating as of match start.
    pub ratings: HashMap<DiscordId, Rating>,
    pub match_quality: f64,
    pub blue_win_probability: f64,
    pub red_win_probability: f64,
    /// Map commanded for a third round, chosen up front.
    pub tiebreaker_map: String,
    /// Identity snapshot used to translate server-side ids to external ids.
    identities: HashMap<PlayfabId, DiscordId>,
}

impl Match {
    pub fn new(
        blue: Vec<DiscordId>,
        red: Vec<DiscordId>,
        ratings: HashMap<DiscordId, Rating>,
        match_quality: f64,
        blue_win_probability: f64,
        red_win_probability: f64,
        tiebreaker_map: String,
        identities: HashMap<PlayfabId, DiscordId>,
    ) -> Self {
        Self {
            blue,
            red,
            ratings,
            match_quality,
            blue_win_probability,
            red_win_probability,
            tiebreaker_map,
            identities,
        }
    }

    /// Which team a participant plays on, if any.
    pub fn team_of(&self, id: DiscordId) -> Option<Team> {
        if self.blue.contains(&id) {
            Some(Team::Blue)
        } else if self.red.contains(&id) {
            Some(Team::Red)
        } else {
            None
        }
    }

    /// Translate a server-side identity into the external identity, but only
    /// for players actually in this match.
    pub fn external_id(&self, playfab: &PlayfabId) -> Option<DiscordId> {
        let id = *self.identities.get(playfab)?;
        self.team_of(id).map(|_| id)
    }

    /// All participants, blue then red.
    pub fn participants(&self) -> impl Iterator<Item = DiscordId> + '_ {
        self.blue.iter().chain(self.red.iter()).copied()
    }

    pub fn size(&self) -> usize {
        self.blue.len() + self.red.len()
    }
}

/// Completed game record handed to the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub start_time: u64,
    pub end_time: u64,
    pub mode: GameMode,
    pub winner: Winner,
    pub blue: Vec<DiscordId>,
    pub red: Vec<DiscordId>,
    pub rounds: Vec<crate::rounds::RoundRecord>,
    pub match_quality: f64,
    pub blue_win_probability: f64,
    pub red_win_probability: f64,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_parsing_and_opponent() {
        assert_eq!("Blue".parse::<Team>(), Ok(Team::Blue));
        assert_eq!("red".parse::<Team>(), Ok(Team::Red));
        assert!("Green".parse::<Team>().is_err());
        assert_eq!(Team::Blue.opponent(), Team::Red);
        assert_eq!(Team::Red.opponent(), Team::Blue);
    }

    #[test]
    fn mode_maps_are_consistent() {
        for mode in [GameMode::Ctf, GameMode::Ctb] {
            let pool = mode.map_pool();
            assert!(pool.len() >= 3, "{mode} pool must cover three rounds");
            assert_eq!(mode.seed_map(), pool[0]);
            assert_eq!(mode.tiebreaker_map(), pool[2]);
        }
    }

    #[test]
    fn match_identity_translation_is_scoped_to_participants() {
        let a = DiscordId(1);
        let b = DiscordId(2);
        let stranger = DiscordId(99);
        let mut identities = HashMap::new();
        identities.insert(PlayfabId::new("PF_A"), a);
        identities.insert(PlayfabId::new("PF_STRANGER"), stranger);

        let m = Match::new(
            vec![a],
            vec![b],
            HashMap::new(),
            0.5,
            0.5,
            0.5,
            "ctf_magpie".to_string(),
            identities,
        );

        assert_eq!(m.external_id(&PlayfabId::new("PF_A")), Some(a));
        // Known identity, but not part of this match.
        assert_eq!(m.external_id(&PlayfabId::new("PF_STRANGER")), None);
        assert_eq!(m.external_id(&PlayfabId::new("PF_UNKNOWN")), None);
        assert_eq!(m.team_of(a), Some(Team::Blue));
        assert_eq!(m.team_of(b), Some(Team::Red));
        assert_eq!(m.size(), 2);
    }
}
