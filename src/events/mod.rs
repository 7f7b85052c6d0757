//! Log-line ingestion: a declarative rule table turning raw lines into
//! strongly-typed [`GameEvent`]s.
//!
//! Every inbound line is offered to every rule: rules are independent, not
//! exclusive. A rule fires when its pattern matches and its precondition
//! against the current gather holds; marked rules are additionally
//! deduplicated against protocol replay (see [`dedup`]). The output of a
//! fired rule is a [`GameEvent`], never a loosely-shaped capture bag: the
//! round state machine only ever sees the typed union.
//!
//! A rule that matches but fails to parse its captures is logged and skipped;
//! it never blocks the remaining rules for that line or subsequent lines.

pub mod dedup;

use std::str::FromStr;
use std::sync::Arc;

use regex::{Captures, Regex};
use tracing::{trace, warn};

use crate::clock::Clock;
use crate::gather::{Gather, InGameState};
use crate::types::{GameMode, PlayfabId, Team};

pub use dedup::{DedupCache, DEDUP_WINDOW_MS};

/// Typed domain event parsed from a log line.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A player typed `!<command>` in game chat.
    PlayerCommand { player: String, command: String, arg: Option<String> },
    /// CTF round-end marker.
    RoundEnded,
    /// A flag was carried home. `flag` is the flag's color, `team` the
    /// capturing side.
    FlagCaptured { flag: Team, player_name: String, playfab: PlayfabId, team: Team },
    /// CTB base capture (bookkeeping only; the winner comes from `CtbWon`).
    BaseCaptured { team: Team },
    /// CTB win announcement: ends the round with an explicit winner.
    CtbWon { team: Team },
    /// The server is loading a map; doubles as "next round begins".
    MapLoading { map: String },
    PlayerKilled {
        killer_name: String,
        killer: PlayfabId,
        killer_team: Team,
        victim_name: String,
        victim: PlayfabId,
        victim_team: Team,
        weapon: String,
    },
}

/// One entry of the rule table.
struct EventRule {
    name: &'static str,
    pattern: Regex,
    precondition: fn(&Gather) -> bool,
    parse: fn(&Captures<'_>) -> Option<GameEvent>,
    dedup: bool,
}

/// Ordered rule table plus the per-connection dedup cache.
pub struct Dispatcher {
    rules: Vec<EventRule>,
    dedup: DedupCache,
}

impl Dispatcher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { rules: rule_table(), dedup: DedupCache::new(clock) }
    }

    /// Evaluate every rule against `line`, returning the events that fired
    /// as `(rule name, event)` pairs in table order.
    pub fn dispatch(&mut self, gather: &Gather, line: &str) -> Vec<(&'static str, GameEvent)> {
        let mut fired = Vec::new();
        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(line) else { continue };
            if !(rule.precondition)(gather) {
                trace!(rule = rule.name, "precondition rejected line");
                continue;
            }
            if rule.dedup && !self.dedup.admit(line) {
                trace!(rule = rule.name, "duplicate line suppressed");
                continue;
            }
            match (rule.parse)(&caps) {
                Some(event) => fired.push((rule.name, event)),
                None => warn!(rule = rule.name, line, "rule matched but captures did not parse"),
            }
        }
        fired
    }
}

/// Dispatch a line and apply every resulting event to the gather, isolating
/// per-event failures.
pub async fn process_line(dispatcher: &mut Dispatcher, gather: &mut Gather, line: &str) {
    for (rule, event) in dispatcher.dispatch(gather, line) {
        if let Err(error) = gather.apply(event).await {
            warn!(rule, %error, "event application failed");
        }
    }
}

fn any_state(_gather: &Gather) -> bool {
    true
}

fn in_gather(gather: &Gather) -> bool {
    gather.state() == InGameState::GatherStarted
}

fn in_ctf_gather(gather: &Gather) -> bool {
    in_gather(gather) && gather.mode() == GameMode::Ctf
}

fn in_ctb_gather(gather: &Gather) -> bool {
    in_gather(gather) && gather.mode() == GameMode::Ctb
}

fn team(caps: &Captures<'_>, name: &str) -> Option<Team> {
    Team::from_str(caps.name(name)?.as_str()).ok()
}

fn text(caps: &Captures<'_>, name: &str) -> Option<String> {
    Some(caps.name(name)?.as_str().to_string())
}

fn parse_player_command(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::PlayerCommand {
        player: text(caps, "player")?,
        command: text(caps, "cmd")?.to_ascii_lowercase(),
        arg: caps.name("arg").map(|m| m.as_str().to_string()),
    })
}

fn parse_round_ended(_caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::RoundEnded)
}

fn parse_flag_captured(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::FlagCaptured {
        flag: team(caps, "flag")?,
        player_name: text(caps, "name")?,
        playfab: PlayfabId::new(text(caps, "playfab")?),
        team: team(caps, "team")?,
    })
}

fn parse_base_captured(caps: &Captures<'_>) -> Option<GameEvent> {
    // The capture line carries no team name; the flag index parity encodes
    // the side (even flags belong to blue's lane).
    let flag: u32 = caps.name("flag")?.as_str().parse().ok()?;
    let team = if flag % 2 == 0 { Team::Blue } else { Team::Red };
    Some(GameEvent::BaseCaptured { team })
}

fn parse_ctb_won(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::CtbWon { team: team(caps, "team")? })
}

fn parse_map_loading(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::MapLoading { map: text(caps, "map")? })
}

fn parse_player_killed(caps: &Captures<'_>) -> Option<GameEvent> {
    Some(GameEvent::PlayerKilled {
        killer_name: text(caps, "killer")?,
        killer: PlayfabId::new(text(caps, "kpf")?),
        killer_team: team(caps, "kteam")?,
        victim_name: text(caps, "victim")?,
        victim: PlayfabId::new(text(caps, "vpf")?),
        victim_team: team(caps, "vteam")?,
        weapon: text(caps, "weapon")?,
    })
}

/// The static rule catalog. Compiled once per dispatcher; patterns are
/// fixed at build time, so a failed compile is a programmer error.
fn rule_table() -> Vec<EventRule> {
    let rule = |name: &'static str,
                pattern: &str,
                precondition: fn(&Gather) -> bool,
                parse: fn(&Captures<'_>) -> Option<GameEvent>,
                dedup: bool| EventRule {
        name,
        pattern: Regex::new(pattern).expect("event rule pattern must compile"),
        precondition,
        parse,
        dedup,
    };

    vec![
        // Chat commands are echoed twice by some transports; dedup them.
        rule(
            "player_command",
            r"^\[[^\]]+\] \[(?P<player>[^\]]+)\] !(?P<cmd>[A-Za-z]+)(?:\s+(?P<arg>\S+))?\s*$",
            any_state,
            parse_player_command,
            true,
        ),
        rule(
            "round_ended",
            r"^\[[^\]]+\] Match state: Ended\s*$",
            in_ctf_gather,
            parse_round_ended,
            false,
        ),
        rule(
            "flag_captured",
            r"^\[[^\]]+\] (?P<flag>Blue|Red) flag captured by\s+(?P<name>.+?) \[(?P<playfab>\w+)\] \((?P<team>Blue|Red)\)\s*$",
            in_ctf_gather,
            parse_flag_captured,
            false,
        ),
        rule(
            "base_captured",
            r"^\[[^\]]+\] RPC_Capture (?P<a>\d+) (?P<b>\d+) flag (?P<flag>\d+)\s*$",
            in_ctb_gather,
            parse_base_captured,
            false,
        ),
        rule(
            "ctb_won",
            r"^\[[^\]]+\] (?P<team>Blue|Red) WON!\s*$",
            in_ctb_gather,
            parse_ctb_won,
            false,
        ),
        rule(
            "map_loading",
            r"^\[[^\]]+\] Popup: Loading\.\.\. (?P<map>\S+)\s*$",
            in_gather,
            parse_map_loading,
            false,
        ),
        rule(
            "player_killed",
            r"^\[[^\]]+\] (?P<killer>.+?) \[(?P<kpf>\w+)\] \((?P<kteam>Blue|Red)\) killed (?P<victim>.+?) \[(?P<vpf>\w+)\] \((?P<vteam>Blue|Red)\) with (?P<weapon>.+?)\s*$",
            in_gather,
            parse_player_killed,
            false,
        ),
    ]
}
