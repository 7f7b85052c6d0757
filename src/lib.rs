//! Match lifecycle engine for WebRcon-managed game servers.
//!
//! `muster` turns a game server's unstructured remote-console log stream
//! into a structured, rated multiplayer match lifecycle:
//!
//! - **Wire codec**: the length-prefixed binary frame format (UTF-32
//!   strings, big-endian integers) of the WebRcon protocol
//! - **Transport**: one socket per server, login handshake, replay-gating
//!   initialization probe, and correlated request/response over the same
//!   stream that carries unsolicited log traffic
//! - **Event ingestion**: a declarative regex rule table with replay
//!   deduplication, producing strongly-typed game events
//! - **Match lifecycle**: CTF/CTB rounds, the gather state machine,
//!   balanced matchmaking, and a strictly-ordered per-round rating ledger
//!
//! Persistence, chat delivery, and process supervision stay outside this
//! crate behind the [`Store`], [`Notifier`], and [`ServerControl`] traits.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use muster::{
//!     ClientConfig, Clock, GameMode, GaussianSkill, Gather, MemoryStore, Muster,
//!     NullNotifier, SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> muster::Result<()> {
//!     let client = Arc::new(Muster::connect("10.0.0.5:27070", ClientConfig::new("session", "key")).await?);
//!
//!     let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//!     let gather = Gather::new(
//!         GameMode::Ctf,
//!         MemoryStore::new(),
//!         Arc::new(GaussianSkill::default()),
//!         Arc::new(NullNotifier),
//!         client.clone(),
//!         clock,
//!     );
//!
//!     let engine = Muster::attach(client.as_ref(), gather)?;
//!     let _gather = engine.await;
//!     Ok(())
//! }
//! ```

mod auth;
mod clock;
mod engine;
mod error;
mod events;
mod gather;
mod ledger;
mod matchmaking;
mod notify;
mod rating;
mod rounds;
mod store;
mod transport;
mod types;
mod wire;

#[cfg(test)]
pub(crate) mod test_utils;

pub use auth::{AuthSessions, CODE_LEN};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Engine;
pub use error::{GatherError, Result};
pub use events::{Dispatcher, GameEvent, process_line, DEDUP_WINDOW_MS};
pub use gather::{EngineMsg, Gather, InGameState};
pub use ledger::apply_game;
pub use matchmaking::{best_match, Candidate};
pub use notify::{Notice, Notifier, NullNotifier};
pub use rating::{GaussianSkill, Rating, RatingEngine, TeamRanks};
pub use rounds::{ModeData, Round, RoundEvent, RoundRecord, TimedEvent};
pub use store::{MemoryStore, RatingUpdate, Store};
pub use transport::{ClientConfig, MapChange, PlayerInfo, ServerControl, WebRconClient};
pub use types::{DiscordId, Game, GameMode, Match, PlayfabId, Team, Winner};
pub use wire::{MessageReader, MessageType, MessageWriter, RawFrame, FRAME_HEADER_SIZE};

use tokio::task::JoinHandle;

/// Unified entry point for managing a server.
///
/// Thin factory over the two steps every deployment performs: connect a
/// [`WebRconClient`], then attach a [`Gather`] engine to its log stream.
pub struct Muster;

impl Muster {
    /// Connect to a game server's remote console and complete the login
    /// handshake and initialization probe.
    ///
    /// # Errors
    ///
    /// Fails fatally if the TCP connect, the login, or the initialization
    /// probe fails: retry and restart policy belongs to the supervisor.
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<WebRconClient> {
        WebRconClient::connect(addr, config).await
    }

    /// Spawn the engine task for a connected client, consuming its log-line
    /// stream. The returned handle resolves with the [`Gather`] when the
    /// connection closes.
    ///
    /// # Errors
    ///
    /// Fails if the client's log stream was already taken by a previous
    /// attach.
    pub fn attach(client: &WebRconClient, gather: Gather) -> Result<JoinHandle<Gather>> {
        let lines = client
            .take_log_lines()
            .ok_or_else(|| GatherError::state("log-line stream already consumed"))?;
        let dispatcher = Dispatcher::new(gather.clock());
        Ok(Engine::spawn(gather, dispatcher, lines))
    }
}
