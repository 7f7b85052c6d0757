//! High-level command surface over the correlated request/response layer.
//!
//! Every operation here is a free-text `Command` frame whose answer is
//! fished out of the log-line stream by predicate. Timeouts are soft: the
//! orchestrator treats "no answer" as "assume unhealthy" and escalates
//! outside this crate.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::types::{GameMode, PlayfabId};

use super::{random_token, WebRconClient};

/// Outcome of a `loadmap` command, when the server answered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapChange {
    Found,
    NotFound,
}

/// One row of the `listplayers` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    pub name: String,
    pub playfab_id: PlayfabId,
    pub ping: u32,
}

/// The command surface the gather orchestrator needs from a managed server.
///
/// Implemented by [`WebRconClient`] in production and by recording doubles
/// in tests. Every method returns a soft outcome; `None`/`false` means the
/// server never answered inside the timeout.
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Liveness probe: a tokenized echo.
    async fn ping(&self) -> bool;

    /// Load a map in a mode. `None` means no reply at all.
    async fn change_map(&self, map: &str, mode: GameMode) -> Option<MapChange>;

    /// Restart the server process.
    async fn restart(&self) -> bool;

    /// Look up one player's row in the `listplayers` reply.
    async fn player_info(&self, name: &str) -> Option<PlayerInfo>;
}

#[async_trait]
impl ServerControl for WebRconClient {
    async fn ping(&self) -> bool {
        let token = random_token();
        let command = format!("echotest {token}");
        let reply = self
            .command_with_reply(
                &command,
                move |line: &str| line.contains(token.as_str()).then_some(()),
                self.response_timeout(),
            )
            .await;
        matches!(reply, Ok(Some(())))
    }

    async fn change_map(&self, map: &str, mode: GameMode) -> Option<MapChange> {
        let command = format!("loadmap {map} {}", mode.command_name());
        let wanted = map.to_string();
        let reply = self
            .command_with_reply(
                &command,
                move |line: &str| {
                    if line.contains("Loading map") && line.contains(wanted.as_str()) {
                        Some(MapChange::Found)
                    } else if line.contains("not found") && line.contains(wanted.as_str()) {
                        Some(MapChange::NotFound)
                    } else {
                        None
                    }
                },
                self.response_timeout(),
            )
            .await;
        reply.unwrap_or_default()
    }

    async fn restart(&self) -> bool {
        let reply = self
            .command_with_reply(
                "restart",
                |line: &str| line.contains("Restarting").then_some(()),
                self.response_timeout(),
            )
            .await;
        matches!(reply, Ok(Some(())))
    }

    async fn player_info(&self, name: &str) -> Option<PlayerInfo> {
        // Display names are untrusted data, not pattern syntax: a player
        // named "[Bo]ss*" must match literally.
        let pattern = format!(
            r"^\s*{}\s+(?P<playfab>\w+)\s+(?P<ping>\d+)\b",
            regex::escape(name)
        );
        let row = match Regex::new(&pattern) {
            Ok(row) => row,
            Err(error) => {
                warn!(%error, "player lookup pattern failed to compile");
                return None;
            }
        };
        let wanted = name.to_string();
        let reply = self
            .command_with_reply(
                "listplayers",
                move |line: &str| {
                    let caps = row.captures(line)?;
                    Some(PlayerInfo {
                        name: wanted.clone(),
                        playfab_id: PlayfabId::new(caps.name("playfab")?.as_str()),
                        ping: caps.name("ping")?.as_str().parse().ok()?,
                    })
                },
                self.response_timeout(),
            )
            .await;
        reply.unwrap_or_default()
    }
}
