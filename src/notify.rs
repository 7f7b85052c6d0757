//! Outbound notifications to the chat-facing surface.
//!
//! The Discord layer (message formatting, channels) lives outside this
//! crate; the gather core only emits structured [`Notice`]s through an
//! injected [`Notifier`]. Delivery is fire-and-forget: a dropped notice
//! never affects match state.

use crate::types::{DiscordId, PlayfabId, Winner};

/// Structured notification emitted by the gather core.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// An `!auth` code was accepted and the identity binding persisted.
    AuthAccepted { external: DiscordId, playfab: PlayfabId },
    /// An `!auth` attempt failed (unknown code or unresolvable player).
    AuthRejected { player: String },
    /// A game finished and was persisted.
    GameFinished { winner: Winner, size: usize },
    /// A commanded map change got no confirmation from the server.
    MapChangeFailed { map: String },
}

/// Sink for notices. Implemented by the Discord surface in production.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Discards every notice. Useful as a default and in tests that do not
/// assert on notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}
