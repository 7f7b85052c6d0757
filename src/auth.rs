//! Short-lived authentication codes.
//!
//! Binding a server-side identity (playfab id) to an external identity must
//! not trust the game server's chat channel: the external user requests a
//! code out-of-band, then proves presence in-game by typing `!auth <code>`.
//! The codes live only in memory; the durable `playfab → external` binding
//! is the store's job.

use std::collections::HashMap;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::types::DiscordId;

/// Length of a minted auth code.
pub const CODE_LEN: usize = 6;

/// Outstanding auth codes for one gather.
#[derive(Debug, Default)]
pub struct AuthSessions {
    codes: HashMap<String, DiscordId>,
}

impl AuthSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a code for an external identity. A user requesting twice simply
    /// ends up with two valid codes; the first one redeemed wins.
    pub fn request(&mut self, external: DiscordId) -> String {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_LEN)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();
        debug!(%external, "minted auth code");
        self.codes.insert(code.clone(), external);
        code
    }

    /// Redeem a code, consuming it. Unknown codes return `None` and mutate
    /// nothing.
    pub fn take(&mut self, code: &str) -> Option<DiscordId> {
        self.codes.remove(code)
    }

    pub fn outstanding(&self) -> usize {
        self.codes.len()
    }
}
