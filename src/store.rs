//! Persistence contract and an in-memory reference implementation.
//!
//! The real deployment backs this with the stats database; the gather core
//! only sees the [`Store`] trait. [`MemoryStore`] implements the same
//! contract on hash maps and is what the tests (and local development) use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::rating::Rating;
use crate::types::{DiscordId, Game, PlayfabId};
use crate::Result;

/// One durably recorded per-round rating change.
///
/// `game_start`/`round_start` locate the update on the timeline; keeping
/// every round's posterior (not just the final one) is what makes
/// rating-over-time displays and audits possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub id: DiscordId,
    pub game_start: u64,
    pub round_start: u64,
    pub rating: Rating,
}

/// External persistence contract.
#[async_trait]
pub trait Store: Send + Sync {
    /// Current rating for a player, if one has ever been recorded.
    async fn rating(&self, id: DiscordId) -> Result<Option<Rating>>;

    /// Persist a completed game.
    async fn insert_game(&self, game: &Game) -> Result<()>;

    /// Record one per-round rating change and make it the player's current
    /// rating.
    async fn update_rating(
        &self,
        id: DiscordId,
        game_start: u64,
        round_start: u64,
        rating: Rating,
    ) -> Result<()>;

    /// Persist a server-identity binding produced by authentication.
    async fn map_identity(&self, playfab: PlayfabId, external: DiscordId) -> Result<()>;

    /// Full playfab → external identity map.
    async fn identity_map(&self) -> Result<HashMap<PlayfabId, DiscordId>>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    ratings: HashMap<DiscordId, Rating>,
    history: Vec<RatingUpdate>,
    games: Vec<Game>,
    identities: HashMap<PlayfabId, DiscordId>,
}

/// In-memory [`Store`] for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a player's current rating without recording history.
    pub async fn set_rating(&self, id: DiscordId, rating: Rating) {
        self.inner.write().await.ratings.insert(id, rating);
    }

    /// All persisted games, in insertion order.
    pub async fn games(&self) -> Vec<Game> {
        self.inner.read().await.games.clone()
    }

    /// Every per-round rating change, in the order it was recorded.
    pub async fn rating_history(&self) -> Vec<RatingUpdate> {
        self.inner.read().await.history.clone()
    }

    pub async fn identity_count(&self) -> usize {
        self.inner.read().await.identities.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn rating(&self, id: DiscordId) -> Result<Option<Rating>> {
        Ok(self.inner.read().await.ratings.get(&id).copied())
    }

    async fn insert_game(&self, game: &Game) -> Result<()> {
        self.inner.write().await.games.push(game.clone());
        Ok(())
    }

    async fn update_rating(
        &self,
        id: DiscordId,
        game_start: u64,
        round_start: u64,
        rating: Rating,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.history.push(RatingUpdate { id, game_start, round_start, rating });
        inner.ratings.insert(id, rating);
        Ok(())
    }

    async fn map_identity(&self, playfab: PlayfabId, external: DiscordId) -> Result<()> {
        self.inner.write().await.identities.insert(playfab, external);
        Ok(())
    }

    async fn identity_map(&self) -> Result<HashMap<PlayfabId, DiscordId>> {
        Ok(self.inner.read().await.identities.clone())
    }
}
