//! Sequential rating application over a completed game.
//!
//! The skill model is path-dependent: applying round 2 before round 1
//! produces different posteriors. The ledger therefore walks rounds in
//! strict chronological order, carrying each participant's updated belief
//! into the next round, and records *every* per-round posterior through the
//! store: per-round history is a first-class output, not an intermediate.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::rating::{Rating, RatingEngine, TeamRanks};
use crate::store::Store;
use crate::types::{DiscordId, Game, Winner};
use crate::Result;

/// Apply one rating update per round of `game`, persisting each change.
///
/// Ratings start from the store's current values (not the pre-match
/// snapshot: other servers may have rated these players since the match
/// began) and are carried forward round by round.
pub async fn apply_game(
    store: &dyn Store,
    engine: &dyn RatingEngine,
    game: &Game,
) -> Result<()> {
    let mut current: HashMap<DiscordId, Rating> = HashMap::new();
    for &id in game.blue.iter().chain(game.red.iter()) {
        let rating = store.rating(id).await?.unwrap_or_else(|| engine.create());
        current.insert(id, rating);
    }

    for round in &game.rounds {
        let Some(winner) = round.winner else {
            debug!(map = %round.map_name, "skipping round without a winner");
            continue;
        };
        let ranks = match winner {
            Winner::Blue => TeamRanks::BLUE_WIN,
            Winner::Red => TeamRanks::RED_WIN,
            Winner::Tie => TeamRanks::DRAW,
        };

        let blue: Vec<Rating> = game.blue.iter().map(|id| current[id]).collect();
        let red: Vec<Rating> = game.red.iter().map(|id| current[id]).collect();
        let (new_blue, new_red) = engine.rate(&blue, &red, ranks);

        for (&id, rating) in game.blue.iter().zip(new_blue).chain(game.red.iter().zip(new_red)) {
            store.update_rating(id, game.start_time, round.start_time, rating).await?;
            current.insert(id, rating);
        }
    }

    info!(
        rounds = game.rounds.len(),
        participants = current.len(),
        "rating ledger applied"
    );
    Ok(())
}
