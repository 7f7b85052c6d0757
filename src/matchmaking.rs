//! Combinatorial balanced-team search.
//!
//! Every distinct way to split the roster in half is scored with the rating
//! engine's match-quality function; the best split wins. Swapping the team
//! labels of a split yields the same quality, so each split and its mirror
//! are the same candidate: pinning the first roster member to blue
//! enumerates exactly one representative per pair. Enumeration is
//! lexicographic over roster indices and ties keep the first-found split,
//! so results are deterministic.

use tracing::debug;

use crate::rating::{Rating, RatingEngine};
use crate::types::DiscordId;
use crate::{GatherError, Result};

/// A scored team split. Ephemeral: produced per search, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub blue: Vec<DiscordId>,
    pub red: Vec<DiscordId>,
    pub match_quality: f64,
    pub blue_win_probability: f64,
    pub red_win_probability: f64,
}

/// Find the most balanced split of `roster` into two equal teams.
///
/// The roster must be even-sized and non-empty; violating that is a
/// programming/configuration error and is rejected before any enumeration.
pub fn best_match(
    engine: &dyn RatingEngine,
    roster: &[(DiscordId, Rating)],
) -> Result<Candidate> {
    if roster.is_empty() || roster.len() % 2 != 0 {
        return Err(GatherError::matchmaker(format!(
            "roster size {} must be even and at least 2",
            roster.len()
        )));
    }

    let half = roster.len() / 2;
    let mut best: Option<(f64, Vec<usize>)> = None;
    let mut evaluated = 0usize;

    // Index 0 always plays blue; choosing the rest of blue from the
    // remaining indices enumerates each split/mirror pair exactly once.
    let mut scratch = Vec::with_capacity(half);
    scratch.push(0);
    enumerate_splits(roster.len(), half, 1, &mut scratch, &mut |blue_idx| {
        let (blue, red) = split_ratings(roster, blue_idx);
        let quality = engine.quality(&blue, &red);
        evaluated += 1;
        if best.as_ref().is_none_or(|(q, _)| quality > *q) {
            best = Some((quality, blue_idx.to_vec()));
        }
    });

    // Unreachable in practice (an even roster always yields at least one
    // split), but avoids an unwrap.
    let (quality, blue_idx) = best.ok_or_else(|| GatherError::matchmaker("no splits"))?;

    let (blue_ratings, red_ratings) = split_ratings(roster, &blue_idx);
    let candidate = Candidate {
        blue: blue_idx.iter().map(|&i| roster[i].0).collect(),
        red: complement(roster.len(), &blue_idx).iter().map(|&i| roster[i].0).collect(),
        match_quality: quality,
        blue_win_probability: engine.win_probability(&blue_ratings, &red_ratings),
        red_win_probability: engine.win_probability(&red_ratings, &blue_ratings),
    };

    debug!(
        splits = evaluated,
        quality = candidate.match_quality,
        "balanced match search complete"
    );
    Ok(candidate)
}

/// Recursively extend `scratch` to a full blue team of size `half`, visiting
/// index combinations in lexicographic order.
fn enumerate_splits(
    n: usize,
    half: usize,
    next: usize,
    scratch: &mut Vec<usize>,
    visit: &mut impl FnMut(&[usize]),
) {
    if scratch.len() == half {
        visit(scratch);
        return;
    }
    let needed = half - scratch.len();
    for i in next..=(n - needed) {
        scratch.push(i);
        enumerate_splits(n, half, i + 1, scratch, visit);
        scratch.pop();
    }
}

fn split_ratings(
    roster: &[(DiscordId, Rating)],
    blue_idx: &[usize],
) -> (Vec<Rating>, Vec<Rating>) {
    let mut blue = Vec::with_capacity(blue_idx.len());
    let mut red = Vec::with_capacity(roster.len() - blue_idx.len());
    for (i, (_, rating)) in roster.iter().enumerate() {
        if blue_idx.contains(&i) {
            blue.push(*rating);
        } else {
            red.push(*rating);
        }
    }
    (blue, red)
}

fn complement(n: usize, blue_idx: &[usize]) -> Vec<usize> {
    (0..n).filter(|i| !blue_idx.contains(i)).collect()
}
