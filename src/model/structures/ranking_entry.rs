use serde::{Deserialize, Serialize};

use crate::model::constants::{BASE_RANKING_POINTS, BASE_RATING_DEVIATION, MIN_RATING_DEVIATION};

/// Persisted per-player rating state.
///
/// `raw_score` is the unbounded internal rating; `score` is the public rating,
/// discounted by the current rating deviation so that an uncertain rating is
/// displayed conservatively. `disconnects` keeps the last 64 race outcomes as
/// bit flags (bit 0 = most recent race), so shifting flushes the oldest result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub online_id: u32,
    pub raw_score: f64,
    pub score: f64,
    pub max_score: f64,
    pub deviation: f64,
    pub disconnects: u64,
    pub races: u64
}

impl RankingEntry {
    /// The entry a player gets on their first connection to a ranked server.
    pub fn new(online_id: u32) -> RankingEntry {
        let score = BASE_RANKING_POINTS - 3.0 * BASE_RATING_DEVIATION + 3.0 * MIN_RATING_DEVIATION;

        RankingEntry {
            online_id,
            raw_score: BASE_RANKING_POINTS,
            score,
            max_score: score,
            deviation: BASE_RATING_DEVIATION,
            disconnects: 0,
            races: 0
        }
    }
}
