//! Pure rating math. Every function here is deterministic and side-effect
//! free; the `Ranking` engine combines them into the per-race update.

use crate::model::constants::{BASE_POINTS_PER_SECOND, BASE_RANKING_POINTS, MIN_RATING_DEVIATION};

/// Race importance factor per mode, used to make ratings move slower in
/// modes with more outcome randomness.
pub fn mode_factor(time_trial: bool) -> f64 {
    if time_trial {
        return 1.0;
    }
    0.75
}

/// Mode spread factor, so that a similar skill difference maps to a similar
/// rating difference in more random modes.
pub fn mode_spread(time_trial: bool) -> f64 {
    if time_trial {
        return 1.0;
    }
    1.25
}

/// Time spread factor. Short races are more random, so the expected result
/// is pulled toward 0.5 as race duration shrinks. `time` must be positive.
pub fn time_spread(time: f64) -> f64 {
    (120.0 / time).sqrt()
}

/// Scaling value of a race of the given duration. Linear in duration;
/// `time_spread` takes care of expecting a more random result in shorter races.
pub fn scaling_for_time(time: f64) -> f64 {
    time * BASE_POINTS_PER_SECOND
}

/// Score of a head-to-head minimatch, from player 1's perspective.
///
/// A large enough relative time difference is a complete win (1.0) or loss
/// (0.0); smaller gaps are interpolated linearly around 0.5.
pub fn h2h_result(player1_time: f64, player2_time: f64) -> f64 {
    let max_time = player1_time.max(player2_time);
    let min_time = player1_time.min(player2_time);

    let mut result = (max_time - min_time) / (min_time / 20.0);
    result = (0.5 + result).min(1.0);

    if player2_time <= player1_time {
        result = 1.0 - result;
    }

    result
}

/// ELO-like expected result for player 1 given the rating difference
/// `player2_rating - player1_rating` and a combined spread factor.
pub fn expected_result(rating_diff: f64, spread: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(rating_diff / (BASE_RANKING_POINTS / 2.0 * spread)))
}

/// Relative factor for how much informative value one head-to-head result
/// carries.
///
/// A player with a high own rating deviation has an unreliable current rating,
/// so new data matters more; this is what lets new players converge quickly
/// against accurately rated opponents. When the opponent's deviation is high
/// instead, the expected score is likely off and the result is worth less.
///
/// When the two rating bands (score, widened by 350 plus half the RD on each
/// side) do not even overlap, the weight is scaled down toward the expected
/// result of the weaker player. Upsets across such a gap are dominated by
/// random race events, and it also makes "farming" much weaker opponents
/// ineffective: to gain points, playing well-rated opponents is the way.
/// The cost is that a legitimate loss to a much weaker player barely moves
/// the rating, but those are rare enough to be the better trade.
///
/// In a race with many players a single event touches many head-to-heads at
/// once, so the per-pair weight shrinks with the player count. Handicap races
/// keep a rating offset to stay playable but their results are poor rating
/// signal, so they are weighted down hard.
pub fn data_accuracy(
    player1_rd: f64,
    player2_rd: f64,
    player1_scores: f64,
    player2_scores: f64,
    player_count: usize,
    handicap_used: bool
) -> f64 {
    let mut accuracy = player1_rd / (player2_rd.sqrt() * MIN_RATING_DEVIATION.sqrt());

    let strong_lowerbound = if player1_scores > player2_scores {
        player1_scores - 350.0 - player1_rd / 2.0
    } else {
        player2_scores - 350.0 - player2_rd / 2.0
    };
    let weak_upperbound = if player1_scores > player2_scores {
        player2_scores + 350.0 + player2_rd / 2.0
    } else {
        player1_scores + 350.0 + player1_rd / 2.0
    };

    if weak_upperbound < strong_lowerbound {
        // The weaker player's expected result, between 0 and 0.5
        let expected = expected_result(strong_lowerbound - weak_upperbound, 1.0);
        accuracy *= (2.0 * expected).max(0.05);
    }

    // A single h2h matters less in a race with many players; the overall
    // impact of a bigger race is still larger.
    accuracy *= 2.0 / (player_count as f64).sqrt();

    if handicap_used {
        accuracy *= 0.25;
    }

    accuracy
}
