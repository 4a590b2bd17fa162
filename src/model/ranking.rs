use std::{collections::HashMap, sync::Weak};

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::model::{
    constants::{
        BASE_RD_PER_DISCONNECT, DISCONNECT_SCORE_PENALTY, HANDICAP_OFFSET, MAX_SCALING_TIME,
        MIN_RATING_DEVIATION, VAR_RD_PER_DISCONNECT
    },
    error::RatingError,
    math,
    snapshot::PlayerSnapshot,
    structures::{
        player_profile::PlayerProfile, race_result::RaceResultData, ranking_entry::RankingEntry
    }
};

/// A rating entry together with a liveness handle to the connection it
/// belongs to. The profile is observed, never owned; once it expires the
/// entry is garbage during the next `cleanup` pass.
pub struct RankingEntryAndProfile {
    pub entry: RankingEntry,
    pub profile: Weak<PlayerProfile>
}

/// The rating engine of a ranked server session.
///
/// Owns one `RankingEntry` per connected player, applies the per-race pairwise
/// update, and tracks pre-race snapshots so score deltas can be reported after
/// each race. All calls must be serialized by the embedding server; there is
/// no internal locking.
#[derive(Default)]
pub struct Ranking {
    // Insertion-ordered so that exports and iteration never depend on
    // hash state.
    entries: IndexMap<u32, RankingEntryAndProfile>,
    old_entries: HashMap<u32, RankingEntry>
}

impl Ranking {
    pub fn new() -> Ranking {
        Ranking {
            entries: IndexMap::new(),
            old_entries: HashMap::new()
        }
    }

    /// Registers a player's rating entry, either from a persisted snapshot
    /// row or, for a first-time player, from the base values.
    pub fn fill(&mut self, online_id: u32, row: Option<&PlayerSnapshot>, profile: Weak<PlayerProfile>) {
        let entry = match row {
            Some(row) => RankingEntry {
                online_id,
                raw_score: row.raw_score,
                score: row.score,
                max_score: row.max_score,
                deviation: row.deviation,
                disconnects: row.disconnects,
                races: row.races
            },
            None => RankingEntry::new(online_id)
        };

        self.entries.insert(online_id, RankingEntryAndProfile { entry, profile });
    }

    /// # Ranked race processing
    ///
    /// Computes the new ratings of every finisher of one completed race,
    /// treating the race as a set of head-to-head minimatches.
    ///
    /// For an ordered pair (p1, p2) only p1's values change, but the loop
    /// also visits (p2, p1); point changes can be asymmetric. Raw score
    /// changes and deviation changes are accumulated against the pre-race
    /// values and committed in a second pass, so the order in which pairs
    /// are visited can never affect the outcome.
    pub fn compute_new_rankings(
        &mut self,
        data: &[RaceResultData],
        time_trial: bool
    ) -> Result<(), RatingError> {
        // The whole update aborts before any mutation if a result references
        // a player we have no entry for.
        for result in data {
            if !self.entries.contains_key(&result.online_id) {
                error!(
                    online_id = result.online_id,
                    "failed to obtain the saved ranking entry for a race finisher"
                );
                return Err(RatingError::UnknownPlayer {
                    online_id: result.online_id
                });
            }
        }

        // Keep a pre-race snapshot for delta reporting. Only the first touch
        // since the last get_delta call is kept.
        for result in data {
            let entry = self.entries.get(&result.online_id).unwrap().entry;
            self.old_entries.entry(result.online_id).or_insert(entry);
        }

        let player_count = data.len();

        let mut prev_raw_scores = Vec::with_capacity(player_count);
        let mut prev_deviations = Vec::with_capacity(player_count);
        let mut disconnect_counts = Vec::with_capacity(player_count);

        // Bump the race counters and record this race in the disconnect
        // history. The last 64 results live as bit flags in a 64-bit int,
        // so shifting flushes the oldest result.
        for result in data {
            let entry = &mut self.entries.get_mut(&result.online_id).unwrap().entry;
            entry.races += 1;
            entry.disconnects <<= 1;
            if result.is_eliminated {
                entry.disconnects |= 1;
            }

            prev_raw_scores.push(entry.raw_score);
            prev_deviations.push(entry.deviation);
            disconnect_counts.push(entry.disconnects.count_ones());
        }

        let mut raw_score_changes = vec![0.0; player_count];
        let mut new_deviations = prev_deviations.clone();

        let mode_factor = math::mode_factor(time_trial);
        let mode_spread = math::mode_spread(time_trial);

        for i in 0..player_count {
            let mut player1_raw = prev_raw_scores[i];
            if data[i].handicap {
                player1_raw -= HANDICAP_OFFSET;
            }
            let player1_rd = prev_deviations[i];

            // A disconnect raises RD once, no matter how many opponents.
            if data[i].is_eliminated && disconnect_counts[i] >= 3 {
                new_deviations[i] = prev_deviations[i]
                    + BASE_RD_PER_DISCONNECT
                    + VAR_RD_PER_DISCONNECT * f64::from(disconnect_counts[i] - 3);
            }

            for j in 0..player_count {
                if i == j {
                    continue;
                }

                // No change between two quitting players
                if data[i].is_eliminated && data[j].is_eliminated {
                    continue;
                }

                let mut player2_raw = prev_raw_scores[j];
                if data[j].handicap {
                    player2_raw -= HANDICAP_OFFSET;
                }
                let player2_rd = prev_deviations[j];

                // Each result is new data refining the previous estimates;
                // weigh it by how reliable it is against them.
                let handicap_used = data[i].handicap || data[j].handicap;
                let accuracy = math::data_accuracy(
                    player1_rd,
                    player2_rd,
                    player1_raw,
                    player2_raw,
                    player_count,
                    handicap_used
                );

                let mut player1_time = data[i].time;
                let mut player2_time = data[j].time;

                // Recurring disconnects are punished through increased RD
                // and a higher RD floor, not a larger raw score loss. The
                // quitter has no valid finish time, so substitute one.
                let result = if data[i].is_eliminated {
                    player1_time = player2_time * 1.2;
                    0.0
                } else if data[j].is_eliminated {
                    player2_time = player1_time * 1.2;
                    1.0
                } else {
                    math::h2h_result(player1_time, player2_time)
                };

                let max_time = MAX_SCALING_TIME.min(player1_time.max(player2_time));
                let importance = accuracy * mode_factor * math::scaling_for_time(max_time);

                let diff = player2_raw - player1_raw;
                let expected = math::expected_result(
                    diff,
                    mode_spread * math::time_spread(player1_time.min(player2_time))
                );

                raw_score_changes[i] += importance * (result - expected);

                // RD was already handled once for this race's quitters.
                if !data[i].is_eliminated {
                    let rd_change_factor = accuracy * 0.0016;
                    let mut rd_change = -prev_deviations[i] * rd_change_factor;

                    // An unexpected result adds an RD increase. If upsets
                    // happen at the rate the expected score predicts, this
                    // does not stop RD from going down; if they are at
                    // least twice as frequent, RD goes up.
                    let upset = (result - expected).abs();
                    if upset > 0.5 {
                        // Renormalize so an expected result of 50% maps to
                        // 1.0 and of 100% maps to 0.0
                        let upset = (2.0 - 2.0 * upset).max(0.02);
                        rd_change += MIN_RATING_DEVIATION * rd_change_factor / upset;
                    }

                    // The RD floor is applied after all pairs are done, so
                    // pair order cannot change the result.
                    new_deviations[i] += rd_change;
                }
            }
        }

        // Commit phase. Kept out of the pair loop because the accumulated
        // changes must apply against the pre-race values.
        for (i, result) in data.iter().enumerate() {
            let entry = &mut self.entries.get_mut(&result.online_id).unwrap().entry;

            entry.raw_score = prev_raw_scores[i] + raw_score_changes[i];

            // The minimum RD escalates with repeated disconnects.
            let mut disconnects_floor = 0.0;
            if disconnect_counts[i] >= 3 {
                let n = f64::from(disconnect_counts[i] - 3);
                disconnects_floor = f64::from(disconnect_counts[i] - 2) * BASE_RD_PER_DISCONNECT
                    + VAR_RD_PER_DISCONNECT * (n * (n + 1.0)) / 2.0;
            }
            entry.deviation = new_deviations[i].max(MIN_RATING_DEVIATION + disconnects_floor);

            // The public rating; at minimum RD it equals the raw score.
            entry.score = entry.raw_score - 3.0 * entry.deviation + 3.0 * MIN_RATING_DEVIATION;
            if entry.score > entry.max_score {
                entry.max_score = entry.score;
            }
        }

        Ok(())
    }

    /// True iff the player has an entry and is still connected.
    pub fn has(&self, online_id: u32) -> bool {
        self.entries
            .get(&online_id)
            .is_some_and(|e| e.profile.strong_count() > 0)
    }

    /// Read-only snapshot of a player's entry. Callers are expected to check
    /// `has` first.
    pub fn get_scores(&self, online_id: u32) -> Result<RankingEntry, RatingError> {
        self.entries
            .get(&online_id)
            .map(|e| e.entry)
            .ok_or(RatingError::UnknownPlayer { online_id })
    }

    /// Score change since the first touch after the previous `get_delta`
    /// call. The pre-race snapshot is consumed on read: a second immediate
    /// call returns 0.0 until the entry is updated again.
    pub fn get_delta(&mut self, online_id: u32) -> f64 {
        let Some(old) = self.old_entries.get(&online_id) else {
            return 0.0;
        };
        let Some(current) = self.entries.get(&online_id) else {
            return 0.0;
        };

        let delta = current.entry.score - old.score;
        self.old_entries.remove(&online_id);
        delta
    }

    /// A projection of a player's entry with the pending disconnect already
    /// booked, for display while the authoritative end-of-race update has
    /// not run yet. The stored entry is not touched.
    pub fn get_temporary_penalized_scores(&self, online_id: u32) -> Result<RankingEntry, RatingError> {
        let mut entry = self.get_scores(online_id)?;
        entry.score -= DISCONNECT_SCORE_PENALTY;
        entry.raw_score -= DISCONNECT_SCORE_PENALTY;
        entry.races += 1;
        entry.disconnects = (entry.disconnects << 1) | 1;
        Ok(entry)
    }

    /// Drops the entries of players who disconnected from the server
    /// entirely. Called periodically by the embedding server.
    pub fn cleanup(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.profile.strong_count() > 0);

        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "dropped rating entries of departed players");
        }
    }

    /// Iterates all entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &RankingEntry> + '_ {
        self.entries.values().map(|e| &e.entry)
    }

    /// Exports all current entries as persistable snapshot rows. The
    /// embedding server decides when and where to store them.
    pub fn snapshot_rows(&self) -> Vec<PlayerSnapshot> {
        self.entries
            .values()
            .map(|e| {
                let username = e
                    .profile
                    .upgrade()
                    .map(|p| p.username.clone())
                    .unwrap_or_default();
                PlayerSnapshot::from_entry(&e.entry, &username)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        model::{
            constants::MIN_RATING_DEVIATION,
            error::RatingError,
            structures::{race_result::RaceResultData, ranking_entry::RankingEntry}
        },
        utils::test_utils::{generate_entry, generate_ranking, generate_result}
    };

    fn eliminated(online_id: u32) -> RaceResultData {
        RaceResultData {
            online_id,
            time: 0.0,
            is_eliminated: true,
            handicap: false
        }
    }

    #[test]
    fn test_two_player_clear_win() {
        let entries = vec![generate_entry(1, 4000.0, 1000.0), generate_entry(2, 4000.0, 1000.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let results = vec![generate_result(1, 60.0), generate_result(2, 90.0)];
        ranking.compute_new_rankings(&results, true).unwrap();

        let winner = ranking.get_scores(1).unwrap();
        let loser = ranking.get_scores(2).unwrap();

        assert!(winner.raw_score > 4000.0);
        assert!(loser.raw_score < 4000.0);
        assert!(winner.deviation < 1000.0);
        assert!(loser.deviation < 1000.0);
        assert_eq!(winner.races, 1);
        assert_eq!(loser.races, 1);
        assert_eq!(winner.disconnects, 0);
        assert_eq!(loser.disconnects, 0);
    }

    #[test]
    fn test_score_never_exceeds_raw_score() {
        let entries = vec![
            generate_entry(1, 4200.0, 400.0),
            generate_entry(2, 3900.0, 250.0),
            generate_entry(3, 4000.0, 1000.0),
        ];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let races = [
            vec![generate_result(1, 95.0), generate_result(2, 96.0), generate_result(3, 101.0)],
            vec![generate_result(1, 130.0), generate_result(2, 124.0), generate_result(3, 122.0)],
            vec![generate_result(1, 88.0), generate_result(2, 90.0), generate_result(3, 85.0)],
        ];

        for results in &races {
            ranking.compute_new_rankings(results, false).unwrap();
            for id in 1..=3 {
                let entry = ranking.get_scores(id).unwrap();
                assert!(entry.score <= entry.raw_score);
                assert!(entry.deviation >= MIN_RATING_DEVIATION);
                assert!(entry.max_score >= entry.score);
            }
        }
    }

    #[test]
    fn test_max_score_is_monotonic() {
        let entries = vec![generate_entry(1, 4000.0, 300.0), generate_entry(2, 4000.0, 300.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let mut high_water = ranking.get_scores(1).unwrap().max_score;

        // Player 1 wins one race and gets crushed in the next two
        let races = [(70.0, 90.0), (95.0, 75.0), (99.0, 70.0)];
        for (t1, t2) in races {
            let results = vec![generate_result(1, t1), generate_result(2, t2)];
            ranking.compute_new_rankings(&results, true).unwrap();

            let entry = ranking.get_scores(1).unwrap();
            assert!(entry.max_score >= high_water);
            high_water = entry.max_score;
        }
    }

    #[test]
    fn test_missing_entry_aborts_without_mutation() {
        let entries = vec![generate_entry(1, 4000.0, 500.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);
        let before = ranking.get_scores(1).unwrap();

        let results = vec![generate_result(1, 60.0), generate_result(42, 70.0)];
        let err = ranking.compute_new_rankings(&results, true).unwrap_err();

        assert!(matches!(err, RatingError::UnknownPlayer { online_id: 42 }));

        // Nothing was touched, not even the delta snapshot
        assert_eq!(ranking.get_scores(1).unwrap(), before);
        assert_abs_diff_eq!(ranking.get_delta(1), 0.0);
    }

    #[test]
    fn test_result_order_does_not_matter() {
        let entries = vec![
            generate_entry(1, 4100.0, 600.0),
            generate_entry(2, 3950.0, 300.0),
            generate_entry(3, 4000.0, 150.0),
        ];

        let (mut forward, _p1) = generate_ranking(&entries);
        let (mut reversed, _p2) = generate_ranking(&entries);

        let mut results = vec![
            generate_result(1, 84.0),
            generate_result(2, 85.5),
            eliminated(3),
        ];
        forward.compute_new_rankings(&results, false).unwrap();

        results.reverse();
        reversed.compute_new_rankings(&results, false).unwrap();

        for id in 1..=3 {
            let a = forward.get_scores(id).unwrap();
            let b = reversed.get_scores(id).unwrap();
            assert_abs_diff_eq!(a.raw_score, b.raw_score, epsilon = 1e-9);
            assert_abs_diff_eq!(a.score, b.score, epsilon = 1e-9);
            assert_abs_diff_eq!(a.deviation, b.deviation, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_repeat_calls_are_deterministic() {
        let entries = vec![generate_entry(1, 4000.0, 700.0), generate_entry(2, 4020.0, 450.0)];
        let results = vec![generate_result(1, 61.2), generate_result(2, 60.9)];

        let (mut first, _p1) = generate_ranking(&entries);
        let (mut second, _p2) = generate_ranking(&entries);
        first.compute_new_rankings(&results, true).unwrap();
        second.compute_new_rankings(&results, true).unwrap();

        for id in 1..=2 {
            assert_eq!(first.get_scores(id).unwrap(), second.get_scores(id).unwrap());
        }
    }

    #[test]
    fn test_serial_quitter_rd_floor() {
        // Three disconnects already on record; this race is the fourth
        let mut quitter = generate_entry(1, 4000.0, MIN_RATING_DEVIATION);
        quitter.disconnects = 0b111;
        let entries = vec![quitter, generate_entry(2, 4000.0, 200.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let results = vec![eliminated(1), generate_result(2, 80.0)];
        ranking.compute_new_rankings(&results, false).unwrap();

        let entry = ranking.get_scores(1).unwrap();
        assert_eq!(entry.disconnects, 0b1111);

        // Direct bump: 100 + 15 + 3 = 118; floor with 4 disconnects:
        // 100 + (4 - 2) * 15 + 3 * 1 = 133, which wins
        assert_abs_diff_eq!(entry.deviation, 133.0);
        assert!(entry.score <= entry.raw_score);
    }

    #[test]
    fn test_single_disconnect_does_not_raise_rd() {
        let entries = vec![generate_entry(1, 4000.0, 500.0), generate_entry(2, 4000.0, 500.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let results = vec![eliminated(1), generate_result(2, 80.0)];
        ranking.compute_new_rankings(&results, false).unwrap();

        let entry = ranking.get_scores(1).unwrap();
        // Below three recorded disconnects the penalty paths stay off
        assert_abs_diff_eq!(entry.deviation, 500.0);
        assert_eq!(entry.disconnects, 1);
        // The quitter still loses raw score from the lost h2h
        assert!(entry.raw_score < 4000.0);
    }

    #[test]
    fn test_upset_raises_deviation_despite_decay() {
        // Confident ratings, large gap: the favorite loses outright
        let entries = vec![generate_entry(1, 3000.0, 100.0), generate_entry(2, 4600.0, 100.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let results = vec![generate_result(1, 60.0), generate_result(2, 90.0)];
        ranking.compute_new_rankings(&results, true).unwrap();

        let underdog = ranking.get_scores(1).unwrap();
        let favorite = ranking.get_scores(2).unwrap();

        assert!(underdog.raw_score > 3000.0);
        assert!(favorite.raw_score < 4600.0);

        // Both sides saw |result - expected| > 0.5, so the upset add-back
        // outweighs the normal RD decay. Without it, the decay would leave
        // both deviations clamped at the floor.
        assert!(underdog.deviation > MIN_RATING_DEVIATION);
        assert!(favorite.deviation > MIN_RATING_DEVIATION);
        assert_abs_diff_eq!(underdog.deviation, favorite.deviation, epsilon = 1e-9);
    }

    #[test]
    fn test_both_eliminated_pair_is_skipped() {
        let entries = vec![
            generate_entry(1, 4000.0, 500.0),
            generate_entry(2, 4000.0, 500.0),
            generate_entry(3, 4000.0, 500.0),
        ];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let results = vec![eliminated(1), eliminated(2), generate_result(3, 90.0)];
        ranking.compute_new_rankings(&results, true).unwrap();

        // Quitters lose only against the finisher, and identically so
        let q1 = ranking.get_scores(1).unwrap();
        let q2 = ranking.get_scores(2).unwrap();
        assert_abs_diff_eq!(q1.raw_score, q2.raw_score);
        assert!(q1.raw_score < 4000.0);
        assert!(ranking.get_scores(3).unwrap().raw_score > 4000.0);
    }

    #[test]
    fn test_handicap_race_moves_ratings_less() {
        let entries = vec![generate_entry(1, 4000.0, 500.0), generate_entry(2, 4000.0, 500.0)];

        let (mut plain, _p1) = generate_ranking(&entries);
        let (mut handicapped, _p2) = generate_ranking(&entries);

        let results = vec![generate_result(1, 60.0), generate_result(2, 90.0)];
        plain.compute_new_rankings(&results, true).unwrap();

        let mut handicap_results = results.clone();
        handicap_results[0].handicap = true;
        handicapped.compute_new_rankings(&handicap_results, true).unwrap();

        let plain_gain = plain.get_scores(1).unwrap().raw_score - 4000.0;
        let handicap_gain = handicapped.get_scores(1).unwrap().raw_score - 4000.0;
        assert!(plain_gain > 0.0);
        assert!(handicap_gain.abs() < plain_gain);
    }

    #[test]
    fn test_delta_is_consumed_on_read() {
        let entries = vec![generate_entry(1, 4000.0, 1000.0), generate_entry(2, 4000.0, 1000.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let before = ranking.get_scores(1).unwrap().score;
        let results = vec![generate_result(1, 60.0), generate_result(2, 90.0)];
        ranking.compute_new_rankings(&results, true).unwrap();
        let after = ranking.get_scores(1).unwrap().score;

        assert_abs_diff_eq!(ranking.get_delta(1), after - before, epsilon = 1e-9);
        assert_abs_diff_eq!(ranking.get_delta(1), 0.0);
    }

    #[test]
    fn test_delta_spans_races_until_read() {
        let entries = vec![generate_entry(1, 4000.0, 400.0), generate_entry(2, 4000.0, 400.0)];
        let (mut ranking, _profiles) = generate_ranking(&entries);

        let before = ranking.get_scores(1).unwrap().score;
        for _ in 0..2 {
            let results = vec![generate_result(1, 60.0), generate_result(2, 90.0)];
            ranking.compute_new_rankings(&results, true).unwrap();
        }
        let after = ranking.get_scores(1).unwrap().score;

        // The snapshot is from the first touch, so the delta covers both races
        assert_abs_diff_eq!(ranking.get_delta(1), after - before, epsilon = 1e-9);
    }

    #[test]
    fn test_penalized_preview_does_not_mutate() {
        let entries = vec![generate_entry(1, 4000.0, MIN_RATING_DEVIATION)];
        let (ranking, _profiles) = generate_ranking(&entries);

        let stored = ranking.get_scores(1).unwrap();
        assert_abs_diff_eq!(stored.score, 4000.0);

        let preview = ranking.get_temporary_penalized_scores(1).unwrap();
        assert_abs_diff_eq!(preview.score, 3800.0);
        assert_abs_diff_eq!(preview.raw_score, stored.raw_score - 200.0);
        assert_eq!(preview.races, stored.races + 1);
        assert_eq!(preview.disconnects, 1);

        assert_eq!(ranking.get_scores(1).unwrap(), stored);
    }

    #[test]
    fn test_has_and_cleanup_follow_liveness() {
        let entries = vec![generate_entry(1, 4000.0, 500.0), generate_entry(2, 4000.0, 500.0)];
        let (mut ranking, mut profiles) = generate_ranking(&entries);

        assert!(ranking.has(1));
        assert!(ranking.has(2));
        assert!(!ranking.has(3));

        // Player 2 leaves the server
        profiles.remove(1);
        assert!(!ranking.has(2));

        // The entry stays until the cleanup pass runs
        assert!(ranking.get_scores(2).is_ok());
        ranking.cleanup();
        assert!(ranking.get_scores(2).is_err());
        assert!(ranking.get_scores(1).is_ok());
    }

    #[test]
    fn test_fill_first_time_player_gets_base_values() {
        use std::sync::Arc;

        use crate::model::structures::player_profile::PlayerProfile;

        let mut ranking = crate::model::ranking::Ranking::new();
        let profile = Arc::new(PlayerProfile::new(5, "newcomer"));
        ranking.fill(5, None, Arc::downgrade(&profile));

        assert!(ranking.has(5));
        assert_eq!(ranking.get_scores(5).unwrap(), RankingEntry::new(5));
    }

    #[test]
    fn test_fill_from_persisted_row() {
        let entry = RankingEntry {
            online_id: 9,
            raw_score: 4321.0,
            score: 4100.5,
            max_score: 4250.0,
            deviation: 173.5,
            disconnects: 0b101,
            races: 77
        };
        let (ranking, _profiles) = generate_ranking(&[entry]);

        assert_eq!(ranking.get_scores(9).unwrap(), entry);
    }
}
