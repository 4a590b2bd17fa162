use std::sync::Arc;

use crate::model::{
    constants::MIN_RATING_DEVIATION,
    ranking::Ranking,
    snapshot::PlayerSnapshot,
    structures::{
        player_profile::PlayerProfile, race_result::RaceResultData, ranking_entry::RankingEntry
    }
};

/// Builds an entry at the given raw score and deviation, with the public
/// score derived the same way the engine derives it.
pub fn generate_entry(online_id: u32, raw_score: f64, deviation: f64) -> RankingEntry {
    let mut entry = RankingEntry::new(online_id);
    entry.raw_score = raw_score;
    entry.deviation = deviation;
    entry.score = raw_score - 3.0 * deviation + 3.0 * MIN_RATING_DEVIATION;
    entry.max_score = entry.score;
    entry
}

/// Builds a `Ranking` filled with the given entries, routed through the
/// persisted-row path. The returned profiles keep the liveness handles
/// alive; drop one to simulate a player leaving the server.
pub fn generate_ranking(entries: &[RankingEntry]) -> (Ranking, Vec<Arc<PlayerProfile>>) {
    let mut ranking = Ranking::new();
    let mut profiles = Vec::with_capacity(entries.len());

    for entry in entries {
        let profile = Arc::new(PlayerProfile::new(
            entry.online_id,
            &format!("player{}", entry.online_id)
        ));
        let row = PlayerSnapshot::from_entry(entry, &profile.username);
        ranking.fill(entry.online_id, Some(&row), Arc::downgrade(&profile));
        profiles.push(profile);
    }

    (ranking, profiles)
}

/// A regular finish, no elimination, no handicap.
pub fn generate_result(online_id: u32, time: f64) -> RaceResultData {
    RaceResultData {
        online_id,
        time,
        is_eliminated: false,
        handicap: false
    }
}
