//! Persisted rating rows and JSON snapshot IO.
//!
//! The engine never touches disk during an update; the embedding server loads
//! a snapshot once per session, feeds the rows to `Ranking::fill`, and
//! persists `Ranking::snapshot_rows` whenever it sees fit. Field names match
//! the server's stored ranking rows.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::model::{error::RatingError, structures::ranking_entry::RankingEntry};

/// One persisted rating row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    #[serde(rename = "online-id")]
    pub online_id: u32,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "scores")]
    pub score: f64,
    #[serde(rename = "max-scores")]
    pub max_score: f64,
    #[serde(rename = "num-races-done")]
    pub races: u64,
    #[serde(rename = "raw-scores")]
    pub raw_score: f64,
    #[serde(rename = "rating-deviation")]
    pub deviation: f64,
    #[serde(rename = "disconnects", default)]
    pub disconnects: u64
}

impl PlayerSnapshot {
    pub fn from_entry(entry: &RankingEntry, username: &str) -> PlayerSnapshot {
        PlayerSnapshot {
            online_id: entry.online_id,
            username: username.to_owned(),
            score: entry.score,
            max_score: entry.max_score,
            races: entry.races,
            raw_score: entry.raw_score,
            deviation: entry.deviation,
            disconnects: entry.disconnects
        }
    }
}

pub fn load_snapshot(path: &Path) -> Result<Vec<PlayerSnapshot>, RatingError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_snapshot(path: &Path, rows: &[PlayerSnapshot]) -> Result<(), RatingError> {
    let contents = serde_json::to_string_pretty(rows)?;
    fs::write(path, contents)?;
    Ok(())
}
