//! Replayable race log records.
//!
//! These are the wire-shaped inputs of a replay session, distinct from the
//! stored rating rows in `snapshot`: one record per completed ranked race,
//! carrying the mode flag and the per-finisher results the server's race-end
//! handler would otherwise deliver live.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::model::{error::RatingError, structures::race_result::RaceResultData};

/// One ranked race in a replayable race log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RaceRecord {
    #[serde(default)]
    pub time_trial: bool,
    pub results: Vec<RaceResultData>
}

pub fn load_race_log(path: &Path) -> Result<Vec<RaceRecord>, RatingError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
