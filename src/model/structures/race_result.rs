use serde::{Deserialize, Serialize};

/// One finisher's outcome in a single ranked race, as reported by the
/// server's race-end handler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RaceResultData {
    pub online_id: u32,
    /// Finish time in seconds. Meaningless when `is_eliminated` is set.
    pub time: f64,
    /// True if the player disconnected or was otherwise eliminated mid-race.
    #[serde(default)]
    pub is_eliminated: bool,
    /// True if handicap mode was applied to this player this race.
    #[serde(default)]
    pub handicap: bool
}
