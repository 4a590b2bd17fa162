pub mod player_profile;
pub mod race_result;
pub mod ranking_entry;
