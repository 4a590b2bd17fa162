//! Rating engine for ranked multiplayer races.
//!
//! Computes and maintains a skill rating per player from completed ranked
//! races, using a Glicko-inspired pairwise decomposition of each race into
//! head-to-head minimatches, with weighting for race duration, game mode,
//! rating uncertainty, handicaps and disconnect history.

pub mod args;
pub mod model;
pub mod utils;
