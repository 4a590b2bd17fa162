pub mod constants;
pub mod error;
pub mod math;
pub mod race_log;
pub mod ranking;
pub mod snapshot;
pub mod structures;
