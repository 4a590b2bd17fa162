use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone)]
#[command(
    display_name = "Race Rating Processor",
    long_about = "Replays a ranked race log against a stored rating snapshot and reports the resulting ratings"
)]
pub struct Args {
    /// JSON rating snapshot, one row per player
    #[arg(short, long, env = "SNAPSHOT_PATH", help = "Rating snapshot to load")]
    pub snapshot: PathBuf,

    /// JSON race log to replay, one record per completed race
    #[arg(short, long, env = "RACE_LOG_PATH", help = "Race log to replay")]
    pub races: PathBuf,

    /// Where to write the updated snapshot; omit to skip persisting
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "RUST_LOG",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Sets the logging verbosity"
    )]
    pub log_level: String
}
