use std::{collections::HashMap, sync::Arc};

use clap::Parser;
use itertools::Itertools;
use tracing::info;
use tracing_subscriber::EnvFilter;

use race_rating_processor::{
    args::Args,
    model::{
        error::RatingError,
        race_log::load_race_log,
        ranking::Ranking,
        snapshot::{load_snapshot, save_snapshot},
        structures::player_profile::PlayerProfile
    }
};

fn main() -> Result<(), RatingError> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level))
        )
        .init();

    let rows = load_snapshot(&args.snapshot)?;
    let races = load_race_log(&args.races)?;

    // Profiles stay alive for the whole replay; the engine itself only holds
    // weak liveness handles.
    let profiles: Vec<Arc<PlayerProfile>> = rows
        .iter()
        .map(|row| Arc::new(PlayerProfile::new(row.online_id, &row.username)))
        .collect();

    let mut ranking = Ranking::new();
    for (row, profile) in rows.iter().zip(&profiles) {
        ranking.fill(row.online_id, Some(row), Arc::downgrade(profile));
    }

    info!(players = rows.len(), races = races.len(), "replaying race log");

    for (n, race) in races.iter().enumerate() {
        ranking.compute_new_rankings(&race.results, race.time_trial)?;

        for result in &race.results {
            let delta = ranking.get_delta(result.online_id);
            info!(
                race = n + 1,
                online_id = result.online_id,
                delta = %format!("{delta:+.1}"),
                "rating change"
            );
        }
    }

    let usernames: HashMap<u32, &str> = rows
        .iter()
        .map(|row| (row.online_id, row.username.as_str()))
        .collect();

    println!(
        "{:<20} {:>10} {:>10} {:>8} {:>6}",
        "player", "score", "raw", "rd", "races"
    );
    for entry in ranking
        .entries()
        .sorted_by(|a, b| b.score.partial_cmp(&a.score).unwrap())
    {
        let name = usernames.get(&entry.online_id).copied().unwrap_or("?");
        println!(
            "{:<20} {:>10.1} {:>10.1} {:>8.1} {:>6}",
            name, entry.score, entry.raw_score, entry.deviation, entry.races
        );
    }

    if let Some(output) = &args.output {
        save_snapshot(output, &ranking.snapshot_rows())?;
        info!(path = %output.display(), "wrote updated snapshot");
    }

    Ok(())
}
