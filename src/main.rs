// src/main.rs - flsurf-tracker entry point

use std::path::PathBuf;

use clap::Parser;

use flsurf_tracker::cli::{self, Cli, Commands};
use flsurf_tracker::infra::config::Config;
use flsurf_tracker::infra::{logger, paths};

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG / FLSURF_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Falls back to defaults if no config.toml
    let (config, config_path) = match cli.config {
        Some(ref path) => {
            let path = PathBuf::from(path);
            (Config::load_from(&path)?, path)
        }
        None => (Config::load()?, paths::config_file_path()),
    };

    match cli.command {
        Commands::Track {
            contract_id,
            no_state,
        } => cli::track::run_track(&config, &contract_id, no_state).await,
        Commands::Sessions { contract_id } => {
            cli::sessions::list_sessions(&config, &contract_id).await
        }
        Commands::Session { session_id } => {
            cli::sessions::show_session(&config, &session_id).await
        }
        Commands::Submit { contract_id } => {
            cli::sessions::submit_latest(&config, &contract_id).await
        }
        Commands::Status { history } => {
            cli::status::show_status(&config, &config_path, history).await
        }
    }
}
