// src/cli/mod.rs - CLI definition (clap derive)

pub mod progress;
pub mod sessions;
pub mod status;
pub mod track;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "flsurf-tracker",
    about = "Track billable work sessions for FLSurf contracts",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Track a work session until Ctrl-C
    Track {
        /// Contract to bill the session against
        contract_id: String,
        /// Do not write current-session.json / session-history.jsonl
        #[arg(long)]
        no_state: bool,
    },
    /// List recorded work sessions for a contract
    Sessions {
        contract_id: String,
    },
    /// Show one work session and the screenshots attached to it
    Session {
        session_id: String,
    },
    /// Submit the latest pending session of a contract for review
    Submit {
        contract_id: String,
    },
    /// Show the session being tracked and recent history
    Status {
        /// Number of finished sessions to show
        #[arg(long, default_value = "5")]
        history: usize,
    },
}
