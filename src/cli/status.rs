// src/cli/status.rs - Tracker status display

use std::path::Path;

use crate::infra::config::Config;
use crate::infra::paths;
use crate::tracking::{SessionRecord, StatusFile};

/// Display config location, the session being tracked and recent history.
pub async fn show_status(config: &Config, config_path: &Path, history: usize) -> anyhow::Result<()> {
    println!("flsurf-tracker v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }
    println!("  Gateway:    {}", config.gateway.base_url);
    println!(
        "  Captures:   every {}s-{}s via {}",
        config.tracking.capture_interval_min_secs,
        config.tracking.capture_interval_max_secs,
        config.capture.command
    );
    println!("  State dir:  {}", paths::state_dir().display());

    let state = StatusFile::default();
    println!();
    match state.read_current() {
        Some(current) => {
            println!("  Current session:");
            for line in describe(&current) {
                println!("    {}", line);
            }
        }
        None => println!("  Session is not active."),
    }

    let recent = state.read_history(history);
    if !recent.is_empty() {
        println!();
        println!("  Recent sessions:");
        for record in recent.iter().rev() {
            println!("    {}", history_line(record));
        }
    }

    Ok(())
}

fn describe(record: &SessionRecord) -> Vec<String> {
    let mut lines = vec![
        format!("Contract:   {}", record.contract_id),
        format!("Session:    {}", record.session_id.as_deref().unwrap_or("-")),
        format!("Status:     {}", record.status),
        format!("Time:       {}", record.elapsed),
        format!(
            "Earned:     {:.2} ({:.2}/h)",
            record.earned_so_far, record.cost_per_hour
        ),
    ];
    if record.pending_captures > 0 {
        lines.push(format!("Unconfirmed captures: {}", record.pending_captures));
    }
    lines.push(format!("Updated:    {}", record.updated_at));
    lines
}

fn history_line(record: &SessionRecord) -> String {
    let mut line = format!(
        "{:<8} {}  {}  earned {:.2}",
        record.status.as_str(),
        record.contract_id,
        record.elapsed,
        record.earned_so_far
    );
    if let Some(error) = &record.error {
        line.push_str(&format!("  ({})", error));
    }
    line
}
