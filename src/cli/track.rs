// src/cli/track.rs - Run a tracked session until interrupted

use std::sync::Arc;

use tokio::sync::watch;

use super::progress::terminal_progress;
use crate::capture::CommandCapture;
use crate::gateway::HttpGateway;
use crate::infra::config::Config;
use crate::infra::paths;
use crate::tracking::{SessionEngine, SessionStatus, StatusFile, SystemClock};

/// Start a session on `contract_id`, wait for Ctrl-C, then stop it.
///
/// Returns early with an error if the session fails while running.
pub async fn run_track(config: &Config, contract_id: &str, no_state: bool) -> anyhow::Result<()> {
    let gateway = HttpGateway::from_config(&config.gateway)?;
    let capture = CommandCapture::from_config(&config.capture);
    let engine = SessionEngine::new(
        &config.tracking,
        Arc::new(SystemClock),
        Arc::new(capture),
        Arc::new(gateway),
    )?;

    engine.subscribe("terminal", terminal_progress());
    if config.state.enabled && !no_state {
        paths::ensure_dirs().await?;
        engine.subscribe("status-file", StatusFile::default().observer());
    }

    // Lets the wait below end when the session fails on its own.
    let (failed_tx, mut failed_rx) = watch::channel(false);
    engine.subscribe("failure-watch", move |snapshot| {
        if snapshot.status() == SessionStatus::Failed {
            let _ = failed_tx.send(true);
        }
        Ok(())
    });

    engine.start(contract_id).await?;
    eprintln!("Tracking contract {} (Ctrl-C to stop)", contract_id);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            eprintln!();
        }
        _ = failed_rx.wait_for(|failed| *failed) => {}
    }

    if engine.status() == SessionStatus::Failed {
        engine.reset().await;
        anyhow::bail!("session for contract {} failed", contract_id);
    }

    match engine.stop().await? {
        Some(stopped) if stopped.status() == SessionStatus::Stopped => {
            println!(
                "Session {} stopped. Tracked {}, earned {:.2}",
                stopped.session_id().unwrap_or("-"),
                crate::tracking::state::format_hms(stopped.elapsed()),
                stopped.earned_so_far()
            );
            Ok(())
        }
        Some(other) => {
            engine.reset().await;
            anyhow::bail!(
                "session ended as {}: {}",
                other.status(),
                other.error().unwrap_or("unknown error")
            )
        }
        None => {
            engine.reset().await;
            anyhow::bail!("session for contract {} failed", contract_id)
        }
    }
}
