// src/infra/paths.rs - Config and state locations
//
// All paths respect the FLSURF_HOME environment variable for isolation.
// When FLSURF_HOME is set, config and state live under that directory.
// When unset, config uses ~/.flsurf/ and data uses XDG_DATA_HOME/flsurf.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const HOME_ENV: &str = "FLSURF_HOME";

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "flsurf"))
        .as_ref()
}

fn flsurf_home() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV).map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $FLSURF_HOME/ or ~/.flsurf/
pub fn config_dir() -> PathBuf {
    if let Some(home) = flsurf_home() {
        return home;
    }
    dirs_home().join(".flsurf")
}

/// Data directory: $FLSURF_HOME/data/ or ~/.local/share/flsurf/
pub fn data_dir() -> PathBuf {
    if let Some(home) = flsurf_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// State directory (current-session.json, session-history.jsonl)
pub fn state_dir() -> PathBuf {
    config_dir().join("state")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), state_dir(), data_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
