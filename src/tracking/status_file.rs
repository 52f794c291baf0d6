// src/tracking/status_file.rs - Session state files for external monitoring
//
// Writes `~/.flsurf/state/current-session.json` on every snapshot and
// appends finished sessions to `~/.flsurf/state/session-history.jsonl`.
// current-session.json is replaced atomically (temp file + rename) without
// fsync; history appends are fsynced.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::state::{format_hms, SessionSnapshot, SessionStatus};
use crate::infra::paths;

const CURRENT_FILE: &str = "current-session.json";
const HISTORY_FILE: &str = "session-history.jsonl";
const ROTATE_BYTES: u64 = 1_048_576;
const ROTATE_LINES: usize = 1000;
const KEEP_LINES: usize = 500;

/// JSON structure written to `current-session.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Option<String>,
    pub contract_id: String,
    pub status: SessionStatus,
    pub cost_per_hour: f64,
    pub started_at: Option<String>,
    pub elapsed_secs: u64,
    pub elapsed: String,
    pub earned_so_far: f64,
    pub pending_captures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: String,
}

impl From<&SessionSnapshot> for SessionRecord {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id().map(str::to_string),
            contract_id: snapshot.contract_id().to_string(),
            status: snapshot.status(),
            cost_per_hour: snapshot.cost_per_hour(),
            started_at: snapshot.started_at().map(|t| t.to_rfc3339()),
            elapsed_secs: snapshot.elapsed().as_secs(),
            elapsed: format_hms(snapshot.elapsed()),
            earned_so_far: snapshot.earned_so_far(),
            pending_captures: snapshot.pending_captures(),
            error: snapshot.error().map(str::to_string),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Writes session snapshots into a state directory.
#[derive(Debug, Clone)]
pub struct StatusFile {
    dir: PathBuf,
}

impl Default for StatusFile {
    fn default() -> Self {
        Self::new(paths::state_dir())
    }
}

impl StatusFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Observer callback suitable for `SessionEngine::subscribe`.
    pub fn observer(self) -> impl Fn(&SessionSnapshot) -> anyhow::Result<()> + Send + Sync + 'static {
        move |snapshot: &SessionSnapshot| self.record(snapshot)
    }

    /// Persist one snapshot. Terminal snapshots go to history and clear the
    /// current file.
    pub fn record(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let record = SessionRecord::from(snapshot);
        if snapshot.status().is_terminal() {
            self.append_history(&record)?;
            match std::fs::remove_file(self.current_path()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }
        self.write_current(&record)
    }

    fn write_current(&self, record: &SessionRecord) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.dir.join(format!(".{}.tmp", CURRENT_FILE));

        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        f.flush()?;
        std::fs::rename(&tmp, self.current_path())?;
        Ok(())
    }

    fn append_history(&self, record: &SessionRecord) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.history_path();

        if let Ok(meta) = std::fs::metadata(&path) {
            let too_big = meta.len() > ROTATE_BYTES;
            if too_big || std::fs::read_to_string(&path)?.lines().count() >= ROTATE_LINES {
                rotate_history(&path)?;
            }
        }

        let line = serde_json::to_string(record)?;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(f, "{}", line)?;
        f.sync_all()?;
        Ok(())
    }

    /// The session currently being tracked, if any process is tracking one.
    pub fn read_current(&self) -> Option<SessionRecord> {
        let content = std::fs::read_to_string(self.current_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Last `limit` finished sessions, oldest first. Unparseable lines are skipped.
    pub fn read_history(&self, limit: usize) -> Vec<SessionRecord> {
        let content = match std::fs::read_to_string(self.history_path()) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..]
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

/// Keep only the last 500 lines.
fn rotate_history(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let keep = &lines[lines.len().saturating_sub(KEEP_LINES)..];
    std::fs::write(path, keep.join("\n") + "\n")?;
    tracing::debug!("Rotated {} down to {} lines", path.display(), keep.len());
    Ok(())
}
