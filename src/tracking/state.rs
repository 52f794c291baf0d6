// src/tracking/state.rs - Session state and the snapshots handed to observers

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Engine lifecycle: `Idle -> Starting -> Active -> Stopping -> Stopped (-> Idle)`,
/// with `Failed` reachable from `Starting` and `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Starting => "starting",
            SessionStatus::Active => "active",
            SessionStatus::Stopping => "stopping",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        }
    }

    /// Holds the engine's single session slot.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Active | SessionStatus::Stopping
        )
    }

    /// Last snapshot an observer sees for a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Earnings for `elapsed` at an hourly rate.
pub fn earned_for(elapsed: Duration, cost_per_hour: f64) -> f64 {
    elapsed.as_secs_f64() / 3600.0 * cost_per_hour
}

/// `hh:mm:ss`, hours not wrapped at 24.
pub fn format_hms(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Immutable copy of the session state at one point in time.
///
/// `earned_so_far` is always derived from `elapsed` and `cost_per_hour`
/// when the snapshot is built; there is no way to set it directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    session_id: Option<String>,
    contract_id: String,
    cost_per_hour: f64,
    started_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    elapsed: Duration,
    earned_so_far: f64,
    pending_captures: u32,
    error: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot for a session that never got a gateway acknowledgement.
    pub fn unacknowledged(
        contract_id: &str,
        cost_per_hour: f64,
        status: SessionStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            session_id: None,
            contract_id: contract_id.to_string(),
            cost_per_hour,
            started_at: None,
            status,
            elapsed: Duration::ZERO,
            earned_so_far: 0.0,
            pending_captures: 0,
            error,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn cost_per_hour(&self) -> f64 {
        self.cost_per_hour
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn earned_so_far(&self) -> f64 {
        self.earned_so_far
    }

    pub fn pending_captures(&self) -> u32 {
        self.pending_captures
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// One-line human summary, as shown in the dashboard status bar.
    pub fn status_line(&self) -> String {
        match self.status {
            SessionStatus::Active | SessionStatus::Stopping => format!(
                "Session running for {}. Time: {}. Earned: {:.2}",
                self.contract_id,
                format_hms(self.elapsed),
                self.earned_so_far
            ),
            SessionStatus::Starting => format!("Starting session for {}...", self.contract_id),
            SessionStatus::Failed => match &self.error {
                Some(e) => format!("Session failed: {}", e),
                None => "Session failed.".to_string(),
            },
            SessionStatus::Stopped => format!(
                "Session stopped after {}. Earned: {:.2}",
                format_hms(self.elapsed),
                self.earned_so_far
            ),
            SessionStatus::Idle => "Session is not active.".to_string(),
        }
    }
}

/// Facts about an acknowledged session, shared read-only between the engine
/// and its two loops.
///
/// Everything is write-once except `pending_captures` and `fatal`, which only
/// the capture loop writes. `terminal` makes sure exactly one terminal
/// snapshot is published per session.
#[derive(Debug)]
pub struct SessionCore {
    session_id: String,
    contract_id: String,
    cost_per_hour: f64,
    started_at: DateTime<Utc>,
    anchor: Instant,
    pending_captures: AtomicU32,
    fatal: OnceLock<String>,
    terminal: AtomicBool,
}

impl SessionCore {
    pub fn new(
        session_id: String,
        contract_id: String,
        cost_per_hour: f64,
        started_at: DateTime<Utc>,
        anchor: Instant,
    ) -> Self {
        Self {
            session_id,
            contract_id,
            cost_per_hour,
            started_at,
            anchor,
            pending_captures: AtomicU32::new(0),
            fatal: OnceLock::new(),
            terminal: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn cost_per_hour(&self) -> f64 {
        self.cost_per_hour
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Always `now - anchor`; never a sum of tick intervals.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.anchor)
    }

    pub fn pending_captures(&self) -> u32 {
        self.pending_captures.load(Ordering::Acquire)
    }

    pub(crate) fn capture_taken(&self) {
        self.pending_captures.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn capture_confirmed(&self) {
        let _ = self
            .pending_captures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Record an unrecoverable error. Returns false if one was already recorded.
    pub(crate) fn mark_fatal(&self, reason: String) -> bool {
        self.fatal.set(reason).is_ok()
    }

    pub fn fatal(&self) -> Option<&str> {
        self.fatal.get().map(String::as_str)
    }

    /// True for the first caller only; that caller publishes the terminal snapshot.
    pub(crate) fn claim_terminal(&self) -> bool {
        !self.terminal.swap(true, Ordering::AcqRel)
    }

    pub fn snapshot(&self, status: SessionStatus, now: Instant) -> SessionSnapshot {
        let elapsed = self.elapsed_at(now);
        SessionSnapshot {
            session_id: Some(self.session_id.clone()),
            contract_id: self.contract_id.clone(),
            cost_per_hour: self.cost_per_hour,
            started_at: Some(self.started_at),
            status,
            elapsed,
            earned_so_far: earned_for(elapsed, self.cost_per_hour),
            pending_captures: self.pending_captures(),
            error: if status == SessionStatus::Failed {
                self.fatal().map(str::to_string)
            } else {
                None
            },
        }
    }

    /// Same as [`snapshot`](Self::snapshot) but with an explicit error message.
    pub fn failed_snapshot(&self, now: Instant, error: String) -> SessionSnapshot {
        let mut snap = self.snapshot(SessionStatus::Failed, now);
        snap.error = Some(error);
        snap
    }
}
