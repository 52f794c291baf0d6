// src/cli/progress.rs - Terminal renderer for session snapshots

use std::io::Write;

use crate::tracking::{SessionSnapshot, SessionStatus};

/// Build an observer that renders snapshots to stderr.
///
/// Active snapshots redraw a single status line in place; every other
/// status gets a line of its own. stdout stays untouched.
pub fn terminal_progress() -> impl Fn(&SessionSnapshot) -> anyhow::Result<()> + Send + Sync + 'static
{
    move |snapshot: &SessionSnapshot| {
        let mut err = std::io::stderr().lock();
        match snapshot.status() {
            SessionStatus::Active => {
                write!(err, "\r\x1b[2K{}", render(snapshot))?;
            }
            _ => {
                writeln!(err, "\r\x1b[2K{}", render(snapshot))?;
            }
        }
        err.flush()?;
        Ok(())
    }
}

/// Single-line rendering, prefixed with the lifecycle status.
pub fn render(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[{}] {}", snapshot.status(), snapshot.status_line());
    if snapshot.status() == SessionStatus::Active && snapshot.pending_captures() > 0 {
        line.push_str(&format!(
            " ({} capture(s) unconfirmed)",
            snapshot.pending_captures()
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::state::SessionCore;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn test_render_active() {
        let anchor = Instant::now();
        let core = SessionCore::new("s".into(), "c-5".into(), 60.0, Utc::now(), anchor);
        let snap = core.snapshot(SessionStatus::Active, anchor + Duration::from_secs(61));
        assert_eq!(
            render(&snap),
            "[active] Session running for c-5. Time: 00:01:01. Earned: 1.02"
        );
    }

    #[test]
    fn test_render_active_with_unconfirmed_captures() {
        let anchor = Instant::now();
        let core = SessionCore::new("s".into(), "c-5".into(), 60.0, Utc::now(), anchor);
        core.capture_taken();
        let snap = core.snapshot(SessionStatus::Active, anchor);
        assert!(render(&snap).ends_with("(1 capture(s) unconfirmed)"));
    }

    #[test]
    fn test_render_failed() {
        let snap = SessionSnapshot::unacknowledged(
            "c-5",
            0.0,
            SessionStatus::Failed,
            Some("gateway down".into()),
        );
        assert_eq!(render(&snap), "[failed] Session failed: gateway down");
    }

    #[test]
    fn test_observer_accepts_every_status() {
        let observer = terminal_progress();
        for status in [
            SessionStatus::Starting,
            SessionStatus::Active,
            SessionStatus::Stopped,
        ] {
            let snap = SessionSnapshot::unacknowledged("c", 1.0, status, None);
            assert!(observer(&snap).is_ok());
        }
    }
}
