// src/tracking/accrual.rs - Periodic elapsed/earnings snapshots

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::bus::EventBus;
use super::clock::Clock;
use super::state::{SessionCore, SessionStatus};

/// Publish an `Active` snapshot every `period` until cancelled.
///
/// Elapsed time is recomputed from the session anchor on every tick, so
/// timer jitter never accumulates. If the session was cancelled because of
/// a fatal error, the loop publishes the `Failed` snapshot on its way out;
/// it is the only publisher while the session runs.
pub(crate) async fn run_accrual_loop(
    core: Arc<SessionCore>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = clock.ticker(period);
    tracing::debug!(
        "Accrual loop started for session {} ({:?} cadence)",
        core.session_id(),
        period
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = core.snapshot(SessionStatus::Active, clock.now());
                tracing::trace!(
                    "Session {}: {:?} elapsed, {:.4} earned",
                    core.session_id(),
                    snapshot.elapsed(),
                    snapshot.earned_so_far()
                );
                bus.publish(&snapshot).await;
            }
        }
    }

    if let Some(reason) = core.fatal() {
        if core.claim_terminal() {
            tracing::error!("Session {} failed: {}", core.session_id(), reason);
            bus.publish(&core.snapshot(SessionStatus::Failed, clock.now()))
                .await;
        }
    }

    tracing::debug!("Accrual loop stopped for session {}", core.session_id());
}
