// src/tracking/capture_loop.rs - Proof-of-work captures at unpredictable times
//
// One capture at a time: wait a random interval, capture, upload, repeat.
// Failures are logged and the loop simply waits for the next interval.

use std::sync::{Arc, Mutex};

use rand::RngCore;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::schedule::CaptureWindow;
use super::state::SessionCore;
use crate::capture::CaptureProvider;
use crate::gateway::{GatewayError, SyncGateway};
use crate::infra::errors::TrackerError;

pub(crate) type SharedRandom = Arc<Mutex<Box<dyn RngCore + Send>>>;

pub(crate) struct CaptureContext {
    pub core: Arc<SessionCore>,
    pub clock: Arc<dyn Clock>,
    pub capture: Arc<dyn CaptureProvider>,
    pub gateway: Arc<dyn SyncGateway>,
    pub window: CaptureWindow,
    pub rng: SharedRandom,
    pub cancel: CancellationToken,
}

/// What one capture attempt amounted to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CaptureOutcome {
    Uploaded(String),
    NoChange,
    Skipped,
    Lost,
}

pub(crate) async fn run_capture_loop(ctx: CaptureContext) {
    tracing::debug!(
        "Capture loop started for session {} (every {:?}..{:?})",
        ctx.core.session_id(),
        ctx.window.min(),
        ctx.window.max()
    );

    loop {
        let wait = {
            let mut rng = match ctx.rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            ctx.window.sample(&mut **rng)
        };
        tracing::debug!("Next capture in {:?}", wait);

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = ctx.clock.sleep(wait) => {}
        }

        // Cancellation abandons an in-flight capture or upload.
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            outcome = capture_once(&ctx) => outcome,
        };

        match outcome {
            Ok(CaptureOutcome::Uploaded(id)) => {
                tracing::info!("Capture {} attached to session {}", id, ctx.core.session_id());
            }
            Ok(other) => tracing::debug!("Capture attempt finished: {:?}", other),
            Err(e) => {
                let reason = e.to_string();
                if ctx.core.mark_fatal(reason) {
                    tracing::error!("Capture loop hit an unrecoverable error: {}", e);
                }
                ctx.cancel.cancel();
                break;
            }
        }
    }

    tracing::debug!("Capture loop stopped for session {}", ctx.core.session_id());
}

/// Capture and upload once. Only an upload rejected because the session no
/// longer exists is returned as an error.
async fn capture_once(ctx: &CaptureContext) -> Result<CaptureOutcome, GatewayError> {
    tracing::info!("Capturing screenshot for contract {}", ctx.core.contract_id());

    let image = match ctx.capture.capture().await {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!("{}", TrackerError::CaptureFailed(e));
            return Ok(CaptureOutcome::Skipped);
        }
    };

    if image.is_empty() {
        return Ok(CaptureOutcome::NoChange);
    }

    ctx.core.capture_taken();
    match ctx
        .gateway
        .upload_artifact(ctx.core.session_id(), image)
        .await
    {
        Ok(id) => {
            ctx.core.capture_confirmed();
            Ok(CaptureOutcome::Uploaded(id))
        }
        Err(e) if e.is_session_gone() => Err(e),
        Err(e) => {
            tracing::warn!(
                "{} ({} capture(s) unconfirmed)",
                TrackerError::UploadFailed(e),
                ctx.core.pending_captures()
            );
            Ok(CaptureOutcome::Lost)
        }
    }
}
