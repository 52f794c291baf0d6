// src/tracking/engine.rs - Work-session state machine
//
// Owns the single session slot, spawns the accrual and capture loops on
// start, and joins both on stop before reporting the session as stopped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::accrual::run_accrual_loop;
use super::bus::{EventBus, Subscription};
use super::capture_loop::{run_capture_loop, CaptureContext, SharedRandom};
use super::clock::Clock;
use super::schedule::CaptureWindow;
use super::state::{SessionCore, SessionSnapshot, SessionStatus};
use crate::capture::CaptureProvider;
use crate::gateway::{GatewayError, SyncGateway};
use crate::infra::config::TrackingConfig;
use crate::infra::errors::TrackerError;

struct Running {
    core: Arc<SessionCore>,
    cancel: CancellationToken,
    accrual: JoinHandle<()>,
    capture: JoinHandle<()>,
}

impl Running {
    /// Cancel both loops and wait until they have returned.
    async fn shutdown(self) -> Arc<SessionCore> {
        self.cancel.cancel();
        let (accrual, capture) = tokio::join!(self.accrual, self.capture);
        if let Err(e) = accrual {
            tracing::error!("Accrual loop task ended abnormally: {}", e);
        }
        if let Err(e) = capture {
            tracing::error!("Capture loop task ended abnormally: {}", e);
        }
        self.core
    }
}

enum Slot {
    Idle,
    Starting,
    Active(Running),
    Stopping(Arc<SessionCore>),
    /// Loops, if any, are still owned here until `reset` joins them.
    Failed(Option<Running>),
}

impl Slot {
    fn status(&self) -> SessionStatus {
        match self {
            Slot::Idle => SessionStatus::Idle,
            Slot::Starting => SessionStatus::Starting,
            Slot::Active(running) if running.core.fatal().is_some() => SessionStatus::Failed,
            Slot::Active(_) => SessionStatus::Active,
            Slot::Stopping(_) => SessionStatus::Stopping,
            Slot::Failed(_) => SessionStatus::Failed,
        }
    }
}

/// Tracks one billable work session at a time.
///
/// Collaborators are injected at construction. `start` and `stop` may be
/// called from any task; transitions are totally ordered by the engine.
pub struct SessionEngine {
    accrual_interval: Duration,
    window: CaptureWindow,
    clock: Arc<dyn Clock>,
    capture: Arc<dyn CaptureProvider>,
    gateway: Arc<dyn SyncGateway>,
    rng: SharedRandom,
    bus: EventBus,
    slot: Mutex<Slot>,
    transition: tokio::sync::Mutex<()>,
}

impl SessionEngine {
    /// Validate `config` and build an idle engine.
    pub fn new(
        config: &TrackingConfig,
        clock: Arc<dyn Clock>,
        capture: Arc<dyn CaptureProvider>,
        gateway: Arc<dyn SyncGateway>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        Ok(Self {
            accrual_interval: config.accrual_interval(),
            window: config.capture_window()?,
            clock,
            capture,
            gateway,
            rng: Arc::new(Mutex::new(Box::new(StdRng::from_entropy()))),
            bus: EventBus::new(config.dispatch_budget(), config.observer_queue),
            slot: Mutex::new(Slot::Idle),
            transition: tokio::sync::Mutex::new(()),
        })
    }

    /// Replace the entropy-seeded generator, e.g. with a seeded one.
    pub fn with_random_source(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Arc::new(Mutex::new(rng));
        self
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: Fn(&SessionSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(name, handler)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_slot().status()
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Snapshot of the running session, if there is one.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let slot = self.lock_slot();
        let status = slot.status();
        match &*slot {
            Slot::Active(running) => Some(running.core.snapshot(status, self.clock.now())),
            Slot::Stopping(core) => Some(core.snapshot(status, self.clock.now())),
            _ => None,
        }
    }

    /// Begin billable work on `contract_id`.
    ///
    /// Fails with `AlreadyActive` unless the engine is idle. Gateway failures
    /// publish a `Failed` snapshot, leave the engine idle and are returned.
    pub async fn start(&self, contract_id: &str) -> Result<SessionSnapshot, TrackerError> {
        {
            let mut slot = self.lock_slot();
            if !matches!(*slot, Slot::Idle) {
                let status = slot.status();
                tracing::warn!(
                    "Start for contract {} rejected: engine is {}",
                    contract_id,
                    status
                );
                return Err(TrackerError::AlreadyActive { status });
            }
            *slot = Slot::Starting;
        }
        let mut guard = StartGuard {
            engine: self,
            armed: true,
            acknowledged: None,
        };

        tracing::info!("Starting session for contract {}", contract_id);
        let requested_at = self.clock.utc_now();
        self.bus
            .publish(&SessionSnapshot::unacknowledged(
                contract_id,
                0.0,
                SessionStatus::Starting,
                None,
            ))
            .await;

        let rate = match self.gateway.fetch_contract_rate(contract_id).await {
            Ok(rate) => rate,
            Err(e) => {
                guard.armed = false;
                return self
                    .fail_start(contract_id, 0.0, "fetch contract rate", e)
                    .await;
            }
        };

        let ack = match self.gateway.begin_session(contract_id).await {
            Ok(ack) => ack,
            Err(e) => {
                guard.armed = false;
                return self.fail_start(contract_id, rate, "begin session", e).await;
            }
        };

        guard.acknowledged = Some(ack.session_id.clone());

        // Held until Active is published so a concurrent stop cannot overtake it.
        let _transition = self.transition.lock().await;

        let anchor = self.clock.now();
        let started_at = match ack.started_at {
            Some(server) => server.max(requested_at),
            None => requested_at,
        };
        let core = Arc::new(SessionCore::new(
            ack.session_id,
            contract_id.to_string(),
            rate,
            started_at,
            anchor,
        ));

        let cancel = CancellationToken::new();
        let accrual = tokio::spawn(run_accrual_loop(
            core.clone(),
            self.clock.clone(),
            self.bus.clone(),
            self.accrual_interval,
            cancel.clone(),
        ));
        let capture = tokio::spawn(run_capture_loop(CaptureContext {
            core: core.clone(),
            clock: self.clock.clone(),
            capture: self.capture.clone(),
            gateway: self.gateway.clone(),
            window: self.window,
            rng: self.rng.clone(),
            cancel: cancel.clone(),
        }));

        *self.lock_slot() = Slot::Active(Running {
            core: core.clone(),
            cancel,
            accrual,
            capture,
        });
        guard.armed = false;

        let active = core.snapshot(SessionStatus::Active, anchor);
        self.bus.publish(&active).await;

        tracing::info!(
            "Session {} active for contract {} at {:.2}/h",
            core.session_id(),
            contract_id,
            rate
        );
        Ok(active)
    }

    async fn fail_start(
        &self,
        contract_id: &str,
        rate: f64,
        operation: &'static str,
        source: GatewayError,
    ) -> Result<SessionSnapshot, TrackerError> {
        tracing::error!(
            "Failed to start session for contract {}: {}",
            contract_id,
            source
        );
        let err = TrackerError::gateway(operation, source);

        *self.lock_slot() = Slot::Failed(None);
        self.bus
            .publish(&SessionSnapshot::unacknowledged(
                contract_id,
                rate,
                SessionStatus::Failed,
                Some(err.to_string()),
            ))
            .await;
        *self.lock_slot() = Slot::Idle;

        Err(err)
    }

    /// End the active session.
    ///
    /// Returns once both loops have terminated and the final snapshot has
    /// been published. A no-op returning `Ok(None)` when nothing is active.
    pub async fn stop(&self) -> Result<Option<SessionSnapshot>, TrackerError> {
        let _transition = self.transition.lock().await;

        let running = {
            let mut slot = self.lock_slot();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Active(running) => {
                    *slot = if running.core.fatal().is_some() {
                        Slot::Failed(None)
                    } else {
                        Slot::Stopping(running.core.clone())
                    };
                    running
                }
                other => {
                    *slot = other;
                    return Ok(None);
                }
            }
        };

        if running.core.fatal().is_some() {
            // Loops are already winding down and publish the Failed snapshot.
            running.shutdown().await;
            return Ok(None);
        }

        tracing::info!(
            "Stopping session {} for contract {}",
            running.core.session_id(),
            running.core.contract_id()
        );
        let core = running.shutdown().await;
        let now = self.clock.now();

        // A fatal error may have landed between the check above and the cancel.
        if let Some(reason) = core.fatal() {
            let failed = core.failed_snapshot(now, reason.to_string());
            if core.claim_terminal() {
                self.bus.publish(&failed).await;
            }
            *self.lock_slot() = Slot::Failed(None);
            return Ok(Some(failed));
        }

        self.bus
            .publish(&core.snapshot(SessionStatus::Stopping, now))
            .await;

        match self.gateway.end_session(core.session_id()).await {
            Ok(()) => {
                let stopped = core.snapshot(SessionStatus::Stopped, now);
                core.claim_terminal();
                self.bus.publish(&stopped).await;
                *self.lock_slot() = Slot::Idle;
                tracing::info!(
                    "Session {} stopped after {:?}, earned {:.2}",
                    core.session_id(),
                    stopped.elapsed(),
                    stopped.earned_so_far()
                );
                Ok(Some(stopped))
            }
            Err(e) => {
                tracing::error!("Failed to end session {} on server: {}", core.session_id(), e);
                let err = TrackerError::gateway("end session", e);
                let failed = core.failed_snapshot(now, err.to_string());
                core.claim_terminal();
                self.bus.publish(&failed).await;
                *self.lock_slot() = Slot::Failed(None);
                Err(err)
            }
        }
    }

    /// Return a failed engine to `Idle`. Returns false if it was not failed.
    pub async fn reset(&self) -> bool {
        let _transition = self.transition.lock().await;

        let running = {
            let mut slot = self.lock_slot();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Failed(running) => running,
                Slot::Active(running) if running.core.fatal().is_some() => Some(running),
                other => {
                    *slot = other;
                    return false;
                }
            }
        };

        if let Some(running) = running {
            running.shutdown().await;
        }
        tracing::info!("Session engine reset to idle");
        true
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        if let Slot::Active(running) | Slot::Failed(Some(running)) = &*self.lock_slot() {
            running.cancel.cancel();
        }
    }
}

/// Puts the slot back to `Idle` if a `start` future is dropped before the
/// engine owns the session. A session the server already acknowledged is
/// ended in the background.
struct StartGuard<'a> {
    engine: &'a SessionEngine,
    armed: bool,
    acknowledged: Option<String>,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut slot = self.engine.lock_slot();
            if matches!(*slot, Slot::Starting) {
                *slot = Slot::Idle;
            }
        }

        let Some(session_id) = self.acknowledged.take() else {
            return;
        };
        tracing::warn!("Start abandoned after server acknowledged session {}", session_id);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No runtime to end abandoned session {}", session_id);
            return;
        };
        let gateway = self.engine.gateway.clone();
        handle.spawn(async move {
            if let Err(e) = gateway.end_session(&session_id).await {
                tracing::error!("Failed to end abandoned session {}: {}", session_id, e);
            }
        });
    }
}
