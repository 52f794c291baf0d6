// tests/engine_test.rs - Integration test: session engine with fake gateway and capture

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;

use flsurf_tracker::capture::{CaptureError, CaptureProvider};
use flsurf_tracker::gateway::{GatewayError, SessionAck, SyncGateway};
use flsurf_tracker::infra::config::TrackingConfig;
use flsurf_tracker::infra::errors::TrackerError;
use flsurf_tracker::tracking::{SessionEngine, SessionSnapshot, SessionStatus, SystemClock};

#[derive(Clone, Copy)]
enum UploadMode {
    Accept,
    Unavailable,
    SessionGone,
    /// Never answers.
    Hang,
}

/// A gateway that answers from memory and records every call.
struct FakeGateway {
    rate: f64,
    upload: UploadMode,
    calls: Mutex<Vec<String>>,
    uploads: AtomicUsize,
}

impl FakeGateway {
    fn new(rate: f64, upload: UploadMode) -> Arc<Self> {
        Arc::new(Self {
            rate,
            upload,
            calls: Mutex::new(Vec::new()),
            uploads: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }
}

#[async_trait]
impl SyncGateway for FakeGateway {
    async fn fetch_contract_rate(&self, _contract_id: &str) -> Result<f64, GatewayError> {
        self.calls.lock().unwrap().push("rate".into());
        Ok(self.rate)
    }

    async fn begin_session(&self, contract_id: &str) -> Result<SessionAck, GatewayError> {
        self.calls.lock().unwrap().push("begin".into());
        Ok(SessionAck {
            session_id: format!("session-{}", contract_id),
            started_at: None,
        })
    }

    async fn end_session(&self, _session_id: &str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push("end".into());
        Ok(())
    }

    async fn upload_artifact(
        &self,
        _session_id: &str,
        image: Vec<u8>,
    ) -> Result<String, GatewayError> {
        self.calls.lock().unwrap().push("upload".into());
        assert!(!image.is_empty());
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        match self.upload {
            UploadMode::Accept => Ok(format!("file-{}", n)),
            UploadMode::Unavailable => Err(GatewayError::Unavailable("HTTP 503".into())),
            UploadMode::SessionGone => Err(GatewayError::Rejected {
                status: 410,
                message: "session closed".into(),
            }),
            UploadMode::Hang => std::future::pending().await,
        }
    }
}

/// A capture provider that hands out a fixed image and remembers when.
struct FakeCapture {
    fail: bool,
    taken: Mutex<Vec<Instant>>,
}

impl FakeCapture {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            taken: Mutex::new(Vec::new()),
        })
    }

    fn taken(&self) -> Vec<Instant> {
        self.taken.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptureProvider for FakeCapture {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        self.taken.lock().unwrap().push(Instant::now());
        if self.fail {
            return Err(CaptureError::Unavailable("no display".into()));
        }
        Ok(b"\x89PNG fake".to_vec())
    }
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A capture provider whose capture never completes.
#[derive(Default)]
struct StuckCapture {
    started: AtomicUsize,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureProvider for StuckCapture {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _flag = DropFlag(self.dropped.clone());
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

fn config() -> TrackingConfig {
    TrackingConfig {
        accrual_interval_secs: 1,
        capture_interval_min_secs: 1,
        capture_interval_max_secs: 2,
        dispatch_budget_ms: 250,
        observer_queue: 64,
    }
}

fn engine(gateway: Arc<FakeGateway>, capture: Arc<dyn CaptureProvider>) -> SessionEngine {
    engine_with(&config(), gateway, capture)
}

fn engine_with(
    config: &TrackingConfig,
    gateway: Arc<FakeGateway>,
    capture: Arc<dyn CaptureProvider>,
) -> SessionEngine {
    SessionEngine::new(config, Arc::new(SystemClock), capture, gateway)
        .unwrap()
        .with_random_source(Box::new(StdRng::seed_from_u64(0x5eed)))
}

fn record(engine: &SessionEngine) -> Arc<Mutex<Vec<SessionSnapshot>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.subscribe("recorder", move |snapshot| {
        sink.lock().unwrap().push(snapshot.clone());
        Ok(())
    });
    seen
}

/// Let observer dispatchers drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn statuses(seen: &Arc<Mutex<Vec<SessionSnapshot>>>) -> Vec<SessionStatus> {
    seen.lock().unwrap().iter().map(|s| s.status()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_three_second_session() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let capture = FakeCapture::new(false);
    let engine = engine(gateway.clone(), capture.clone());
    let seen = record(&engine);

    let started = Instant::now();
    let active = engine.start("c-1").await.unwrap();
    assert_eq!(active.status(), SessionStatus::Active);
    assert_eq!(active.session_id(), Some("session-c-1"));
    assert_eq!(active.elapsed(), Duration::ZERO);
    assert!(engine.is_active());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let stopped = engine.stop().await.unwrap().unwrap();

    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert!(stopped.elapsed() >= Duration::from_secs(3));
    assert!(stopped.elapsed() < Duration::from_millis(3500));
    let expected = stopped.elapsed().as_secs_f64() / 3600.0 * 10.0;
    assert!((stopped.earned_so_far() - expected).abs() < 1e-12);
    assert!((stopped.earned_so_far() - 0.008_333).abs() < 1e-3);
    assert_eq!(engine.status(), SessionStatus::Idle);

    // First capture lands within the window's upper bound.
    let taken = capture.taken();
    assert!(!taken.is_empty());
    assert!(taken[0] - started <= Duration::from_secs(2));
    assert!(taken[0] - started >= Duration::from_secs(1));
    assert_eq!(gateway.count("upload"), taken.len());
    assert_eq!(stopped.pending_captures(), 0);

    settle().await;
    let all = statuses(&seen);
    assert_eq!(all.first(), Some(&SessionStatus::Starting));
    assert_eq!(all.last(), Some(&SessionStatus::Stopped));
    assert_eq!(all.iter().filter(|s| s.is_terminal()).count(), 1);
    let stopping_at = all
        .iter()
        .position(|s| *s == SessionStatus::Stopping)
        .unwrap();
    assert!(all[stopping_at..]
        .iter()
        .all(|s| *s != SessionStatus::Active));
    assert!(all.iter().filter(|s| **s == SessionStatus::Active).count() >= 3);

    assert_eq!(gateway.calls().first().map(String::as_str), Some("rate"));
    assert_eq!(gateway.calls().last().map(String::as_str), Some("end"));
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_are_consistent() {
    let gateway = FakeGateway::new(42.5, UploadMode::Accept);
    let engine = engine(gateway, FakeCapture::new(false));
    let seen = record(&engine);

    engine.start("c-2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5500)).await;
    engine.stop().await.unwrap();
    settle().await;

    let snapshots = seen.lock().unwrap().clone();
    let mut last_elapsed = Duration::ZERO;
    for snap in &snapshots {
        let hours = snap.elapsed().as_secs_f64() / 3600.0;
        assert!((snap.earned_so_far() - hours * snap.cost_per_hour()).abs() < 1e-12);
        assert!(snap.elapsed() >= last_elapsed, "elapsed went backwards");
        last_elapsed = snap.elapsed();
    }
    let terminal: Vec<_> = snapshots
        .iter()
        .filter(|s| s.status().is_terminal())
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(snapshots.last().unwrap().status(), SessionStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_no_snapshots_after_stop() {
    let engine = engine(
        FakeGateway::new(10.0, UploadMode::Accept),
        FakeCapture::new(false),
    );
    let seen = record(&engine);

    engine.start("c-3").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    engine.stop().await.unwrap();
    settle().await;
    let count = seen.lock().unwrap().len();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(seen.lock().unwrap().len(), count);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_stop_takes_no_capture() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let capture = FakeCapture::new(false);
    let engine = engine(gateway.clone(), capture.clone());

    engine.start("c-4").await.unwrap();
    let stopped = engine.stop().await.unwrap().unwrap();

    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert!(stopped.elapsed() < Duration::from_secs(1));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(capture.taken().is_empty());
    assert_eq!(gateway.count("upload"), 0);
    assert_eq!(gateway.count("end"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_keeps_session_running() {
    let gateway = FakeGateway::new(10.0, UploadMode::Unavailable);
    let engine = engine(gateway.clone(), FakeCapture::new(false));

    engine.start("c-5").await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(engine.is_active());
    let uploads = gateway.count("upload");
    assert!(uploads >= 2, "expected repeated capture attempts, got {}", uploads);

    let stopped = engine.stop().await.unwrap().unwrap();
    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert_eq!(stopped.pending_captures() as usize, gateway.count("upload"));
}

#[tokio::test(start_paused = true)]
async fn test_capture_failure_is_skipped() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let capture = FakeCapture::new(true);
    let engine = engine(gateway.clone(), capture.clone());

    engine.start("c-6").await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(engine.is_active());
    assert!(capture.taken().len() >= 2);
    assert_eq!(gateway.count("upload"), 0);
    let stopped = engine.stop().await.unwrap().unwrap();
    assert_eq!(stopped.pending_captures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_gone_fails_engine() {
    let gateway = FakeGateway::new(10.0, UploadMode::SessionGone);
    let engine = engine(gateway.clone(), FakeCapture::new(false));
    let seen = record(&engine);

    engine.start("c-7").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(engine.status(), SessionStatus::Failed);
    assert_eq!(gateway.count("upload"), 1);
    assert!(matches!(
        engine.start("c-8").await,
        Err(TrackerError::AlreadyActive {
            status: SessionStatus::Failed
        })
    ));

    settle().await;
    let snapshots = seen.lock().unwrap().clone();
    let failed: Vec<_> = snapshots
        .iter()
        .filter(|s| s.status() == SessionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error().unwrap().contains("session closed"));
    assert_eq!(snapshots.last().unwrap().status(), SessionStatus::Failed);

    assert!(engine.stop().await.unwrap().is_none());
    assert!(engine.reset().await);
    assert_eq!(engine.status(), SessionStatus::Idle);
    assert_eq!(gateway.count("end"), 0);

    settle().await;
    assert_eq!(seen.lock().unwrap().len(), snapshots.len());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_admit_one() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let engine = engine(gateway.clone(), FakeCapture::new(false));

    let (a, b) = tokio::join!(engine.start("c-a"), engine.start("c-b"));
    assert!(a.is_ok() ^ b.is_ok());
    let rejected = if a.is_ok() { b } else { a };
    assert!(matches!(rejected, Err(TrackerError::AlreadyActive { .. })));
    assert_eq!(gateway.count("begin"), 1);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stops_end_once() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let engine = engine(gateway.clone(), FakeCapture::new(false));
    engine.start("c-9").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (a, b) = tokio::join!(engine.stop(), engine.stop());
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(gateway.count("end"), 1);
    assert_eq!(engine.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let engine = engine(gateway.clone(), FakeCapture::new(false));

    engine.start("c-10").await.unwrap();
    engine.stop().await.unwrap();
    let second = engine.start("c-11").await.unwrap();
    assert_eq!(second.session_id(), Some("session-c-11"));
    assert_eq!(second.elapsed(), Duration::ZERO);
    engine.stop().await.unwrap();
    assert_eq!(gateway.count("begin"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_in_flight_capture() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let capture = Arc::new(StuckCapture::default());
    let engine = engine(gateway.clone(), capture.clone());

    engine.start("c-12").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(capture.started.load(Ordering::SeqCst), 1);
    assert!(!capture.dropped.load(Ordering::SeqCst));

    let stopped = engine.stop().await.unwrap().unwrap();
    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert!(capture.dropped.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(capture.started.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.count("upload"), 0);
    assert_eq!(gateway.count("end"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_in_flight_upload() {
    let gateway = FakeGateway::new(10.0, UploadMode::Hang);
    let engine = engine(gateway.clone(), FakeCapture::new(false));

    engine.start("c-13").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(gateway.count("upload"), 1);

    let stopped = engine.stop().await.unwrap().unwrap();
    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert_eq!(stopped.pending_captures(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.count("upload"), 1);
    assert_eq!(gateway.count("end"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_dropped_by_caller_timeout_keeps_session_owned() {
    let gateway = FakeGateway::new(10.0, UploadMode::Accept);
    let tracking = TrackingConfig {
        capture_interval_min_secs: 600,
        capture_interval_max_secs: 600,
        dispatch_budget_ms: 1000,
        observer_queue: 1,
        ..config()
    };
    let engine = engine_with(&tracking, gateway.clone(), FakeCapture::new(false));
    engine.subscribe("slow", |_s: &SessionSnapshot| {
        std::thread::sleep(Duration::from_millis(400));
        Ok(())
    });

    // Keep the dispatcher busy so the queue is full when Active is published.
    engine
        .events()
        .publish(&SessionSnapshot::unacknowledged("warmup", 0.0, SessionStatus::Idle, None))
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let attempt = tokio::time::timeout(Duration::from_millis(150), engine.start("c-14")).await;
    assert!(attempt.is_err(), "start should still be publishing Active");
    assert_eq!(gateway.count("begin"), 1);

    // The engine owns the acknowledged session, so it can still be ended.
    assert!(engine.is_active());
    let stopped = engine.stop().await.unwrap().unwrap();
    assert_eq!(stopped.session_id(), Some("session-c-14"));
    assert_eq!(gateway.count("end"), 1);
    assert_eq!(engine.status(), SessionStatus::Idle);
}
