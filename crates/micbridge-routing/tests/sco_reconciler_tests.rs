//! SCO reconciler tests
//!
//! Runs the full controller + reconciler thread against an instrumented
//! fake backend with shrunken delays: enable reporting, self-healing
//! retries, and keep-alive behavior around disable.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use micbridge_foundation::clock::real_clock;
use micbridge_foundation::timer::TimerService;
use micbridge_routing::{
    AudioMode, NoopRouteBackend, RouteBackend, RouteTiming, RouterController, ScoState,
};

/// Timing shrunk far enough that a whole enable cycle fits in tens of
/// milliseconds.
fn test_timing() -> RouteTiming {
    RouteTiming {
        settle_kick: Duration::from_millis(10),
        settle_report: Duration::from_millis(30),
        retry_delay: Duration::from_millis(50),
        keep_alive_period: Duration::from_millis(40),
    }
}

#[derive(Default)]
struct FakeRouteBackend {
    mode: Mutex<Option<AudioMode>>,
    sco_on: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeRouteBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn call_log(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl RouteBackend for FakeRouteBackend {
    fn set_mode(&self, mode: AudioMode) {
        self.calls.lock().push("set_mode");
        *self.mode.lock() = Some(mode);
    }

    fn mode(&self) -> AudioMode {
        self.mode.lock().unwrap_or(AudioMode::Normal)
    }

    fn start_sco(&self) {
        self.calls.lock().push("start_sco");
        self.start_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_sco(&self) {
        self.calls.lock().push("stop_sco");
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_sco_on(&self, on: bool) {
        self.sco_on.store(on, Ordering::SeqCst);
    }

    fn is_sco_on(&self) -> bool {
        self.sco_on.load(Ordering::SeqCst)
    }

    fn is_sco_available(&self) -> bool {
        true
    }
}

fn spawn_router(
    backend: Arc<FakeRouteBackend>,
) -> (
    RouterController,
    crossbeam_channel::Sender<ScoState>,
    crossbeam_channel::Receiver<micbridge_routing::RouteLog>,
) {
    let (sco_tx, sco_rx) = crossbeam_channel::unbounded();
    let (router, log_rx) = RouterController::new(
        backend,
        sco_rx,
        TimerService::new(real_clock()),
        test_timing(),
    );
    (router, sco_tx, log_rx)
}

#[test]
fn enable_reports_sampled_state() {
    let backend = FakeRouteBackend::new();
    let (router, _sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    let report = router.enable().unwrap();

    assert_eq!(report.mode, AudioMode::Communication);
    assert!(report.sco_on);
    assert!(report.sco_available);

    // Defensive reset: the stale link is stopped before the fresh start.
    let calls = backend.call_log();
    let first_stop = calls.iter().position(|c| *c == "stop_sco").unwrap();
    let first_start = calls.iter().position(|c| *c == "start_sco").unwrap();
    assert!(first_stop < first_start);
}

#[test]
fn disable_restores_normal_mode() {
    let backend = FakeRouteBackend::new();
    let (router, _sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    router.disable();

    assert_eq!(backend.mode(), AudioMode::Normal);
    assert!(!backend.is_sco_on());
}

#[test]
fn disconnect_while_desired_retries_exactly_once() {
    let backend = FakeRouteBackend::new();
    let (router, sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    let baseline = backend.starts();

    sco_tx.send(ScoState::Disconnected).unwrap();
    // Past the retry delay, with margin; the SCO flag is still raised so
    // the keep-alive stays quiet and only the retry fires.
    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(backend.starts(), baseline + 1);
}

#[test]
fn disable_before_retry_delay_suppresses_the_retry() {
    let backend = FakeRouteBackend::new();
    let (router, sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    sco_tx.send(ScoState::Disconnected).unwrap();
    // Let the reconciler consume the notification, then disable before
    // the retry delay elapses.
    std::thread::sleep(Duration::from_millis(10));
    router.disable();

    let after_disable = backend.starts();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(backend.starts(), after_disable);
}

#[test]
fn keep_alive_restarts_when_the_flag_drops() {
    let backend = FakeRouteBackend::new();
    let (router, _sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    let baseline = backend.starts();

    // Simulate the platform silently dropping the flag.
    backend.set_sco_on(false);
    std::thread::sleep(Duration::from_millis(100));

    assert!(backend.starts() > baseline, "keep-alive never re-issued start");
}

#[test]
fn no_keep_alive_start_after_disable() {
    let backend = FakeRouteBackend::new();
    let (router, _sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    router.disable();

    // The flag reads off after disable; a live keep-alive would restart.
    let after_disable = backend.starts();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(backend.starts(), after_disable);
}

#[test]
fn connected_notifications_do_not_schedule_retries() {
    let backend = FakeRouteBackend::new();
    let (router, sco_tx, _log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    let baseline = backend.starts();

    sco_tx.send(ScoState::Connecting).unwrap();
    sco_tx.send(ScoState::Connected).unwrap();
    std::thread::sleep(Duration::from_millis(120));

    assert_eq!(backend.starts(), baseline);
}

#[test]
fn route_logs_flow_for_transitions_and_retries() {
    let backend = FakeRouteBackend::new();
    let (router, sco_tx, log_rx) = spawn_router(Arc::clone(&backend));

    router.enable().unwrap();
    sco_tx.send(ScoState::Disconnected).unwrap();
    std::thread::sleep(Duration::from_millis(150));

    let mut messages = Vec::new();
    while let Ok(log) = log_rx.try_recv() {
        messages.push(log.message);
    }
    assert!(messages.iter().any(|m| m.starts_with("BEFORE:")));
    assert!(messages.iter().any(|m| m.starts_with("AFTER:")));
    assert!(messages.iter().any(|m| m.contains("SCO state changed: DISCONNECTED")));
    assert!(messages.iter().any(|m| m.contains("Attempting SCO reconnection")));
}

#[test]
fn unsupported_hardware_surfaces_through_the_report() {
    let (sco_tx, sco_rx) = crossbeam_channel::unbounded();
    let (router, _log_rx) = RouterController::new(
        Arc::new(NoopRouteBackend::new()),
        sco_rx,
        TimerService::new(real_clock()),
        test_timing(),
    );

    let report = router.enable().unwrap();
    assert_eq!(report.mode, AudioMode::Communication);
    assert!(!report.sco_available);

    drop(sco_tx);
}
