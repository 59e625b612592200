//! Capture session lifecycle and the read/deliver loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::backend::{CaptureDevice, PermissionGate, ReadOutcome, RecorderBackend, SourceKind};
use crate::encoder::{AudioChunk, ChunkEncoder};
use crate::{negotiate, probe};
use micbridge_foundation::AudioError;

/// Capture rate used when the caller does not ask for one.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 24_000;

// How long `start` waits for the capture thread to finish acquisition
// before giving up on it.
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer of encoded chunks. Called on the capture thread; there is no
/// internal queue, so a slow sink throttles capture instead of buffering.
pub trait ChunkSink: Send + Sync {
    fn on_chunk(&self, chunk: AudioChunk);
}

impl<F> ChunkSink for F
where
    F: Fn(AudioChunk) + Send + Sync,
{
    fn on_chunk(&self, chunk: AudioChunk) {
        self(chunk)
    }
}

/// Effective configuration of a live session, echoed back on `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SessionInfo {
    pub sample_rate_hz: u32,
    pub buffer_len: u32,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Diagnostic counters, readable at any time.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub chunks_emitted: AtomicU64,
    pub samples_delivered: AtomicU64,
    pub read_anomalies: AtomicU64,
    pub fatal_reads: AtomicU64,
}

struct Session {
    info: SessionInfo,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

struct Inner {
    state: CaptureState,
    session: Option<Session>,
}

/// Public facade over the capture engine. Serializes start/stop, owns the
/// session lifecycle and guarantees both calls are idempotent.
pub struct CaptureController {
    backend: Arc<dyn RecorderBackend>,
    permissions: Arc<dyn PermissionGate>,
    sink: Arc<dyn ChunkSink>,
    stats: Arc<CaptureStats>,
    inner: Mutex<Inner>,
}

impl CaptureController {
    pub fn new(
        backend: Arc<dyn RecorderBackend>,
        permissions: Arc<dyn PermissionGate>,
        sink: Arc<dyn ChunkSink>,
    ) -> Self {
        Self {
            backend,
            permissions,
            sink,
            stats: Arc::new(CaptureStats::default()),
            inner: Mutex::new(Inner {
                state: CaptureState::Idle,
                session: None,
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Start capturing. A start while a session is live is a no-op success
    /// that echoes the live session's configuration. Any failure on the
    /// way up tears everything back down before returning, so an error
    /// never leaves a half-initialized session behind.
    pub fn start(&self, sample_rate_hz: Option<u32>) -> Result<SessionInfo, AudioError> {
        let mut inner = self.inner.lock();

        if let Some(session) = &inner.session {
            if !session.join.is_finished() {
                tracing::info!("capture already running, echoing current session");
                return Ok(session.info);
            }
            // The loop died on a fatal read; reap it so this start recovers.
            tracing::warn!("previous capture session ended on its own, reaping before restart");
            reap_session(&mut inner);
        }

        set_state(&mut inner, CaptureState::Starting);

        if !self.permissions.microphone_granted() {
            set_state(&mut inner, CaptureState::Idle);
            return Err(AudioError::PermissionDenied);
        }

        let rate = sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ);
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = bounded(1);

        let backend = Arc::clone(&self.backend);
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let stop_flag = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let Some((mut device, buffer_len)) = acquire_and_start(&*backend, rate, &ready_tx)
                else {
                    return;
                };
                run_loop(device.as_mut(), buffer_len, &stop_flag, &*sink, &stats);
                // Release on this thread, after the loop has fully wound
                // down; joining from the controller serializes this with
                // any subsequent start.
                device.stop();
            })
            .map_err(|e| {
                set_state(&mut inner, CaptureState::Idle);
                AudioError::Fatal(format!("failed to spawn capture thread: {e}"))
            })?;

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(info)) => {
                inner.session = Some(Session { info, stop, join });
                set_state(&mut inner, CaptureState::Recording);
                tracing::info!(
                    sample_rate_hz = info.sample_rate_hz,
                    buffer_len = info.buffer_len,
                    source = %info.source,
                    "capture session started"
                );
                Ok(info)
            }
            Ok(Err(e)) => {
                let _ = join.join();
                set_state(&mut inner, CaptureState::Idle);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                stop.store(true, Ordering::SeqCst);
                let _ = join.join();
                set_state(&mut inner, CaptureState::Idle);
                Err(AudioError::Fatal(
                    "capture thread did not report readiness".to_string(),
                ))
            }
        }
    }

    /// Stop capturing. Always succeeds; cleanup errors are logged, never
    /// surfaced, and a stop with no live session is a no-op.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.session.is_none() {
            tracing::debug!("stop requested with no live session");
            return;
        }
        set_state(&mut inner, CaptureState::Stopping);
        reap_session(&mut inner);
        set_state(&mut inner, CaptureState::Idle);
        tracing::info!("capture session stopped");
    }
}

fn set_state(inner: &mut Inner, next: CaptureState) {
    if inner.state != next {
        tracing::info!("capture state: {:?} -> {:?}", inner.state, next);
        inner.state = next;
    }
}

fn reap_session(inner: &mut Inner) {
    if let Some(session) = inner.session.take() {
        session.stop.store(true, Ordering::SeqCst);
        if session.join.join().is_err() {
            tracing::error!("capture thread panicked during shutdown");
        }
    }
}

/// Runs on the capture thread. Resolves the buffer length, negotiates a
/// source and starts recording, reporting the result back to `start`
/// before entering the loop. On any failure the partially-built session
/// is dropped here and `None` is returned.
fn acquire_and_start(
    backend: &dyn RecorderBackend,
    sample_rate_hz: u32,
    ready_tx: &Sender<Result<SessionInfo, AudioError>>,
) -> Option<(Box<dyn CaptureDevice>, u32)> {
    let buffer_len = match probe::resolve_buffer_len(backend, sample_rate_hz) {
        Ok(len) => len,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return None;
        }
    };

    let mut device = match negotiate::acquire(backend, sample_rate_hz, buffer_len) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return None;
        }
    };

    if let Err(e) = device.start() {
        let _ = ready_tx.send(Err(e));
        return None;
    }

    let info = SessionInfo {
        sample_rate_hz,
        buffer_len,
        source: device.source(),
    };
    let _ = ready_tx.send(Ok(info));
    Some((device, buffer_len))
}

fn run_loop(
    device: &mut dyn CaptureDevice,
    buffer_len: u32,
    stop: &AtomicBool,
    sink: &dyn ChunkSink,
    stats: &CaptureStats,
) {
    let mut samples = vec![0i16; (buffer_len / 2) as usize];
    let mut encoder = ChunkEncoder::new();
    tracing::info!("capture loop started");

    while !stop.load(Ordering::SeqCst) {
        match device.read(&mut samples) {
            ReadOutcome::Data(n) => {
                let n = n.min(samples.len());
                let peak = samples[..n].iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
                tracing::debug!(samples = n, peak, "captured chunk");

                let chunk = encoder.encode(&samples[..n]);
                stats.chunks_emitted.fetch_add(1, Ordering::Relaxed);
                stats.samples_delivered.fetch_add(n as u64, Ordering::Relaxed);
                sink.on_chunk(chunk);

                // Zero the consumed portion so a later short read cannot
                // leak stale samples.
                samples[..n].fill(0);
            }
            ReadOutcome::Transient(code) => {
                stats.read_anomalies.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(code, "capture read returned no data, continuing");
            }
            ReadOutcome::Fatal(fault) => {
                stats.fatal_reads.fetch_add(1, Ordering::Relaxed);
                tracing::error!(?fault, "fatal capture read error, terminating loop");
                break;
            }
        }
    }

    tracing::info!("capture loop ended");
}
