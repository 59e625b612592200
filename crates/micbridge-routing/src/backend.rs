//! OS audio-policy seam for SCO routing.
//!
//! The reconciler drives the platform through this trait; state-change
//! notifications flow back separately as a channel of [`ScoState`]
//! values. Starting SCO is a request, not a guarantee, which is why the
//! reconciler keeps nudging.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    Normal,
    Communication,
}

/// Actual SCO link state as reported by the OS audio subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Unknown,
}

impl fmt::Display for ScoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoState::Disconnected => "DISCONNECTED",
            ScoState::Connecting => "CONNECTING",
            ScoState::Connected => "CONNECTED",
            ScoState::Error => "ERROR",
            ScoState::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

pub trait RouteBackend: Send + Sync {
    fn set_mode(&self, mode: AudioMode);
    fn mode(&self) -> AudioMode;

    /// Ask the platform to bring the SCO link up. A request, not a
    /// guarantee.
    fn start_sco(&self);
    fn stop_sco(&self);

    fn set_sco_on(&self, on: bool);
    fn is_sco_on(&self) -> bool;

    /// Whether this hardware supports SCO off-call at all.
    fn is_sco_available(&self) -> bool;
}

/// Backend for hosts whose OS owns Bluetooth routing entirely (typical
/// desktops). Tracks the requested mode and flag in-memory and reports
/// SCO as unavailable, which surfaces through the enable report rather
/// than as an error.
pub struct NoopRouteBackend {
    mode: Mutex<AudioMode>,
    sco_on: AtomicBool,
}

impl Default for NoopRouteBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NoopRouteBackend {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(AudioMode::Normal),
            sco_on: AtomicBool::new(false),
        }
    }
}

impl RouteBackend for NoopRouteBackend {
    fn set_mode(&self, mode: AudioMode) {
        *self.mode.lock() = mode;
    }

    fn mode(&self) -> AudioMode {
        *self.mode.lock()
    }

    fn start_sco(&self) {
        tracing::debug!("SCO start requested on a host without SCO control");
    }

    fn stop_sco(&self) {}

    fn set_sco_on(&self, on: bool) {
        self.sco_on.store(on, Ordering::SeqCst);
    }

    fn is_sco_on(&self) -> bool {
        self.sco_on.load(Ordering::SeqCst)
    }

    fn is_sco_available(&self) -> bool {
        false
    }
}
