//! Hardware seam for the capture engine.
//!
//! Everything above this module talks to the audio hardware through these
//! traits; the cpal implementation lives in [`crate::device`] and tests
//! substitute scripted fakes.

use std::fmt;

use micbridge_foundation::AudioError;

/// Capture sources probed in priority order. Heterogeneous hardware
/// exposes voice-optimized and generic microphone inputs inconsistently,
/// so the negotiator walks this list instead of trusting any single
/// source to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    VoiceRecognition,
    Mic,
    Default,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::VoiceRecognition => write!(f, "voice_recognition"),
            SourceKind::Mic => write!(f, "mic"),
            SourceKind::Default => write!(f, "default"),
        }
    }
}

/// Fixed probe order.
pub const SOURCE_CANDIDATES: [SourceKind; 3] = [
    SourceKind::VoiceRecognition,
    SourceKind::Mic,
    SourceKind::Default,
];

/// Outcome of one blocking read from a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` samples were written into the front of the buffer.
    Data(usize),
    /// Nothing arrived this cycle; the loop logs and carries on.
    Transient(i32),
    /// The device is unusable; the capture loop must terminate.
    Fatal(ReadFault),
}

/// Unrecoverable read error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    InvalidOperation,
    BadValue,
}

pub trait RecorderBackend: Send + Sync {
    /// Minimum viable buffer length in bytes for mono 16-bit PCM at the
    /// given rate, as reported by the platform. Fails when the platform
    /// cannot answer for this rate/format combination.
    fn min_buffer_len(&self, sample_rate_hz: u32) -> Result<u32, AudioError>;

    /// Open a capture device on the given source. Returns an initialized
    /// handle, or an error with every partially-constructed resource
    /// already released.
    fn open(
        &self,
        source: SourceKind,
        sample_rate_hz: u32,
        buffer_len: u32,
    ) -> Result<Box<dyn CaptureDevice>, AudioError>;
}

/// An initialized capture device. Dropping the handle releases it.
pub trait CaptureDevice {
    fn source(&self) -> SourceKind;

    /// Begin recording. Must be called once before `read`.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Blocking read of up to `buf.len()` samples.
    fn read(&mut self, buf: &mut [i16]) -> ReadOutcome;

    /// Stop recording and release the underlying stream. Idempotent.
    fn stop(&mut self);
}

/// Yields the "microphone access granted" fact. The acquisition UI/flow
/// behind it belongs to the host, not to this crate.
pub trait PermissionGate: Send + Sync {
    fn microphone_granted(&self) -> bool;
}

/// Hosts without a runtime microphone permission model (desktop Linux and
/// friends) grant access at the OS level before the process starts.
pub struct HostPermissions;

impl PermissionGate for HostPermissions {
    fn microphone_granted(&self) -> bool {
        true
    }
}
