//! Source acquisition with ordered fallback.

use micbridge_foundation::AudioError;

use crate::backend::{CaptureDevice, RecorderBackend, SOURCE_CANDIDATES};

/// Try each candidate source in priority order and return the first
/// device that initializes. A handle that fails mid-open is released by
/// the backend before the next candidate is tried, so exhaustion leaves
/// nothing live behind.
pub fn acquire(
    backend: &dyn RecorderBackend,
    sample_rate_hz: u32,
    buffer_len: u32,
) -> Result<Box<dyn CaptureDevice>, AudioError> {
    for source in SOURCE_CANDIDATES {
        tracing::debug!(%source, "trying capture source");
        match backend.open(source, sample_rate_hz, buffer_len) {
            Ok(device) => {
                tracing::info!(%source, "capture source initialized");
                return Ok(device);
            }
            Err(e) => {
                tracing::warn!(%source, error = %e, "capture source failed to initialize");
            }
        }
    }
    Err(AudioError::AllSourcesFailed)
}
