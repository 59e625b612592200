//! Buffer sizing policy.

use micbridge_foundation::AudioError;

use crate::backend::RecorderBackend;

/// Medium size class, in bytes. Doubles as the classification threshold.
pub const BUFFER_LEN_MEDIUM: u32 = 2048;
/// Large size class, chosen when the platform minimum exceeds the medium
/// threshold.
pub const BUFFER_LEN_LARGE: u32 = 4096;

/// Resolve the capture buffer length for `sample_rate_hz`.
///
/// The platform-reported minimum is classified into one of two fixed
/// tiers rather than passed through: minima above the medium threshold
/// get the large class, everything else (the threshold itself included)
/// the medium class.
pub fn resolve_buffer_len(
    backend: &dyn RecorderBackend,
    sample_rate_hz: u32,
) -> Result<u32, AudioError> {
    let min = backend.min_buffer_len(sample_rate_hz)?;
    let resolved = if min > BUFFER_LEN_MEDIUM {
        BUFFER_LEN_LARGE
    } else {
        BUFFER_LEN_MEDIUM
    };
    tracing::debug!(min_buffer_len = min, resolved, "resolved capture buffer length");
    Ok(resolved)
}
