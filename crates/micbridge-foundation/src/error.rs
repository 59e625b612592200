use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Routing subsystem error: {0}")]
    Route(#[from] RouteError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Microphone permission not granted")]
    PermissionDenied,

    #[error("No viable buffer size for {sample_rate_hz} Hz mono 16-bit PCM")]
    UnsupportedConfig { sample_rate_hz: u32 },

    #[error("No capture source could be initialized")]
    AllSourcesFailed,

    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Default stream config error: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Supported stream configs error: {0}")]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Route reconciler is not running")]
    ReconcilerGone,

    #[error("Timed out waiting for the route report")]
    ReportTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_error_display_names_the_rate() {
        let err = AudioError::UnsupportedConfig {
            sample_rate_hz: 24_000,
        };
        assert!(err.to_string().contains("24000"));
    }

    #[test]
    fn app_error_wraps_audio_error() {
        let err: AppError = AudioError::PermissionDenied.into();
        assert!(matches!(err, AppError::Audio(AudioError::PermissionDenied)));
    }

    #[test]
    fn app_error_wraps_route_error() {
        let err: AppError = RouteError::ReportTimeout.into();
        assert!(matches!(err, AppError::Route(RouteError::ReportTimeout)));
    }
}
