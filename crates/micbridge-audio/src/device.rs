//! cpal-backed recorder.
//!
//! The stream callback feeds a lock-free sample ring; the blocking `read`
//! side drains it in bounded slices so the capture loop keeps observing
//! its stop flag even when the host goes quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig, SupportedBufferSize};

use crate::backend::{CaptureDevice, ReadFault, ReadOutcome, RecorderBackend, SourceKind};
use crate::ring_buffer::{SampleReader, SampleRing, SampleWriter};
use micbridge_foundation::AudioError;

// Name fragments used to map a capture source onto host input devices.
const VOICE_PATTERNS: &[&str] = &["voice", "comm", "echo-cancel"];
const MIC_PATTERNS: &[&str] = &["mic", "capture", "front:"];

// A blocking read waits in these slices, up to the max, before reporting
// an empty cycle. Bounded so the stop flag stays observable.
const READ_WAIT_SLICE: Duration = Duration::from_millis(5);
const READ_WAIT_MAX: Duration = Duration::from_millis(200);

pub struct CpalRecorder;

impl Default for CpalRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalRecorder {
    pub fn new() -> Self {
        Self
    }

    fn pick_device(&self, host: &cpal::Host, source: SourceKind) -> Result<cpal::Device, AudioError> {
        match source {
            SourceKind::Default => host
                .default_input_device()
                .ok_or(AudioError::DeviceNotFound { name: None }),
            SourceKind::VoiceRecognition => find_by_patterns(host, VOICE_PATTERNS),
            SourceKind::Mic => find_by_patterns(host, MIC_PATTERNS),
        }
    }
}

fn find_by_patterns(host: &cpal::Host, patterns: &[&str]) -> Result<cpal::Device, AudioError> {
    if let Ok(devices) = host.input_devices() {
        for device in devices {
            if let Ok(name) = device.name() {
                let lname = name.to_lowercase();
                if patterns.iter().any(|p| lname.contains(p)) {
                    return Ok(device);
                }
            }
        }
    }
    Err(AudioError::DeviceNotFound { name: None })
}

impl RecorderBackend for CpalRecorder {
    fn min_buffer_len(&self, sample_rate_hz: u32) -> Result<u32, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::DeviceNotFound { name: None })?;

        for range in device.supported_input_configs()? {
            if range.min_sample_rate() <= sample_rate_hz
                && range.max_sample_rate() >= sample_rate_hz
            {
                return match range.buffer_size() {
                    // cpal reports frames; mono 16-bit PCM is two bytes a frame.
                    SupportedBufferSize::Range { min, .. } => Ok(min.saturating_mul(2).max(2)),
                    SupportedBufferSize::Unknown => {
                        Err(AudioError::UnsupportedConfig { sample_rate_hz })
                    }
                };
            }
        }
        Err(AudioError::UnsupportedConfig { sample_rate_hz })
    }

    fn open(
        &self,
        source: SourceKind,
        sample_rate_hz: u32,
        buffer_len: u32,
    ) -> Result<Box<dyn CaptureDevice>, AudioError> {
        let host = cpal::default_host();
        let device = self.pick_device(&host, source)?;
        if let Ok(name) = device.name() {
            tracing::info!(%source, device = %name, host = ?host.id(), "opening capture device");
        }

        let sample_format = device.default_input_config()?.sample_format();
        let config = StreamConfig {
            channels: 1,
            sample_rate: sample_rate_hz,
            buffer_size: cpal::BufferSize::Fixed(buffer_len / 2),
        };

        let (writer, reader) = SampleRing::with_capacity(buffer_len as usize * 4).split();
        let failed = Arc::new(AtomicBool::new(false));
        let stream = build_input_stream(&device, &config, sample_format, writer, &failed)?;

        Ok(Box::new(CpalCaptureDevice {
            stream: Some(stream),
            reader,
            source,
            failed,
            recording: false,
        }))
    }
}

fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    writer: SampleWriter,
    failed: &Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let failed = Arc::clone(failed);
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
        failed.store(true, Ordering::SeqCst);
    };

    let mut writer = writer;
    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &_| {
                writer.push(data);
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => {
            let mut converted: Vec<i16> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[f32], _: &_| {
                    converted.clear();
                    converted.reserve(data.len());
                    // Clamp [-1.0, 1.0] and scale to i16
                    for &s in data {
                        let clamped = s.clamp(-1.0, 1.0);
                        converted.push((clamped * 32767.0).round() as i16);
                    }
                    writer.push(&converted);
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let mut converted: Vec<i16> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[u16], _: &_| {
                    converted.clear();
                    converted.reserve(data.len());
                    // Convert unsigned [0,65535] to signed [-32768,32767]
                    for &s in data {
                        converted.push((s as i32 - 32768) as i16);
                    }
                    writer.push(&converted);
                },
                err_fn,
                None,
            )?
        }
        other => {
            return Err(AudioError::Fatal(format!(
                "sample format not supported: {other:?}"
            )));
        }
    };

    Ok(stream)
}

struct CpalCaptureDevice {
    stream: Option<Stream>,
    reader: SampleReader,
    source: SourceKind,
    failed: Arc<AtomicBool>,
    recording: bool,
}

impl CaptureDevice for CpalCaptureDevice {
    fn source(&self) -> SourceKind {
        self.source
    }

    fn start(&mut self) -> Result<(), AudioError> {
        match &self.stream {
            Some(stream) => {
                stream.play()?;
                self.recording = true;
                Ok(())
            }
            None => Err(AudioError::Fatal("stream already released".to_string())),
        }
    }

    fn read(&mut self, buf: &mut [i16]) -> ReadOutcome {
        if !self.recording {
            return ReadOutcome::Fatal(ReadFault::InvalidOperation);
        }
        if buf.is_empty() {
            return ReadOutcome::Fatal(ReadFault::BadValue);
        }

        let mut waited = Duration::ZERO;
        loop {
            if self.failed.load(Ordering::SeqCst) {
                return ReadOutcome::Fatal(ReadFault::InvalidOperation);
            }
            let n = self.reader.pop(buf);
            if n > 0 {
                return ReadOutcome::Data(n);
            }
            if waited >= READ_WAIT_MAX {
                return ReadOutcome::Transient(0);
            }
            std::thread::sleep(READ_WAIT_SLICE);
            waited += READ_WAIT_SLICE;
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.recording = false;
    }
}
