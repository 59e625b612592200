pub mod backend;
pub mod capture;
pub mod device;
pub mod encoder;
pub mod negotiate;
pub mod probe;
pub mod ring_buffer;

// Public API
pub use backend::{
    CaptureDevice, HostPermissions, PermissionGate, ReadFault, ReadOutcome, RecorderBackend,
    SourceKind, SOURCE_CANDIDATES,
};
pub use capture::{
    CaptureController, CaptureState, CaptureStats, ChunkSink, SessionInfo, DEFAULT_SAMPLE_RATE_HZ,
};
pub use device::CpalRecorder;
pub use encoder::{decode_payload, AudioChunk, ChunkEncoder};
pub use probe::{resolve_buffer_len, BUFFER_LEN_LARGE, BUFFER_LEN_MEDIUM};
pub use ring_buffer::SampleRing;
