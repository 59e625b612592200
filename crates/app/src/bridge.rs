//! Command facade and outbound event stream.
//!
//! Commands come in as method calls and return typed payloads echoing the
//! effective configuration; everything flowing the other way (chunks,
//! route logs, mic-key events) is funneled through one bounded event
//! channel. The channel is small on purpose: a slow consumer blocks the
//! capture thread at the sink instead of growing a queue.

use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::Serialize;

use micbridge_audio::{AudioChunk, CaptureController, ChunkSink, SessionInfo, SourceKind};
use micbridge_foundation::AppError;
use micbridge_routing::{RouteReport, RouterController};

use crate::keys::KeyKind;

/// Events pushed to the host.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    #[serde(rename_all = "camelCase")]
    AudioChunk { payload: String, sample_count: u32 },
    RouterLog { message: String },
    MicKey {
        #[serde(rename = "type")]
        kind: KeyKind,
    },
}

/// Chunk sink that forwards onto the bridge event channel.
pub struct EventSink {
    tx: Sender<BridgeEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<BridgeEvent>) -> Self {
        Self { tx }
    }
}

impl ChunkSink for EventSink {
    fn on_chunk(&self, chunk: AudioChunk) {
        let _ = self.tx.send(BridgeEvent::AudioChunk {
            payload: chunk.payload,
            sample_count: chunk.sample_count,
        });
    }
}

/// Success payload of `start`, echoing the configuration actually in use.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub success: bool,
    pub sample_rate_hz: u32,
    pub buffer_len: u32,
    pub source: SourceKind,
}

impl From<SessionInfo> for StartPayload {
    fn from(info: SessionInfo) -> Self {
        Self {
            success: true,
            sample_rate_hz: info.sample_rate_hz,
            buffer_len: info.buffer_len,
            source: info.source,
        }
    }
}

/// Command facade over both subsystems.
pub struct Bridge {
    capture: Arc<CaptureController>,
    router: RouterController,
}

impl Bridge {
    pub fn new(capture: Arc<CaptureController>, router: RouterController) -> Self {
        Self { capture, router }
    }

    pub fn start(&self, sample_rate_hz: Option<u32>) -> Result<StartPayload, AppError> {
        let info = self.capture.start(sample_rate_hz)?;
        Ok(info.into())
    }

    pub fn stop(&self) {
        self.capture.stop();
    }

    pub fn enable_route(&self) -> Result<RouteReport, AppError> {
        Ok(self.router.enable()?)
    }

    pub fn disable_route(&self) {
        self.router.disable();
    }

    /// Host teardown: the same cleanup paths as `stop` and
    /// `disable_route`, in that order.
    pub fn teardown(&self) {
        self.capture.stop();
        self.router.disable();
    }
}
