//! PCM chunk encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// A transport-ready audio chunk. Produced once per read cycle and never
/// retained; the raw samples are consumed by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AudioChunk {
    /// Base64 (standard alphabet, no line wrapping) of the samples packed
    /// as little-endian byte pairs.
    pub payload: String,
    pub sample_count: u32,
    /// Monotonically increasing within a session.
    pub seq: u64,
}

/// Packs 16-bit samples into little-endian bytes and base64-encodes them.
/// The transform itself is stateless and deterministic; the encoder only
/// carries the session's sequence counter.
#[derive(Debug, Default)]
pub struct ChunkEncoder {
    seq: u64,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, samples: &[i16]) -> AudioChunk {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let chunk = AudioChunk {
            payload: STANDARD.encode(&bytes),
            sample_count: samples.len() as u32,
            seq: self.seq,
        };
        self.seq += 1;
        chunk
    }
}

/// Decode a chunk payload back into samples. The inverse of
/// [`ChunkEncoder::encode`]; used by tests and consumers that need the
/// raw PCM back.
pub fn decode_payload(payload: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let bytes = STANDARD.decode(payload)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_samples() {
        let samples = vec![0i16, 1, -1, 1000, -1000, i16::MAX, i16::MIN];
        let mut encoder = ChunkEncoder::new();
        let chunk = encoder.encode(&samples);
        assert_eq!(decode_payload(&chunk.payload).unwrap(), samples);
        assert_eq!(chunk.sample_count, samples.len() as u32);
    }

    #[test]
    fn round_trip_empty_sequence() {
        let mut encoder = ChunkEncoder::new();
        let chunk = encoder.encode(&[]);
        assert_eq!(chunk.payload, "");
        assert_eq!(chunk.sample_count, 0);
        assert_eq!(decode_payload(&chunk.payload).unwrap(), Vec::<i16>::new());
    }

    #[test]
    fn round_trip_all_zero_sequence() {
        let samples = vec![0i16; 512];
        let mut encoder = ChunkEncoder::new();
        let chunk = encoder.encode(&samples);
        assert_eq!(decode_payload(&chunk.payload).unwrap(), samples);
    }

    #[test]
    fn encoding_is_deterministic() {
        let samples: Vec<i16> = (0..256).map(|i| (i * 37) as i16).collect();
        let a = ChunkEncoder::new().encode(&samples);
        let b = ChunkEncoder::new().encode(&samples);
        assert_eq!(a.payload, b.payload);
    }

    #[test]
    fn payload_has_no_line_wraps() {
        // 3072 samples -> 6144 bytes -> 8192 base64 chars, well past any
        // 64/76-column wrapping boundary.
        let samples = vec![0x1234i16; 3072];
        let chunk = ChunkEncoder::new().encode(&samples);
        assert!(!chunk.payload.contains('\n'));
        assert!(!chunk.payload.contains('\r'));
    }

    #[test]
    fn little_endian_byte_order() {
        let chunk = ChunkEncoder::new().encode(&[0x0102i16]);
        let bytes = STANDARD.decode(&chunk.payload).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn sequence_numbers_increase() {
        let mut encoder = ChunkEncoder::new();
        let a = encoder.encode(&[1, 2, 3]);
        let b = encoder.encode(&[4, 5, 6]);
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
    }
}
