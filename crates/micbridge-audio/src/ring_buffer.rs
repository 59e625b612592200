//! Lock-free sample ring between the stream callback and the blocking
//! reader. rtrb is wait-free on both ends, which keeps the audio callback
//! allocation- and lock-free.

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

pub struct SampleRing {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl SampleRing {
    pub fn with_capacity(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    pub fn split(self) -> (SampleWriter, SampleReader) {
        (
            SampleWriter {
                producer: self.producer,
            },
            SampleReader {
                consumer: self.consumer,
            },
        )
    }
}

/// Callback-side half. Never blocks; samples that do not fit are dropped.
pub struct SampleWriter {
    producer: Producer<i16>,
}

impl SampleWriter {
    /// Push samples from the stream callback, returning how many were
    /// accepted. Overflow drops the excess with a warning rather than
    /// stalling the callback.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let take = samples.len().min(self.producer.slots());
        if take < samples.len() {
            warn!(
                dropped = samples.len() - take,
                "sample ring full, dropping samples"
            );
        }
        if take == 0 {
            return 0;
        }

        let mut chunk = match self.producer.write_chunk(take) {
            Ok(chunk) => chunk,
            Err(_) => return 0,
        };
        // The write may wrap; fill both slices.
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        second.copy_from_slice(&samples[split..take]);
        chunk.commit_all();
        take
    }
}

/// Reader-side half, polled by the capture device's blocking read.
pub struct SampleReader {
    consumer: Consumer<i16>,
}

impl SampleReader {
    /// Pop up to `buf.len()` samples, returning how many were read.
    pub fn pop(&mut self, buf: &mut [i16]) -> usize {
        let want = buf.len().min(self.consumer.slots());
        if want == 0 {
            return 0;
        }

        let chunk = match self.consumer.read_chunk(want) {
            Ok(chunk) => chunk,
            Err(_) => return 0,
        };
        let (first, second) = chunk.as_slices();
        let split = first.len();
        buf[..split].copy_from_slice(first);
        buf[split..split + second.len()].copy_from_slice(second);
        chunk.commit_all();
        want
    }

    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}
