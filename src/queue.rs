//! Packet and PCM FIFOs used by the pipeline.

use std::collections::VecDeque;

use symphonia::core::formats::Packet;

use crate::config::BYTES_PER_SAMPLE;

/// FIFO of raw container packets for one lane.
///
/// Only the decode thread touches packet queues, so they carry no
/// synchronization. Remaining packets are dropped wholesale when the decode
/// thread releases its state.
#[derive(Default)]
pub(crate) struct PacketQueue {
    packets: VecDeque<Packet>,
}

impl PacketQueue {
    pub fn enqueue(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    pub fn dequeue(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// Drop everything still queued.
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

/// A run of decoded audio in the playback format.
///
/// `data` holds interleaved stereo s16 native-endian bytes; `start` is the
/// source time of the first sample, which is what the skip policy cuts on.
pub(crate) struct PcmChunk {
    pub start: f64,
    pub data: Vec<u8>,
}

impl PcmChunk {
    pub fn from_samples(start: f64, samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            data.extend_from_slice(&s.to_ne_bytes());
        }
        Self { start, data }
    }

    /// Frame-samples in the chunk (one sample on each channel).
    pub fn samples(&self) -> u64 {
        (self.data.len() / BYTES_PER_SAMPLE) as u64
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Source time just past the last sample.
    pub fn end(&self, rate: u32) -> f64 {
        self.start + self.samples() as f64 / rate as f64
    }

    /// Drop `frames` samples off the tail.
    pub fn truncate_samples(&mut self, frames: u64) {
        let keep = self.byte_len() - (frames as usize * BYTES_PER_SAMPLE).min(self.byte_len());
        self.data.truncate(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_come_out_in_order_and_clear_drops_the_rest() {
        let mut q = PacketQueue::default();
        q.enqueue(Packet::new_from_slice(0, 1, 1, &[0u8]));
        q.enqueue(Packet::new_from_slice(0, 2, 1, &[0u8]));
        assert_eq!(q.dequeue().map(|p| p.ts()), Some(1));

        q.clear();
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn chunk_accounts_samples_and_time() {
        // Four stereo frames at 4 bytes each.
        let samples = [0i16; 8];
        let chunk = PcmChunk::from_samples(1.0, &samples);

        assert_eq!(chunk.samples(), 4);
        assert_eq!(chunk.byte_len(), 16);
        assert!((chunk.end(4) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn chunk_truncates_from_the_tail() {
        let samples = [7i16; 8];
        let mut chunk = PcmChunk::from_samples(0.0, &samples);

        chunk.truncate_samples(1);
        assert_eq!(chunk.samples(), 3);

        chunk.truncate_samples(100);
        assert_eq!(chunk.samples(), 0);
    }
}
