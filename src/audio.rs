//! The audio half of the decode loop.
//!
//! Drains audio packets until the PCM queue holds the target fill, pushing
//! each decoded buffer through the output converter and placing the results
//! according to the skip policy. Placement is the only code here that takes
//! the pipeline lock.

use anyhow::Result;
use symphonia::core::codecs::Decoder;
use symphonia::core::formats::Track;
use tracing::{debug, warn};

use crate::config::BYTES_PER_SAMPLE;
use crate::decode;
use crate::demux::{Demuxer, Lane};
use crate::queue::PcmChunk;
use crate::resample::OutputConverter;
use crate::state::Shared;

/// Where a converted chunk goes relative to the leading skip.
#[derive(Debug, PartialEq)]
enum Placement {
    /// At or past the skip point: queue the whole chunk.
    Enqueue,
    /// Entirely before the skip point.
    Drop,
    /// Straddles the skip point: consumption begins `index` bytes in.
    Straddle { index: usize },
}

fn classify(chunk: &PcmChunk, skip: f64, rate: u32) -> Placement {
    let start = chunk.start;
    if start >= skip {
        return Placement::Enqueue;
    }
    if chunk.end(rate) <= skip {
        return Placement::Drop;
    }
    let index = BYTES_PER_SAMPLE * ((skip - start) * rate as f64).floor() as usize;
    if index >= chunk.byte_len() {
        // Float rounding put the cut at the very end; nothing left to play.
        return Placement::Drop;
    }
    Placement::Straddle { index }
}

pub(crate) struct AudioStage {
    decoder: Box<dyn Decoder>,
    converter: OutputConverter,
    out_rate: u32,
    skip: f64,
    target_samples: u64,
}

impl AudioStage {
    pub fn new(track: &Track, out_rate: u32, skip: f64, target_seconds: u32) -> Result<Self> {
        let decoder = decode::make_decoder_for_track(track)?;
        Ok(Self {
            decoder,
            converter: OutputConverter::new(out_rate),
            out_rate,
            skip,
            target_samples: target_seconds as u64 * out_rate as u64,
        })
    }

    /// Discard codec state after the pre-start seek.
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Produce until the queue holds the target fill, the stream ends, or
    /// teardown is requested.
    pub fn fill(&mut self, demux: &mut Demuxer, shared: &Shared) {
        loop {
            {
                let st = shared.lock();
                if st.quit || st.audio_finished {
                    return;
                }
                if st.queue_samples >= self.target_samples {
                    return;
                }
            }

            let Some(packet) = demux.read_packet(Lane::Audio) else {
                // End of stream: drain the converter tail (the equivalent of
                // flushing codec-internal buffers), then retire the lane.
                match self.converter.flush() {
                    Ok(chunks) => {
                        for chunk in chunks {
                            self.place(chunk, shared);
                        }
                    }
                    Err(e) => warn!(error = %e, "flush failed at end of stream"),
                }
                debug!("audio stream finished");
                shared.latch_audio_finished();
                return;
            };

            let start = demux.packet_seconds(Lane::Audio, &packet);
            let mut chunks = Vec::new();
            let Self {
                decoder, converter, ..
            } = self;

            let outcome = decode::decode_packet_and_then(decoder, &packet, |buf| {
                match converter.push(start, buf) {
                    Ok(out) => chunks = out,
                    // A frame the converter cannot handle is dropped alone;
                    // the stream keeps going.
                    Err(e) => warn!(error = %e, "dropping unconvertible frame"),
                }
                Ok(())
            });

            match outcome {
                Ok(_) => {
                    for chunk in chunks {
                        self.place(chunk, shared);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "audio decode failed, retiring stream");
                    shared.latch_audio_finished();
                    return;
                }
            }
        }
    }

    /// Queue a converted chunk, honoring the leading skip.
    ///
    /// Nothing is placed after teardown, and nothing after the lane has been
    /// retired (the consumer latches `audio_finished` itself when its end
    /// bound runs out; chunks still in flight at that point are dropped).
    /// The end-of-stream flush is safe against the second check because it
    /// places its chunks before the flag goes up.
    fn place(&self, chunk: PcmChunk, shared: &Shared) {
        let placement = classify(&chunk, self.skip, self.out_rate);
        let mut st = shared.lock();
        if st.quit || st.audio_finished {
            return;
        }
        match placement {
            Placement::Enqueue => {
                st.queue_samples += chunk.samples();
                st.queue.push_back(chunk);
            }
            Placement::Drop => {}
            Placement::Straddle { index } => {
                st.queue_samples += chunk.samples() - (index / BYTES_PER_SAMPLE) as u64;
                st.out_chunk = Some(chunk);
                st.out_index = index;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: f64, frames: usize) -> PcmChunk {
        PcmChunk::from_samples(start, &vec![0i16; frames * 2])
    }

    #[test]
    fn chunk_past_the_skip_point_is_queued() {
        assert_eq!(classify(&chunk(2.0, 100), 2.0, 100), Placement::Enqueue);
        assert_eq!(classify(&chunk(3.0, 100), 2.0, 100), Placement::Enqueue);
    }

    #[test]
    fn chunk_before_the_skip_point_is_dropped() {
        // One second of frames at rate 100, ending exactly at the skip point.
        assert_eq!(classify(&chunk(1.0, 100), 2.0, 100), Placement::Drop);
        assert_eq!(classify(&chunk(0.0, 100), 2.0, 100), Placement::Drop);
    }

    #[test]
    fn straddling_chunk_is_cut_at_the_skip_point() {
        // Frames cover [1.5, 2.5) at rate 100; skip 2.0 lands 50 frames in.
        let placement = classify(&chunk(1.5, 100), 2.0, 100);
        assert_eq!(
            placement,
            Placement::Straddle {
                index: 50 * BYTES_PER_SAMPLE
            }
        );
    }

    #[test]
    fn cut_landing_on_the_last_sample_stays_in_bounds() {
        // Skip falls within the final sample; the cut index must stay below
        // the chunk length or be treated as a drop.
        let c = chunk(0.0, 10);
        match classify(&c, 0.0999, 100) {
            Placement::Straddle { index } => assert!(index < c.byte_len()),
            Placement::Drop => {}
            other => panic!("unexpected placement {other:?}"),
        }
    }
}
