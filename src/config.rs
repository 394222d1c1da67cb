//! Process-wide playback configuration and output-format constants.
//!
//! Every stream is converted to the same playback format: interleaved stereo
//! signed 16-bit PCM at the registered output rate. The rate is registered
//! once at startup and captured by each [`Media`](crate::Media) handle when
//! it is opened.

use std::sync::atomic::{AtomicU32, Ordering};

/// Output channel count.
pub const CHANNELS: usize = 2;

/// Bytes per channel in the output format (signed 16-bit).
pub const BYTES_PER_CHANNEL: usize = 2;

/// Bytes per frame-sample in the output format (one sample on each channel).
pub const BYTES_PER_SAMPLE: usize = CHANNELS * BYTES_PER_CHANNEL;

static OUTPUT_RATE: AtomicU32 = AtomicU32::new(44_100);

/// Register the playback sample rate all audio is converted to.
pub(crate) fn register_output_rate(rate: u32) {
    if rate > 0 {
        OUTPUT_RATE.store(rate, Ordering::Relaxed);
    }
}

/// The currently registered playback sample rate.
pub(crate) fn output_rate() -> u32 {
    OUTPUT_RATE.load(Ordering::Relaxed)
}
