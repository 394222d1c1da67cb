//! `undertone`: background media decoding for real-time audio playback.
//!
//! This crate pulls a container stream (audio + video) from a caller-supplied
//! random-access byte source, decodes the audio into a fixed playback format
//! (interleaved stereo s16 at a configured rate), and serves it to an audio
//! device callback on demand.
//!
//! The shape of the pipeline:
//! - a dedicated decode thread demuxes, decodes and resamples, keeping a few
//!   seconds of PCM queued ahead of the consumer;
//! - the consumer side ([`Media::read_audio`]) never blocks on decode
//!   progress, only on initial stream discovery, so it is safe to call from
//!   a low-latency audio callback;
//! - [`Media::close`] may be called at any moment; the decode thread owns
//!   all stream resources and releases them on its way out.
//!
//! Video streams are demuxed and drained so they cannot stall the audio
//! path, but no frames are delivered anywhere yet.
//!
//! ```no_run
//! use std::fs::File;
//!
//! undertone::init(44_100, false);
//!
//! let file = File::open("intro.ogg").unwrap();
//! let mut media = undertone::Media::open(file, "intro.ogg");
//! media.set_range(0.5, 0.0).unwrap(); // skip the first half second
//! media.start().unwrap();
//!
//! // From the audio device callback:
//! let mut buf = [0u8; 4096];
//! let n = media.read_audio(&mut buf);
//! buf[n..].fill(0); // the device zero-fills any shortfall
//! ```

// Consumer-facing surface.
pub mod error;
pub mod media;
pub mod source;

// Surface registration for the (future) video path.
pub mod video;

// Logging configuration and control.
pub mod logging;

// The decode pipeline, owned by the decode thread.
mod audio;
mod config;
mod decode;
mod demux;
mod queue;
mod resample;
mod state;
mod worker;

pub use config::{BYTES_PER_CHANNEL, BYTES_PER_SAMPLE, CHANNELS};
pub use error::{Error, Result};
pub use media::Media;
pub use source::ByteSource;
pub use video::{SurfaceSpec, set_sample_surfaces};

/// Process-wide playback configuration.
///
/// Registers the output sample rate all audio is converted to (captured by
/// each [`Media::open`] call) and initializes logging; `verbose` raises the
/// default log level so stream selection and decode lifecycle events show
/// up.
pub fn init(rate: u32, verbose: bool) {
    config::register_output_rate(rate);
    logging::init(verbose);
}
