//! Codec-level helpers built on top of Symphonia.
//!
//! This module isolates decoder construction and the per-packet error model
//! so the audio stage can focus on queueing and the skip policy.

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{Packet, Track};

/// Create a decoder for the selected audio track using the default registry.
pub(crate) fn make_decoder_for_track(track: &Track) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!(e))
        .context("failed to create decoder for audio track")
}

/// Decode a packet and hand the decoded buffer to a callback.
///
/// Return value semantics:
/// - `Ok(true)`  → a decoded buffer was produced and `on_decoded` ran
/// - `Ok(false)` → the codec consumed the packet without producing output
/// - `Err(_)`    → decoder failure; the caller retires the stream
///
/// A truncated read inside the codec (`IoError`) is treated as an empty
/// decode rather than a failure, which keeps a damaged tail from cutting off
/// audio that is already queued.
pub(crate) fn decode_packet_and_then(
    decoder: &mut Box<dyn Decoder>,
    packet: &Packet,
    mut on_decoded: impl FnMut(AudioBufferRef<'_>) -> Result<()>,
) -> Result<bool> {
    match decoder.decode(packet) {
        Ok(buf) => {
            on_decoded(buf)?;
            Ok(true)
        }

        Err(SymphoniaError::IoError(_)) => Ok(false),

        Err(e) => Err(anyhow!(e)).context("decoder failure"),
    }
}
