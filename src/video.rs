//! The video half of the decode loop, and the surface registration API.
//!
//! Symphonia registers no video decoders, so this lane exists to keep the
//! router's video queue from growing while the audio path runs: packets are
//! drained, their timestamps traced, and the payloads dropped. The trace
//! point is where a future surface-delivery path would hand frames out.

use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::demux::{Demuxer, Lane};
use crate::state::Shared;

pub(crate) struct VideoStage;

impl VideoStage {
    /// Drop everything queued on the video lane.
    ///
    /// While audio is still decoding, only already-routed packets are taken;
    /// once the audio lane has finished, the container is read directly so
    /// the video lane can still reach its own end of stream.
    pub fn drain(&mut self, demux: &mut Demuxer, shared: &Shared, pull_container: bool) {
        loop {
            let packet = if pull_container {
                demux.read_packet(Lane::Video)
            } else {
                demux.take_queued(Lane::Video)
            };

            let Some(packet) = packet else {
                if demux.at_eof() {
                    shared.latch_video_finished();
                }
                return;
            };

            let pts = demux.packet_seconds(Lane::Video, &packet);
            trace!(pts, "discarding video packet");
        }
    }
}

/// Pixel-format reference for future video frame delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

static SAMPLE_SURFACES: Mutex<Option<(SurfaceSpec, SurfaceSpec)>> = Mutex::new(None);

/// Register reference surfaces for video output.
///
/// Accepted and stored for a future surface-delivery path; the current
/// pipeline decodes and discards video, so these are otherwise unused.
pub fn set_sample_surfaces(rgb: SurfaceSpec, rgba: SurfaceSpec) {
    *SAMPLE_SURFACES
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some((rgb, rgba));
}

/// The registered reference surfaces, if any.
pub fn sample_surfaces() -> Option<(SurfaceSpec, SurfaceSpec)> {
    *SAMPLE_SURFACES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_are_stored_for_later() {
        let rgb = SurfaceSpec {
            width: 640,
            height: 480,
            bytes_per_pixel: 3,
        };
        let rgba = SurfaceSpec {
            width: 640,
            height: 480,
            bytes_per_pixel: 4,
        };
        set_sample_surfaces(rgb, rgba);
        assert_eq!(sample_surfaces(), Some((rgb, rgba)));
    }
}
