//! Container probing and packet routing.
//!
//! Responsibilities:
//! - probe the byte source and select the first audio and first video track
//! - read container packets and route them onto per-lane queues
//! - answer time and duration questions for the selected tracks
//! - perform the one backward seek issued before playback starts
//!
//! The demuxer is owned by the decode thread; nothing here is synchronized.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo, Track};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

use crate::queue::PacketQueue;
use crate::source::{ByteSource, STREAM_BUFFER_LEN, SourceStream};

/// Which per-stream queue a packet belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Lane {
    Audio,
    Video,
}

pub(crate) struct Demuxer {
    format: Box<dyn FormatReader>,
    audio_track: Option<u32>,
    video_track: Option<u32>,
    audio_queue: PacketQueue,
    video_queue: PacketQueue,
    /// Once the audio lane is retired its packets are dropped instead of
    /// queued, so a still-draining video lane cannot grow the audio queue.
    audio_abandoned: bool,
    eof: bool,
}

impl Demuxer {
    /// Probe the container over the caller's byte source and pick streams.
    ///
    /// Track selection policy:
    /// - audio: the first track with a decodable codec and a known sample
    ///   rate (required for resampling decisions downstream);
    /// - video: the first remaining track without a sample rate. Symphonia
    ///   registers no video decoders, so such tracks exist only to be
    ///   drained.
    ///
    /// `label` doubles as a container-format hint when it carries an
    /// extension, which improves probe accuracy for ambiguous layouts.
    pub fn open(source: Box<dyn ByteSource>, label: &str) -> Result<Self> {
        let stream = SourceStream::new(source);
        let mss = MediaSourceStream::new(
            Box::new(stream),
            MediaSourceStreamOptions {
                buffer_len: STREAM_BUFFER_LEN,
            },
        );

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(label).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| anyhow!(e))
            .context("failed to probe media stream")?;

        let format = probed.format;

        let audio_track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
            .map(|t| t.id);

        let video_track = format
            .tracks()
            .iter()
            .find(|t| Some(t.id) != audio_track && t.codec_params.sample_rate.is_none())
            .map(|t| t.id);

        debug!(?audio_track, ?video_track, label, "selected streams");

        Ok(Self {
            format,
            audio_track,
            video_track,
            audio_queue: PacketQueue::default(),
            video_queue: PacketQueue::default(),
            audio_abandoned: false,
            eof: false,
        })
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.track_by_id(self.audio_track?)
    }

    pub fn has_video(&self) -> bool {
        self.video_track.is_some()
    }

    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// Stop queueing audio packets; the audio lane will consume no more.
    /// Anything it already queued is dropped too.
    pub fn abandon_audio(&mut self) {
        self.audio_abandoned = true;
        self.audio_queue.clear();
    }

    /// Deliver one packet belonging to `lane`.
    ///
    /// Packets for the other lane encountered along the way are queued, not
    /// dropped; the container bounds inter-stream skew, not us. `None` is
    /// the end-of-stream sentinel.
    pub fn read_packet(&mut self, lane: Lane) -> Option<Packet> {
        loop {
            if let Some(packet) = self.queue_mut(lane).dequeue() {
                return Some(packet);
            }

            if self.eof {
                return None;
            }

            match self.format.next_packet() {
                Ok(packet) => self.route(packet),
                // Symphonia reports a clean end of stream as an IO error.
                Err(SymphoniaError::IoError(_)) => {
                    self.eof = true;
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "demux failure, treating as end of stream");
                    self.eof = true;
                    return None;
                }
            }
        }
    }

    /// Dequeue from `lane` without touching the container.
    pub fn take_queued(&mut self, lane: Lane) -> Option<Packet> {
        self.queue_mut(lane).dequeue()
    }

    /// Source time of a packet's first sample, in seconds.
    pub fn packet_seconds(&self, lane: Lane, packet: &Packet) -> f64 {
        let id = match lane {
            Lane::Audio => self.audio_track,
            Lane::Video => self.video_track,
        };
        let Some(track) = id.and_then(|i| self.track_by_id(i)) else {
            return 0.0;
        };

        let params = &track.codec_params;
        if let Some(tb) = params.time_base {
            let time = tb.calc_time(packet.ts());
            time.seconds as f64 + time.frac
        } else if let Some(rate) = params.sample_rate {
            packet.ts() as f64 / rate as f64
        } else {
            0.0
        }
    }

    /// Exact stream duration converted to output samples, when the container
    /// reports one. Estimated durations surface as `None`.
    pub fn duration_samples(&self, out_rate: u32) -> Option<u64> {
        let params = &self.audio_track()?.codec_params;
        let frames = params.n_frames?;
        let rate = params.sample_rate?;
        Some(frames.saturating_mul(out_rate as u64) / rate as u64)
    }

    /// Backward seek to `secs`, issued once before the decode loop starts.
    pub fn seek_to(&mut self, secs: f64) -> Result<()> {
        self.format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time: Time::from(secs),
                    track_id: self.audio_track,
                },
            )
            .map_err(|e| anyhow!(e))
            .context("seek before start failed")?;
        Ok(())
    }

    fn track_by_id(&self, id: u32) -> Option<&Track> {
        self.format.tracks().iter().find(|t| t.id == id)
    }

    fn queue_mut(&mut self, lane: Lane) -> &mut PacketQueue {
        match lane {
            Lane::Audio => &mut self.audio_queue,
            Lane::Video => &mut self.video_queue,
        }
    }

    fn route(&mut self, packet: Packet) {
        if Some(packet.track_id()) == self.audio_track {
            if !self.audio_abandoned {
                self.audio_queue.enqueue(packet);
            }
        } else if Some(packet.track_id()) == self.video_track {
            self.video_queue.enqueue(packet);
        }
        // Packets of unselected tracks are dropped.
    }
}
