//! The decode thread: setup, steady-state production, exit path.
//!
//! The thread owns everything the pipeline needs (byte source, demuxer,
//! decoder, converter) and releases it all only after the caller requests
//! teardown. Its lifecycle: initialize, produce until the queue is full,
//! sleep until the consumer signals, repeat; on any exit (success, setup
//! failure, or quit) the `ready` flag is raised so a blocked reader can
//! never stall on a thread that is already gone.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::audio::AudioStage;
use crate::demux::Demuxer;
use crate::source::ByteSource;
use crate::state::Shared;
use crate::video::VideoStage;

/// Seconds of decoded audio the queue is kept filled to.
pub(crate) const TARGET_FILL_SECONDS: u32 = 2;

/// Inferred durations beyond this are rejected as container nonsense.
const MAX_DURATION_SECONDS: u64 = 3600;

pub(crate) struct WorkerConfig {
    pub label: String,
    pub skip: f64,
    pub out_rate: u32,
}

struct Pipeline {
    demux: Demuxer,
    audio: Option<AudioStage>,
    video: VideoStage,
}

/// Thread entry point.
pub(crate) fn run(source: Box<dyn ByteSource>, cfg: WorkerConfig, shared: Arc<Shared>) {
    debug!(label = %cfg.label, "decode thread starting");

    let mut pipeline = match setup(source, &cfg, &shared) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(label = %cfg.label, error = %e, "decoder setup failed");
            shared.latch_all_finished();
            None
        }
    };

    if let Some(p) = pipeline.as_mut() {
        steady_loop(p, &shared);
    }

    // Exit path: make sure no reader stays parked on `ready`, then hold all
    // state until the caller asks for teardown.
    let mut st = shared.lock();
    if !st.ready {
        st.ready = true;
        shared.notify_all();
    }
    while !st.quit {
        st = shared.wait(st);
    }
    drop(st);

    debug!(label = %cfg.label, "decode thread exiting");
    drop(pipeline); // packet queues, codec state and the byte source go here
}

fn setup(source: Box<dyn ByteSource>, cfg: &WorkerConfig, shared: &Shared) -> Result<Pipeline> {
    let mut demux = Demuxer::open(source, &cfg.label)?;

    let mut audio = demux
        .audio_track()
        .map(|t| AudioStage::new(t, cfg.out_rate, cfg.skip, TARGET_FILL_SECONDS))
        .transpose()?;

    if audio.is_none() {
        debug!(label = %cfg.label, "no audio stream");
        shared.latch_audio_finished();
    }
    if !demux.has_video() {
        shared.latch_video_finished();
    }

    // Exact container durations bound playback so the tail does not ring
    // past the stream's end; estimates are ignored, as is anything a caller
    // already configured through `set_range`.
    if let Some(samples) = demux.duration_samples(cfg.out_rate) {
        if samples > 0 && samples <= MAX_DURATION_SECONDS * cfg.out_rate as u64 {
            let mut st = shared.lock();
            if st.audio_duration == 0 {
                st.audio_duration = samples;
            }
        } else {
            debug!(samples, "rejecting implausible container duration");
        }
    }

    if cfg.skip != 0.0 {
        // A failed seek is not fatal: decoding simply starts from the
        // beginning and the skip policy discards the difference.
        if let Err(e) = demux.seek_to(cfg.skip) {
            warn!(error = %e, skip = cfg.skip, "seek failed, decoding from start");
        } else if let Some(stage) = audio.as_mut() {
            stage.reset();
        }
    }

    Ok(Pipeline {
        demux,
        audio,
        video: VideoStage,
    })
}

fn steady_loop(p: &mut Pipeline, shared: &Shared) {
    loop {
        let (quit, audio_done, video_done) = {
            let st = shared.lock();
            (st.quit, st.audio_finished, st.video_finished)
        };
        if quit {
            return;
        }

        if !audio_done {
            if let Some(stage) = p.audio.as_mut() {
                stage.fill(&mut p.demux, shared);
            }
        }

        // Audio may have just finished; if so the router stops hoarding
        // packets nobody will consume.
        let audio_done = shared.lock().audio_finished;
        if audio_done {
            p.demux.abandon_audio();
        }

        if !video_done {
            p.video.drain(&mut p.demux, shared, audio_done);
        }

        let mut st = shared.lock();
        if !st.ready {
            st.ready = true;
            shared.notify_all();
        }
        if !(st.needs_decode || st.quit) {
            st = shared.wait(st);
        }
        st.needs_decode = false;
        if st.quit {
            return;
        }
    }
}
