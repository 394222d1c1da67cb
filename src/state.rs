//! State shared between the decode thread and the consumer.
//!
//! One mutex and one condition variable coordinate the whole pipeline: the
//! condvar is signaled on every flag change, and both sides re-check their
//! predicate after waking. Everything not in [`Playback`] is owned outright
//! by the decode thread.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::queue::PcmChunk;

/// The lock-guarded half of a playing stream.
#[derive(Default)]
pub(crate) struct Playback {
    /// Decoder initialization finished (set exactly once, never cleared).
    pub ready: bool,
    /// The consumer took data and wants the queue refilled.
    pub needs_decode: bool,
    /// The caller asked for teardown. Terminal.
    pub quit: bool,
    /// The audio/video lanes have reached end of data. Latched.
    pub audio_finished: bool,
    pub video_finished: bool,

    /// Decoded chunks waiting for the consumer, oldest first.
    pub queue: VecDeque<PcmChunk>,
    /// Samples resident in `queue` plus the unread remainder of `out_chunk`.
    pub queue_samples: u64,
    /// The chunk currently being read from, and the byte offset into it.
    pub out_chunk: Option<PcmChunk>,
    pub out_index: usize,

    /// Output samples delivered through `read_audio` so far.
    pub read_samples: u64,
    /// Total output samples to emit; 0 plays to the natural end.
    pub audio_duration: u64,
}

pub(crate) struct Shared {
    state: Mutex<Playback>,
    cond: Condvar,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Playback::default()),
            cond: Condvar::new(),
        }
    }

    /// A panicking decode thread must not take the audio callback down with
    /// it, so lock poisoning is shrugged off.
    pub fn lock(&self) -> MutexGuard<'_, Playback> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait<'a>(&self, guard: MutexGuard<'a, Playback>) -> MutexGuard<'a, Playback> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    pub fn latch_audio_finished(&self) {
        self.lock().audio_finished = true;
        self.notify_all();
    }

    pub fn latch_video_finished(&self) {
        self.lock().video_finished = true;
        self.notify_all();
    }

    pub fn latch_all_finished(&self) {
        let mut st = self.lock();
        st.audio_finished = true;
        st.video_finished = true;
        drop(st);
        self.notify_all();
    }
}
