//! The consumer-facing handle for one media stream.
//!
//! Thread roles: the caller opens, configures and starts the stream; a
//! real-time audio callback pulls PCM through [`Media::read_audio`]; the
//! decode thread produces. `read_audio` blocks only until the decoder has
//! finished initializing, never on decode progress, so it is safe to call
//! from a low-latency device callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::debug;

use crate::config::{self, BYTES_PER_SAMPLE};
use crate::error::{Error, Result};
use crate::source::ByteSource;
use crate::state::Shared;
use crate::worker::{self, WorkerConfig};

/// What `start` hands to the decode thread.
struct Pending {
    source: Box<dyn ByteSource>,
    skip: f64,
}

/// Handle to one playing media stream.
pub struct Media {
    label: String,
    out_rate: u32,
    shared: Arc<Shared>,
    pending: Mutex<Option<Pending>>,
    started: AtomicBool,
}

impl Media {
    /// Allocate playback state over `source`.
    ///
    /// `label` shows up in diagnostics and, when it carries a file
    /// extension, doubles as a container-format hint. Nothing is read until
    /// [`start`](Self::start).
    pub fn open(source: impl ByteSource + 'static, label: &str) -> Media {
        Media {
            label: label.to_owned(),
            out_rate: config::output_rate(),
            shared: Arc::new(Shared::new()),
            pending: Mutex::new(Some(Pending {
                source: Box::new(source),
                skip: 0.0,
            })),
            started: AtomicBool::new(false),
        }
    }

    /// Set where playback starts and, optionally, where it is forced to end.
    ///
    /// `start` seconds are skipped sample-accurately at the head. A nonzero
    /// `end` caps delivery at `end - start` seconds even if the stream runs
    /// longer; zero plays to the natural end. Must precede
    /// [`start`](Self::start).
    pub fn set_range(&mut self, start: f64, end: f64) -> Result<()> {
        if end != 0.0 && end <= start {
            return Err(Error::InvalidRange { start, end });
        }

        let mut pending = self.lock_pending();
        let Some(p) = pending.as_mut() else {
            return Err(self.gone());
        };
        p.skip = start;

        let mut st = self.shared.lock();
        st.audio_duration = if end != 0.0 {
            ((end - start) * self.out_rate as f64) as u64
        } else {
            0
        };
        Ok(())
    }

    /// Spawn the decode thread.
    ///
    /// The byte source and all decoder state now belong to that thread;
    /// [`close`](Self::close) only asks it to shut down.
    pub fn start(&mut self) -> Result<()> {
        let Some(p) = self.lock_pending().take() else {
            return Err(self.gone());
        };

        let cfg = WorkerConfig {
            label: self.label.clone(),
            skip: p.skip,
            out_rate: self.out_rate,
        };
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(format!("decode: {}", self.label))
            .spawn(move || worker::run(p.source, cfg, shared))?;

        self.started.store(true, Ordering::Release);
        debug!(label = %self.label, "playback started");
        Ok(())
    }

    /// Fill `buf` with interleaved stereo s16 PCM at the configured rate.
    ///
    /// Returns the byte count written, which is less than `buf.len()` when
    /// the stream has ended or the decoder has not caught up; the audio
    /// device zero-fills the shortfall. Blocks only until the decoder
    /// finishes initializing (or teardown is requested, whichever first).
    pub fn read_audio(&self, buf: &mut [u8]) -> usize {
        let shared = &self.shared;
        let mut st = shared.lock();
        while !st.ready && !st.quit {
            st = shared.wait(st);
        }

        let mut len = buf.len();
        if st.audio_duration > 0 {
            let remaining =
                st.audio_duration.saturating_sub(st.read_samples) as usize * BYTES_PER_SAMPLE;
            if remaining == 0 {
                // The bound is terminal: anything decoded past it will never
                // be delivered, so the residue is dropped here.
                st.audio_finished = true;
                st.out_chunk = None;
                st.out_index = 0;
                st.queue.clear();
                st.queue_samples = 0;
            }
            len = len.min(remaining);
        }

        let mut written = 0usize;
        while written < len {
            if st.out_chunk.is_none() {
                st.out_chunk = st.queue.pop_front();
                st.out_index = 0;
            }
            let Some(chunk) = st.out_chunk.as_ref() else {
                break;
            };

            let chunk_byte_len = chunk.byte_len();
            let avail = chunk_byte_len - st.out_index;
            let count = avail.min(len - written);
            buf[written..written + count]
                .copy_from_slice(&chunk.data[st.out_index..st.out_index + count]);

            st.out_index += count;
            st.read_samples += (count / BYTES_PER_SAMPLE) as u64;
            st.queue_samples = st
                .queue_samples
                .saturating_sub((count / BYTES_PER_SAMPLE) as u64);
            written += count;

            if st.out_index >= chunk_byte_len {
                st.out_chunk = None;
                st.out_index = 0;
            }
        }

        // Wake the producer only when something was actually consumed.
        if written > 0 {
            st.needs_decode = true;
            shared.notify_all();
        }
        written
    }

    /// True once the stream has nothing left to deliver: either every queued
    /// sample went out, or a configured end bound was reached (in which case
    /// whatever the decoder produced past it never will be).
    pub fn finished(&self) -> bool {
        let st = self.shared.lock();
        if st.audio_duration > 0 && st.read_samples >= st.audio_duration {
            return true;
        }
        st.audio_finished && st.out_chunk.is_none() && st.queue.is_empty()
    }

    /// Ask the decode thread to shut down and release everything it owns.
    ///
    /// Returns without waiting; safe to call at any time, any number of
    /// times. A stream that never started is torn down directly.
    pub fn close(&self) {
        drop(self.lock_pending().take());

        let mut st = self.shared.lock();
        st.quit = true;
        drop(st);
        self.shared.notify_all();
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gone(&self) -> Error {
        if self.started.load(Ordering::Acquire) {
            Error::AlreadyStarted
        } else {
            Error::Closed
        }
    }
}

impl Drop for Media {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn empty_media() -> Media {
        Media::open(io::Cursor::new(Vec::new()), "empty")
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut media = empty_media();
        assert!(matches!(
            media.set_range(1.0, 1.0),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            media.set_range(2.0, 0.5),
            Err(Error::InvalidRange { .. })
        ));
        media.close();
    }

    #[test]
    fn range_resets_when_end_is_zero() {
        let mut media = empty_media();
        media.set_range(0.0, 1.0).unwrap();
        assert!(media.shared.lock().audio_duration > 0);

        media.set_range(0.0, 0.0).unwrap();
        assert_eq!(media.shared.lock().audio_duration, 0);
        media.close();
    }

    #[test]
    fn configuration_fails_after_close() {
        let mut media = empty_media();
        media.close();
        assert!(matches!(media.set_range(0.0, 0.0), Err(Error::Closed)));
        assert!(matches!(media.start(), Err(Error::Closed)));
    }

    #[test]
    fn close_is_idempotent() {
        let media = empty_media();
        media.close();
        media.close();
        assert!(media.shared.lock().quit);
    }

    #[test]
    fn read_returns_nothing_after_close_without_start() {
        let media = empty_media();
        media.close();
        let mut buf = [0u8; 64];
        assert_eq!(media.read_audio(&mut buf), 0);
    }
}
