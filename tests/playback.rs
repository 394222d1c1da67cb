//! End-to-end playback tests over in-memory WAV fixtures.
//!
//! These drive the public surface the way an audio device would: start the
//! stream, pull PCM in device-sized chunks, zero-tolerate blocking, and
//! check the delivered byte counts against the fixture's length.

use std::io::{self, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use undertone::{BYTES_PER_SAMPLE, ByteSource, Media};

const RATE: u32 = 44_100;

fn init() {
    undertone::init(RATE, false);
}

/// A sine-wave WAV held in memory.
fn wav_bytes(rate: u32, channels: u16, secs: f64, freq: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        let frames = (secs * rate as f64).round() as u64;
        for n in 0..frames {
            let s = sine_sample(rate, freq, n);
            for _ in 0..channels {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn sine_sample(rate: u32, freq: f64, n: u64) -> i16 {
    let t = n as f64 / rate as f64;
    ((t * freq * std::f64::consts::TAU).sin() * 0.5 * i16::MAX as f64) as i16
}

/// Pull everything the stream will deliver, in device-sized chunks.
///
/// `read_audio` returning 0 can mean either "decoder not caught up" or "end
/// of stream". The device would zero-fill and try again, so this helper
/// does the same until the stream reports itself finished.
fn drain(media: &Media, chunk: usize) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];

    while !media.finished() {
        assert!(Instant::now() < deadline, "playback did not finish in time");
        let n = media.read_audio(&mut buf);
        if n == 0 {
            thread::sleep(Duration::from_millis(2));
            continue;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn frames_of(bytes: &[u8]) -> Vec<(i16, i16)> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| {
            (
                i16::from_ne_bytes([b[0], b[1]]),
                i16::from_ne_bytes([b[2], b[3]]),
            )
        })
        .collect()
}

#[test]
fn mono_track_is_resampled_to_the_output_format() {
    init();
    let bytes = wav_bytes(22_050, 1, 1.0, 440.0);

    let mut media = Media::open(io::Cursor::new(bytes), "sine.wav");
    media.start().unwrap();
    let out = drain(&media, 4096);
    media.close();

    // One second of output: 44100 frames at 4 bytes, within a resampler
    // block of exact.
    let expected = RATE as i64 * BYTES_PER_SAMPLE as i64;
    assert!(
        (out.len() as i64 - expected).abs() <= 256 * BYTES_PER_SAMPLE as i64,
        "expected about {expected} bytes, got {}",
        out.len()
    );

    let frames = frames_of(&out);
    // Mono mirrored onto both channels survives resampling.
    assert!(frames.iter().all(|(l, r)| l == r));
    // And the signal is actually there.
    assert!(frames.iter().any(|(l, _)| l.unsigned_abs() > 1000));
}

#[test]
fn skip_drops_leading_audio_exactly() {
    init();
    let bytes = wav_bytes(RATE, 2, 2.0, 220.0);

    let mut media = Media::open(io::Cursor::new(bytes), "sine.wav");
    media.set_range(0.5, 0.0).unwrap();
    media.start().unwrap();
    let out = drain(&media, 4096);
    media.close();

    // The native-rate path trims sample-accurately: 1.5 s remain.
    let skipped = (0.5 * RATE as f64).floor() as usize;
    let expected = (2 * RATE as usize - skipped) * BYTES_PER_SAMPLE;
    assert_eq!(out.len(), expected);

    // The first delivered frame is the fixture's sample at the skip point.
    let (first, _) = frames_of(&out)[0];
    let want = sine_sample(RATE, 220.0, skipped as u64);
    assert!(
        (first as i32 - want as i32).abs() <= 2,
        "first sample {first}, expected {want}"
    );
}

#[test]
fn end_bound_clamps_delivery() {
    init();
    let bytes = wav_bytes(RATE, 2, 1.0, 330.0);

    let mut media = Media::open(io::Cursor::new(bytes), "sine.wav");
    media.set_range(0.0, 0.25).unwrap();
    media.start().unwrap();
    let out = drain(&media, 4096);

    assert_eq!(out.len(), (0.25 * RATE as f64) as usize * BYTES_PER_SAMPLE);

    // The bound is terminal: further reads produce nothing.
    let mut buf = [0u8; 256];
    assert_eq!(media.read_audio(&mut buf), 0);
    media.close();
}

#[test]
fn natural_eof_drains_queued_tail() {
    init();
    let bytes = wav_bytes(RATE, 1, 0.7, 550.0);

    let mut media = Media::open(io::Cursor::new(bytes), "sine.wav");
    media.start().unwrap();
    let out = drain(&media, 4096);

    let frames = (0.7 * RATE as f64).round() as usize;
    assert_eq!(out.len(), frames * BYTES_PER_SAMPLE);
    assert!(media.finished());
    media.close();
}

/// A byte source that records when the decode thread releases it.
struct TrackedSource {
    inner: io::Cursor<Vec<u8>>,
    released: Arc<AtomicBool>,
}

impl ByteSource for TrackedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.inner, buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut self.inner, pos)
    }

    fn byte_len(&mut self) -> Option<u64> {
        Some(self.inner.get_ref().len() as u64)
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::Release);
    }
}

#[test]
fn close_right_after_start_releases_the_source() {
    init();
    let released = Arc::new(AtomicBool::new(false));
    let source = TrackedSource {
        inner: io::Cursor::new(wav_bytes(RATE, 2, 2.0, 440.0)),
        released: Arc::clone(&released),
    };

    let mut media = Media::open(source, "sine.wav");
    media.start().unwrap();
    media.close();
    media.close(); // idempotent

    // The decode thread owns the source now; it drops it on the way out.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !released.load(Ordering::Acquire) {
        assert!(Instant::now() < deadline, "decode thread never released");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn close_unblocks_a_reader_waiting_for_ready() {
    init();
    let media = Arc::new(Media::open(io::Cursor::new(Vec::new()), "never-started"));

    let reader = {
        let media = Arc::clone(&media);
        thread::spawn(move || {
            let mut buf = [0u8; 512];
            media.read_audio(&mut buf)
        })
    };

    // The stream never starts, so the reader is parked on `ready`.
    thread::sleep(Duration::from_millis(50));
    media.close();

    let n = reader.join().expect("reader thread panicked");
    assert_eq!(n, 0);
}

#[test]
fn unparseable_input_still_unblocks_readers() {
    init();
    let media = {
        let mut m = Media::open(io::Cursor::new(vec![0u8; 64]), "garbage.bin");
        m.start().unwrap();
        m
    };

    // Setup fails, but `ready` is still signaled and reads return nothing.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut buf = [0u8; 512];
    assert_eq!(media.read_audio(&mut buf), 0);
    while !media.finished() {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(2));
    }
    media.close();
}

#[test]
fn plays_from_a_file_source() {
    init();
    let bytes = wav_bytes(RATE, 2, 0.3, 440.0);

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&bytes).unwrap();
    io::Seek::seek(&mut file, SeekFrom::Start(0)).unwrap();

    let mut media = Media::open(file, "clip.wav");
    media.start().unwrap();
    let out = drain(&media, 1024);

    let frames = (0.3 * RATE as f64).round() as usize;
    assert_eq!(out.len(), frames * BYTES_PER_SAMPLE);
    media.close();
}
