//! Conversion of decoded audio into the fixed playback format.
//!
//! Responsibilities:
//! - copy Symphonia-decoded PCM into interleaved `f32`
//! - map whatever channel layout the codec produced onto stereo
//! - resample to the playback rate when the source rate differs (rubato)
//! - stamp every emitted chunk with the source time of its first sample
//!
//! Timestamps drive the skip policy downstream, so they are kept
//! sample-accurate: the first decoded frame anchors the output timeline and
//! each emitted chunk advances it by its own length. The resampler's filter
//! delay is trimmed off the head of the stream and the tail is clamped to
//! the expected output length at end of stream, so the timeline matches the
//! audio that actually comes out.

use anyhow::{Context, Result, anyhow, bail};
use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use tracing::warn;

use crate::config::CHANNELS;
use crate::queue::PcmChunk;

/// Source frames fed to rubato per process call.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

pub(crate) struct OutputConverter {
    out_rate: u32,

    /// Scratch buffer for copying decoded PCM out of Symphonia.
    sample_buf: Option<SampleBuffer<f32>>,
    buf_spec: Option<SignalSpec>,

    /// Lazily built; only needed when the source rate differs from `out_rate`.
    resampler: Option<SincFixedIn<f32>>,
    src_rate: u32,

    /// Per-channel accumulation feeding the resampler in full blocks.
    pending: [Vec<f32>; CHANNELS],

    /// Output frames still to drop to cancel the resampler's filter delay.
    delay_to_trim: usize,

    /// Source time of the first frame fed to the resampler.
    anchor: Option<f64>,

    /// Source frames fed to the resampler and output frames emitted from it,
    /// counted from the point the resampler was built.
    frames_in: u64,
    emitted: u64,
    base_out: u64,
}

impl OutputConverter {
    pub fn new(out_rate: u32) -> Self {
        Self {
            out_rate,
            sample_buf: None,
            buf_spec: None,
            resampler: None,
            src_rate: 0,
            pending: [Vec::new(), Vec::new()],
            delay_to_trim: 0,
            anchor: None,
            frames_in: 0,
            emitted: 0,
            base_out: 0,
        }
    }

    /// Convert one decoded buffer; `start` is its source time in seconds.
    pub fn push(&mut self, start: f64, decoded: AudioBufferRef<'_>) -> Result<Vec<PcmChunk>> {
        let (interleaved, src_rate, channels) = self.decoded_to_interleaved(&decoded)?;
        let stereo = to_stereo(&interleaved, channels);
        self.push_stereo(start, &stereo, src_rate)
    }

    /// Convert interleaved stereo `f32` frames at `src_rate`.
    pub fn push_stereo(
        &mut self,
        start: f64,
        stereo: &[f32],
        src_rate: u32,
    ) -> Result<Vec<PcmChunk>> {
        if stereo.is_empty() {
            return Ok(Vec::new());
        }

        // Fast path: already at the playback rate, so the chunk keeps the
        // decoded frame's own timestamp exactly.
        if src_rate == self.out_rate {
            return Ok(vec![PcmChunk::from_samples(start, &to_i16(stereo))]);
        }

        self.ensure_resampler(src_rate)?;
        if self.anchor.is_none() {
            self.anchor = Some(start);
        }

        for frame in stereo.chunks_exact(CHANNELS) {
            self.pending[0].push(frame[0]);
            self.pending[1].push(frame[1]);
        }
        self.frames_in += (stereo.len() / CHANNELS) as u64;

        let mut chunks = Vec::new();
        while self.pending[0].len() >= RESAMPLE_CHUNK_FRAMES {
            let block = [
                self.pending[0].drain(..RESAMPLE_CHUNK_FRAMES).collect::<Vec<f32>>(),
                self.pending[1].drain(..RESAMPLE_CHUNK_FRAMES).collect::<Vec<f32>>(),
            ];

            let rs = self
                .resampler
                .as_mut()
                .ok_or_else(|| anyhow!("resampler not initialized"))?;
            let out = rs
                .process(&block[..], None)
                .map_err(|e| anyhow!(e))
                .context("resampler process failed")?;

            if let Some(chunk) = self.emit(&out) {
                chunks.push(chunk);
            }
        }

        Ok(chunks)
    }

    /// Flush remaining buffered samples at end of stream.
    ///
    /// If resampling was never needed, this is a no-op. Otherwise the
    /// remainder block and the filter tail are drained, and the total output
    /// is clamped to the length the input called for.
    pub fn flush(&mut self) -> Result<Vec<PcmChunk>> {
        if self.resampler.is_none() {
            return Ok(Vec::new());
        }

        let ratio_num = self.out_rate as u64;
        let expected = self.base_out
            + (self.frames_in * ratio_num + self.src_rate as u64 / 2) / self.src_rate as u64;

        let mut chunks = Vec::new();

        if !self.pending[0].is_empty() {
            let block = [
                std::mem::take(&mut self.pending[0]),
                std::mem::take(&mut self.pending[1]),
            ];
            let rs = self
                .resampler
                .as_mut()
                .ok_or_else(|| anyhow!("resampler not initialized"))?;
            let out = rs
                .process_partial(Some(&block[..]), None)
                .map_err(|e| anyhow!(e))
                .context("resampler flush failed")?;
            if let Some(chunk) = self.emit(&out) {
                chunks.push(chunk);
            }
        }

        // The sinc filter still holds history; drain it until the expected
        // length is reached or it runs dry.
        for _ in 0..2 {
            if self.base_out + self.emitted >= expected {
                break;
            }
            let rs = self
                .resampler
                .as_mut()
                .ok_or_else(|| anyhow!("resampler not initialized"))?;
            let out = rs
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| anyhow!(e))
                .context("resampler tail drain failed")?;
            if out.first().is_none_or(|ch| ch.is_empty()) {
                break;
            }
            if let Some(chunk) = self.emit(&out) {
                chunks.push(chunk);
            }
        }

        let mut overshoot = (self.base_out + self.emitted).saturating_sub(expected);
        while overshoot > 0 {
            let Some(last) = chunks.last_mut() else { break };
            let cut = overshoot.min(last.samples());
            last.truncate_samples(cut);
            self.emitted -= cut;
            overshoot -= cut;
            if last.samples() == 0 {
                chunks.pop();
            }
        }

        Ok(chunks)
    }

    /// Interleave one resampler output block, trim any remaining filter
    /// delay, and stamp the result on the output timeline.
    fn emit(&mut self, out: &[Vec<f32>]) -> Option<PcmChunk> {
        let frames = out.first().map_or(0, |ch| ch.len());
        let skip = self.delay_to_trim.min(frames);
        self.delay_to_trim -= skip;
        if frames == skip {
            return None;
        }

        let mut samples = Vec::with_capacity((frames - skip) * CHANNELS);
        for i in skip..frames {
            for ch in out {
                let v = ch[i].clamp(-1.0, 1.0);
                samples.push((v * i16::MAX as f32).round() as i16);
            }
        }

        let start = self.anchor.unwrap_or(0.0)
            + (self.base_out + self.emitted) as f64 / self.out_rate as f64;
        self.emitted += (frames - skip) as u64;
        Some(PcmChunk::from_samples(start, &samples))
    }

    fn ensure_resampler(&mut self, src_rate: u32) -> Result<()> {
        if self.resampler.is_some() && self.src_rate == src_rate {
            return Ok(());
        }
        if self.resampler.is_some() {
            warn!(
                from = self.src_rate,
                to = src_rate,
                "source sample rate changed mid-stream, rebuilding resampler"
            );
            self.pending[0].clear();
            self.pending[1].clear();
        }

        let rs = SincFixedIn::<f32>::new(
            self.out_rate as f64 / src_rate as f64,
            2.0,
            rubato::SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: rubato::SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            RESAMPLE_CHUNK_FRAMES,
            CHANNELS,
        )
        .map_err(|e| anyhow!(e))
        .context("failed to init resampler")?;

        self.delay_to_trim = rs.output_delay();
        self.base_out += self.emitted;
        self.frames_in = 0;
        self.emitted = 0;
        self.src_rate = src_rate;
        self.resampler = Some(rs);
        Ok(())
    }

    fn decoded_to_interleaved(&mut self, decoded: &AudioBufferRef<'_>) -> Result<(Vec<f32>, u32, usize)> {
        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            bail!("decoded audio had zero channels");
        }

        let needed = decoded.capacity() * channels;
        let recreate = match (&self.sample_buf, self.buf_spec) {
            (Some(buf), Some(prev)) => buf.capacity() < needed || prev != spec,
            _ => true,
        };
        if recreate {
            self.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            self.buf_spec = Some(spec);
        }

        let buf = self
            .sample_buf
            .as_mut()
            .ok_or_else(|| anyhow!("sample buffer not initialized"))?;
        buf.copy_interleaved_ref(decoded.clone());

        Ok((buf.samples().to_vec(), spec.rate, channels))
    }
}

/// Map interleaved samples of any channel count onto interleaved stereo.
///
/// Mono is mirrored onto both channels; wider layouts keep their first pair.
fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => interleaved.to_vec(),
        1 => {
            let mut out = Vec::with_capacity(interleaved.len() * 2);
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
            out
        }
        n => {
            let frames = interleaved.len() / n;
            let mut out = Vec::with_capacity(frames * 2);
            for f in 0..frames {
                out.push(interleaved[f * n]);
                out.push(interleaved[f * n + 1]);
            }
            out
        }
    }
}

fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect()
}
