//! Variable-ratio streaming resampler
//!
//! Wraps a `rubato` polynomial resampler with a fixed output chunk. Two
//! consumption styles are offered:
//!
//! - [`StreamResampler::process_from`]: the caller hands over a contiguous
//!   input slice (the delay's history) and learns how much was consumed.
//! - [`StreamResampler::pull`]: the resampler asks a source closure for
//!   exactly the frames it needs whenever its staged output runs dry (the
//!   wavetable oscillator).
//!
//! All buffers are sized at construction; neither path allocates.

use crate::error::{Error, Result};
use rubato::{FastFixedOut, PolynomialDegree, Resampler};

pub struct StreamResampler {
    inner: FastFixedOut<f32>,
    max_relative: f64,
    ratio: f64,
    input: Vec<f32>,
    output: Vec<f32>,
    staged: usize,
    read: usize,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("ratio", &self.ratio)
            .field("max_relative", &self.max_relative)
            .field("staged", &(self.staged - self.read))
            .finish()
    }
}

impl StreamResampler {
    /// `chunk` output frames per block; the ratio may later move within
    /// `[1 / max_relative, max_relative]`.
    pub fn new(chunk: usize, max_relative: f64) -> Result<Self> {
        let inner = FastFixedOut::<f32>::new(1.0, max_relative, PolynomialDegree::Cubic, chunk, 1)
            .map_err(|e| Error::Resampler(e.to_string()))?;
        let input = vec![0.0; inner.input_frames_max()];
        let output = vec![0.0; inner.output_frames_max()];
        Ok(Self {
            inner,
            max_relative,
            ratio: 1.0,
            input,
            output,
            staged: 0,
            read: 0,
        })
    }

    /// Output rate over input rate, clamped to the construction range
    pub fn set_ratio(&mut self, ratio: f64) {
        let ratio = if ratio.is_finite() {
            ratio.clamp(1.0 / self.max_relative, self.max_relative)
        } else {
            1.0
        };
        if ratio != self.ratio && self.inner.set_resample_ratio(ratio, false).is_ok() {
            self.ratio = ratio;
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Input frames the next block will consume
    pub fn input_frames_next(&self) -> usize {
        self.inner.input_frames_next()
    }

    /// Resamples one block from `input` into `out`.
    ///
    /// Returns `(consumed, generated)`. Nothing happens when `input` is
    /// shorter than [`input_frames_next`](Self::input_frames_next) or `out`
    /// cannot hold a block.
    pub fn process_from(&mut self, input: &[f32], out: &mut [f32]) -> (usize, usize) {
        let needed = self.inner.input_frames_next();
        if input.len() < needed || out.len() < self.inner.output_frames_next() {
            return (0, 0);
        }
        self.inner
            .process_into_buffer(&[&input[..needed]], &mut [out], None)
            .unwrap_or((0, 0))
    }

    /// Next output sample, refilling from `source` when the staged block is
    /// exhausted. A failed block yields silence.
    pub fn pull(&mut self, mut source: impl FnMut() -> f32) -> f32 {
        if self.read >= self.staged {
            let needed = self.inner.input_frames_next().min(self.input.len());
            for v in &mut self.input[..needed] {
                *v = source();
            }
            let (_, generated) = self
                .inner
                .process_into_buffer(&[&self.input[..needed]], &mut [&mut self.output[..]], None)
                .unwrap_or((0, 0));
            self.staged = generated;
            self.read = 0;
            if generated == 0 {
                return 0.0;
            }
        }
        let value = self.output[self.read];
        self.read += 1;
        value
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.staged = 0;
        self.read = 0;
    }
}
