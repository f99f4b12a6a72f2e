//! Colored noise generators
//!
//! White, pink (Voss-McCartney), red, violet, blue, gray (inverse
//! A-weighting) and black (uniform) noise, each calibrated to roughly the RMS
//! of a 5 V sine and soft-clipped. Outputs that are not patched are not
//! computed.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use tracing::trace;

use crate::dsp::{softclip, IirOnePole};
use crate::persist::EngineSettings;
use crate::port::{Module, ModuleIo, ModuleSpec, PortDef, ProcessArgs, SignalKind};
use crate::rng::Rng;

const MAX_OCTAVES: usize = 16;
const GRAY_BLOCK: usize = 1024;

/// Voss-McCartney pink noise: row `i` is redrawn every `2^i` samples
#[derive(Debug, Clone)]
pub struct PinkNoiseGenerator {
    frame: Option<u32>,
    values: [f32; MAX_OCTAVES],
    octaves: usize,
}

impl Default for PinkNoiseGenerator {
    fn default() -> Self {
        Self {
            frame: None,
            values: [0.0; MAX_OCTAVES],
            octaves: 8,
        }
    }
}

impl PinkNoiseGenerator {
    /// Row count for a sample rate: one row per octave above about 172 Hz
    /// at 44.1 kHz, between 4 and 16.
    pub fn octaves_for(sample_rate: f32) -> usize {
        ((sample_rate.log2() + 1.0).floor() as i32 - 8).clamp(4, MAX_OCTAVES as i32) as usize
    }

    pub fn set_octaves(&mut self, octaves: usize) {
        self.octaves = octaves.clamp(1, MAX_OCTAVES);
    }

    pub fn octaves(&self) -> usize {
        self.octaves
    }

    pub fn process(&mut self, rng: &mut Rng) -> f32 {
        let frame = match self.frame {
            Some(f) if f + 1 < (1 << self.octaves) => f + 1,
            _ => 0,
        };
        // The first call redraws every row
        let changed = match self.frame {
            Some(last) => last ^ frame,
            None => u32::MAX,
        };
        self.frame = Some(frame);

        let mut sum = 0.0;
        for (i, value) in self.values[..self.octaves].iter_mut().enumerate() {
            if changed & (1 << i) != 0 {
                *value = rng.uniform() - 0.5;
            }
            sum += *value;
        }
        sum
    }
}

/// Block FFT filter shaping white noise by the inverse A-weighting curve.
///
/// Collects [`GRAY_BLOCK`] samples, filters them in the frequency domain and
/// plays the result back during the next block.
pub struct GrayFilter {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    input: Vec<f32>,
    output: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    gains: Vec<f32>,
    frame: usize,
}

impl std::fmt::Debug for GrayFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrayFilter").field("frame", &self.frame).finish()
    }
}

/// Reciprocal of the A-weighting magnitude at `f` Hz
pub fn inverse_a_weighting(f: f32) -> f32 {
    let f2 = f * f;
    ((424.36 + f2) * ((11599.3 + f2) * (544496.0 + f2)).sqrt() * (148693636.0 + f2))
        / (148693636.0 * f2 * f2)
}

impl GrayFilter {
    pub fn new(sample_rate: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(GRAY_BLOCK);
        let inverse = planner.plan_fft_inverse(GRAY_BLOCK);
        let spectrum = forward.make_output_vec();
        let scratch_len = forward.get_scratch_len().max(inverse.get_scratch_len());
        let mut filter = Self {
            forward,
            inverse,
            input: vec![0.0; GRAY_BLOCK],
            output: vec![0.0; GRAY_BLOCK],
            gains: vec![0.0; spectrum.len()],
            spectrum,
            scratch: vec![Complex::default(); scratch_len],
            frame: 0,
        };
        filter.set_sample_rate(sample_rate);
        filter
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        let bin_hz = sample_rate / GRAY_BLOCK as f32;
        for (k, gain) in self.gains.iter_mut().enumerate() {
            let f = bin_hz * k as f32;
            // DC and the extremes of the audible band are removed
            *gain = if (80.0..=20000.0).contains(&f) {
                inverse_a_weighting(f) / GRAY_BLOCK as f32
            } else {
                0.0
            };
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        self.input[self.frame] = x;
        self.frame += 1;
        if self.frame >= GRAY_BLOCK {
            self.frame = 0;
            self.filter_block();
        }
        self.output[self.frame]
    }

    fn filter_block(&mut self) {
        // The forward transform clobbers its input; the block is complete anyway
        if self
            .forward
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .is_err()
        {
            self.output.fill(0.0);
            return;
        }
        for (bin, gain) in self.spectrum.iter_mut().zip(&self.gains) {
            *bin *= *gain;
        }
        let last = self.spectrum.len() - 1;
        self.spectrum[0].im = 0.0;
        self.spectrum[last].im = 0.0;
        if self
            .inverse
            .process_with_scratch(&mut self.spectrum, &mut self.output, &mut self.scratch)
            .is_err()
        {
            self.output.fill(0.0);
        }
    }

    pub fn reset(&mut self) {
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.frame = 0;
    }
}

/// Seven-color noise source
pub struct Noise {
    io: ModuleIo,
    rng: Rng,
    pink: PinkNoiseGenerator,
    white_filter: IirOnePole,
    pink_filter: IirOnePole,
    red_filter: IirOnePole,
    violet_filter: IirOnePole,
    blue_filter: IirOnePole,
    gray_filter: GrayFilter,
    last_white: f32,
    last_pink: f32,
    gain_white: f32,
    gain_white_differenced: f32,
    gain_pink: f32,
    gain_pink_differenced: f32,
}

impl Noise {
    pub const WHITE_OUTPUT: usize = 0;
    pub const PINK_OUTPUT: usize = 1;
    pub const RED_OUTPUT: usize = 2;
    pub const VIOLET_OUTPUT: usize = 3;
    pub const BLUE_OUTPUT: usize = 4;
    pub const GRAY_OUTPUT: usize = 5;
    pub const BLACK_OUTPUT: usize = 6;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .output_def(
                PortDef::new("White noise", SignalKind::Audio)
                    .with_description("0 dB/octave power density"),
            )
            .output_def(
                PortDef::new("Pink noise", SignalKind::Audio)
                    .with_description("-3 dB/octave power density"),
            )
            .output_def(
                PortDef::new("Red noise", SignalKind::Audio)
                    .with_description("-6 dB/octave power density"),
            )
            .output_def(
                PortDef::new("Violet noise", SignalKind::Audio)
                    .with_description("+6 dB/octave power density"),
            )
            .output_def(
                PortDef::new("Blue noise", SignalKind::Audio)
                    .with_description("+3 dB/octave power density"),
            )
            .output_def(
                PortDef::new("Gray noise", SignalKind::Audio)
                    .with_description("Psychoacoustic equal loudness"),
            )
            .output_def(
                PortDef::new("Black noise", SignalKind::Audio)
                    .with_description("Uniform random numbers"),
            )
    }

    pub fn new(settings: &EngineSettings) -> Self {
        let mut noise = Self {
            io: ModuleIo::new(Self::spec()),
            rng: settings.rng(),
            pink: PinkNoiseGenerator::default(),
            white_filter: IirOnePole::default(),
            pink_filter: IirOnePole::default(),
            red_filter: IirOnePole::default(),
            violet_filter: IirOnePole::default(),
            blue_filter: IirOnePole::default(),
            gray_filter: GrayFilter::new(settings.sample_rate),
            last_white: 0.0,
            last_pink: 0.0,
            gain_white: 0.0,
            gain_white_differenced: 0.0,
            gain_pink: 0.0,
            gain_pink_differenced: 0.0,
        };
        noise.set_sample_rate(settings.sample_rate);
        noise
    }

    fn connected(&self, id: usize) -> bool {
        self.io.output(id).is_connected()
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Noise {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        if self.connected(Self::WHITE_OUTPUT)
            || self.connected(Self::RED_OUTPUT)
            || self.connected(Self::VIOLET_OUTPUT)
            || self.connected(Self::GRAY_OUTPUT)
        {
            let white = self.white_filter.process(self.rng.normal());
            self.io
                .output_mut(Self::WHITE_OUTPUT)
                .set_voltage(softclip(white * self.gain_white), 0);

            if self.connected(Self::RED_OUTPUT) {
                let red = self.red_filter.process(white) / 0.0645;
                self.io
                    .output_mut(Self::RED_OUTPUT)
                    .set_voltage(softclip(red * self.gain_white), 0);
            }

            if self.connected(Self::VIOLET_OUTPUT) {
                let violet = self.violet_filter.process((white - self.last_white) / 1.41);
                self.last_white = white;
                self.io
                    .output_mut(Self::VIOLET_OUTPUT)
                    .set_voltage(softclip(violet * self.gain_white_differenced), 0);
            }

            if self.connected(Self::GRAY_OUTPUT) {
                let gray = self.gray_filter.process(white) / 1.67;
                self.io
                    .output_mut(Self::GRAY_OUTPUT)
                    .set_voltage(softclip(gray * self.gain_white), 0);
            }
        }

        if self.connected(Self::PINK_OUTPUT) || self.connected(Self::BLUE_OUTPUT) {
            let pink = self
                .pink_filter
                .process(self.pink.process(&mut self.rng) / 0.816);
            self.io
                .output_mut(Self::PINK_OUTPUT)
                .set_voltage(softclip(pink * self.gain_pink), 0);

            if self.connected(Self::BLUE_OUTPUT) {
                let blue = self.blue_filter.process((pink - self.last_pink) / 0.705);
                self.last_pink = pink;
                self.io
                    .output_mut(Self::BLUE_OUTPUT)
                    .set_voltage(softclip(blue * self.gain_pink_differenced), 0);
            }
        }

        if self.connected(Self::BLACK_OUTPUT) {
            let u = self.rng.uniform();
            self.io
                .output_mut(Self::BLACK_OUTPUT)
                .set_voltage(u * 10.0 - 5.0, 0);
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        let sample_time = 1.0 / sample_rate;
        // Unit-RMS noise scaled to the RMS of a 5 V sine, normalized by bandwidth
        self.gain_white = 5.0 * sample_rate.sqrt() / (44100f32.sqrt() * 2f32.sqrt());
        self.gain_white_differenced = self.gain_white * sample_rate / 44100.0;
        self.gain_pink = 5.0 / 2f32.sqrt();
        self.gain_pink_differenced = self.gain_pink * sample_rate / 44100.0;

        for filter in [
            &mut self.white_filter,
            &mut self.pink_filter,
            &mut self.violet_filter,
            &mut self.blue_filter,
        ] {
            filter.set_lowpass(18000.0, sample_time);
        }
        self.red_filter.set_lowpass(60.0, sample_time);
        self.pink.set_octaves(PinkNoiseGenerator::octaves_for(sample_rate));
        self.gray_filter.set_sample_rate(sample_rate);
        trace!(sample_rate, octaves = self.pink.octaves(), "noise recalibrated");
    }

    fn reset(&mut self) {
        self.white_filter.reset();
        self.pink_filter.reset();
        self.red_filter.reset();
        self.violet_filter.reset();
        self.blue_filter.reset();
        self.gray_filter.reset();
        self.last_white = 0.0;
        self.last_pink = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Noise {
        Noise::new(&EngineSettings::default().with_seed(42))
    }

    fn render(noise: &mut Noise, output: usize, frames: usize) -> Vec<f32> {
        noise.io_mut().output_mut(output).connect(1);
        let args = ProcessArgs::new(44100.0);
        (0..frames)
            .map(|_| {
                noise.process(&args);
                noise.io().output(output).get_voltage(0)
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|v| v * v).sum::<f32>() / samples.len() as f32).sqrt()
    }

    /// Mean power per octave band, via averaged Hann-windowed periodograms
    fn octave_band_powers(samples: &[f32], sample_rate: f32, bands: &[(f32, f32)]) -> Vec<f32> {
        const SEGMENT: usize = 4096;
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(SEGMENT);
        let mut spectrum = fft.make_output_vec();
        let mut power = vec![0.0f32; spectrum.len()];
        let window: Vec<f32> = (0..SEGMENT)
            .map(|i| 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / SEGMENT as f32).cos())
            .collect();
        for segment in samples.chunks_exact(SEGMENT) {
            let mut frame: Vec<f32> = segment.iter().zip(&window).map(|(x, w)| x * w).collect();
            fft.process(&mut frame, &mut spectrum).unwrap();
            for (p, bin) in power.iter_mut().zip(&spectrum) {
                *p += bin.norm_sqr();
            }
        }
        let bin_hz = sample_rate / SEGMENT as f32;
        bands
            .iter()
            .map(|&(lo, hi)| {
                let bins: Vec<f32> = power
                    .iter()
                    .enumerate()
                    .filter(|(k, _)| {
                        let f = *k as f32 * bin_hz;
                        f >= lo && f < hi
                    })
                    .map(|(_, p)| *p)
                    .collect();
                bins.iter().sum::<f32>() / bins.len() as f32
            })
            .collect()
    }

    #[test]
    fn test_pink_slope_is_minus_three_db_per_octave() {
        let mut noise = seeded();
        let samples = render(&mut noise, Noise::PINK_OUTPUT, 1 << 16);

        let bands: Vec<(f32, f32)> = (0..7)
            .map(|i| {
                let lo = 100.0 * 2f32.powi(i);
                (lo, (lo * 2.0).min(10000.0))
            })
            .collect();
        let powers = octave_band_powers(&samples, 44100.0, &bands);

        // Least squares slope of dB against octave number
        let xs: Vec<f32> = bands.iter().map(|(lo, hi)| (lo * hi).sqrt().log2()).collect();
        let ys: Vec<f32> = powers.iter().map(|p| 10.0 * p.log10()).collect();
        let n = xs.len() as f32;
        let mx = xs.iter().sum::<f32>() / n;
        let my = ys.iter().sum::<f32>() / n;
        let num: f32 = xs.iter().zip(&ys).map(|(x, y)| (x - mx) * (y - my)).sum();
        let den: f32 = xs.iter().map(|x| (x - mx) * (x - mx)).sum();
        let slope = num / den;
        assert!((slope + 3.0).abs() <= 1.5, "pink slope {} dB/oct", slope);
    }

    #[test]
    fn test_white_level_near_sine_rms() {
        let mut noise = seeded();
        let samples = render(&mut noise, Noise::WHITE_OUTPUT, 44100);
        let level = rms(&samples);
        assert!(level > 2.0 && level < 5.0, "white rms {}", level);
    }

    #[test]
    fn test_outputs_bounded_by_softclip() {
        let mut noise = seeded();
        for id in 0..7 {
            noise.io_mut().output_mut(id).connect(1);
        }
        let args = ProcessArgs::new(44100.0);
        for _ in 0..20000 {
            noise.process(&args);
            for id in 0..7 {
                let v = noise.io().output(id).get_voltage(0);
                assert!(v.is_finite() && v.abs() < 12.0);
            }
        }
    }

    #[test]
    fn test_black_noise_is_uniform_range() {
        let mut noise = seeded();
        let samples = render(&mut noise, Noise::BLACK_OUTPUT, 10000);
        assert!(samples.iter().all(|v| (-5.0..5.0).contains(v)));
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!(mean.abs() < 0.2, "black mean {}", mean);
    }

    #[test]
    fn test_gray_has_one_block_latency() {
        let mut noise = seeded();
        let samples = render(&mut noise, Noise::GRAY_OUTPUT, GRAY_BLOCK * 3);
        assert!(samples[..GRAY_BLOCK - 1].iter().all(|&v| v == 0.0));
        assert!(rms(&samples[GRAY_BLOCK..]) > 0.1);
    }

    #[test]
    fn test_unpatched_outputs_stay_silent() {
        let mut noise = seeded();
        noise.io_mut().output_mut(Noise::PINK_OUTPUT).connect(1);
        let args = ProcessArgs::new(44100.0);
        for _ in 0..100 {
            noise.process(&args);
        }
        assert_eq!(noise.io().output(Noise::RED_OUTPUT).get_voltage(0), 0.0);
        assert_eq!(noise.io().output(Noise::BLACK_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_pink_octaves_follow_sample_rate() {
        assert_eq!(PinkNoiseGenerator::octaves_for(44100.0), 8);
        assert_eq!(PinkNoiseGenerator::octaves_for(96000.0), 9);
        assert_eq!(PinkNoiseGenerator::octaves_for(1000.0), 4);
    }

    #[test]
    fn test_inverse_a_weighting_near_unity_at_1khz() {
        assert!((inverse_a_weighting(1000.0) - 1.259).abs() < 0.01);
        assert!(inverse_a_weighting(100.0) > 10.0);
    }
}
