//! One-pole filters, slew limiting and the oversampling decimator

use std::f32::consts::PI;
use std::ops::{Add, Mul, Sub};

/// Sample types the filters run on: `f32` or a four-lane [`Float4`](crate::simd::Float4)
pub trait FilterSample:
    Copy + Default + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
}

impl<T> FilterSample for T where
    T: Copy + Default + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>
{
}

/// First-order RC filter with simultaneous lowpass and highpass taps.
///
/// The cutoff is a normalized frequency (`hz / sample_rate`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RcFilter<T = f32> {
    c: f32,
    x_state: T,
    y_state: T,
}

impl<T: FilterSample> RcFilter<T> {
    pub fn new(cutoff: f32) -> Self {
        let mut filter = Self::default();
        filter.set_cutoff_freq(cutoff);
        filter
    }

    #[inline]
    pub fn set_cutoff_freq(&mut self, cutoff: f32) {
        self.c = 1.0 / (PI * cutoff);
    }

    #[inline]
    pub fn process(&mut self, x: T) {
        let y = (x + self.x_state - self.y_state * (1.0 - self.c)) * (1.0 / (1.0 + self.c));
        self.x_state = x;
        self.y_state = y;
    }

    #[inline]
    pub fn lowpass(&self) -> T {
        self.y_state
    }

    #[inline]
    pub fn highpass(&self) -> T {
        self.x_state - self.y_state
    }

    pub fn reset(&mut self) {
        self.x_state = T::default();
        self.y_state = T::default();
    }
}

/// Bilinear one-pole lowpass in direct form 1
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IirOnePole {
    b0: f32,
    b1: f32,
    a1: f32,
    x1: f32,
    y1: f32,
}

impl IirOnePole {
    pub fn lowpass(cutoff_hz: f32, sample_time: f32) -> Self {
        let mut filter = Self::default();
        filter.set_lowpass(cutoff_hz, sample_time);
        filter
    }

    /// Recomputes coefficients, keeping state. Cutoff is limited to 0.49 of
    /// the sample rate.
    pub fn set_lowpass(&mut self, cutoff_hz: f32, sample_time: f32) {
        let g = (PI * (cutoff_hz * sample_time).min(0.49)).tan();
        let norm = 1.0 / (1.0 + g);
        self.b0 = g * norm;
        self.b1 = g * norm;
        self.a1 = (g - 1.0) * norm;
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 - self.a1 * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// Linear rate limiter with independent rise and fall speeds (units per second)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlewLimiter {
    rise: f32,
    fall: f32,
    out: f32,
}

impl SlewLimiter {
    pub fn new(rise: f32, fall: f32) -> Self {
        Self {
            rise,
            fall,
            out: 0.0,
        }
    }

    pub fn set_rise_fall(&mut self, rise: f32, fall: f32) {
        self.rise = rise;
        self.fall = fall;
    }

    #[inline]
    pub fn process(&mut self, delta_time: f32, input: f32) -> f32 {
        let lo = self.out - self.fall * delta_time;
        let hi = self.out + self.rise * delta_time;
        self.out = input.max(lo).min(hi);
        self.out
    }

    pub fn value(&self) -> f32 {
        self.out
    }

    pub fn reset(&mut self, value: f32) {
        self.out = value;
    }
}

fn sinc(x: f32) -> f32 {
    if x == 0.0 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

/// Windowed-sinc lowpass kernel: ideal boxcar response times a
/// Blackman-Harris window. `cutoff` is normalized to the kernel's rate.
pub fn windowed_sinc_kernel(len: usize, cutoff: f32) -> Vec<f32> {
    let center = (len as f32 - 1.0) / 2.0;
    let factor = 2.0 * PI / (len as f32 - 1.0);
    (0..len)
        .map(|i| {
            let t = i as f32 - center;
            let ir = 2.0 * cutoff * sinc(2.0 * cutoff * t);
            let p = i as f32 * factor;
            let window = 0.35875 - 0.48829 * p.cos() + 0.14128 * (2.0 * p).cos()
                - 0.01168 * (3.0 * p).cos();
            ir * window
        })
        .collect()
}

/// FIR decimator from `oversample` input samples to one output sample
#[derive(Debug, Clone)]
pub struct Decimator<T = f32> {
    oversample: usize,
    kernel: Vec<f32>,
    buffer: Vec<T>,
    index: usize,
}

impl<T: FilterSample> Decimator<T> {
    /// Kernel of `oversample * quality` taps with cutoff `0.9 * 0.5 / oversample`
    pub fn new(oversample: usize, quality: usize) -> Self {
        let len = oversample * quality;
        Self {
            oversample,
            kernel: windowed_sinc_kernel(len, 0.9 * 0.5 / oversample as f32),
            buffer: vec![T::default(); len],
            index: 0,
        }
    }

    pub fn oversample(&self) -> usize {
        self.oversample
    }

    /// `input` must hold exactly `oversample` samples, oldest first
    pub fn process(&mut self, input: &[T]) -> T {
        let len = self.buffer.len();
        self.buffer[self.index..self.index + self.oversample].copy_from_slice(input);
        self.index = (self.index + self.oversample) % len;

        let mut out = T::default();
        for (i, &k) in self.kernel.iter().enumerate() {
            let index = (self.index + len - 1 - i) % len;
            out = out + self.buffer[index] * k;
        }
        out
    }

    pub fn reset(&mut self) {
        for v in &mut self.buffer {
            *v = T::default();
        }
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::Float4;

    #[test]
    fn test_rc_lowpass_settles_to_dc() {
        let mut rc: RcFilter = RcFilter::new(100.0 / 44100.0);
        for _ in 0..44100 {
            rc.process(1.0);
        }
        assert!((rc.lowpass() - 1.0).abs() < 1e-3);
        assert!(rc.highpass().abs() < 1e-3);
    }

    #[test]
    fn test_rc_filter_on_vector_lanes() {
        let mut rc: RcFilter<Float4> = RcFilter::new(0.01);
        for _ in 0..10_000 {
            rc.process(Float4([1.0, -1.0, 0.0, 2.0]));
        }
        let lp = rc.lowpass();
        assert!((lp[0] - 1.0).abs() < 1e-3);
        assert!((lp[1] + 1.0).abs() < 1e-3);
        assert!((lp[3] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_one_pole_dc_gain_is_unity() {
        let mut f = IirOnePole::lowpass(1000.0, 1.0 / 48000.0);
        let mut y = 0.0;
        for _ in 0..48000 {
            y = f.process(0.5);
        }
        assert!((y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_one_pole_attenuates_nyquist() {
        let mut f = IirOnePole::lowpass(100.0, 1.0 / 48000.0);
        let mut peak = 0.0f32;
        for i in 0..4800 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = f.process(x);
            if i > 1000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_slew_limits_rate() {
        let mut slew = SlewLimiter::new(10.0, 20.0);
        let dt = 0.01;
        assert!((slew.process(dt, 1.0) - 0.1).abs() < 1e-6);
        assert!((slew.process(dt, 1.0) - 0.2).abs() < 1e-6);
        assert!((slew.process(dt, -1.0) - 0.0).abs() < 1e-6);
        assert!((slew.process(dt, 0.05) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_decimator_passes_dc() {
        let mut d: Decimator = Decimator::new(16, 16);
        let block = [1.0f32; 16];
        let mut y = 0.0;
        for _ in 0..64 {
            y = d.process(&block);
        }
        assert!((y - 1.0).abs() < 0.02, "dc gain {}", y);
    }

    #[test]
    fn test_decimator_rejects_oversampled_nyquist() {
        let mut d: Decimator = Decimator::new(16, 16);
        let mut block = [0.0f32; 16];
        for (i, v) in block.iter_mut().enumerate() {
            *v = if i % 2 == 0 { 1.0 } else { -1.0 };
        }
        let mut y = 0.0f32;
        for _ in 0..64 {
            y = d.process(&block);
        }
        assert!(y.abs() < 1e-3, "leak {}", y);
    }
}
