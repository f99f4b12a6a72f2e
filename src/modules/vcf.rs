//! Voltage-Controlled Filter: 4-pole transistor ladder
//!
//! Four trapezoidal one-pole stages in series with global negative feedback.
//! The zero-delay feedback loop is solved in closed form each sample: the
//! stage memories predict the linear response, the loop input follows from
//! that prediction, and the stages then run forward with a soft clip on each
//! stage input. Lowpass, highpass and bandpass are mixed from the stage taps.

use crate::dsp::approx::tanh_pade_simd;
use crate::dsp::ClockDivider;
use crate::persist::EngineSettings;
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind};
use crate::rng::Rng;
use crate::simd::{group_starts, Float4, GROUPS, LANES};

const MIN_CUTOFF: f32 = 15.0;
const MAX_CUTOFF: f32 = 20000.0;
const NOISE_FLOOR: f32 = 1e-6;

/// Stage taps produced by one ladder step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LadderTaps {
    pub lowpass: Float4,
    pub highpass: Float4,
    pub bandpass: Float4,
}

/// Advances the ladder by one sample.
///
/// `g` is the prewarped integrator gain `tan(π fc / fs)` and `k` the feedback
/// amount (self-oscillation begins near 4). Stage memories live in `state`.
pub fn ladder_step(state: &mut [Float4; 4], input: Float4, g: Float4, k: Float4) -> LadderTaps {
    let big_g = g / (g + 1.0);
    let one_minus = Float4::splat(1.0) - big_g;

    // Linear prediction of the last stage from memories alone
    let beta = [
        state[0] * one_minus,
        state[1] * one_minus,
        state[2] * one_minus,
        state[3] * one_minus,
    ];
    let g2 = big_g * big_g;
    let g3 = g2 * big_g;
    let g4 = g2 * g2;
    let s = g3 * beta[0] + g2 * beta[1] + big_g * beta[2] + beta[3];
    let u = (input - k * s) / (k * g4 + 1.0);

    let mut y = [Float4::ZERO; 4];
    let mut x = u;
    for i in 0..4 {
        let v = (tanh_pade_simd(x) - state[i]) * big_g;
        y[i] = v + state[i];
        state[i] = y[i] + v;
        x = y[i];
    }

    LadderTaps {
        lowpass: y[3],
        highpass: tanh_pade_simd(u - y[0] * 4.0 + y[1] * 6.0 - y[2] * 4.0 + y[3]),
        bandpass: (y[1] - y[2] * 2.0 + y[3]) * 4.0,
    }
}

/// Polyphonic ladder filter module
pub struct Vcf {
    io: ModuleIo,
    state: [[Float4; 4]; GROUPS],
    rng: Rng,
    light_divider: ClockDivider,
}

impl Vcf {
    pub const FREQ_PARAM: usize = 0;
    pub const RES_PARAM: usize = 1;
    pub const FREQ_CV_PARAM: usize = 2;
    pub const DRIVE_PARAM: usize = 3;
    pub const RES_CV_PARAM: usize = 4;
    pub const DRIVE_CV_PARAM: usize = 5;

    pub const FREQ_INPUT: usize = 0;
    pub const RES_INPUT: usize = 1;
    pub const DRIVE_INPUT: usize = 2;
    pub const IN_INPUT: usize = 3;

    pub const LPF_OUTPUT: usize = 0;
    pub const HPF_OUTPUT: usize = 1;
    pub const BPF_OUTPUT: usize = 2;

    pub const CUTOFF_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Cutoff frequency", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Resonance", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Cutoff frequency CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Drive", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Resonance CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Drive CV", -1.0, 1.0, 0.0))
            .input("Frequency", SignalKind::VoltPerOctave)
            .input("Resonance", SignalKind::CvUnipolar)
            .input("Drive", SignalKind::CvUnipolar)
            .input("Audio", SignalKind::Audio)
            .output("Lowpass filter", SignalKind::Audio)
            .output("Highpass filter", SignalKind::Audio)
            .output("Bandpass filter", SignalKind::Audio)
            .light("Cutoff")
    }

    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            state: [[Float4::ZERO; 4]; GROUPS],
            rng: settings.rng(),
            light_divider: ClockDivider::new(256),
        }
    }

    /// Cutoff in Hz for a group
    pub fn cutoff_hz(&self, c: usize, sample_rate: f32) -> Float4 {
        let knob = self.io.param(Self::FREQ_PARAM);
        let cv_amount = self.io.param(Self::FREQ_CV_PARAM);
        let pitch = self.io.input(Self::FREQ_INPUT).get_poly_voltage_simd(c) * cv_amount;
        let base = MIN_CUTOFF * (MAX_CUTOFF / MIN_CUTOFF).powf(knob);
        let upper = MAX_CUTOFF.min(0.45 * sample_rate);
        (Float4::pow_base(2.0, pitch) * base).clamp(MIN_CUTOFF, upper.max(MIN_CUTOFF))
    }

    /// Normalized resonance for a group, in [0, 1]
    pub fn resonance(&self, c: usize) -> Float4 {
        let cv = self.io.input(Self::RES_INPUT).get_poly_voltage_simd(c);
        (Float4::splat(self.io.param(Self::RES_PARAM))
            + cv * (self.io.param(Self::RES_CV_PARAM) / 10.0))
            .clamp(0.0, 1.0)
    }

    fn drive_gain(&self, c: usize) -> Float4 {
        let cv = self.io.input(Self::DRIVE_INPUT).get_poly_voltage_simd(c);
        let drive = (Float4::splat(self.io.param(Self::DRIVE_PARAM))
            + cv * (self.io.param(Self::DRIVE_CV_PARAM) / 10.0))
            .clamp(0.0, 1.0);
        (drive + 1.0).map(|d| d.powi(5))
    }
}

impl Default for Vcf {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Vcf {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let outputs = [Self::LPF_OUTPUT, Self::HPF_OUTPUT, Self::BPF_OUTPUT];
        if !outputs.iter().any(|&id| self.io.output(id).is_connected()) {
            return;
        }

        // An unplugged input reads 0 V, so the noise floor alone can start
        // self-oscillation
        let channels = self.io.max_input_channels(&[Self::IN_INPUT]);
        for c in group_starts(channels) {
            let g = c / LANES;
            let cutoff = self.cutoff_hz(c, args.sample_rate);
            let k = self.resonance(c).map(|r| 4.5 * r * r);
            let gain = self.drive_gain(c);

            let mut noise = Float4::ZERO;
            for lane in 0..LANES {
                noise[lane] = self.rng.uniform_bipolar() * NOISE_FLOOR;
            }
            let input = self.io.input(Self::IN_INPUT).get_voltage_simd(c) * (1.0 / 5.0) * gain + noise;

            let warp = cutoff.map(|f| (std::f32::consts::PI * f * args.sample_time).tan());
            let taps = ladder_step(&mut self.state[g], input, warp, k);

            let finite = self.state[g]
                .iter()
                .all(|s| s.0.iter().all(|v| v.is_finite()));
            if !finite {
                self.state[g] = [Float4::ZERO; 4];
                for id in outputs {
                    self.io.output_mut(id).set_voltage_simd(Float4::ZERO, c);
                }
                continue;
            }

            self.io
                .output_mut(Self::LPF_OUTPUT)
                .set_voltage_simd(taps.lowpass * 5.0, c);
            self.io
                .output_mut(Self::HPF_OUTPUT)
                .set_voltage_simd(taps.highpass * 5.0, c);
            self.io
                .output_mut(Self::BPF_OUTPUT)
                .set_voltage_simd(taps.bandpass * 5.0, c);
        }

        for id in outputs {
            self.io.output_mut(id).set_channels(channels);
        }

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let knob = self.io.param(Self::FREQ_PARAM);
            self.io
                .light_mut(Self::CUTOFF_LIGHT)
                .set_brightness_smooth(knob, dt);
        }
    }

    fn reset(&mut self) {
        self.state = [[Float4::ZERO; 4]; GROUPS];
    }
}
