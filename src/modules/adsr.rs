//! ADSR Envelope Generator
//!
//! Every stage is an exponential approach toward a target at a per-stage
//! rate. Attack aims past full scale (1.2) so it reaches 1.0 in finite time,
//! at which point the decay stage takes over and settles on the sustain
//! level. Stage rates are recomputed from the knobs and CV every 16 frames.

use crate::dsp::{ClockDivider, SchmittTrigger4};
use crate::persist::EngineSettings;
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind};
use crate::simd::{group_starts, Float4, Mask4, GROUPS, LANES};

/// Shortest stage time in seconds (knob at 0)
pub const MIN_TIME: f32 = 1e-3;
/// Longest stage time in seconds (knob at 1)
pub const MAX_TIME: f32 = 10.0;
const LAMBDA_BASE: f32 = MAX_TIME / MIN_TIME;
const ATTACK_TARGET: f32 = 1.2;

/// Stage rate in 1/s for a normalized time knob
#[inline]
fn stage_lambda(x: Float4) -> Float4 {
    Float4::pow_base(LAMBDA_BASE, -x) * (1.0 / MIN_TIME)
}

/// Polyphonic exponential ADSR
pub struct Adsr {
    io: ModuleIo,
    attacking: [Mask4; GROUPS],
    gate: [Mask4; GROUPS],
    env: [Float4; GROUPS],
    attack_lambda: [Float4; GROUPS],
    decay_lambda: [Float4; GROUPS],
    release_lambda: [Float4; GROUPS],
    sustain: [Float4; GROUPS],
    retrigger: [SchmittTrigger4; GROUPS],
    cv_divider: ClockDivider,
    light_divider: ClockDivider,
    coefficients_stale: bool,
}

impl Adsr {
    pub const ATTACK_PARAM: usize = 0;
    pub const DECAY_PARAM: usize = 1;
    pub const SUSTAIN_PARAM: usize = 2;
    pub const RELEASE_PARAM: usize = 3;
    pub const ATTACK_CV_PARAM: usize = 4;
    pub const DECAY_CV_PARAM: usize = 5;
    pub const SUSTAIN_CV_PARAM: usize = 6;
    pub const RELEASE_CV_PARAM: usize = 7;
    pub const PUSH_PARAM: usize = 8;

    pub const ATTACK_INPUT: usize = 0;
    pub const DECAY_INPUT: usize = 1;
    pub const SUSTAIN_INPUT: usize = 2;
    pub const RELEASE_INPUT: usize = 3;
    pub const GATE_INPUT: usize = 4;
    pub const RETRIG_INPUT: usize = 5;

    pub const ENVELOPE_OUTPUT: usize = 0;

    pub const ATTACK_LIGHT: usize = 0;
    pub const DECAY_LIGHT: usize = 1;
    pub const SUSTAIN_LIGHT: usize = 2;
    pub const RELEASE_LIGHT: usize = 3;
    pub const PUSH_LIGHT: usize = 4;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Attack", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Decay", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Sustain", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Release", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Attack CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Decay CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Sustain CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Release CV", -1.0, 1.0, 0.0))
            .param(ParamDef::button("Push"))
            .input("Attack", SignalKind::CvUnipolar)
            .input("Decay", SignalKind::CvUnipolar)
            .input("Sustain", SignalKind::CvUnipolar)
            .input("Release", SignalKind::CvUnipolar)
            .input("Gate", SignalKind::Gate)
            .input("Retrigger", SignalKind::Trigger)
            .output("Envelope", SignalKind::CvUnipolar)
            .light("Attack")
            .light("Decay")
            .light("Sustain")
            .light("Release")
            .light("Push")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            attacking: [Mask4::ALL; GROUPS],
            gate: [Mask4::NONE; GROUPS],
            env: [Float4::ZERO; GROUPS],
            attack_lambda: [Float4::ZERO; GROUPS],
            decay_lambda: [Float4::ZERO; GROUPS],
            release_lambda: [Float4::ZERO; GROUPS],
            sustain: [Float4::ZERO; GROUPS],
            retrigger: [SchmittTrigger4::default(); GROUPS],
            cv_divider: ClockDivider::new(16),
            light_divider: ClockDivider::new(128),
            coefficients_stale: true,
        }
    }

    /// Envelope level of `channel`, 0 to about 1
    pub fn envelope(&self, channel: usize) -> f32 {
        self.env[channel / LANES][channel % LANES]
    }

    fn knob(&self, c: usize, param: usize, cv_param: usize, input: usize) -> Float4 {
        let cv = self.io.input(input).get_poly_voltage_simd(c);
        (Float4::splat(self.io.param(param)) + cv * (self.io.param(cv_param) / 10.0))
            .clamp(0.0, 1.0)
    }

    fn update_coefficients(&mut self, channels: usize) {
        for c in group_starts(channels) {
            let g = c / LANES;
            let attack = self.knob(c, Self::ATTACK_PARAM, Self::ATTACK_CV_PARAM, Self::ATTACK_INPUT);
            let decay = self.knob(c, Self::DECAY_PARAM, Self::DECAY_CV_PARAM, Self::DECAY_INPUT);
            let sustain =
                self.knob(c, Self::SUSTAIN_PARAM, Self::SUSTAIN_CV_PARAM, Self::SUSTAIN_INPUT);
            let release =
                self.knob(c, Self::RELEASE_PARAM, Self::RELEASE_CV_PARAM, Self::RELEASE_INPUT);
            self.attack_lambda[g] = stage_lambda(attack);
            self.decay_lambda[g] = stage_lambda(decay);
            self.release_lambda[g] = stage_lambda(release);
            self.sustain[g] = sustain;
        }
    }

    fn update_lights(&mut self, channels: usize, dt: f32, push: bool) {
        let (mut any_attack, mut any_decay, mut any_sustain, mut any_release) =
            (false, false, false, false);
        for c in 0..channels {
            let (g, lane) = (c / LANES, c % LANES);
            let gate = self.gate[g].0[lane];
            let env = self.env[g][lane];
            let sustain = self.sustain[g][lane];
            if gate && self.attacking[g].0[lane] {
                any_attack = true;
            } else if gate && env > sustain + 0.01 {
                any_decay = true;
            } else if gate {
                any_sustain = true;
            } else if env > 0.01 {
                any_release = true;
            }
        }
        let flags = [
            (Self::ATTACK_LIGHT, any_attack),
            (Self::DECAY_LIGHT, any_decay),
            (Self::SUSTAIN_LIGHT, any_sustain),
            (Self::RELEASE_LIGHT, any_release),
            (Self::PUSH_LIGHT, push),
        ];
        for (id, on) in flags {
            self.io
                .light_mut(id)
                .set_brightness_smooth(if on { 1.0 } else { 0.0 }, dt);
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Adsr {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::GATE_INPUT]);

        if self.cv_divider.process() || self.coefficients_stale {
            self.update_coefficients(channels);
            self.coefficients_stale = false;
        }

        let push = self.io.param(Self::PUSH_PARAM) > 0.0;
        for c in group_starts(channels) {
            let g = c / LANES;
            let old_gate = self.gate[g];
            let gate = if push {
                Mask4::ALL
            } else {
                self.io.input(Self::GATE_INPUT).get_voltage_simd(c).ge(1.0)
            };
            self.gate[g] = gate;

            let rising = gate.and(old_gate.not());
            let retriggered = self.retrigger[g]
                .process(self.io.input(Self::RETRIG_INPUT).get_poly_voltage_simd(c));
            let attacking = self.attacking[g].or(rising).or(retriggered).and(gate);

            let target = Float4::select(
                attacking,
                Float4::splat(ATTACK_TARGET),
                Float4::select(gate, self.sustain[g], Float4::ZERO),
            );
            let lambda = Float4::select(
                attacking,
                self.attack_lambda[g],
                Float4::select(gate, self.decay_lambda[g], self.release_lambda[g]),
            );
            let old = self.env[g];
            let mut env = old + (target - old) * lambda * args.sample_time;
            // Attack overshoot is cut at full scale
            env = Float4::select(attacking.and(env.ge(1.0)), env.min(Float4::splat(1.0)), env);
            // A step below f32 resolution would freeze short of the target
            let stalled = attacking.not().and((env - old).abs().le(0.0));
            env = Float4::select(stalled, target, env);
            self.env[g] = env;

            // Full scale ends the attack; a low gate re-arms it
            self.attacking[g] = attacking.and(env.lt(1.0)).or(gate.not());

            self.io
                .output_mut(Self::ENVELOPE_OUTPUT)
                .set_voltage_simd(env * 10.0, c);
        }
        self.io
            .output_mut(Self::ENVELOPE_OUTPUT)
            .set_channels(channels);

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            self.update_lights(channels, dt, push);
        }
    }

    fn reset(&mut self) {
        self.attacking = [Mask4::ALL; GROUPS];
        self.gate = [Mask4::NONE; GROUPS];
        self.env = [Float4::ZERO; GROUPS];
        for t in &mut self.retrigger {
            t.reset();
        }
        self.coefficients_stale = true;
    }

    fn set_sample_rate(&mut self, _sample_rate: f32) {
        self.coefficients_stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adsr() -> Adsr {
        let mut adsr = Adsr::default();
        adsr.io_mut().output_mut(Adsr::ENVELOPE_OUTPUT).connect(1);
        adsr
    }

    fn out(adsr: &Adsr) -> f32 {
        adsr.io().output(Adsr::ENVELOPE_OUTPUT).get_voltage(0)
    }

    #[test]
    fn test_push_scenario() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.0);
        adsr.io_mut().set_param(Adsr::SUSTAIN_PARAM, 1.0);
        adsr.io_mut().set_param(Adsr::PUSH_PARAM, 1.0);
        let args = ProcessArgs::new(44100.0);
        for _ in 0..441 {
            adsr.process(&args);
        }
        assert!(out(&adsr) > 9.5, "after attack {}", out(&adsr));

        adsr.io_mut().set_param(Adsr::PUSH_PARAM, 0.0);
        adsr.io_mut().set_param(Adsr::RELEASE_PARAM, 1.0);
        for _ in 0..44 {
            adsr.process(&args);
        }
        assert!(out(&adsr) > 9.0, "after release {}", out(&adsr));
        assert!(adsr.io().lights[Adsr::PUSH_LIGHT].brightness() >= 0.0);
    }

    #[test]
    fn test_monotone_attack_and_release() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.3);
        let args = ProcessArgs::new(44100.0);
        let gate = Adsr::GATE_INPUT;
        adsr.io_mut().input_mut(gate).connect(1);
        adsr.io_mut().input_mut(gate).set_voltage(10.0, 0);

        let mut last = 0.0;
        while adsr.attacking[0].0[0] {
            adsr.process(&args);
            let v = adsr.envelope(0);
            if !adsr.attacking[0].0[0] {
                break;
            }
            assert!(v >= last, "attack fell {} -> {}", last, v);
            last = v;
        }
        assert!(adsr.envelope(0) >= 1.0);

        adsr.io_mut().input_mut(gate).set_voltage(0.0, 0);
        let mut last = adsr.envelope(0);
        for _ in 0..20_000 {
            adsr.process(&args);
            let v = adsr.envelope(0);
            assert!(v <= last, "release rose {} -> {}", last, v);
            last = v;
        }
    }

    #[test]
    fn test_sustain_boundary() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.0);
        adsr.io_mut().set_param(Adsr::DECAY_PARAM, 1.0);
        adsr.io_mut().set_param(Adsr::SUSTAIN_PARAM, 1.0);
        let sample_rate = 2000.0;
        let args = ProcessArgs::new(sample_rate);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).connect(1);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).set_voltage(10.0, 0);
        let frames = (10.0 * MAX_TIME * sample_rate) as usize;
        for _ in 0..frames {
            adsr.process(&args);
        }
        assert!((adsr.envelope(0) - 1.0).abs() < 1e-3, "env {}", adsr.envelope(0));
    }

    #[test]
    fn test_full_sustain_settles_at_full_scale() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.0);
        adsr.io_mut().set_param(Adsr::DECAY_PARAM, 1.0);
        adsr.io_mut().set_param(Adsr::SUSTAIN_PARAM, 1.0);
        let sample_rate = 44100.0;
        let args = ProcessArgs::new(sample_rate);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).connect(1);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).set_voltage(10.0, 0);
        let mut peak = 0.0f32;
        for _ in 0..(10.0 * MAX_TIME * sample_rate) as usize {
            adsr.process(&args);
            peak = peak.max(adsr.envelope(0));
        }
        assert!(peak <= 1.0, "peak {}", peak);
        assert!((adsr.envelope(0) - 1.0).abs() < 1e-3, "env {}", adsr.envelope(0));
        assert!(out(&adsr) <= 10.0);
    }

    #[test]
    fn test_slow_decay_reaches_sustain() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.0);
        adsr.io_mut().set_param(Adsr::DECAY_PARAM, 1.0);
        adsr.io_mut().set_param(Adsr::SUSTAIN_PARAM, 0.5);
        let sample_rate = 48000.0;
        let args = ProcessArgs::new(sample_rate);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).connect(1);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).set_voltage(10.0, 0);
        for _ in 0..(10.0 * MAX_TIME * sample_rate) as usize {
            adsr.process(&args);
        }
        assert!((adsr.envelope(0) - 0.5).abs() < 1e-3, "env {}", adsr.envelope(0));
    }

    #[test]
    fn test_retrigger_restarts_attack() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::SUSTAIN_PARAM, 0.2);
        adsr.io_mut().set_param(Adsr::DECAY_PARAM, 0.0);
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.0);
        let args = ProcessArgs::new(44100.0);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).connect(1);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).set_voltage(10.0, 0);
        adsr.io_mut().input_mut(Adsr::RETRIG_INPUT).connect(1);
        for _ in 0..4410 {
            adsr.process(&args);
        }
        assert!((adsr.envelope(0) - 0.2).abs() < 0.01);

        adsr.io_mut().input_mut(Adsr::RETRIG_INPUT).set_voltage(10.0, 0);
        adsr.process(&args);
        assert!(adsr.attacking[0].0[0]);
        let mut peak = 0.0f32;
        for _ in 0..200 {
            adsr.process(&args);
            peak = peak.max(adsr.envelope(0));
        }
        assert!(peak >= 1.0, "peak {}", peak);
    }

    #[test]
    fn test_polyphonic_gates() {
        let mut adsr = adsr();
        adsr.io_mut().set_param(Adsr::ATTACK_PARAM, 0.0);
        let args = ProcessArgs::new(44100.0);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).connect(5);
        adsr.io_mut().input_mut(Adsr::GATE_INPUT).set_voltage(10.0, 4);
        for _ in 0..441 {
            adsr.process(&args);
        }
        let env = adsr.io().output(Adsr::ENVELOPE_OUTPUT);
        assert_eq!(env.channels(), 5);
        assert!(env.get_voltage(4) > 5.0);
        assert_eq!(env.get_voltage(0), 0.0);
    }
}
