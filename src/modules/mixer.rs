//! Mixers, attenuators and amplifiers

use crate::dsp::rescale;
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, Port, ProcessArgs, SignalKind, PORT_MAX_CHANNELS};
use crate::simd::{group_starts, Float4};

pub const MIXER_INPUTS: usize = 6;

/// Six-input polyphonic mixer with a master level
pub struct Mixer {
    io: ModuleIo,
}

impl Mixer {
    pub const LEVEL_PARAM: usize = 0;
    pub const IN_INPUT: usize = 0;
    pub const OUT_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new().param(ParamDef::new("Level", 0.0, 1.0, 1.0).with_unit("%"));
        for i in 1..=MIXER_INPUTS {
            spec = spec.input(format!("Channel {}", i), SignalKind::Audio);
        }
        spec.output("Mix", SignalKind::Audio)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Mixer {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let inputs: [usize; MIXER_INPUTS] = std::array::from_fn(|i| Self::IN_INPUT + i);
        let channels = self.io.max_input_channels(&inputs);
        let gain = self.io.param(Self::LEVEL_PARAM);
        for c in group_starts(channels) {
            let mut out = Float4::ZERO;
            for &i in &inputs {
                out += self.io.input(i).get_voltage_simd(c);
            }
            self.io
                .output_mut(Self::OUT_OUTPUT)
                .set_voltage_simd(out * gain, c);
        }
        self.io.output_mut(Self::OUT_OUTPUT).set_channels(channels);
    }
}

pub const VC_MIXER_CHANNELS: usize = 4;

/// Four-channel mixer with CV over each channel level and the mix level.
///
/// Knob levels are squared for a perceptual taper; CVs scale linearly from
/// 0 to 10 V.
pub struct VcMixer {
    io: ModuleIo,
}

impl VcMixer {
    pub const MIX_LEVEL_PARAM: usize = 0;
    pub const LEVEL_PARAM: usize = 1;

    pub const MIX_CV_INPUT: usize = 0;
    pub const CH_INPUT: usize = 1;
    pub const CV_INPUT: usize = 1 + VC_MIXER_CHANNELS;

    pub const MIX_OUTPUT: usize = 0;
    pub const CH_OUTPUT: usize = 1;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new().param(ParamDef::new("Mix level", 0.0, 1.0, 1.0));
        for i in 1..=VC_MIXER_CHANNELS {
            spec = spec.param(ParamDef::new(format!("Channel {} level", i), 0.0, 1.0, 1.0));
        }
        spec = spec.input("Mix CV", SignalKind::CvUnipolar);
        for i in 1..=VC_MIXER_CHANNELS {
            spec = spec.input(format!("Channel {}", i), SignalKind::Audio);
        }
        for i in 1..=VC_MIXER_CHANNELS {
            spec = spec.input(format!("Channel {} CV", i), SignalKind::CvUnipolar);
        }
        spec = spec.output("Mix", SignalKind::Audio);
        for i in 1..=VC_MIXER_CHANNELS {
            spec = spec.output(format!("Channel {}", i), SignalKind::Audio);
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }

    fn cv_gain(&self, input: usize, c: usize) -> Float4 {
        let port = self.io.input(input);
        if port.is_connected() {
            (port.get_poly_voltage_simd(c) / 10.0).clamp(0.0, 1.0)
        } else {
            Float4::splat(1.0)
        }
    }
}

impl Default for VcMixer {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for VcMixer {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let inputs: [usize; VC_MIXER_CHANNELS] = std::array::from_fn(|i| Self::CH_INPUT + i);
        let channels = self.io.max_input_channels(&inputs);
        for c in group_starts(channels) {
            let mut mix = Float4::ZERO;
            for i in 0..VC_MIXER_CHANNELS {
                let level = self.io.param(Self::LEVEL_PARAM + i);
                let ch = self.io.input(Self::CH_INPUT + i).get_poly_voltage_simd(c)
                    * (level * level)
                    * self.cv_gain(Self::CV_INPUT + i, c);
                self.io.output_mut(Self::CH_OUTPUT + i).set_voltage_simd(ch, c);
                mix += ch;
            }
            mix = mix * self.io.param(Self::MIX_LEVEL_PARAM) * self.cv_gain(Self::MIX_CV_INPUT, c);
            self.io.output_mut(Self::MIX_OUTPUT).set_voltage_simd(mix, c);
        }
        for i in 0..VC_MIXER_CHANNELS {
            self.io.output_mut(Self::CH_OUTPUT + i).set_channels(channels);
        }
        self.io.output_mut(Self::MIX_OUTPUT).set_channels(channels);
    }
}

const EXP_BASE: f32 = 50.0;

/// Exponential response of a 0..1 control, 0 at 0 and 1 at 1
#[inline]
pub fn exponential_gain(x: f32) -> f32 {
    rescale(EXP_BASE.powf(x.clamp(0.0, 1.0)), 1.0, EXP_BASE, 0.0, 1.0)
}

/// Dual amplifier with linear and exponential CV per channel
pub struct Vca {
    io: ModuleIo,
}

impl Vca {
    pub const LEVEL1_PARAM: usize = 0;
    pub const LEVEL2_PARAM: usize = 1;

    pub const EXP1_INPUT: usize = 0;
    pub const LIN1_INPUT: usize = 1;
    pub const IN1_INPUT: usize = 2;
    pub const EXP2_INPUT: usize = 3;
    pub const LIN2_INPUT: usize = 4;
    pub const IN2_INPUT: usize = 5;

    pub const OUT1_OUTPUT: usize = 0;
    pub const OUT2_OUTPUT: usize = 1;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::new("Channel 1 level", 0.0, 1.0, 1.0))
            .param(ParamDef::new("Channel 2 level", 0.0, 1.0, 1.0));
        for ch in 1..=2 {
            spec = spec
                .input(format!("Channel {} exponential CV", ch), SignalKind::CvUnipolar)
                .input(format!("Channel {} linear CV", ch), SignalKind::CvUnipolar)
                .input(format!("Channel {}", ch), SignalKind::Audio);
        }
        spec.output("Channel 1", SignalKind::Audio)
            .output("Channel 2", SignalKind::Audio)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }

    fn process_channel(&mut self, level: usize, lin: usize, exp: usize, input: usize, output: usize) {
        let channels = self.io.max_input_channels(&[input]);
        let level = self.io.param(level);
        let lin = *self.io.input(lin);
        let exp = *self.io.input(exp);
        let input = *self.io.input(input);
        let out = self.io.output_mut(output);
        for c in 0..channels {
            let mut v = input.get_voltage(c) * level;
            if lin.is_connected() {
                v *= (lin.get_poly_voltage(c) / 10.0).clamp(0.0, 1.0);
            }
            if exp.is_connected() {
                v *= exponential_gain(exp.get_poly_voltage(c) / 10.0);
            }
            out.set_voltage(v, c);
        }
        out.set_channels(channels);
    }
}

impl Default for Vca {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Vca {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        self.process_channel(
            Self::LEVEL1_PARAM,
            Self::LIN1_INPUT,
            Self::EXP1_INPUT,
            Self::IN1_INPUT,
            Self::OUT1_OUTPUT,
        );
        self.process_channel(
            Self::LEVEL2_PARAM,
            Self::LIN2_INPUT,
            Self::EXP2_INPUT,
            Self::IN2_INPUT,
            Self::OUT2_OUTPUT,
        );
    }
}

/// Single polyphonic amplifier with a linear or quartic CV response
pub struct Vca1 {
    io: ModuleIo,
    last_gains: [f32; PORT_MAX_CHANNELS],
    last_channels: usize,
}

impl Vca1 {
    pub const LEVEL_PARAM: usize = 0;
    /// 0 selects the exponential response
    pub const EXP_PARAM: usize = 1;

    pub const CV_INPUT: usize = 0;
    pub const IN_INPUT: usize = 1;

    pub const OUT_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Level", 0.0, 1.0, 1.0))
            .param(ParamDef::switch("Response mode", 0.0, 1.0, 1.0))
            .input("CV", SignalKind::CvUnipolar)
            .input("Channel", SignalKind::Audio)
            .output("Channel", SignalKind::Audio)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            last_gains: [0.0; PORT_MAX_CHANNELS],
            last_channels: 1,
        }
    }

    /// Gains applied on the last frame, one per active channel
    pub fn gains(&self) -> &[f32] {
        &self.last_gains[..self.last_channels]
    }

    pub fn gain(level: f32, cv: Option<f32>, exponential: bool) -> f32 {
        match cv {
            Some(cv) => {
                let cv = (cv / 10.0).clamp(0.0, 1.0);
                level * if exponential { cv.powi(4) } else { cv }
            }
            None => level,
        }
    }
}

impl Default for Vca1 {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Vca1 {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::IN_INPUT, Self::CV_INPUT]);
        let level = self.io.param(Self::LEVEL_PARAM);
        let exponential = self.io.param(Self::EXP_PARAM) as i32 == 0;
        let cv = *self.io.input(Self::CV_INPUT);
        let input = *self.io.input(Self::IN_INPUT);
        let out = self.io.output_mut(Self::OUT_OUTPUT);
        for c in 0..channels {
            let cv = cv.is_connected().then(|| cv.get_poly_voltage(c));
            let gain = Self::gain(level, cv, exponential);
            out.set_voltage(input.get_poly_voltage(c) * gain, c);
            self.last_gains[c] = gain;
        }
        out.set_channels(channels);
        self.last_channels = channels;
    }
}

pub const CV_MIX_INPUTS: usize = 3;

/// Three attenuverted CVs summed; the first is normalled to 10 V so it acts
/// as an offset when unpatched.
pub struct CvMix {
    io: ModuleIo,
}

impl CvMix {
    pub const LEVEL_PARAM: usize = 0;
    pub const CV_INPUT: usize = 0;
    pub const MIX_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new();
        for i in 1..=CV_MIX_INPUTS {
            spec = spec.param(ParamDef::new(format!("Level {}", i), -1.0, 1.0, 0.0).with_unit("%"));
        }
        for i in 1..=CV_MIX_INPUTS {
            spec = spec.input(format!("CV {}", i), SignalKind::CvBipolar);
        }
        spec.output("Mix", SignalKind::CvBipolar)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }
}

impl Default for CvMix {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for CvMix {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        if !self.io.output(Self::MIX_OUTPUT).is_connected() {
            return;
        }
        let inputs: [usize; CV_MIX_INPUTS] = std::array::from_fn(|i| Self::CV_INPUT + i);
        let channels = self.io.max_input_channels(&inputs);
        for c in group_starts(channels) {
            let mut mix = Float4::ZERO;
            for i in 0..CV_MIX_INPUTS {
                let input = self.io.input(Self::CV_INPUT + i);
                let cv = if i == 0 {
                    input.get_normal_poly_voltage_simd(10.0, c)
                } else {
                    input.get_poly_voltage_simd(c)
                };
                mix += cv * self.io.param(Self::LEVEL_PARAM + i);
            }
            self.io.output_mut(Self::MIX_OUTPUT).set_voltage_simd(mix, c);
        }
        self.io.output_mut(Self::MIX_OUTPUT).set_channels(channels);
    }
}

pub const EIGHT_VERT_ROWS: usize = 8;

/// Eight attenuverters. Each unpatched input takes the signal of the row
/// above; the first row is normalled to 10 V.
pub struct EightVert {
    io: ModuleIo,
}

impl EightVert {
    pub const GAIN_PARAM: usize = 0;
    pub const IN_INPUT: usize = 0;
    pub const OUT_OUTPUT: usize = 0;
    /// Positive and negative light per row
    pub const OUT_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new();
        for i in 1..=EIGHT_VERT_ROWS {
            spec = spec.param(ParamDef::new(format!("Row {} gain", i), -1.0, 1.0, 0.0));
        }
        for i in 1..=EIGHT_VERT_ROWS {
            spec = spec.input(format!("Row {}", i), SignalKind::CvBipolar);
        }
        for i in 1..=EIGHT_VERT_ROWS {
            spec = spec.output(format!("Row {}", i), SignalKind::CvBipolar);
        }
        for i in 1..=EIGHT_VERT_ROWS {
            spec = spec
                .light(format!("Row {} positive", i))
                .light(format!("Row {} negative", i));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }
}

impl Default for EightVert {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for EightVert {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let mut last: Option<Port> = None;
        for i in 0..EIGHT_VERT_ROWS {
            let input = *self.io.input(Self::IN_INPUT + i);
            if input.is_connected() {
                last = Some(input);
            }
            let gain = self.io.param(Self::GAIN_PARAM + i);
            let channels = last.map_or(1, |p| p.channels());
            let out = self.io.output_mut(Self::OUT_OUTPUT + i);
            for c in 0..channels {
                let v = last.map_or(10.0, |p| p.get_voltage(c));
                out.set_voltage(v * gain, c);
            }
            out.set_channels(channels);

            let first = out.get_voltage(0);
            self.io
                .light_mut(Self::OUT_LIGHT + 2 * i)
                .set_brightness_smooth((first / 5.0).max(0.0), args.sample_time);
            self.io
                .light_mut(Self::OUT_LIGHT + 2 * i + 1)
                .set_brightness_smooth((-first / 5.0).max(0.0), args.sample_time);
        }
    }
}

pub const UNITY_GROUP_INPUTS: usize = 6;

/// Two unity-gain six-input mixers with inverted outputs.
///
/// Either group can average its patched inputs instead of summing them, and
/// the two groups can be merged into one twelve-input mix.
pub struct Unity {
    io: ModuleIo,
    merge: bool,
}

impl Unity {
    pub const AVG1_PARAM: usize = 0;
    pub const AVG2_PARAM: usize = 1;

    pub const IN1_INPUT: usize = 0;
    pub const IN2_INPUT: usize = UNITY_GROUP_INPUTS;

    pub const MIX1_OUTPUT: usize = 0;
    pub const INV1_OUTPUT: usize = 1;
    pub const MIX2_OUTPUT: usize = 2;
    pub const INV2_OUTPUT: usize = 3;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::switch("Group 1 average", 0.0, 1.0, 0.0))
            .param(ParamDef::switch("Group 2 average", 0.0, 1.0, 0.0));
        for group in 1..=2 {
            for i in 1..=UNITY_GROUP_INPUTS {
                spec = spec.input(format!("Group {} input {}", group, i), SignalKind::Audio);
            }
        }
        for group in 1..=2 {
            spec = spec
                .output(format!("Group {} mix", group), SignalKind::Audio)
                .output(format!("Group {} inverted", group), SignalKind::Audio);
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            merge: false,
        }
    }

    pub fn is_merged(&self) -> bool {
        self.merge
    }

    pub fn set_merge(&mut self, merge: bool) {
        self.merge = merge;
    }
}

impl Default for Unity {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Unity {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let mut mix = [0.0f32; 2];
        let mut count = [0u32; 2];
        for (group, (m, n)) in mix.iter_mut().zip(&mut count).enumerate() {
            for j in 0..UNITY_GROUP_INPUTS {
                let input = self.io.input(Self::IN1_INPUT + UNITY_GROUP_INPUTS * group + j);
                if input.is_connected() {
                    *m += input.get_voltage(0);
                    *n += 1;
                }
            }
        }
        if self.merge {
            mix = [mix[0] + mix[1]; 2];
            count = [count[0] + count[1]; 2];
        }
        for group in 0..2 {
            let average = self.io.param(Self::AVG1_PARAM + group).round() as i32 == 1;
            if average && count[group] > 0 {
                mix[group] /= count[group] as f32;
            }
            self.io
                .output_mut(Self::MIX1_OUTPUT + 2 * group)
                .set_voltage(mix[group], 0);
            self.io
                .output_mut(Self::INV1_OUTPUT + 2 * group)
                .set_voltage(-mix[group], 0);
        }
    }

    fn reset(&mut self) {
        self.merge = false;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bool("merge", self.merge);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.merge = state.get_bool("merge", self.merge);
    }
}

/// Crossfader pan law
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanLaw {
    #[default]
    Linear,
    /// Equal power, -3 dB at the center
    EqualPower,
}

/// Two-input crossfader with mirrored outputs
pub struct Fade {
    io: ModuleIo,
    pan_law: PanLaw,
}

impl Fade {
    pub const CROSSFADE_PARAM: usize = 0;
    pub const CROSSFADE_CV_PARAM: usize = 1;

    pub const CROSSFADE_INPUT: usize = 0;
    pub const IN1_INPUT: usize = 1;
    pub const IN2_INPUT: usize = 2;

    pub const OUT1_OUTPUT: usize = 0;
    pub const OUT2_OUTPUT: usize = 1;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Crossfade", 0.0, 1.0, 0.5).with_unit("%"))
            .param(ParamDef::new("Crossfade CV", -1.0, 1.0, 0.0).with_unit("%"))
            .input("Crossfade", SignalKind::CvUnipolar)
            .input("Input 1", SignalKind::Audio)
            .input("Input 2", SignalKind::Audio)
            .output("Output 1", SignalKind::Audio)
            .output("Output 2", SignalKind::Audio)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            pan_law: PanLaw::Linear,
        }
    }

    pub fn pan_law(&self) -> PanLaw {
        self.pan_law
    }

    pub fn set_pan_law(&mut self, pan_law: PanLaw) {
        self.pan_law = pan_law;
    }
}

impl Default for Fade {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Fade {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        if !self.io.output(Self::OUT1_OUTPUT).is_connected()
            && !self.io.output(Self::OUT2_OUTPUT).is_connected()
        {
            return;
        }
        let channels = self.io.max_input_channels(&[Self::IN1_INPUT, Self::IN2_INPUT]);
        let knob = self.io.param(Self::CROSSFADE_PARAM);
        let cv_amount = self.io.param(Self::CROSSFADE_CV_PARAM);
        for c in group_starts(channels) {
            let cv = self.io.input(Self::CROSSFADE_INPUT).get_poly_voltage_simd(c);
            let mut fade = (cv / 10.0 * cv_amount + knob).clamp(0.0, 1.0);
            let mut fade1 = 1.0 - fade;
            if self.pan_law == PanLaw::EqualPower {
                fade = fade.sqrt();
                fade1 = fade1.sqrt();
            }
            let in1 = self.io.input(Self::IN1_INPUT).get_poly_voltage_simd(c);
            let in2 = self.io.input(Self::IN2_INPUT).get_poly_voltage_simd(c);
            self.io
                .output_mut(Self::OUT1_OUTPUT)
                .set_voltage_simd(fade1 * in1 + fade * in2, c);
            self.io
                .output_mut(Self::OUT2_OUTPUT)
                .set_voltage_simd(fade * in1 + fade1 * in2, c);
        }
        self.io.output_mut(Self::OUT1_OUTPUT).set_channels(channels);
        self.io.output_mut(Self::OUT2_OUTPUT).set_channels(channels);
    }

    fn reset(&mut self) {
        self.pan_law = PanLaw::Linear;
    }

    fn save_state(&self, state: &mut StateStore) {
        let law = match self.pan_law {
            PanLaw::Linear => 0,
            PanLaw::EqualPower => 1,
        };
        state.set_i64("panLaw", law);
    }

    fn load_state(&mut self, state: &StateStore) {
        if state.contains("panLaw") {
            self.pan_law = match state.get_i64("panLaw", 0) {
                1 => PanLaw::EqualPower,
                _ => PanLaw::Linear,
            };
        }
    }
}

/// Stereo mid/side encoder and decoder with width control
pub struct MidSide {
    io: ModuleIo,
}

impl MidSide {
    pub const ENC_WIDTH_PARAM: usize = 0;
    pub const DEC_WIDTH_PARAM: usize = 1;

    pub const ENC_WIDTH_INPUT: usize = 0;
    pub const ENC_LEFT_INPUT: usize = 1;
    pub const ENC_RIGHT_INPUT: usize = 2;
    pub const DEC_WIDTH_INPUT: usize = 3;
    pub const DEC_MID_INPUT: usize = 4;
    pub const DEC_SIDES_INPUT: usize = 5;

    pub const ENC_MID_OUTPUT: usize = 0;
    pub const ENC_SIDES_OUTPUT: usize = 1;
    pub const DEC_LEFT_OUTPUT: usize = 2;
    pub const DEC_RIGHT_OUTPUT: usize = 3;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Encoder width", 0.0, 2.0, 1.0).with_unit("%"))
            .param(ParamDef::new("Decoder width", 0.0, 2.0, 1.0).with_unit("%"))
            .input("Encoder width", SignalKind::CvUnipolar)
            .input("Encoder left", SignalKind::Audio)
            .input("Encoder right", SignalKind::Audio)
            .input("Decoder width", SignalKind::CvUnipolar)
            .input("Decoder mid", SignalKind::Audio)
            .input("Decoder sides", SignalKind::Audio)
            .output("Encoder mid", SignalKind::Audio)
            .output("Encoder sides", SignalKind::Audio)
            .output("Decoder left", SignalKind::Audio)
            .output("Decoder right", SignalKind::Audio)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }

    fn width(&self, param: usize, input: usize, c: usize) -> Float4 {
        let cv = self.io.input(input).get_poly_voltage_simd(c);
        (cv / 10.0 * 2.0 + self.io.param(param)).max(Float4::ZERO)
    }
}

impl Default for MidSide {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for MidSide {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let channels = self
            .io
            .max_input_channels(&[Self::ENC_LEFT_INPUT, Self::ENC_RIGHT_INPUT]);
        for c in group_starts(channels) {
            let width = self.width(Self::ENC_WIDTH_PARAM, Self::ENC_WIDTH_INPUT, c);
            let left = self.io.input(Self::ENC_LEFT_INPUT).get_voltage_simd(c);
            let right = self.io.input(Self::ENC_RIGHT_INPUT).get_voltage_simd(c);
            self.io
                .output_mut(Self::ENC_MID_OUTPUT)
                .set_voltage_simd((left + right) / 2.0, c);
            self.io
                .output_mut(Self::ENC_SIDES_OUTPUT)
                .set_voltage_simd((left - right) / 2.0 * width, c);
        }
        self.io.output_mut(Self::ENC_MID_OUTPUT).set_channels(channels);
        self.io.output_mut(Self::ENC_SIDES_OUTPUT).set_channels(channels);

        let channels = self
            .io
            .max_input_channels(&[Self::DEC_MID_INPUT, Self::DEC_SIDES_INPUT]);
        for c in group_starts(channels) {
            let width = self.width(Self::DEC_WIDTH_PARAM, Self::DEC_WIDTH_INPUT, c);
            let mid = self.io.input(Self::DEC_MID_INPUT).get_voltage_simd(c);
            let sides = self.io.input(Self::DEC_SIDES_INPUT).get_voltage_simd(c) * width;
            self.io
                .output_mut(Self::DEC_LEFT_OUTPUT)
                .set_voltage_simd(mid + sides, c);
            self.io
                .output_mut(Self::DEC_RIGHT_OUTPUT)
                .set_voltage_simd(mid - sides, c);
        }
        self.io.output_mut(Self::DEC_LEFT_OUTPUT).set_channels(channels);
        self.io.output_mut(Self::DEC_RIGHT_OUTPUT).set_channels(channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn patch(io: &mut ModuleIo, input: usize, voltages: &[f32]) {
        let port = io.input_mut(input);
        port.connect(voltages.len());
        port.write_voltages(voltages);
    }

    #[test]
    fn test_mixer_sums_polyphonic_inputs() {
        let mut mixer = Mixer::default();
        patch(mixer.io_mut(), 0, &[1.0, 2.0]);
        patch(mixer.io_mut(), 3, &[0.5, 0.5, 0.5]);
        mixer.io_mut().output_mut(Mixer::OUT_OUTPUT).connect(1);
        mixer.io_mut().set_param(Mixer::LEVEL_PARAM, 0.5);
        mixer.process(&ProcessArgs::default());
        let out = mixer.io().output(Mixer::OUT_OUTPUT);
        assert_eq!(out.channels(), 3);
        assert_abs_diff_eq!(out.get_voltage(0), 0.75);
        assert_abs_diff_eq!(out.get_voltage(1), 1.25);
        assert_abs_diff_eq!(out.get_voltage(2), 0.25);
    }

    #[test]
    fn test_vc_mixer_levels_and_cv() {
        let mut mixer = VcMixer::default();
        patch(mixer.io_mut(), VcMixer::CH_INPUT, &[4.0]);
        patch(mixer.io_mut(), VcMixer::CH_INPUT + 1, &[2.0]);
        patch(mixer.io_mut(), VcMixer::CV_INPUT + 1, &[5.0]);
        patch(mixer.io_mut(), VcMixer::MIX_CV_INPUT, &[20.0]);
        mixer.io_mut().set_param(VcMixer::LEVEL_PARAM, 0.5);
        mixer.process(&ProcessArgs::default());
        // Squared knob: 4 V at level 0.5 gives 1 V
        assert_abs_diff_eq!(mixer.io().output(VcMixer::CH_OUTPUT).get_voltage(0), 1.0);
        assert_abs_diff_eq!(mixer.io().output(VcMixer::CH_OUTPUT + 1).get_voltage(0), 1.0);
        // Mix CV over 10 V is clamped to unity
        assert_abs_diff_eq!(mixer.io().output(VcMixer::MIX_OUTPUT).get_voltage(0), 2.0);
    }

    #[test]
    fn test_exponential_gain_endpoints() {
        assert_abs_diff_eq!(exponential_gain(0.0), 0.0);
        assert_abs_diff_eq!(exponential_gain(1.0), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(exponential_gain(0.5), (50f32.sqrt() - 1.0) / 49.0, epsilon = 1e-6);
        assert!(exponential_gain(0.5) < 0.5);
    }

    #[test]
    fn test_vca_linear_and_exponential_cv() {
        let mut vca = Vca::default();
        patch(vca.io_mut(), Vca::IN1_INPUT, &[8.0, -8.0]);
        patch(vca.io_mut(), Vca::LIN1_INPUT, &[5.0]);
        patch(vca.io_mut(), Vca::IN2_INPUT, &[8.0]);
        patch(vca.io_mut(), Vca::EXP2_INPUT, &[10.0]);
        vca.io_mut().output_mut(Vca::OUT1_OUTPUT).connect(1);
        vca.process(&ProcessArgs::default());
        assert_eq!(vca.io().output(Vca::OUT1_OUTPUT).channels(), 2);
        assert_abs_diff_eq!(vca.io().output(Vca::OUT1_OUTPUT).get_voltage(0), 4.0);
        assert_abs_diff_eq!(vca.io().output(Vca::OUT1_OUTPUT).get_voltage(1), -4.0);
        assert_abs_diff_eq!(vca.io().output(Vca::OUT2_OUTPUT).get_voltage(0), 8.0, epsilon = 1e-5);
    }

    #[test]
    fn test_cv_mix_first_input_normalled() {
        let mut mix = CvMix::default();
        mix.io_mut().output_mut(CvMix::MIX_OUTPUT).connect(1);
        mix.io_mut().set_param(CvMix::LEVEL_PARAM, 0.3);
        mix.io_mut().set_param(CvMix::LEVEL_PARAM + 2, -1.0);
        patch(mix.io_mut(), CvMix::CV_INPUT + 2, &[2.0]);
        mix.process(&ProcessArgs::default());
        assert_abs_diff_eq!(mix.io().output(CvMix::MIX_OUTPUT).get_voltage(0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_eight_vert_normalling_chain() {
        let mut vert = EightVert::default();
        for i in 0..EIGHT_VERT_ROWS {
            vert.io_mut().set_param(EightVert::GAIN_PARAM + i, 0.5);
        }
        patch(vert.io_mut(), EightVert::IN_INPUT + 4, &[-2.0, 6.0]);
        vert.process(&ProcessArgs::default());
        assert_abs_diff_eq!(vert.io().output(0).get_voltage(0), 5.0);
        assert_abs_diff_eq!(vert.io().output(3).get_voltage(0), 5.0);
        assert_abs_diff_eq!(vert.io().output(4).get_voltage(0), -1.0);
        assert_abs_diff_eq!(vert.io().output(7).get_voltage(1), 3.0);
        assert!(vert.io().lights[EightVert::OUT_LIGHT + 1].brightness() == 0.0);
        assert!(vert.io().lights[EightVert::OUT_LIGHT + 2 * 4 + 1].brightness() > 0.0);
    }

    #[test]
    fn test_unity_average_and_merge() {
        let mut unity = Unity::default();
        patch(unity.io_mut(), Unity::IN1_INPUT, &[2.0]);
        patch(unity.io_mut(), Unity::IN1_INPUT + 1, &[4.0]);
        patch(unity.io_mut(), Unity::IN2_INPUT, &[3.0]);
        unity.process(&ProcessArgs::default());
        assert_abs_diff_eq!(unity.io().output(Unity::MIX1_OUTPUT).get_voltage(0), 6.0);
        assert_abs_diff_eq!(unity.io().output(Unity::INV1_OUTPUT).get_voltage(0), -6.0);

        unity.io_mut().set_param(Unity::AVG1_PARAM, 1.0);
        unity.process(&ProcessArgs::default());
        assert_abs_diff_eq!(unity.io().output(Unity::MIX1_OUTPUT).get_voltage(0), 3.0);

        unity.set_merge(true);
        unity.process(&ProcessArgs::default());
        assert_abs_diff_eq!(unity.io().output(Unity::MIX1_OUTPUT).get_voltage(0), 3.0);
        assert_abs_diff_eq!(unity.io().output(Unity::MIX2_OUTPUT).get_voltage(0), 9.0);

        let mut state = StateStore::new();
        unity.save_state(&mut state);
        let mut restored = Unity::default();
        restored.load_state(&state);
        assert!(restored.is_merged());
    }

    #[test]
    fn test_fade_pan_laws() {
        let mut fade = Fade::default();
        patch(fade.io_mut(), Fade::IN1_INPUT, &[1.0]);
        patch(fade.io_mut(), Fade::IN2_INPUT, &[0.0]);
        fade.io_mut().output_mut(Fade::OUT1_OUTPUT).connect(1);
        fade.process(&ProcessArgs::default());
        assert_abs_diff_eq!(fade.io().output(Fade::OUT1_OUTPUT).get_voltage(0), 0.5);

        fade.set_pan_law(PanLaw::EqualPower);
        fade.process(&ProcessArgs::default());
        assert_abs_diff_eq!(
            fade.io().output(Fade::OUT1_OUTPUT).get_voltage(0),
            0.5f32.sqrt(),
            epsilon = 1e-6
        );

        // Full CV pushes the fade all the way to input 2
        patch(fade.io_mut(), Fade::CROSSFADE_INPUT, &[10.0]);
        fade.io_mut().set_param(Fade::CROSSFADE_CV_PARAM, 1.0);
        fade.process(&ProcessArgs::default());
        assert_abs_diff_eq!(fade.io().output(Fade::OUT1_OUTPUT).get_voltage(0), 0.0);
        assert_abs_diff_eq!(fade.io().output(Fade::OUT2_OUTPUT).get_voltage(0), 1.0);

        let mut state = StateStore::new();
        fade.save_state(&mut state);
        let mut restored = Fade::default();
        restored.load_state(&state);
        assert_eq!(restored.pan_law(), PanLaw::EqualPower);
    }

    #[test]
    fn test_mid_side_round_trip_at_unity_width() {
        let mut encoder = MidSide::default();
        patch(encoder.io_mut(), MidSide::ENC_LEFT_INPUT, &[3.0, -1.0]);
        patch(encoder.io_mut(), MidSide::ENC_RIGHT_INPUT, &[1.0, 1.0]);
        encoder.io_mut().output_mut(MidSide::ENC_MID_OUTPUT).connect(1);
        encoder.io_mut().output_mut(MidSide::ENC_SIDES_OUTPUT).connect(1);
        encoder.process(&ProcessArgs::default());
        let mid: Vec<f32> = encoder.io().output(MidSide::ENC_MID_OUTPUT).voltages().to_vec();
        let sides: Vec<f32> = encoder.io().output(MidSide::ENC_SIDES_OUTPUT).voltages().to_vec();
        assert_eq!(mid, vec![2.0, 0.0]);
        assert_eq!(sides, vec![1.0, -1.0]);

        patch(encoder.io_mut(), MidSide::DEC_MID_INPUT, &mid);
        patch(encoder.io_mut(), MidSide::DEC_SIDES_INPUT, &sides);
        encoder.io_mut().output_mut(MidSide::DEC_LEFT_OUTPUT).connect(1);
        encoder.io_mut().output_mut(MidSide::DEC_RIGHT_OUTPUT).connect(1);
        encoder.process(&ProcessArgs::default());
        assert_eq!(encoder.io().output(MidSide::DEC_LEFT_OUTPUT).voltages(), &[3.0, -1.0]);
        assert_eq!(encoder.io().output(MidSide::DEC_RIGHT_OUTPUT).voltages(), &[1.0, 1.0]);
    }

    #[test]
    fn test_mid_side_width_cv_never_negative() {
        let mut ms = MidSide::default();
        patch(ms.io_mut(), MidSide::ENC_LEFT_INPUT, &[2.0]);
        patch(ms.io_mut(), MidSide::ENC_WIDTH_INPUT, &[-10.0]);
        ms.process(&ProcessArgs::default());
        assert_abs_diff_eq!(ms.io().output(MidSide::ENC_SIDES_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_vca1_response_curves() {
        let mut vca = Vca1::default();
        patch(vca.io_mut(), Vca1::IN_INPUT, &[10.0]);
        patch(vca.io_mut(), Vca1::CV_INPUT, &[5.0, 12.0, -3.0]);
        vca.io_mut().output_mut(Vca1::OUT_OUTPUT).connect(1);
        vca.process(&ProcessArgs::default());
        let out = vca.io().output(Vca1::OUT_OUTPUT);
        assert_eq!(out.channels(), 3);
        // Mono input is spread across the CV channels
        assert_abs_diff_eq!(out.get_voltage(0), 5.0);
        assert_abs_diff_eq!(out.get_voltage(1), 10.0);
        assert_abs_diff_eq!(out.get_voltage(2), 0.0);
        assert_eq!(vca.gains().len(), 3);

        vca.io_mut().set_param(Vca1::EXP_PARAM, 0.0);
        vca.io_mut().set_param(Vca1::LEVEL_PARAM, 0.5);
        vca.process(&ProcessArgs::default());
        assert_abs_diff_eq!(vca.gains()[0], 0.5 * 0.0625);
        assert_abs_diff_eq!(vca.io().output(Vca1::OUT_OUTPUT).get_voltage(0), 0.3125);
    }

    #[test]
    fn test_vca1_level_without_cv() {
        let mut vca = Vca1::default();
        patch(vca.io_mut(), Vca1::IN_INPUT, &[4.0, -4.0]);
        vca.io_mut().set_param(Vca1::LEVEL_PARAM, 0.25);
        vca.process(&ProcessArgs::default());
        assert_abs_diff_eq!(vca.io().output(Vca1::OUT_OUTPUT).get_voltage(1), -1.0);
        assert_eq!(vca.gains(), &[0.25, 0.25]);
    }
}
