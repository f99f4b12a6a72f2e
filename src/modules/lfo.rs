//! Low-frequency sources: a classic four-wave LFO and a random voltage
//! generator with selectable interpolation shapes.

use crate::dsp::{rescale, sin2pi_pade_05_5_4, BooleanTrigger, ClockDivider, SchmittTrigger, SchmittTrigger4};
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind, PORT_MAX_CHANNELS};
use crate::rng::Rng;
use crate::simd::{group_starts, GROUPS, LANES};

/// Highest LFO pitch, log2 Hz
const MAX_PITCH: f32 = 8.0;
const MIN_PULSE_WIDTH: f32 = 0.01;

/// The four LFO waves at `phase` in [0, 1), each in [-1, 1] and starting
/// at 0 (square excepted).
pub fn lfo_waves(phase: f32, pulse_width: f32) -> [f32; 4] {
    let sine = sin2pi_pade_05_5_4(phase);
    let tri = if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    };
    let saw = if phase < 0.5 { 2.0 * phase } else { 2.0 * phase - 2.0 };
    let square = if phase < pulse_width { 1.0 } else { -1.0 };
    [sine, tri, saw, square]
}

/// Polyphonic sine/triangle/saw/square LFO
pub struct Lfo {
    io: ModuleIo,
    phase: [f32; PORT_MAX_CHANNELS],
    reset_triggers: [SchmittTrigger; PORT_MAX_CHANNELS],
    light_divider: ClockDivider,
}

impl Lfo {
    pub const OFFSET_PARAM: usize = 0;
    pub const INVERT_PARAM: usize = 1;
    pub const FREQ_PARAM: usize = 2;
    pub const FM1_PARAM: usize = 3;
    pub const FM2_PARAM: usize = 4;
    pub const PW_PARAM: usize = 5;
    pub const PWM_PARAM: usize = 6;

    pub const FM1_INPUT: usize = 0;
    pub const FM2_INPUT: usize = 1;
    pub const RESET_INPUT: usize = 2;
    pub const PW_INPUT: usize = 3;

    pub const SIN_OUTPUT: usize = 0;
    pub const TRI_OUTPUT: usize = 1;
    pub const SAW_OUTPUT: usize = 2;
    pub const SQR_OUTPUT: usize = 3;

    pub const PHASE_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::switch("Offset 0-10V", 0.0, 1.0, 0.0))
            .param(ParamDef::switch("Invert", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Frequency", -8.0, 10.0, 1.0).with_unit("log2 Hz"))
            .param(ParamDef::new("FM 1", 0.0, 1.0, 0.0))
            .param(ParamDef::new("FM 2", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Pulse width", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Pulse width modulation", 0.0, 1.0, 0.0))
            .input("FM 1", SignalKind::CvBipolar)
            .input("FM 2", SignalKind::CvBipolar)
            .input("Reset", SignalKind::Trigger)
            .input("Pulse width", SignalKind::CvUnipolar)
            .output("Sine", SignalKind::CvBipolar)
            .output("Triangle", SignalKind::CvBipolar)
            .output("Sawtooth", SignalKind::CvBipolar)
            .output("Square", SignalKind::CvBipolar)
            .light("Phase")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            phase: [0.0; PORT_MAX_CHANNELS],
            reset_triggers: [SchmittTrigger::default(); PORT_MAX_CHANNELS],
            light_divider: ClockDivider::new(16),
        }
    }

    pub fn phase(&self, channel: usize) -> f32 {
        self.phase[channel]
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Lfo {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[
            Self::FM1_INPUT,
            Self::FM2_INPUT,
            Self::RESET_INPUT,
            Self::PW_INPUT,
        ]);
        let offset = if self.io.param(Self::OFFSET_PARAM) > 0.0 { 5.0 } else { 0.0 };
        let factor = if self.io.param(Self::INVERT_PARAM) > 0.0 { -5.0 } else { 5.0 };

        for c in 0..channels {
            let reset = self.io.input(Self::RESET_INPUT).get_poly_voltage(c);
            if self.reset_triggers[c].process_with(reset, 0.1, 2.0) {
                self.phase[c] = 0.0;
            }

            let pitch = (self.io.param(Self::FREQ_PARAM)
                + self.io.param(Self::FM1_PARAM) * self.io.input(Self::FM1_INPUT).get_poly_voltage(c)
                + self.io.param(Self::FM2_PARAM) * self.io.input(Self::FM2_INPUT).get_poly_voltage(c))
            .min(MAX_PITCH);
            let pw = (self.io.param(Self::PW_PARAM)
                + self.io.param(Self::PWM_PARAM) * self.io.input(Self::PW_INPUT).get_poly_voltage(c) / 10.0)
                .clamp(MIN_PULSE_WIDTH, 1.0 - MIN_PULSE_WIDTH);

            let delta = (pitch.exp2() * args.sample_time).min(0.5);
            let mut phase = self.phase[c] + delta;
            if phase >= 1.0 {
                phase -= 1.0;
            }
            self.phase[c] = phase;

            for (i, wave) in lfo_waves(phase, pw).into_iter().enumerate() {
                self.io
                    .output_mut(Self::SIN_OUTPUT + i)
                    .set_voltage(factor * wave + offset, c);
            }
        }
        for i in Self::SIN_OUTPUT..=Self::SQR_OUTPUT {
            self.io.output_mut(i).set_channels(channels);
        }

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let brightness = if channels == 1 { 1.0 - self.phase[0] } else { 1.0 };
            self.io
                .light_mut(Self::PHASE_LIGHT)
                .set_brightness_smooth(brightness, dt);
        }
    }

    fn reset(&mut self) {
        self.phase = [0.0; PORT_MAX_CHANNELS];
    }
}

/// Progress from the previous random value to the next, 0 to 1, for each
/// output shape at clock `phase`.
///
/// `shape` bends every curve: 0 jumps immediately, 1 spreads the change over
/// the whole clock period.
pub fn random_shapes(phase: f32, shape: f32) -> [f32; 4] {
    let steps = (shape * shape * 15.0 + 1.0).ceil();
    let stepped = (phase * steps).ceil() / steps;

    let slope = 1.0 / shape;
    let linear = if slope < 1e6 { (phase * slope).min(1.0) } else { 1.0 };

    let smooth = if slope < 1e6 {
        let v = (std::f32::consts::PI * (phase * slope).min(1.0)).cos();
        rescale(v, 1.0, -1.0, 0.0, 1.0)
    } else {
        1.0
    };

    let b = shape.powi(4);
    let exponential = if b > 0.999 {
        phase
    } else if b > 1e-20 {
        (b.powf(phase) - 1.0) / (b - 1.0)
    } else {
        1.0
    };

    [stepped, linear, smooth, exponential]
}

/// Clocked random voltages.
///
/// On each clock, internal or from the trigger input, a new target is drawn
/// (or sampled from the external input) and each output moves from the old
/// target to the new one along its own curve.
pub struct Random {
    io: ModuleIo,
    rng: Rng,
    trigger: SchmittTrigger,
    last_value: f32,
    value: f32,
    clock_phase: f32,
    trigger_frame: u32,
    /// Frames between the last two external triggers
    trigger_period: Option<u32>,
    rate_flash: bool,
}

impl Random {
    pub const RATE_PARAM: usize = 0;
    pub const SHAPE_PARAM: usize = 1;
    pub const OFFSET_PARAM: usize = 2;
    pub const MODE_PARAM: usize = 3;
    pub const RATE_CV_PARAM: usize = 4;
    pub const SHAPE_CV_PARAM: usize = 5;

    pub const RATE_INPUT: usize = 0;
    pub const SHAPE_INPUT: usize = 1;
    pub const TRIGGER_INPUT: usize = 2;
    pub const EXTERNAL_INPUT: usize = 3;

    pub const STEPPED_OUTPUT: usize = 0;
    pub const LINEAR_OUTPUT: usize = 1;
    pub const SMOOTH_OUTPUT: usize = 2;
    pub const EXPONENTIAL_OUTPUT: usize = 3;

    pub const RATE_LIGHT: usize = 0;
    pub const SHAPE_LIGHT: usize = 1;

    /// Standard deviation of a relative-mode step
    const WALK_STD_DEV: f32 = 0.1;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Rate", 0.002f32.log2(), 2000f32.log2(), 2f32.log2()).with_unit("log2 Hz"))
            .param(ParamDef::new("Shape", 0.0, 1.0, 1.0))
            .param(ParamDef::switch("Offset", 0.0, 1.0, 0.0))
            .param(ParamDef::switch("Mode", 0.0, 1.0, 1.0))
            .param(ParamDef::new("Rate CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Shape CV", -1.0, 1.0, 0.0))
            .input("Rate", SignalKind::CvBipolar)
            .input("Shape", SignalKind::CvUnipolar)
            .input("Trigger", SignalKind::Trigger)
            .input("External", SignalKind::CvBipolar)
            .output("Stepped", SignalKind::CvBipolar)
            .output("Linear", SignalKind::CvBipolar)
            .output("Smooth", SignalKind::CvBipolar)
            .output("Exponential", SignalKind::CvBipolar)
            .light("Rate")
            .light("Shape")
    }

    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            rng: settings.rng(),
            trigger: SchmittTrigger::default(),
            last_value: 0.0,
            value: 0.0,
            clock_phase: 0.0,
            trigger_frame: 0,
            trigger_period: None,
            rate_flash: false,
        }
    }

    /// Current target, normalized (-0.5..0.5 bipolar, 0..1 unipolar)
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn clock_phase(&self) -> f32 {
        self.clock_phase
    }

    fn unipolar(&self) -> bool {
        self.io.param(Self::OFFSET_PARAM) > 0.0
    }

    fn next_value(&mut self) {
        self.last_value = self.value;
        self.rate_flash = true;

        let external = self.io.input(Self::EXTERNAL_INPUT);
        if external.is_connected() {
            self.value = external.get_voltage(0) / 10.0;
            return;
        }

        let uni = self.unipolar();
        let bias = if uni { 0.0 } else { 0.5 };
        if self.io.param(Self::MODE_PARAM) > 0.0 {
            self.value = self.rng.uniform() - bias;
        } else {
            // Random walk on 0..1, pulled back toward the middle
            let value = self.value + bias;
            let delta = (self.rng.normal() - (value - 0.5) * 2.0) * Self::WALK_STD_DEV;
            self.value = (value + delta).clamp(0.0, 1.0) - bias;
        }
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Random {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        if self.io.input(Self::TRIGGER_INPUT).is_connected() {
            // Follow the tempo of the incoming triggers
            self.trigger_frame = self.trigger_frame.saturating_add(1);
            if let Some(period) = self.trigger_period {
                self.clock_phase = (self.clock_phase + 1.0 / period as f32).min(1.0);
            }
            let trig = rescale(self.io.input(Self::TRIGGER_INPUT).get_voltage(0), 0.1, 2.0, 0.0, 1.0);
            if self.trigger.process(trig) {
                self.clock_phase = 0.0;
                self.trigger_period = Some(self.trigger_frame.max(1));
                self.trigger_frame = 0;
                self.next_value();
            }
        } else {
            let rate = self.io.param(Self::RATE_PARAM)
                + self.io.input(Self::RATE_INPUT).get_voltage(0) * self.io.param(Self::RATE_CV_PARAM);
            self.clock_phase += (rate.exp2() * args.sample_time).min(0.5);
            if self.clock_phase >= 1.0 {
                self.clock_phase -= 1.0;
                self.next_value();
            }
        }

        let shape = (self.io.param(Self::SHAPE_PARAM)
            + self.io.input(Self::SHAPE_INPUT).get_voltage(0) / 10.0 * self.io.param(Self::SHAPE_CV_PARAM))
            .clamp(0.0, 1.0);

        for (i, progress) in random_shapes(self.clock_phase, shape).into_iter().enumerate() {
            let out = self.io.output_mut(Self::STEPPED_OUTPUT + i);
            if out.is_connected() {
                let v = rescale(progress, 0.0, 1.0, self.last_value, self.value);
                out.set_voltage(v * 10.0, 0);
            }
        }

        let flash = if self.rate_flash { 1.0 } else { 0.0 };
        self.rate_flash = false;
        let rate_light = self.io.light_mut(Self::RATE_LIGHT);
        if flash > 0.0 {
            rate_light.set_brightness(flash);
        } else {
            rate_light.set_brightness_smooth(0.0, args.sample_time);
        }
        self.io.light_mut(Self::SHAPE_LIGHT).set_brightness(shape);
    }

    fn reset(&mut self) {
        self.last_value = 0.0;
        self.value = 0.0;
        self.clock_phase = 0.0;
        self.trigger_frame = 0;
        self.trigger_period = None;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_f32("value", self.value);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.value = state.get_f32("value", self.value);
        self.last_value = self.value;
    }
}

pub const RANDOM_VALUES_OUTPUTS: usize = 7;

/// Seven independent uniform random voltages, redrawn per channel on each
/// trigger or push.
pub struct RandomValues {
    io: ModuleIo,
    rng: Rng,
    push: BooleanTrigger,
    triggers: [SchmittTrigger4; GROUPS],
    gain: f32,
    offset: f32,
}

impl RandomValues {
    pub const PUSH_PARAM: usize = 0;

    pub const TRIGGER_INPUT: usize = 0;

    pub const RND_OUTPUT: usize = 0;

    pub const PUSH_LIGHT: usize = 0;

    const DEFAULT_GAIN: f32 = 10.0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::button("Push"))
            .input("Trigger", SignalKind::Trigger);
        for i in 1..=RANDOM_VALUES_OUTPUTS {
            spec = spec.output(format!("Random {}", i), SignalKind::CvUnipolar);
        }
        spec.light("Push")
    }

    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            rng: settings.rng(),
            push: BooleanTrigger::default(),
            triggers: [SchmittTrigger4::default(); GROUPS],
            gain: Self::DEFAULT_GAIN,
            offset: 0.0,
        }
    }

    /// Values are drawn from `offset..offset + gain`
    pub fn set_range(&mut self, gain: f32, offset: f32) {
        self.gain = gain;
        self.offset = offset;
    }

    pub fn range(&self) -> (f32, f32) {
        (self.gain, self.offset)
    }
}

impl Default for RandomValues {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for RandomValues {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::TRIGGER_INPUT]);
        let pushed = self.push.process(self.io.param(Self::PUSH_PARAM) > 0.0);
        let mut light = false;
        for c in group_starts(channels) {
            let input = self.io.input(Self::TRIGGER_INPUT).get_voltage_simd(c);
            let triggered = self.triggers[c / LANES].process_with(input, 0.1, 1.0);
            if !pushed && !triggered.any() {
                continue;
            }
            light = true;
            for lane in 0..LANES.min(channels - c) {
                if pushed || triggered.0[lane] {
                    for i in 0..RANDOM_VALUES_OUTPUTS {
                        let v = self.rng.uniform() * self.gain + self.offset;
                        self.io.output_mut(Self::RND_OUTPUT + i).set_voltage(v, c + lane);
                    }
                }
            }
        }
        for i in 0..RANDOM_VALUES_OUTPUTS {
            self.io.output_mut(Self::RND_OUTPUT + i).set_channels(channels);
        }
        self.io
            .light_mut(Self::PUSH_LIGHT)
            .set_brightness_smooth(if light { 1.0 } else { 0.0 }, args.sample_time);
    }

    fn reset(&mut self) {
        self.gain = Self::DEFAULT_GAIN;
        self.offset = 0.0;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_f32("randomGain", self.gain);
        state.set_f32("randomOffset", self.offset);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.gain = state.get_f32("randomGain", self.gain);
        self.offset = state.get_f32("randomOffset", self.offset);
    }
}
