//! Gate logic, comparison and gate processing

use crate::dsp::{exp2_taylor5, BooleanTrigger, ClockDivider, DoubleRingBuffer, PulseGenerator, SchmittTrigger};
use crate::persist::EngineSettings;
use crate::port::{Light, Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind, PORT_MAX_CHANNELS};
use crate::rng::Rng;

/// Logic high threshold for [`Logic`] inputs
pub const LOGIC_THRESHOLD: f32 = 1.0;
const GATE_HIGH: f32 = 10.0;

#[inline]
fn gate_voltage(state: bool) -> f32 {
    if state {
        GATE_HIGH
    } else {
        0.0
    }
}

/// Drives a mono/poly light pair: the first lights for one channel, the
/// second for several.
fn set_activity_lights(lights: &mut [Light], active: bool, channels: usize, dt: f32) {
    let mono = if active && channels <= 1 { 1.0 } else { 0.0 };
    let poly = if active && channels > 1 { 1.0 } else { 0.0 };
    lights[0].set_brightness_smooth(mono, dt);
    lights[1].set_brightness_smooth(poly, dt);
}

fn output_pair_lights(spec: ModuleSpec, names: &[&str]) -> ModuleSpec {
    names.iter().fold(spec, |spec, name| {
        spec.light(format!("{} mono", name))
            .light(format!("{} poly", name))
    })
}

const LOGIC_OUTPUTS: [&str; 8] = ["NOT A", "NOT B", "OR", "NOR", "AND", "NAND", "XOR", "XNOR"];

/// Eight boolean functions of two polyphonic gate inputs
pub struct Logic {
    io: ModuleIo,
    light_divider: ClockDivider,
}

impl Logic {
    pub const B_PARAM: usize = 0;

    pub const A_INPUT: usize = 0;
    pub const B_INPUT: usize = 1;

    pub const NOTA_OUTPUT: usize = 0;
    pub const NOTB_OUTPUT: usize = 1;
    pub const OR_OUTPUT: usize = 2;
    pub const NOR_OUTPUT: usize = 3;
    pub const AND_OUTPUT: usize = 4;
    pub const NAND_OUTPUT: usize = 5;
    pub const XOR_OUTPUT: usize = 6;
    pub const XNOR_OUTPUT: usize = 7;

    pub const B_BUTTON_LIGHT: usize = 0;
    /// Mono/poly pairs, one per output
    pub const OUTPUT_LIGHT: usize = 1;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::button("B"))
            .input("A", SignalKind::Gate)
            .input("B", SignalKind::Gate);
        for name in LOGIC_OUTPUTS {
            spec = spec.output(name, SignalKind::Gate);
        }
        output_pair_lights(spec.light("B button"), &LOGIC_OUTPUTS)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            light_divider: ClockDivider::new(32),
        }
    }

    /// Output states in output order for inputs `a` and `b`
    pub fn evaluate(a: bool, b: bool) -> [bool; 8] {
        [!a, !b, a || b, !(a || b), a && b, !(a && b), a != b, a == b]
    }
}

impl Default for Logic {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Logic {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::A_INPUT, Self::B_INPUT]);
        let b_push = self.io.param(Self::B_PARAM) > 0.0;
        let mut any = [false; 8];
        for c in 0..channels {
            let a = self.io.input(Self::A_INPUT).get_poly_voltage(c) >= LOGIC_THRESHOLD;
            let b = b_push || self.io.input(Self::B_INPUT).get_poly_voltage(c) >= LOGIC_THRESHOLD;
            for (i, state) in Self::evaluate(a, b).into_iter().enumerate() {
                self.io
                    .output_mut(Self::NOTA_OUTPUT + i)
                    .set_voltage(gate_voltage(state), c);
                any[i] |= state;
            }
        }
        for i in 0..LOGIC_OUTPUTS.len() {
            self.io.output_mut(Self::NOTA_OUTPUT + i).set_channels(channels);
        }

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            self.io
                .light_mut(Self::B_BUTTON_LIGHT)
                .set_brightness(if b_push { 1.0 } else { 0.0 });
            for (i, &active) in any.iter().enumerate() {
                let start = Self::OUTPUT_LIGHT + 2 * i;
                set_activity_lights(&mut self.io.lights[start..start + 2], active, channels, dt);
            }
        }
    }
}

/// Window comparator and min/max of two voltages
pub struct Compare {
    io: ModuleIo,
    light_divider: ClockDivider,
}

/// Per-channel results of [`Compare`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub max: f32,
    pub min: f32,
    /// `a` limited to the window `±|b|`
    pub clip: f32,
    /// The part of `a` outside the window
    pub lim: f32,
    pub clipped: bool,
    pub greater: bool,
    pub less: bool,
}

impl Compare {
    pub const B_PARAM: usize = 0;

    pub const A_INPUT: usize = 0;
    pub const B_INPUT: usize = 1;

    pub const MAX_OUTPUT: usize = 0;
    pub const MIN_OUTPUT: usize = 1;
    pub const CLIP_OUTPUT: usize = 2;
    pub const LIM_OUTPUT: usize = 3;
    pub const CLIPGATE_OUTPUT: usize = 4;
    pub const LIMGATE_OUTPUT: usize = 5;
    pub const GREATER_OUTPUT: usize = 6;
    pub const LESS_OUTPUT: usize = 7;

    pub const CLIP_LIGHT: usize = 0;
    pub const LIM_LIGHT: usize = 2;
    pub const GREATER_LIGHT: usize = 4;
    pub const LESS_LIGHT: usize = 6;

    pub fn spec() -> ModuleSpec {
        let spec = ModuleSpec::new()
            .param(ParamDef::new("B offset", -10.0, 10.0, 0.0).with_unit(" V"))
            .input("A", SignalKind::CvBipolar)
            .input("B", SignalKind::CvBipolar)
            .output("Maximum", SignalKind::CvBipolar)
            .output("Minimum", SignalKind::CvBipolar)
            .output("Clip", SignalKind::CvBipolar)
            .output("Limit", SignalKind::CvBipolar)
            .output("Clip gate", SignalKind::Gate)
            .output("Limit gate", SignalKind::Gate)
            .output("A > B", SignalKind::Gate)
            .output("A < B", SignalKind::Gate);
        output_pair_lights(spec, &["Clip", "Limit", "Greater", "Less"])
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            light_divider: ClockDivider::new(32),
        }
    }

    pub fn compare(a: f32, b: f32) -> Comparison {
        let b_abs = b.abs();
        let (clip, clipped) = if b_abs < a {
            (b_abs, true)
        } else if a < -b_abs {
            (-b_abs, true)
        } else {
            (a, false)
        };
        Comparison {
            max: a.max(b),
            min: a.min(b),
            clip,
            lim: a - clip,
            clipped,
            greater: a > b,
            less: a < b,
        }
    }
}

impl Default for Compare {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Compare {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::A_INPUT, Self::B_INPUT]);
        let b_offset = self.io.param(Self::B_PARAM);
        let (mut any_clip, mut any_lim, mut any_greater, mut any_less) = (false, false, false, false);
        for c in 0..channels {
            let a = self.io.input(Self::A_INPUT).get_voltage(c);
            let b = self.io.input(Self::B_INPUT).get_voltage(c) + b_offset;
            let r = Self::compare(a, b);
            let values = [
                r.max,
                r.min,
                r.clip,
                r.lim,
                gate_voltage(r.clipped),
                gate_voltage(!r.clipped),
                gate_voltage(r.greater),
                gate_voltage(r.less),
            ];
            for (i, v) in values.into_iter().enumerate() {
                self.io.output_mut(Self::MAX_OUTPUT + i).set_voltage(v, c);
            }
            any_clip |= r.clipped;
            any_lim |= !r.clipped;
            any_greater |= r.greater;
            any_less |= r.less;
        }
        for i in Self::MAX_OUTPUT..=Self::LESS_OUTPUT {
            self.io.output_mut(i).set_channels(channels);
        }

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let lights = &mut self.io.lights;
            set_activity_lights(&mut lights[Self::CLIP_LIGHT..], any_clip, channels, dt);
            set_activity_lights(&mut lights[Self::LIM_LIGHT..], any_lim, channels, dt);
            set_activity_lights(&mut lights[Self::GREATER_LIGHT..], any_greater, channels, dt);
            set_activity_lights(&mut lights[Self::LESS_LIGHT..], any_less, channels, dt);
        }
    }
}

/// Events remembered per channel for the delayed gate
const GATE_HISTORY: usize = 1 << 10;

#[derive(Clone)]
struct GateEngine {
    state: bool,
    reset_trigger: SchmittTrigger,
    rise_pulse: PulseGenerator,
    fall_pulse: PulseGenerator,
    flop: bool,
    /// Seconds since the gate started, `None` when idle
    gate_time: Option<f32>,
    /// (time, new state) transitions, oldest first
    events: DoubleRingBuffer<(f64, bool)>,
}

impl GateEngine {
    fn new() -> Self {
        Self {
            state: false,
            reset_trigger: SchmittTrigger::default(),
            rise_pulse: PulseGenerator::default(),
            fall_pulse: PulseGenerator::default(),
            flop: false,
            gate_time: None,
            events: DoubleRingBuffer::new(GATE_HISTORY),
        }
    }

    /// Input state at `time`, replayed from the event history
    fn state_at(&self, time: f64) -> bool {
        let events = self.events.start_data();
        let i = events.partition_point(|&(t, _)| t <= time);
        i > 0 && events[i - 1].1
    }

    fn reset(&mut self) {
        self.state = false;
        self.reset_trigger.reset();
        self.rise_pulse.reset();
        self.fall_pulse.reset();
        self.flop = false;
        self.gate_time = None;
        self.events.clear();
    }

    fn record(&mut self, time: f64) {
        if self.events.size() >= GATE_HISTORY - 1 {
            self.events.shift();
        }
        self.events.push((time, self.state));
    }
}

/// Gate utilities: edge pulses, flip/flop, fixed-length gate and a gate
/// delayed by the same length.
pub struct Gates {
    io: ModuleIo,
    time: f64,
    reset_button: BooleanTrigger,
    engines: Vec<GateEngine>,
    light_divider: ClockDivider,
}

impl Gates {
    pub const LENGTH_PARAM: usize = 0;
    pub const RESET_PARAM: usize = 1;

    pub const LENGTH_INPUT: usize = 0;
    pub const IN_INPUT: usize = 1;
    pub const RESET_INPUT: usize = 2;

    pub const RISE_OUTPUT: usize = 0;
    pub const FALL_OUTPUT: usize = 1;
    pub const FLIP_OUTPUT: usize = 2;
    pub const FLOP_OUTPUT: usize = 3;
    pub const GATE_OUTPUT: usize = 4;
    pub const DELAY_OUTPUT: usize = 5;

    pub const RESET_LIGHT: usize = 0;
    pub const OUTPUT_LIGHT: usize = 1;

    pub fn spec() -> ModuleSpec {
        let spec = ModuleSpec::new()
            .param(
                ParamDef::new("Gate length", 1e-3f32.log2(), 10f32.log2(), 0.1f32.log2())
                    .with_unit(" ms"),
            )
            .param(ParamDef::button("Reset flip/flop"))
            .input("Length", SignalKind::CvBipolar)
            .input("Gate", SignalKind::Gate)
            .input("Reset", SignalKind::Trigger)
            .output("Rising edge trigger", SignalKind::Trigger)
            .output("Falling edge trigger", SignalKind::Trigger)
            .output("Flip", SignalKind::Gate)
            .output("Flop", SignalKind::Gate)
            .output("Gate", SignalKind::Gate)
            .output("Delayed gate", SignalKind::Gate)
            .light("Reset");
        output_pair_lights(spec, &["Rise", "Fall", "Flip", "Flop", "Gate", "Delay"])
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            time: 0.0,
            reset_button: BooleanTrigger::default(),
            engines: vec![GateEngine::new(); PORT_MAX_CHANNELS],
            light_divider: ClockDivider::new(32),
        }
    }

    /// Gate length in seconds for a length knob plus CV, `2^pitch`
    pub fn gate_length(pitch: f32) -> f32 {
        exp2_taylor5(pitch + 30.0) / 1_073_741_824.0
    }
}

impl Default for Gates {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Gates {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::IN_INPUT]);
        let reset_button = self.reset_button.process(self.io.param(Self::RESET_PARAM) > 0.0);
        let delay_connected = self.io.output(Self::DELAY_OUTPUT).is_connected();
        let mut any = [false; 6];

        for c in 0..channels {
            let e = &mut self.engines[c];
            let input = self.io.inputs[Self::IN_INPUT].get_voltage(c);
            let mut changed = false;
            if e.state {
                if input <= 0.1 {
                    e.state = false;
                    e.fall_pulse.trigger(PulseGenerator::TRIGGER_DURATION);
                    changed = true;
                }
            } else if input >= 2.0 {
                e.state = true;
                e.rise_pulse.trigger(PulseGenerator::TRIGGER_DURATION);
                e.flop ^= true;
                e.gate_time = Some(0.0);
                changed = true;
            }

            let reset_in = self.io.inputs[Self::RESET_INPUT].get_voltage(c);
            let reset = e.reset_trigger.process_with(reset_in, 0.1, 2.0) || reset_button;
            if reset {
                e.flop = false;
                e.events.clear();
            }

            let rise = e.rise_pulse.process(args.sample_time);
            let fall = e.fall_pulse.process(args.sample_time);

            let pitch = self.io.params[Self::LENGTH_PARAM].value()
                + self.io.inputs[Self::LENGTH_INPUT].get_poly_voltage(c);
            let length = Self::gate_length(pitch);
            if let Some(t) = e.gate_time {
                let t = t + args.sample_time;
                e.gate_time = if reset || t >= length { None } else { Some(t) };
            }
            let gate = e.gate_time.is_some();

            let mut delayed = false;
            if delay_connected {
                delayed = e.state_at(self.time - length as f64);
                if changed {
                    e.record(self.time);
                }
            }

            let states = [rise, fall, !e.flop, e.flop, gate, delayed];
            for (i, &state) in states.iter().enumerate() {
                self.io.outputs[Self::RISE_OUTPUT + i].set_voltage(gate_voltage(state), c);
                any[i] |= state;
            }
        }
        self.time += args.sample_time as f64;
        for i in Self::RISE_OUTPUT..=Self::DELAY_OUTPUT {
            self.io.output_mut(i).set_channels(channels);
        }

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let pushed = self.io.param(Self::RESET_PARAM) > 0.0;
            self.io
                .light_mut(Self::RESET_LIGHT)
                .set_brightness(if pushed { 1.0 } else { 0.0 });
            for (i, &active) in any.iter().enumerate() {
                let start = Self::OUTPUT_LIGHT + 2 * i;
                set_activity_lights(&mut self.io.lights[start..start + 2], active, channels, dt);
            }
        }
    }

    fn reset(&mut self) {
        self.time = 0.0;
        for e in &mut self.engines {
            e.reset();
        }
    }
}

/// Sample and hold, track and hold, slew and glide of one polyphonic input
pub struct Process {
    io: ModuleIo,
    state: [bool; PORT_MAX_CHANNELS],
    sample1: [f32; PORT_MAX_CHANNELS],
    sample2: [f32; PORT_MAX_CHANNELS],
    hold: [f32; PORT_MAX_CHANNELS],
    slew: [f32; PORT_MAX_CHANNELS],
    glide: [f32; PORT_MAX_CHANNELS],
}

impl Process {
    pub const SLEW_PARAM: usize = 0;
    pub const GATE_PARAM: usize = 1;

    pub const SLEW_INPUT: usize = 0;
    pub const IN_INPUT: usize = 1;
    pub const GATE_INPUT: usize = 2;

    /// Sampled on each gate
    pub const SH1_OUTPUT: usize = 0;
    /// The sample before SH1
    pub const SH2_OUTPUT: usize = 1;
    pub const TH_OUTPUT: usize = 2;
    pub const HT_OUTPUT: usize = 3;
    /// Slews only while the gate is low
    pub const SLEW_OUTPUT: usize = 4;
    pub const GLIDE_OUTPUT: usize = 5;

    pub const GATE_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(
                ParamDef::new("Slew", 1e-3f32.log2(), 10f32.log2(), 1e-3f32.log2())
                    .with_unit(" ms/V"),
            )
            .param(ParamDef::button("Gate"))
            .input("Slew", SignalKind::CvBipolar)
            .input("Voltage", SignalKind::CvBipolar)
            .input("Gate", SignalKind::Gate)
            .output("Sample & hold", SignalKind::CvBipolar)
            .output("Sample & hold 2", SignalKind::CvBipolar)
            .output("Track & hold", SignalKind::CvBipolar)
            .output("Hold & track", SignalKind::CvBipolar)
            .output("Slew", SignalKind::CvBipolar)
            .output("Glide", SignalKind::CvBipolar)
            .light("Gate")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            state: [false; PORT_MAX_CHANNELS],
            sample1: [0.0; PORT_MAX_CHANNELS],
            sample2: [0.0; PORT_MAX_CHANNELS],
            hold: [0.0; PORT_MAX_CHANNELS],
            slew: [0.0; PORT_MAX_CHANNELS],
            glide: [0.0; PORT_MAX_CHANNELS],
        }
    }

    /// Slew rate in V/s for a slew knob plus CV, `2^-pitch`
    pub fn slew_rate(pitch: f32) -> f32 {
        exp2_taylor5(-pitch + 30.0) / 1_073_741_824.0
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Process {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::IN_INPUT]);
        let button = self.io.param(Self::GATE_PARAM) > 0.0;
        for c in 0..channels {
            let input = self.io.input(Self::IN_INPUT).get_voltage(c);
            let pitch = self.io.param(Self::SLEW_PARAM) + self.io.input(Self::SLEW_INPUT).get_poly_voltage(c);
            let delta = Self::slew_rate(pitch) * args.sample_time;
            let gate = self.io.input(Self::GATE_INPUT).get_poly_voltage(c);

            if !self.state[c] {
                if gate >= 2.0 || button {
                    self.state[c] = true;
                    self.hold[c] = input;
                    self.sample2[c] = self.sample1[c];
                    self.sample1[c] = input;
                    self.glide[c] = input;
                }
            } else if gate <= 0.1 && !button {
                self.state[c] = false;
                self.hold[c] = input;
            }

            if self.state[c] {
                self.slew[c] = input;
            } else {
                self.slew[c] += (input - self.slew[c]).clamp(-delta, delta);
            }
            self.glide[c] += (input - self.glide[c]).clamp(-delta, delta);

            let held = self.state[c];
            let values = [
                self.sample1[c],
                self.sample2[c],
                if held { self.hold[c] } else { input },
                if held { input } else { self.hold[c] },
                self.slew[c],
                self.glide[c],
            ];
            for (i, v) in values.into_iter().enumerate() {
                self.io.output_mut(Self::SH1_OUTPUT + i).set_voltage(v, c);
            }
        }
        for i in Self::SH1_OUTPUT..=Self::GLIDE_OUTPUT {
            self.io.output_mut(i).set_channels(channels);
        }
        self.io
            .light_mut(Self::GATE_LIGHT)
            .set_brightness(if button { 1.0 } else { 0.0 });
    }

    fn reset(&mut self) {
        self.state = [false; PORT_MAX_CHANNELS];
        self.sample1 = [0.0; PORT_MAX_CHANNELS];
        self.sample2 = [0.0; PORT_MAX_CHANNELS];
        self.hold = [0.0; PORT_MAX_CHANNELS];
        self.slew = [0.0; PORT_MAX_CHANNELS];
        self.glide = [0.0; PORT_MAX_CHANNELS];
    }
}

pub const SHASR_ROWS: usize = 8;

/// Eight sample and holds chained into a shift register.
///
/// A row samples on its own trigger, or on the nearest patched trigger above
/// it. An unpatched sample input takes the previous row's held value, so a
/// shared trigger shifts the values down the column.
pub struct Shasr {
    io: ModuleIo,
    rng: Rng,
    randomize_button: BooleanTrigger,
    push_button: BooleanTrigger,
    clear_button: BooleanTrigger,
    triggers: [SchmittTrigger; SHASR_ROWS],
    values: [f32; SHASR_ROWS],
}

impl Shasr {
    pub const RANDOMIZE_PARAM: usize = 0;
    pub const PUSH_PARAM: usize = 1;
    pub const CLEAR_PARAM: usize = 2;

    pub const IN_INPUT: usize = 0;
    pub const TRIGGER_INPUT: usize = SHASR_ROWS;

    pub const SH_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::button("Randomize"))
            .param(ParamDef::button("Push"))
            .param(ParamDef::button("Clear"));
        for row in 1..=SHASR_ROWS {
            spec = spec.input(format!("Sample {}", row), SignalKind::CvBipolar);
        }
        for row in 1..=SHASR_ROWS {
            spec = spec.input(format!("Trigger {}", row), SignalKind::Trigger);
        }
        for row in 1..=SHASR_ROWS {
            spec = spec.output(format!("Sample {}", row), SignalKind::CvBipolar);
        }
        spec
    }

    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            rng: settings.rng(),
            randomize_button: BooleanTrigger::default(),
            push_button: BooleanTrigger::default(),
            clear_button: BooleanTrigger::default(),
            triggers: [SchmittTrigger::new(); SHASR_ROWS],
            values: [0.0; SHASR_ROWS],
        }
    }

    pub fn values(&self) -> &[f32; SHASR_ROWS] {
        &self.values
    }
}

impl Default for Shasr {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Shasr {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let randomize = self.randomize_button.process(self.io.param(Self::RANDOMIZE_PARAM) > 0.0);
        let push = self.push_button.process(self.io.param(Self::PUSH_PARAM) > 0.0);
        let clear = self.clear_button.process(self.io.param(Self::CLEAR_PARAM) > 0.0);

        // Rows shift from the values held at the start of the frame
        let held = self.values;
        let mut last_trig = push;
        for i in 0..SHASR_ROWS {
            let trig = self.io.input(Self::TRIGGER_INPUT + i);
            if trig.is_connected() {
                last_trig = self.triggers[i].process_with(trig.get_voltage(0), 0.1, 1.0);
            }
            if last_trig {
                let previous = if i > 0 { held[i - 1] } else { 0.0 };
                self.values[i] = self.io.input(Self::IN_INPUT + i).get_normal_voltage(previous, 0);
            }
            if randomize {
                self.values[i] = self.rng.uniform() * 10.0;
            }
            if clear {
                self.values[i] = 0.0;
            }
        }

        for (i, &v) in self.values.iter().enumerate() {
            self.io.output_mut(Self::SH_OUTPUT + i).set_voltage(v, 0);
        }
    }

    fn reset(&mut self) {
        self.values = [0.0; SHASR_ROWS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_logic_truth_table() {
        assert_eq!(
            Logic::evaluate(true, false),
            [false, true, true, false, false, true, true, false]
        );
        assert_eq!(
            Logic::evaluate(true, true),
            [false, false, true, false, true, false, false, true]
        );
    }

    #[test]
    fn test_logic_threshold_and_button() {
        let mut logic = Logic::default();
        logic.io_mut().input_mut(Logic::A_INPUT).connect(2);
        logic.io_mut().input_mut(Logic::A_INPUT).write_voltages(&[0.99, 1.0]);
        logic.io_mut().output_mut(Logic::AND_OUTPUT).connect(1);
        logic.io_mut().set_param(Logic::B_PARAM, 1.0);
        logic.process(&ProcessArgs::default());
        let and = logic.io().output(Logic::AND_OUTPUT);
        assert_eq!(and.channels(), 2);
        assert_eq!(and.voltages(), &[0.0, 10.0]);
    }

    #[test]
    fn test_compare_window() {
        let r = Compare::compare(7.0, -5.0);
        assert_eq!(r.clip, 5.0);
        assert_eq!(r.lim, 2.0);
        assert!(r.clipped && r.greater && !r.less);
        assert_eq!((r.max, r.min), (7.0, -5.0));

        let r = Compare::compare(-7.0, 5.0);
        assert_eq!(r.clip, -5.0);
        assert_eq!(r.lim, -2.0);

        let r = Compare::compare(3.0, 5.0);
        assert!(!r.clipped && r.less);
        assert_eq!(r.lim, 0.0);
    }

    #[test]
    fn test_compare_b_offset() {
        let mut compare = Compare::default();
        compare.io_mut().input_mut(Compare::A_INPUT).connect(1);
        compare.io_mut().input_mut(Compare::A_INPUT).set_voltage(2.0, 0);
        compare.io_mut().set_param(Compare::B_PARAM, 3.0);
        compare.process(&ProcessArgs::default());
        assert_eq!(compare.io().output(Compare::LESS_OUTPUT).get_voltage(0), 10.0);
        assert_eq!(compare.io().output(Compare::MAX_OUTPUT).get_voltage(0), 3.0);
        assert_eq!(compare.io().output(Compare::LIMGATE_OUTPUT).get_voltage(0), 10.0);
    }

    fn gate_step(gates: &mut Gates, input: f32, frames: usize, args: &ProcessArgs) {
        for _ in 0..frames {
            gates.io_mut().input_mut(Gates::IN_INPUT).set_voltage(input, 0);
            gates.process(args);
        }
    }

    #[test]
    fn test_gates_edges_and_flip_flop() {
        let mut gates = Gates::default();
        let args = ProcessArgs::new(1000.0);
        gates.io_mut().input_mut(Gates::IN_INPUT).connect(1);
        gate_step(&mut gates, 5.0, 1, &args);
        assert_eq!(gates.io().output(Gates::RISE_OUTPUT).get_voltage(0), 10.0);
        assert_eq!(gates.io().output(Gates::FLOP_OUTPUT).get_voltage(0), 10.0);
        assert_eq!(gates.io().output(Gates::FLIP_OUTPUT).get_voltage(0), 0.0);
        // Hysteresis: 1 V neither falls nor rises
        gate_step(&mut gates, 1.0, 3, &args);
        assert_eq!(gates.io().output(Gates::FALL_OUTPUT).get_voltage(0), 0.0);
        gate_step(&mut gates, 0.0, 1, &args);
        assert_eq!(gates.io().output(Gates::FALL_OUTPUT).get_voltage(0), 10.0);
        gate_step(&mut gates, 5.0, 1, &args);
        assert_eq!(gates.io().output(Gates::FLOP_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_gates_fixed_length_gate() {
        let mut gates = Gates::default();
        let args = ProcessArgs::new(1000.0);
        // 2^-3 s = 125 ms
        gates.io_mut().set_param(Gates::LENGTH_PARAM, -3.0);
        gates.io_mut().input_mut(Gates::IN_INPUT).connect(1);
        gate_step(&mut gates, 5.0, 1, &args);
        gate_step(&mut gates, 0.0, 120, &args);
        assert_eq!(gates.io().output(Gates::GATE_OUTPUT).get_voltage(0), 10.0);
        gate_step(&mut gates, 0.0, 10, &args);
        assert_eq!(gates.io().output(Gates::GATE_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_gates_delayed_gate() {
        let mut gates = Gates::default();
        let args = ProcessArgs::new(1000.0);
        gates.io_mut().set_param(Gates::LENGTH_PARAM, -4.0);
        gates.io_mut().input_mut(Gates::IN_INPUT).connect(1);
        gates.io_mut().output_mut(Gates::DELAY_OUTPUT).connect(1);
        gate_step(&mut gates, 5.0, 20, &args);
        gate_step(&mut gates, 0.0, 50, &args);
        // 62.5 ms behind, the delayed copy is inside the 20 ms pulse
        assert_eq!(gates.io().output(Gates::DELAY_OUTPUT).get_voltage(0), 10.0);
        gate_step(&mut gates, 0.0, 50, &args);
        assert_eq!(gates.io().output(Gates::DELAY_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_gates_history_is_bounded() {
        let mut gates = Gates::default();
        let args = ProcessArgs::new(1000.0);
        gates.io_mut().input_mut(Gates::IN_INPUT).connect(1);
        gates.io_mut().output_mut(Gates::DELAY_OUTPUT).connect(1);
        for _ in 0..2000 {
            gate_step(&mut gates, 5.0, 1, &args);
            gate_step(&mut gates, 0.0, 1, &args);
        }
        assert!(gates.engines[0].events.size() < GATE_HISTORY);
    }

    #[test]
    fn test_gates_reset_clears_flop() {
        let mut gates = Gates::default();
        let args = ProcessArgs::default();
        gates.io_mut().input_mut(Gates::IN_INPUT).connect(1);
        gate_step(&mut gates, 5.0, 1, &args);
        gates.io_mut().set_param(Gates::RESET_PARAM, 1.0);
        gate_step(&mut gates, 5.0, 1, &args);
        assert_eq!(gates.io().output(Gates::FLOP_OUTPUT).get_voltage(0), 0.0);
        assert_eq!(gates.io().output(Gates::GATE_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_process_sample_and_hold_chain() {
        let mut process = Process::default();
        let args = ProcessArgs::default();
        let io = process.io_mut();
        io.input_mut(Process::IN_INPUT).connect(1);
        io.input_mut(Process::GATE_INPUT).connect(1);
        for (input, gate) in [(1.0, 10.0), (2.0, 10.0), (3.0, 0.0), (4.0, 10.0)] {
            process.io_mut().input_mut(Process::IN_INPUT).set_voltage(input, 0);
            process.io_mut().input_mut(Process::GATE_INPUT).set_voltage(gate, 0);
            process.process(&args);
        }
        let out = |id| process.io().output(id).get_voltage(0);
        assert_eq!(out(Process::SH1_OUTPUT), 4.0);
        assert_eq!(out(Process::SH2_OUTPUT), 1.0);
        assert_eq!(out(Process::TH_OUTPUT), 4.0);
        assert_eq!(out(Process::HT_OUTPUT), 4.0);
    }

    #[test]
    fn test_process_track_and_hold() {
        let mut process = Process::default();
        let args = ProcessArgs::default();
        process.io_mut().input_mut(Process::IN_INPUT).connect(1);
        process.io_mut().set_param(Process::GATE_PARAM, 1.0);
        process.io_mut().input_mut(Process::IN_INPUT).set_voltage(2.0, 0);
        process.process(&args);
        process.io_mut().input_mut(Process::IN_INPUT).set_voltage(5.0, 0);
        process.process(&args);
        // Gate high: T&H holds the sampled value, H&T tracks
        assert_eq!(process.io().output(Process::TH_OUTPUT).get_voltage(0), 2.0);
        assert_eq!(process.io().output(Process::HT_OUTPUT).get_voltage(0), 5.0);
        process.io_mut().set_param(Process::GATE_PARAM, 0.0);
        process.io_mut().input_mut(Process::IN_INPUT).set_voltage(7.0, 0);
        process.process(&args);
        assert_eq!(process.io().output(Process::TH_OUTPUT).get_voltage(0), 7.0);
        assert_eq!(process.io().output(Process::HT_OUTPUT).get_voltage(0), 7.0);
    }

    #[test]
    fn test_process_slew_rate_limits_change() {
        let mut process = Process::default();
        let args = ProcessArgs::new(1000.0);
        // 2^-1 s per volt: 2 V/s
        process.io_mut().set_param(Process::SLEW_PARAM, -1.0);
        assert_abs_diff_eq!(Process::slew_rate(-1.0), 2.0, epsilon = 1e-4);
        process.io_mut().input_mut(Process::IN_INPUT).connect(1);
        process.io_mut().input_mut(Process::IN_INPUT).set_voltage(10.0, 0);
        for _ in 0..500 {
            process.process(&args);
        }
        assert_abs_diff_eq!(process.io().output(Process::SLEW_OUTPUT).get_voltage(0), 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(process.io().output(Process::GLIDE_OUTPUT).get_voltage(0), 1.0, epsilon = 1e-2);
    }

    fn shasr_with_trigger(rows: &[usize]) -> Shasr {
        let mut shasr = Shasr::default();
        for &row in rows {
            shasr.io_mut().input_mut(Shasr::TRIGGER_INPUT + row).connect(1);
        }
        shasr
    }

    fn pulse(shasr: &mut Shasr, row: usize) {
        let args = ProcessArgs::default();
        shasr.io_mut().input_mut(Shasr::TRIGGER_INPUT + row).set_voltage(10.0, 0);
        shasr.process(&args);
        shasr.io_mut().input_mut(Shasr::TRIGGER_INPUT + row).set_voltage(0.0, 0);
        shasr.process(&args);
    }

    #[test]
    fn test_shasr_shared_trigger_shifts_values() {
        let mut shasr = shasr_with_trigger(&[0]);
        shasr.io_mut().input_mut(Shasr::IN_INPUT).connect(1);
        for v in [1.0, 2.0, 3.0] {
            shasr.io_mut().input_mut(Shasr::IN_INPUT).set_voltage(v, 0);
            pulse(&mut shasr, 0);
        }
        assert_eq!(&shasr.values()[..4], &[3.0, 2.0, 1.0, 0.0]);
        assert_abs_diff_eq!(shasr.io().output(Shasr::SH_OUTPUT + 2).get_voltage(0), 1.0);
    }

    #[test]
    fn test_shasr_patched_trigger_splits_the_chain() {
        let mut shasr = shasr_with_trigger(&[0, 2]);
        shasr.io_mut().input_mut(Shasr::IN_INPUT).connect(1);
        shasr.io_mut().input_mut(Shasr::IN_INPUT).set_voltage(4.0, 0);
        pulse(&mut shasr, 0);
        // Row 1 follows row 0; row 2 waits for its own trigger
        assert_eq!(&shasr.values()[..3], &[4.0, 0.0, 0.0]);
        pulse(&mut shasr, 0);
        assert_eq!(&shasr.values()[..3], &[4.0, 4.0, 0.0]);
        pulse(&mut shasr, 2);
        assert_eq!(&shasr.values()[..4], &[4.0, 4.0, 4.0, 0.0]);
    }

    #[test]
    fn test_shasr_buttons() {
        let mut shasr = Shasr::new(&EngineSettings::default().with_seed(5));
        let args = ProcessArgs::default();
        shasr.io_mut().set_param(Shasr::RANDOMIZE_PARAM, 1.0);
        shasr.process(&args);
        assert!(shasr.values().iter().all(|v| (0.0..10.0).contains(v)));
        assert!(shasr.values().iter().any(|&v| v > 0.0));
        // Held button fires once
        let snapshot = *shasr.values();
        shasr.process(&args);
        assert_eq!(shasr.values(), &snapshot);

        shasr.io_mut().set_param(Shasr::CLEAR_PARAM, 1.0);
        shasr.process(&args);
        assert_eq!(shasr.values(), &[0.0; SHASR_ROWS]);

        // Push with nothing patched shifts the column
        shasr.values[0] = 7.0;
        shasr.io_mut().set_param(Shasr::PUSH_PARAM, 1.0);
        shasr.process(&args);
        assert_eq!(&shasr.values()[..2], &[0.0, 7.0]);
    }
}
