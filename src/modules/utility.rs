//! Small routing and utility modules: manual gates, polyphonic split and
//! merge, mults, mutes, octave shifting and rescaling.

use crate::dsp::{BooleanTrigger, ClockDivider, PulseGenerator, SchmittTrigger};
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind, PORT_MAX_CHANNELS};

/// Manual gate with latching hold
pub struct Push {
    io: ModuleIo,
    hold: bool,
    hold_button: BooleanTrigger,
    hold_trigger: SchmittTrigger,
    push_trigger: SchmittTrigger,
    gate_edge: BooleanTrigger,
    pulse: PulseGenerator,
}

impl Push {
    pub const PUSH_PARAM: usize = 0;
    pub const HOLD_PARAM: usize = 1;

    pub const HOLD_INPUT: usize = 0;
    pub const PUSH_INPUT: usize = 1;

    pub const TRIG_OUTPUT: usize = 0;
    pub const GATE_OUTPUT: usize = 1;

    pub const PUSH_LIGHT: usize = 0;
    pub const HOLD_LIGHT: usize = 1;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::button("Push"))
            .param(ParamDef::button("Hold"))
            .input("Hold", SignalKind::Trigger)
            .input("Push", SignalKind::Gate)
            .output("Trigger", SignalKind::Trigger)
            .output("Gate", SignalKind::Gate)
            .light("Push")
            .light("Hold")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            hold: false,
            hold_button: BooleanTrigger::default(),
            hold_trigger: SchmittTrigger::default(),
            push_trigger: SchmittTrigger::default(),
            gate_edge: BooleanTrigger::default(),
            pulse: PulseGenerator::default(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.hold
    }
}

impl Default for Push {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Push {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        if self.hold_button.process(self.io.param(Self::HOLD_PARAM) > 0.0) {
            self.hold ^= true;
        }
        let hold_in = self.io.input(Self::HOLD_INPUT).get_voltage(0);
        if self.hold_trigger.process_with(hold_in, 0.1, 1.0) {
            self.hold ^= true;
        }

        let push_in = self.io.input(Self::PUSH_INPUT).get_voltage(0);
        self.push_trigger.process_with(push_in, 0.1, 1.0);
        let push = self.io.param(Self::PUSH_PARAM) > 0.0 || self.push_trigger.is_high();
        let gate = push ^ self.hold;

        if self.gate_edge.process(gate) {
            self.pulse.trigger(PulseGenerator::TRIGGER_DURATION);
        }
        let trig = self.pulse.process(args.sample_time);

        self.io
            .output_mut(Self::TRIG_OUTPUT)
            .set_voltage(if trig { 10.0 } else { 0.0 }, 0);
        self.io
            .output_mut(Self::GATE_OUTPUT)
            .set_voltage(if gate { 10.0 } else { 0.0 }, 0);

        let hold = if self.hold { 1.0 } else { 0.0 };
        self.io
            .light_mut(Self::HOLD_LIGHT)
            .set_brightness_smooth(hold, args.sample_time);
        self.io
            .light_mut(Self::PUSH_LIGHT)
            .set_brightness_smooth(if gate { 1.0 } else { 0.0 }, args.sample_time);
    }

    fn reset(&mut self) {
        self.hold = false;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bool("hold", self.hold);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.hold = state.get_bool("hold", self.hold);
    }
}

pub const PULSE_BUTTONS: usize = 10;

/// Bank of buttons, each with trigger and gate outputs
pub struct Pulses {
    io: ModuleIo,
    buttons: [BooleanTrigger; PULSE_BUTTONS],
    pulses: [PulseGenerator; PULSE_BUTTONS],
}

impl Pulses {
    pub const PUSH_PARAM: usize = 0;
    pub const TRIG_OUTPUT: usize = 0;
    pub const GATE_OUTPUT: usize = PULSE_BUTTONS;
    pub const PUSH_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new();
        for i in 1..=PULSE_BUTTONS {
            spec = spec.param(ParamDef::button(format!("Push {}", i)));
        }
        for i in 1..=PULSE_BUTTONS {
            spec = spec.output(format!("Trigger {}", i), SignalKind::Trigger);
        }
        for i in 1..=PULSE_BUTTONS {
            spec = spec.output(format!("Gate {}", i), SignalKind::Gate);
        }
        for i in 1..=PULSE_BUTTONS {
            spec = spec.light(format!("Push {}", i));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            buttons: [BooleanTrigger::default(); PULSE_BUTTONS],
            pulses: [PulseGenerator::default(); PULSE_BUTTONS],
        }
    }
}

impl Default for Pulses {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Pulses {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        for i in 0..PULSE_BUTTONS {
            let pushed = self.io.param(Self::PUSH_PARAM + i) > 0.0;
            if self.buttons[i].process(pushed) {
                self.pulses[i].trigger(PulseGenerator::TRIGGER_DURATION);
            }
            let trig = self.pulses[i].process(args.sample_time);
            self.io
                .output_mut(Self::TRIG_OUTPUT + i)
                .set_voltage(if trig { 10.0 } else { 0.0 }, 0);
            self.io
                .output_mut(Self::GATE_OUTPUT + i)
                .set_voltage(if pushed { 10.0 } else { 0.0 }, 0);
            self.io
                .light_mut(Self::PUSH_LIGHT + i)
                .set_brightness_smooth(if pushed { 1.0 } else { 0.0 }, args.sample_time);
        }
    }
}

pub const MIN_OCTAVE: i32 = -4;
pub const MAX_OCTAVE: i32 = 4;

/// Shifts a polyphonic pitch CV by whole octaves
pub struct Octave {
    io: ModuleIo,
    octave: i32,
}

impl Octave {
    pub const PITCH_INPUT: usize = 0;
    pub const PITCH_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .input("1V/octave pitch", SignalKind::VoltPerOctave)
            .output("Pitch", SignalKind::VoltPerOctave)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            octave: 0,
        }
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn set_octave(&mut self, octave: i32) {
        self.octave = octave.clamp(MIN_OCTAVE, MAX_OCTAVE);
    }
}

impl Default for Octave {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Octave {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::PITCH_INPUT]);
        let input = *self.io.input(Self::PITCH_INPUT);
        let out = self.io.output_mut(Self::PITCH_OUTPUT);
        for c in 0..channels {
            out.set_voltage(input.get_voltage(c) + self.octave as f32, c);
        }
        out.set_channels(channels);
    }

    fn reset(&mut self) {
        self.octave = 0;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_i64("octave", self.octave as i64);
    }

    fn load_state(&mut self, state: &StateStore) {
        let octave = state.get_i64("octave", self.octave as i64);
        self.set_octave(octave.clamp(MIN_OCTAVE as i64, MAX_OCTAVE as i64) as i32);
    }
}

/// Breaks a polyphonic cable into 16 mono outputs
pub struct Split {
    io: ModuleIo,
    light_divider: ClockDivider,
}

impl Split {
    pub const POLY_INPUT: usize = 0;
    pub const MONO_OUTPUT: usize = 0;
    pub const CHANNEL_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new().input("Polyphonic", SignalKind::Audio);
        for c in 1..=PORT_MAX_CHANNELS {
            spec = spec.output(format!("Channel {}", c), SignalKind::Audio);
        }
        for c in 1..=PORT_MAX_CHANNELS {
            spec = spec.light(format!("Channel {}", c));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            light_divider: ClockDivider::new(512),
        }
    }
}

impl Default for Split {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Split {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let input = *self.io.input(Self::POLY_INPUT);
        for c in 0..PORT_MAX_CHANNELS {
            self.io
                .output_mut(Self::MONO_OUTPUT + c)
                .set_voltage(input.get_voltage(c), 0);
        }
        if self.light_divider.process() {
            for c in 0..PORT_MAX_CHANNELS {
                let active = if c < input.channels() { 1.0 } else { 0.0 };
                self.io.light_mut(Self::CHANNEL_LIGHT + c).set_brightness(active);
            }
        }
    }
}

/// Combines up to 16 mono inputs into one polyphonic cable.
///
/// In automatic mode the output carries as many channels as the highest
/// connected input; a fixed count can be set instead.
pub struct Merge {
    io: ModuleIo,
    channels: Option<usize>,
    light_divider: ClockDivider,
}

impl Merge {
    pub const MONO_INPUT: usize = 0;
    pub const POLY_OUTPUT: usize = 0;
    pub const CHANNEL_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new();
        for c in 1..=PORT_MAX_CHANNELS {
            spec = spec.input(format!("Channel {}", c), SignalKind::Audio);
        }
        spec = spec.output("Polyphonic", SignalKind::Audio);
        for c in 1..=PORT_MAX_CHANNELS {
            spec = spec.light(format!("Channel {}", c));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            channels: None,
            light_divider: ClockDivider::new(512),
        }
    }

    /// Fixed channel count, or `None` for automatic
    pub fn channels(&self) -> Option<usize> {
        self.channels
    }

    pub fn set_channels(&mut self, channels: Option<usize>) {
        self.channels = channels.map(|n| n.clamp(1, PORT_MAX_CHANNELS));
    }
}

impl Default for Merge {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Merge {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let mut highest = 0;
        let mut voltages = [0.0; PORT_MAX_CHANNELS];
        for (c, v) in voltages.iter_mut().enumerate() {
            let input = self.io.input(Self::MONO_INPUT + c);
            if input.is_connected() {
                highest = c + 1;
                *v = input.get_voltage(0);
            }
        }
        let channels = self.channels.unwrap_or(highest);
        let out = self.io.output_mut(Self::POLY_OUTPUT);
        out.write_voltages(&voltages[..channels]);
        out.set_channels(channels);

        if self.light_divider.process() {
            for c in 0..PORT_MAX_CHANNELS {
                let on = if c < channels { 1.0 } else { 0.0 };
                self.io.light_mut(Self::CHANNEL_LIGHT + c).set_brightness(on);
            }
        }
    }

    fn reset(&mut self) {
        self.channels = None;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_i64("channels", self.channels.map_or(-1, |n| n as i64));
    }

    fn load_state(&mut self, state: &StateStore) {
        let channels = state.get_i64("channels", self.channels.map_or(-1, |n| n as i64));
        self.set_channels(usize::try_from(channels).ok());
    }
}

/// Sums every channel of a polyphonic cable to mono
pub struct Sum {
    io: ModuleIo,
    light_divider: ClockDivider,
}

impl Sum {
    pub const LEVEL_PARAM: usize = 0;
    pub const POLY_INPUT: usize = 0;
    pub const MONO_OUTPUT: usize = 0;
    pub const CHANNEL_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::new("Level", 0.0, 1.0, 1.0).with_unit("%"))
            .input("Polyphonic", SignalKind::Audio)
            .output("Monophonic", SignalKind::Audio);
        for c in 1..=PORT_MAX_CHANNELS {
            spec = spec.light(format!("Channel {}", c));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            light_divider: ClockDivider::new(256),
        }
    }
}

impl Default for Sum {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Sum {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let input = self.io.input(Self::POLY_INPUT);
        let channels = input.channels();
        let sum = input.get_voltage_sum() * self.io.param(Self::LEVEL_PARAM);
        self.io.output_mut(Self::MONO_OUTPUT).set_voltage(sum, 0);

        if self.light_divider.process() {
            for c in 0..PORT_MAX_CHANNELS {
                let on = if c < channels { 1.0 } else { 0.0 };
                self.io.light_mut(Self::CHANNEL_LIGHT + c).set_brightness(on);
            }
        }
    }
}

pub const MULT_OUTPUTS: usize = 8;

/// Copies one polyphonic input to eight outputs
pub struct Mult {
    io: ModuleIo,
}

impl Mult {
    pub const MULT_INPUT: usize = 0;
    pub const MULT_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new().input("Mult", SignalKind::Audio);
        for i in 1..=MULT_OUTPUTS {
            spec = spec.output(format!("Mult {}", i), SignalKind::Audio);
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
        }
    }
}

impl Default for Mult {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Mult {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let input = *self.io.input(Self::MULT_INPUT);
        let channels = input.channels().max(1);
        for i in 0..MULT_OUTPUTS {
            let out = self.io.output_mut(Self::MULT_OUTPUT + i);
            out.set_channels(channels);
            out.write_voltages(input.voltages());
        }
    }
}

pub const MUTE_CHANNELS: usize = 10;

/// Ten mute switches. An unpatched input takes the signal of the nearest
/// patched input above it.
pub struct Mutes {
    io: ModuleIo,
    unmuted: [bool; MUTE_CHANNELS],
    buttons: [BooleanTrigger; MUTE_CHANNELS],
}

impl Mutes {
    pub const MUTE_PARAM: usize = 0;
    pub const IN_INPUT: usize = 0;
    pub const OUT_OUTPUT: usize = 0;
    pub const MUTE_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new();
        for i in 1..=MUTE_CHANNELS {
            spec = spec.param(ParamDef::button(format!("Mute {}", i)));
        }
        for i in 1..=MUTE_CHANNELS {
            spec = spec.input(format!("Input {}", i), SignalKind::Audio);
        }
        for i in 1..=MUTE_CHANNELS {
            spec = spec.output(format!("Output {}", i), SignalKind::Audio);
        }
        for i in 1..=MUTE_CHANNELS {
            spec = spec.light(format!("Mute {}", i));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            unmuted: [true; MUTE_CHANNELS],
            buttons: [BooleanTrigger::default(); MUTE_CHANNELS],
        }
    }

    pub fn is_muted(&self, channel: usize) -> bool {
        !self.unmuted[channel]
    }

    pub fn set_muted(&mut self, channel: usize, muted: bool) {
        self.unmuted[channel] = !muted;
    }
}

impl Default for Mutes {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Mutes {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let mut source = None;
        for i in 0..MUTE_CHANNELS {
            if self.buttons[i].process(self.io.param(Self::MUTE_PARAM + i) > 0.0) {
                self.unmuted[i] ^= true;
            }
            let input = *self.io.input(Self::IN_INPUT + i);
            if input.is_connected() {
                source = Some(input);
            }

            let out = self.io.output_mut(Self::OUT_OUTPUT + i);
            match source {
                Some(port) => {
                    out.set_channels(port.channels());
                    if self.unmuted[i] {
                        out.write_voltages(port.voltages());
                    } else {
                        out.clear_voltages();
                    }
                }
                None => {
                    out.set_channels(1);
                    out.clear_voltages();
                }
            }
            let light = if self.unmuted[i] { 0.9 } else { 0.0 };
            self.io.light_mut(Self::MUTE_LIGHT + i).set_brightness(light);
        }
    }

    fn reset(&mut self) {
        self.unmuted = [true; MUTE_CHANNELS];
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bools("states", &self.unmuted);
    }

    fn load_state(&mut self, state: &StateStore) {
        state.get_bools("states", &mut self.unmuted);
    }
}

/// Gain, offset and a min/max window, each edge of which either clamps or
/// reflects.
pub struct Rescale {
    io: ModuleIo,
    multiplier: f32,
    reflect_min: bool,
    reflect_max: bool,
}

impl Rescale {
    pub const GAIN_PARAM: usize = 0;
    pub const OFFSET_PARAM: usize = 1;
    pub const MAX_PARAM: usize = 2;
    pub const MIN_PARAM: usize = 3;

    pub const IN_INPUT: usize = 0;
    pub const OUT_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Gain", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Offset", -10.0, 10.0, 0.0).with_unit(" V"))
            .param(ParamDef::new("Maximum", -10.0, 10.0, 10.0).with_unit(" V"))
            .param(ParamDef::new("Minimum", -10.0, 10.0, -10.0).with_unit(" V"))
            .input("Signal", SignalKind::CvBipolar)
            .output("Signal", SignalKind::CvBipolar)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            multiplier: 1.0,
            reflect_min: false,
            reflect_max: false,
        }
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Scales the gain knob range, e.g. 10 for ±10x
    pub fn set_multiplier(&mut self, multiplier: f32) {
        self.multiplier = multiplier;
    }

    pub fn set_reflect(&mut self, min: bool, max: bool) {
        self.reflect_min = min;
        self.reflect_max = max;
    }

    /// Applies the window to an already scaled and offset voltage
    pub fn limit(&self, x: f32, min: f32, max: f32) -> f32 {
        match (self.reflect_min, self.reflect_max) {
            (true, true) if max > min => {
                // Fold back and forth between the two edges
                let range = max - min;
                let t = (x - min).rem_euclid(2.0 * range);
                min + if t > range { 2.0 * range - t } else { t }
            }
            (true, false) => ((x - min).abs() + min).min(max),
            (false, true) => (max - (max - x).abs()).max(min),
            _ => x.min(max).max(min),
        }
    }
}

impl Default for Rescale {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Rescale {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let channels = self.io.max_input_channels(&[Self::IN_INPUT]);
        let gain = self.io.param(Self::GAIN_PARAM) * self.multiplier;
        let offset = self.io.param(Self::OFFSET_PARAM);
        let min = self.io.param(Self::MIN_PARAM);
        let max = self.io.param(Self::MAX_PARAM);
        let input = *self.io.input(Self::IN_INPUT);
        let mut out = [0.0; PORT_MAX_CHANNELS];
        for (c, v) in out[..channels].iter_mut().enumerate() {
            *v = self.limit(input.get_poly_voltage(c) * gain + offset, min, max);
        }
        let output = self.io.output_mut(Self::OUT_OUTPUT);
        output.set_channels(channels);
        output.write_voltages(&out[..channels]);
    }

    fn reset(&mut self) {
        self.multiplier = 1.0;
        self.set_reflect(false, false);
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_f32("multiplier", self.multiplier);
        state.set_bool("reflectMin", self.reflect_min);
        state.set_bool("reflectMax", self.reflect_max);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.multiplier = state.get_f32("multiplier", self.multiplier);
        self.reflect_min = state.get_bool("reflectMin", self.reflect_min);
        self.reflect_max = state.get_bool("reflectMax", self.reflect_max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_push_gate_and_trigger() {
        let mut push = Push::default();
        let args = ProcessArgs::new(500.0);
        push.io_mut().set_param(Push::PUSH_PARAM, 1.0);
        push.process(&args);
        assert_eq!(push.io().output(Push::GATE_OUTPUT).get_voltage(0), 10.0);
        assert_eq!(push.io().output(Push::TRIG_OUTPUT).get_voltage(0), 10.0);
        // A 1 ms pulse at 500 Hz lasts a single frame
        push.process(&args.next());
        assert_eq!(push.io().output(Push::TRIG_OUTPUT).get_voltage(0), 0.0);
        assert_eq!(push.io().output(Push::GATE_OUTPUT).get_voltage(0), 10.0);
        push.io_mut().set_param(Push::PUSH_PARAM, 0.0);
        push.process(&args);
        assert_eq!(push.io().output(Push::GATE_OUTPUT).get_voltage(0), 0.0);
    }

    #[test]
    fn test_push_hold_inverts_and_persists() {
        let mut push = Push::default();
        let args = ProcessArgs::default();
        push.io_mut().set_param(Push::HOLD_PARAM, 1.0);
        push.process(&args);
        push.io_mut().set_param(Push::HOLD_PARAM, 0.0);
        push.process(&args);
        assert!(push.is_held());
        assert_eq!(push.io().output(Push::GATE_OUTPUT).get_voltage(0), 10.0);

        // Pushing while held releases the gate
        push.io_mut().input_mut(Push::PUSH_INPUT).connect(1);
        push.io_mut().input_mut(Push::PUSH_INPUT).set_voltage(5.0, 0);
        push.process(&args);
        assert_eq!(push.io().output(Push::GATE_OUTPUT).get_voltage(0), 0.0);

        let mut state = StateStore::new();
        push.save_state(&mut state);
        let mut restored = Push::default();
        restored.load_state(&state);
        assert!(restored.is_held());
    }

    #[test]
    fn test_pulses_buttons_are_independent() {
        let mut pulses = Pulses::default();
        pulses.io_mut().set_param(Pulses::PUSH_PARAM + 3, 1.0);
        pulses.process(&ProcessArgs::default());
        assert_eq!(pulses.io().output(Pulses::TRIG_OUTPUT + 3).get_voltage(0), 10.0);
        assert_eq!(pulses.io().output(Pulses::GATE_OUTPUT + 3).get_voltage(0), 10.0);
        assert_eq!(pulses.io().output(Pulses::TRIG_OUTPUT).get_voltage(0), 0.0);
        assert_eq!(pulses.io().output(Pulses::GATE_OUTPUT + 4).get_voltage(0), 0.0);
    }

    #[test]
    fn test_octave_shift_is_clamped_and_persisted() {
        let mut octave = Octave::default();
        octave.set_octave(7);
        assert_eq!(octave.octave(), MAX_OCTAVE);
        octave.set_octave(-2);
        octave.io_mut().input_mut(Octave::PITCH_INPUT).connect(2);
        octave.io_mut().input_mut(Octave::PITCH_INPUT).set_voltage(0.5, 1);
        octave.io_mut().output_mut(Octave::PITCH_OUTPUT).connect(1);
        octave.process(&ProcessArgs::default());
        assert_eq!(octave.io().output(Octave::PITCH_OUTPUT).channels(), 2);
        assert_abs_diff_eq!(octave.io().output(Octave::PITCH_OUTPUT).get_voltage(1), -1.5);

        let mut state = StateStore::new();
        octave.save_state(&mut state);
        let mut restored = Octave::default();
        restored.load_state(&state);
        assert_eq!(restored.octave(), -2);
    }

    #[test]
    fn test_split_then_merge() {
        let mut split = Split::default();
        split.io_mut().input_mut(Split::POLY_INPUT).connect(3);
        for c in 0..3 {
            split
                .io_mut()
                .input_mut(Split::POLY_INPUT)
                .set_voltage(c as f32 + 1.0, c);
        }
        split.process(&ProcessArgs::default());

        let mut merge = Merge::default();
        merge.io_mut().output_mut(Merge::POLY_OUTPUT).connect(1);
        for c in 0..3 {
            let v = split.io().output(Split::MONO_OUTPUT + c).get_voltage(0);
            let input = merge.io_mut().input_mut(Merge::MONO_INPUT + c);
            input.connect(1);
            input.set_voltage(v, 0);
        }
        merge.process(&ProcessArgs::default());
        let out = merge.io().output(Merge::POLY_OUTPUT);
        assert_eq!(out.channels(), 3);
        assert_eq!(out.voltages(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_merge_fixed_channels_persist() {
        let mut merge = Merge::default();
        merge.io_mut().output_mut(Merge::POLY_OUTPUT).connect(1);
        merge.io_mut().input_mut(Merge::MONO_INPUT).connect(1);
        merge.set_channels(Some(6));
        merge.process(&ProcessArgs::default());
        assert_eq!(merge.io().output(Merge::POLY_OUTPUT).channels(), 6);

        let mut state = StateStore::new();
        merge.save_state(&mut state);
        let mut restored = Merge::default();
        restored.load_state(&state);
        assert_eq!(restored.channels(), Some(6));

        merge.set_channels(None);
        merge.save_state(&mut state);
        restored.load_state(&state);
        assert_eq!(restored.channels(), None);
    }

    #[test]
    fn test_sum_and_mult() {
        let mut sum = Sum::default();
        sum.io_mut().input_mut(Sum::POLY_INPUT).connect(4);
        for c in 0..4 {
            sum.io_mut().input_mut(Sum::POLY_INPUT).set_voltage(1.5, c);
        }
        sum.io_mut().set_param(Sum::LEVEL_PARAM, 0.5);
        sum.process(&ProcessArgs::default());
        assert_abs_diff_eq!(sum.io().output(Sum::MONO_OUTPUT).get_voltage(0), 3.0);

        let mut mult = Mult::default();
        mult.io_mut().input_mut(Mult::MULT_INPUT).connect(2);
        mult.io_mut().input_mut(Mult::MULT_INPUT).set_voltage(-2.0, 1);
        for i in 0..MULT_OUTPUTS {
            mult.io_mut().output_mut(i).connect(1);
        }
        mult.process(&ProcessArgs::default());
        for i in 0..MULT_OUTPUTS {
            assert_eq!(mult.io().output(i).voltages(), &[0.0, -2.0]);
        }
    }

    #[test]
    fn test_mutes_normalled_chain() {
        let mut mutes = Mutes::default();
        mutes.io_mut().input_mut(Mutes::IN_INPUT).connect(1);
        mutes.io_mut().input_mut(Mutes::IN_INPUT).set_voltage(4.0, 0);
        mutes.set_muted(2, true);
        mutes.process(&ProcessArgs::default());
        assert_eq!(mutes.io().output(Mutes::OUT_OUTPUT + 1).get_voltage(0), 4.0);
        assert_eq!(mutes.io().output(Mutes::OUT_OUTPUT + 2).get_voltage(0), 0.0);
        assert_eq!(mutes.io().output(Mutes::OUT_OUTPUT + 9).get_voltage(0), 4.0);

        // Toggling by button
        mutes.io_mut().set_param(Mutes::MUTE_PARAM + 2, 1.0);
        mutes.process(&ProcessArgs::default());
        assert!(!mutes.is_muted(2));

        let mut state = StateStore::new();
        mutes.set_muted(5, true);
        mutes.save_state(&mut state);
        let mut restored = Mutes::default();
        restored.load_state(&state);
        assert!(restored.is_muted(5));
        assert!(!restored.is_muted(2));
    }

    #[test]
    fn test_rescale_clamps_and_reflects() {
        let mut rescale = Rescale::default();
        assert_abs_diff_eq!(rescale.limit(12.0, -5.0, 5.0), 5.0);
        rescale.set_reflect(true, false);
        assert_abs_diff_eq!(rescale.limit(-7.0, -5.0, 5.0), -3.0);
        rescale.set_reflect(false, true);
        assert_abs_diff_eq!(rescale.limit(7.0, -5.0, 5.0), 3.0);
        rescale.set_reflect(true, true);
        assert_abs_diff_eq!(rescale.limit(17.0, -5.0, 5.0), -3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(rescale.limit(-8.0, -5.0, 5.0), -2.0, epsilon = 1e-5);
        // An inverted window collapses onto the minimum
        rescale.set_reflect(false, false);
        assert_abs_diff_eq!(rescale.limit(0.0, 2.0, -2.0), 2.0);
    }

    #[test]
    fn test_rescale_process_with_multiplier() {
        let mut rescale = Rescale::default();
        rescale.set_multiplier(10.0);
        rescale.io_mut().set_param(Rescale::GAIN_PARAM, 0.5);
        rescale.io_mut().set_param(Rescale::OFFSET_PARAM, 1.0);
        rescale.io_mut().input_mut(Rescale::IN_INPUT).connect(1);
        rescale.io_mut().input_mut(Rescale::IN_INPUT).set_voltage(0.2, 0);
        rescale.io_mut().output_mut(Rescale::OUT_OUTPUT).connect(1);
        rescale.process(&ProcessArgs::default());
        assert_abs_diff_eq!(rescale.io().output(Rescale::OUT_OUTPUT).get_voltage(0), 2.0, epsilon = 1e-6);

        let mut state = StateStore::new();
        rescale.set_reflect(true, false);
        rescale.save_state(&mut state);
        let mut restored = Rescale::default();
        restored.load_state(&state);
        assert_abs_diff_eq!(restored.multiplier(), 10.0);
        assert_abs_diff_eq!(restored.limit(-12.0, -10.0, 10.0), -8.0);
    }
}
