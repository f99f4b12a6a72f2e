//! Sequential switches: one input routed to 4 outputs in turn, or 4 inputs
//! selected in turn onto one output. Selection changes are slewed to avoid
//! clicks.

use crate::dsp::{SchmittTrigger, SlewLimiter};
use crate::persist::EngineSettings;
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind, PORT_MAX_CHANNELS};

pub const WAYS: usize = 4;
/// Crossfade speed between slots, full scale per second
const SLEW_RATE: f32 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    /// One input distributed to four outputs
    OneToFour,
    /// Four inputs selected onto one output
    FourToOne,
}

pub struct SequentialSwitch {
    io: ModuleIo,
    kind: SwitchKind,
    selected: usize,
    clock_trigger: SchmittTrigger,
    reset_trigger: SchmittTrigger,
    slews: [SlewLimiter; WAYS],
}

impl SequentialSwitch {
    pub const STEPS_PARAM: usize = 0;

    pub const CLOCK_INPUT: usize = 0;
    pub const RESET_INPUT: usize = 1;
    pub const IN_INPUT: usize = 2;

    pub const OUT_OUTPUT: usize = 0;

    pub const SELECT_LIGHT: usize = 0;

    pub fn spec(kind: SwitchKind) -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::switch("Steps", 0.0, 2.0, 0.0))
            .input("Clock", SignalKind::Clock)
            .input("Reset", SignalKind::Trigger);
        match kind {
            SwitchKind::OneToFour => {
                spec = spec.input("Audio", SignalKind::Audio);
                for i in 1..=WAYS {
                    spec = spec.output(format!("Audio {}", i), SignalKind::Audio);
                }
            }
            SwitchKind::FourToOne => {
                for i in 1..=WAYS {
                    spec = spec.input(format!("Audio {}", i), SignalKind::Audio);
                }
                spec = spec.output("Audio", SignalKind::Audio);
            }
        }
        for i in 1..=WAYS {
            spec = spec.light(format!("Slot {}", i));
        }
        spec
    }

    pub fn with_kind(kind: SwitchKind) -> Self {
        Self {
            io: ModuleIo::new(Self::spec(kind)),
            kind,
            selected: 0,
            clock_trigger: SchmittTrigger::default(),
            reset_trigger: SchmittTrigger::default(),
            slews: [SlewLimiter::new(SLEW_RATE, SLEW_RATE); WAYS],
        }
    }

    pub fn one_to_four(_settings: &EngineSettings) -> Self {
        Self::with_kind(SwitchKind::OneToFour)
    }

    pub fn four_to_one(_settings: &EngineSettings) -> Self {
        Self::with_kind(SwitchKind::FourToOne)
    }

    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Slewed routing weight of `slot`, 0 to 1
    pub fn weight(&self, slot: usize) -> f32 {
        self.slews[slot].value()
    }

    fn num_steps(&self) -> usize {
        WAYS - (self.io.param(Self::STEPS_PARAM).round().clamp(0.0, 2.0) as usize)
    }
}

impl Module for SequentialSwitch {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let clock = self.io.input(Self::CLOCK_INPUT).get_voltage(0) / 2.0;
        if self.clock_trigger.process(clock) {
            self.selected += 1;
        }
        let reset = self.io.input(Self::RESET_INPUT).get_voltage(0) / 2.0;
        if self.reset_trigger.process(reset) {
            self.selected = 0;
        }
        self.selected %= self.num_steps();

        for (i, slew) in self.slews.iter_mut().enumerate() {
            let target = if i == self.selected { 1.0 } else { 0.0 };
            slew.process(args.sample_time, target);
        }
        let weights: [f32; WAYS] = std::array::from_fn(|i| self.slews[i].value());

        match self.kind {
            SwitchKind::OneToFour => {
                let channels = self.io.max_input_channels(&[Self::IN_INPUT]);
                let input = self.io.input(Self::IN_INPUT);
                let voltages: [f32; PORT_MAX_CHANNELS] = std::array::from_fn(|c| input.get_voltage(c));
                for (i, &w) in weights.iter().enumerate() {
                    let out = self.io.output_mut(Self::OUT_OUTPUT + i);
                    out.set_channels(channels);
                    for (c, &v) in voltages[..channels].iter().enumerate() {
                        out.set_voltage(v * w, c);
                    }
                }
            }
            SwitchKind::FourToOne => {
                let inputs: [usize; WAYS] = std::array::from_fn(|i| Self::IN_INPUT + i);
                let channels = self.io.max_input_channels(&inputs);
                let mut mixed = [0.0; PORT_MAX_CHANNELS];
                for (i, &w) in weights.iter().enumerate() {
                    let input = self.io.input(Self::IN_INPUT + i);
                    for (c, m) in mixed[..channels].iter_mut().enumerate() {
                        *m += input.get_poly_voltage(c) * w;
                    }
                }
                let out = self.io.output_mut(Self::OUT_OUTPUT);
                out.set_channels(channels);
                out.write_voltages(&mixed[..channels]);
            }
        }

        for (i, &w) in weights.iter().enumerate() {
            self.io.light_mut(Self::SELECT_LIGHT + i).set_brightness(w);
        }
    }

    fn reset(&mut self) {
        self.selected = 0;
        for slew in &mut self.slews {
            slew.reset(0.0);
        }
    }
}
