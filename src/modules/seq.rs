//! SEQ-3: eight-step, three-row CV and gate sequencer

use crate::dsp::{BooleanTrigger, ClockDivider, SchmittTrigger, Timer};
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind};

pub const STEPS: usize = 8;

pub struct Seq3 {
    io: ModuleIo,
    running: bool,
    gates: [bool; STEPS],
    index: usize,
    phase: f32,
    gate_in: bool,
    clock_trigger: SchmittTrigger,
    run_button: BooleanTrigger,
    run_trigger: SchmittTrigger,
    reset_trigger: SchmittTrigger,
    gate_buttons: [BooleanTrigger; STEPS],
    clock_timer: Timer,
    light_divider: ClockDivider,
}

impl Seq3 {
    pub const CLOCK_PARAM: usize = 0;
    pub const RUN_PARAM: usize = 1;
    pub const RESET_PARAM: usize = 2;
    pub const STEPS_PARAM: usize = 3;
    pub const ROW1_PARAM: usize = 4;
    pub const ROW2_PARAM: usize = Self::ROW1_PARAM + STEPS;
    pub const ROW3_PARAM: usize = Self::ROW2_PARAM + STEPS;
    pub const GATE_PARAM: usize = Self::ROW3_PARAM + STEPS;
    pub const TEMPO_CV_PARAM: usize = Self::GATE_PARAM + STEPS;

    pub const CLOCK_INPUT: usize = 0;
    pub const EXT_CLOCK_INPUT: usize = 1;
    pub const RESET_INPUT: usize = 2;
    pub const STEPS_INPUT: usize = 3;
    pub const RUN_INPUT: usize = 4;

    pub const GATES_OUTPUT: usize = 0;
    pub const ROW1_OUTPUT: usize = 1;
    pub const ROW2_OUTPUT: usize = 2;
    pub const ROW3_OUTPUT: usize = 3;
    pub const GATE_OUTPUT: usize = 4;

    pub const RUNNING_LIGHT: usize = 0;
    pub const RESET_LIGHT: usize = 1;
    pub const GATES_LIGHT: usize = 2;
    pub const ROW_LIGHTS: usize = 3;
    pub const GATE_LIGHTS: usize = 6;

    pub fn spec() -> ModuleSpec {
        let mut spec = ModuleSpec::new()
            .param(ParamDef::new("Clock tempo", -2.0, 6.0, 2.0).with_unit("log2 Hz"))
            .param(ParamDef::button("Run"))
            .param(ParamDef::button("Reset"))
            .param(ParamDef::switch("Steps", 1.0, 8.0, 8.0));
        for row in 1..=3 {
            for step in 1..=STEPS {
                spec = spec.param(
                    ParamDef::new(format!("Row {} step {}", row, step), 0.0, 10.0, 0.0).with_unit("V"),
                );
            }
        }
        for step in 1..=STEPS {
            spec = spec.param(ParamDef::button(format!("Step {} gate", step)));
        }
        spec = spec
            .param(ParamDef::new("Tempo CV", -1.0, 1.0, 1.0))
            .input("Tempo", SignalKind::CvBipolar)
            .input("External clock", SignalKind::Clock)
            .input("Reset", SignalKind::Trigger)
            .input("Steps", SignalKind::CvUnipolar)
            .input("Run", SignalKind::Trigger)
            .output("Gate", SignalKind::Gate)
            .output("Row 1", SignalKind::CvUnipolar)
            .output("Row 2", SignalKind::CvUnipolar)
            .output("Row 3", SignalKind::CvUnipolar);
        for step in 1..=STEPS {
            spec = spec.output(format!("Step {} gate", step), SignalKind::Gate);
        }
        spec = spec
            .light("Running")
            .light("Reset")
            .light("Gate")
            .light("Row 1")
            .light("Row 2")
            .light("Row 3");
        for step in 1..=STEPS {
            spec = spec.light(format!("Step {}", step));
        }
        spec
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            running: true,
            gates: [true; STEPS],
            index: 0,
            phase: 0.0,
            gate_in: false,
            clock_trigger: SchmittTrigger::default(),
            run_button: BooleanTrigger::default(),
            run_trigger: SchmittTrigger::default(),
            reset_trigger: SchmittTrigger::default(),
            gate_buttons: [BooleanTrigger::default(); STEPS],
            clock_timer: Timer::default(),
            light_divider: ClockDivider::new(16),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn gates(&self) -> &[bool; STEPS] {
        &self.gates
    }

    pub fn set_gate(&mut self, step: usize, on: bool) {
        self.gates[step] = on;
    }

    /// Seconds since the last external clock edge
    pub fn time_since_clock(&self) -> f32 {
        self.clock_timer.time()
    }

    pub fn num_steps(&self) -> usize {
        let steps = self.io.param(Self::STEPS_PARAM) + self.io.input(Self::STEPS_INPUT).get_voltage(0);
        steps.round().clamp(1.0, STEPS as f32) as usize
    }

    /// Jumps to `index`, wrapping to the first step past the active length
    pub fn set_index(&mut self, index: usize) {
        self.phase = 0.0;
        self.index = if index >= self.num_steps() { 0 } else { index };
    }

    /// Returns true when the clock advanced this frame
    fn clock(&mut self, dt: f32) -> bool {
        let ext = self.io.input(Self::EXT_CLOCK_INPUT);
        if ext.is_connected() {
            let v = ext.get_voltage(0);
            self.clock_timer.process(dt);
            let edge = self.clock_trigger.process(v);
            if edge {
                self.clock_timer.reset();
            }
            self.gate_in = self.clock_trigger.is_high();
            edge
        } else {
            let cv = self.io.input(Self::CLOCK_INPUT).get_voltage(0) * self.io.param(Self::TEMPO_CV_PARAM);
            let rate = (self.io.param(Self::CLOCK_PARAM) + cv).exp2();
            self.phase += rate * dt;
            let advance = self.phase >= 1.0;
            if advance {
                // Overshoot carries into the new step
                self.phase -= 1.0;
            }
            self.gate_in = self.phase < 0.5;
            advance
        }
    }
}

impl Default for Seq3 {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Seq3 {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let run_pressed = self.run_button.process(self.io.param(Self::RUN_PARAM) > 0.0);
        let run_edge = self
            .run_trigger
            .process(self.io.input(Self::RUN_INPUT).get_voltage(0));
        if run_pressed || run_edge {
            self.running = !self.running;
        }

        let reset_level =
            self.io.param(Self::RESET_PARAM) * 10.0 + self.io.input(Self::RESET_INPUT).get_voltage(0);
        let reset = self.reset_trigger.process(reset_level);
        if reset {
            self.set_index(0);
        }

        if self.running {
            let advanced = self.clock(args.sample_time);
            if advanced && !reset {
                let next = self.index + 1;
                self.index = if next >= self.num_steps() { 0 } else { next };
            } else if advanced {
                self.phase = 0.0;
            }
        } else {
            self.gate_in = false;
        }

        for (i, button) in self.gate_buttons.iter_mut().enumerate() {
            if button.process(self.io.param(Self::GATE_PARAM + i) > 0.0) {
                self.gates[i] = !self.gates[i];
            }
        }

        let index = self.index;
        let gate_on = self.gate_in && self.gates[index];
        for i in 0..STEPS {
            let v = if self.running && gate_on && i == index { 10.0 } else { 0.0 };
            self.io.output_mut(Self::GATE_OUTPUT + i).set_voltage(v, 0);
        }
        let rows = [
            self.io.param(Self::ROW1_PARAM + index),
            self.io.param(Self::ROW2_PARAM + index),
            self.io.param(Self::ROW3_PARAM + index),
        ];
        for (row, &v) in rows.iter().enumerate() {
            self.io.output_mut(Self::ROW1_OUTPUT + row).set_voltage(v, 0);
        }
        self.io
            .output_mut(Self::GATES_OUTPUT)
            .set_voltage(if gate_on { 10.0 } else { 0.0 }, 0);

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let running = if self.running { 1.0 } else { 0.0 };
            let reset_lit = if self.reset_trigger.is_high() { 1.0 } else { 0.0 };
            let gate_lit = if self.gate_in { 1.0 } else { 0.0 };
            self.io.light_mut(Self::RUNNING_LIGHT).set_brightness(running);
            self.io.light_mut(Self::RESET_LIGHT).set_brightness_smooth(reset_lit, dt);
            self.io.light_mut(Self::GATES_LIGHT).set_brightness_smooth(gate_lit, dt);
            for (row, &v) in rows.iter().enumerate() {
                self.io.light_mut(Self::ROW_LIGHTS + row).set_brightness(v / 10.0);
            }
            for i in 0..STEPS {
                let b = match (self.gate_in && i == index, self.gates[i]) {
                    (true, true) => 1.0,
                    (true, false) => 0.33,
                    (false, true) => 0.66,
                    (false, false) => 0.0,
                };
                self.io.light_mut(Self::GATE_LIGHTS + i).set_brightness_smooth(b, dt);
            }
        }
    }

    fn reset(&mut self) {
        self.gates = [true; STEPS];
        self.index = 0;
        self.phase = 0.0;
        self.running = true;
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bool("running", self.running);
        state.set_bools("gates", &self.gates);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.running = state.get_bool("running", self.running);
        state.get_bools("gates", &mut self.gates);
    }
}
