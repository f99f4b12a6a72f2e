//! Oscilloscope capture engine
//!
//! X and Y are sampled into fixed buffers at an interval set by the time
//! knob. Once a buffer is full the scope waits for a trigger before it starts
//! over: a rising edge through the trigger level on X (or on the trigger
//! input in external mode), or [`HOLD_TIME`] without one. Drawing is left to
//! the host, which reads the buffers and their [`ScopeStats`].

use crate::dsp::{BooleanTrigger, SchmittTrigger};
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind};

pub const SCOPE_BUFFER_SIZE: usize = 512;
/// Longest wait for a trigger once the buffer is full, in seconds
pub const HOLD_TIME: f32 = 0.1;
/// Hysteresis below the trigger level
const TRIGGER_HYSTERESIS: f32 = 0.1;

/// Summary of a captured buffer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScopeStats {
    pub vrms: f32,
    pub vpp: f32,
    pub vmin: f32,
    pub vmax: f32,
}

impl ScopeStats {
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let (mut vmin, mut vmax, mut sum_sq) = (f32::INFINITY, f32::NEG_INFINITY, 0.0);
        for &v in values {
            vmin = vmin.min(v);
            vmax = vmax.max(v);
            sum_sq += v * v;
        }
        Self {
            vrms: (sum_sq / values.len() as f32).sqrt(),
            vpp: vmax - vmin,
            vmin,
            vmax,
        }
    }
}

/// Two-channel triggered scope
pub struct Scope {
    io: ModuleIo,
    buffer_x: [f32; SCOPE_BUFFER_SIZE],
    buffer_y: [f32; SCOPE_BUFFER_SIZE],
    buffer_index: usize,
    frame_index: u32,
    lissajous: bool,
    external: bool,
    lissajous_button: BooleanTrigger,
    external_button: BooleanTrigger,
    trigger: SchmittTrigger,
}

impl Scope {
    pub const X_SCALE_PARAM: usize = 0;
    pub const X_POS_PARAM: usize = 1;
    pub const Y_SCALE_PARAM: usize = 2;
    pub const Y_POS_PARAM: usize = 3;
    pub const TIME_PARAM: usize = 4;
    pub const LISSAJOUS_PARAM: usize = 5;
    pub const TRIG_PARAM: usize = 6;
    pub const EXTERNAL_PARAM: usize = 7;

    pub const X_INPUT: usize = 0;
    pub const Y_INPUT: usize = 1;
    pub const TRIG_INPUT: usize = 2;

    pub const PLOT_LIGHT: usize = 0;
    pub const LISSAJOUS_LIGHT: usize = 1;
    pub const INTERNAL_LIGHT: usize = 2;
    pub const EXTERNAL_LIGHT: usize = 3;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::switch("X scale", -2.0, 8.0, 0.0))
            .param(ParamDef::new("X position", -10.0, 10.0, 0.0).with_unit(" V"))
            .param(ParamDef::switch("Y scale", -2.0, 8.0, 0.0))
            .param(ParamDef::new("Y position", -10.0, 10.0, 0.0).with_unit(" V"))
            .param(ParamDef::new("Time", -16.0, -6.0, -14.0).with_unit("log2 s"))
            .param(ParamDef::button("Lissajous mode"))
            .param(ParamDef::new("Trigger level", -10.0, 10.0, 0.0).with_unit(" V"))
            .param(ParamDef::button("External trigger"))
            .input("X", SignalKind::Audio)
            .input("Y", SignalKind::Audio)
            .input("Trigger", SignalKind::Trigger)
            .light("Plot")
            .light("Lissajous")
            .light("Internal")
            .light("External")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            buffer_x: [0.0; SCOPE_BUFFER_SIZE],
            buffer_y: [0.0; SCOPE_BUFFER_SIZE],
            buffer_index: 0,
            frame_index: 0,
            lissajous: false,
            external: false,
            lissajous_button: BooleanTrigger::default(),
            external_button: BooleanTrigger::default(),
            trigger: SchmittTrigger::new(),
        }
    }

    pub fn buffer_x(&self) -> &[f32; SCOPE_BUFFER_SIZE] {
        &self.buffer_x
    }

    pub fn buffer_y(&self) -> &[f32; SCOPE_BUFFER_SIZE] {
        &self.buffer_y
    }

    /// Next slot to be written; equal to the buffer size while waiting
    pub fn buffer_index(&self) -> usize {
        self.buffer_index
    }

    /// True once the buffer is full and no trigger has arrived yet
    pub fn is_waiting(&self) -> bool {
        self.buffer_index >= SCOPE_BUFFER_SIZE
    }

    pub fn lissajous(&self) -> bool {
        self.lissajous
    }

    pub fn set_lissajous(&mut self, lissajous: bool) {
        self.lissajous = lissajous;
    }

    pub fn external(&self) -> bool {
        self.external
    }

    pub fn set_external(&mut self, external: bool) {
        self.external = external;
    }

    pub fn stats_x(&self) -> ScopeStats {
        ScopeStats::of(&self.buffer_x)
    }

    pub fn stats_y(&self) -> ScopeStats {
        ScopeStats::of(&self.buffer_y)
    }

    fn restart(&mut self) {
        self.buffer_index = 0;
        self.frame_index = 0;
    }

    fn update_lights(&mut self) {
        let on = |b: bool| if b { 1.0 } else { 0.0 };
        let (lissajous, external) = (self.lissajous, self.external);
        self.io.light_mut(Self::PLOT_LIGHT).set_brightness(on(!lissajous));
        self.io.light_mut(Self::LISSAJOUS_LIGHT).set_brightness(on(lissajous));
        self.io.light_mut(Self::INTERNAL_LIGHT).set_brightness(on(!external));
        self.io.light_mut(Self::EXTERNAL_LIGHT).set_brightness(on(external));
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Scope {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        if self.lissajous_button.process(self.io.param(Self::LISSAJOUS_PARAM) > 0.0) {
            self.lissajous = !self.lissajous;
        }
        if self.external_button.process(self.io.param(Self::EXTERNAL_PARAM) > 0.0) {
            self.external = !self.external;
        }
        self.update_lights();

        let interval = self.io.param(Self::TIME_PARAM).exp2();
        let frame_count = (interval * args.sample_rate).ceil() as u32;

        if self.buffer_index < SCOPE_BUFFER_SIZE {
            self.frame_index += 1;
            if self.frame_index > frame_count {
                self.frame_index = 0;
                self.buffer_x[self.buffer_index] = self.io.input(Self::X_INPUT).get_voltage(0);
                self.buffer_y[self.buffer_index] = self.io.input(Self::Y_INPUT).get_voltage(0);
                self.buffer_index += 1;
            }
        }

        if self.buffer_index < SCOPE_BUFFER_SIZE {
            return;
        }

        // Free-running without a trigger source
        let trig_input = self.io.input(Self::TRIG_INPUT);
        if self.lissajous || (self.external && !trig_input.is_connected()) {
            self.restart();
            return;
        }

        if self.frame_index == 0 {
            self.trigger.rearm();
        }
        self.frame_index += 1;

        let level = self.io.param(Self::TRIG_PARAM);
        let gate = if self.external {
            trig_input.get_voltage(0)
        } else {
            self.io.input(Self::X_INPUT).get_voltage(0)
        };
        let triggered = self
            .trigger
            .process_with(gate, level - TRIGGER_HYSTERESIS, level);
        if triggered || self.frame_index as f32 >= args.sample_rate * HOLD_TIME {
            self.restart();
        }
    }

    fn reset(&mut self) {
        self.lissajous = false;
        self.external = false;
        self.buffer_x = [0.0; SCOPE_BUFFER_SIZE];
        self.buffer_y = [0.0; SCOPE_BUFFER_SIZE];
        self.restart();
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bool("lissajous", self.lissajous);
        state.set_bool("external", self.external);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.lissajous = state.get_bool("lissajous", self.lissajous);
        self.external = state.get_bool("external", self.external);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 1 kHz with a 2^-10 s interval: one capture every other frame
    fn scope() -> (Scope, ProcessArgs) {
        let mut scope = Scope::default();
        scope.io_mut().set_param(Scope::TIME_PARAM, -10.0);
        scope.io_mut().input_mut(Scope::X_INPUT).connect(1);
        (scope, ProcessArgs::new(1000.0))
    }

    fn run(scope: &mut Scope, x: f32, frames: usize, args: &ProcessArgs) {
        scope.io_mut().input_mut(Scope::X_INPUT).set_voltage(x, 0);
        for _ in 0..frames {
            scope.process(args);
        }
    }

    #[test]
    fn test_capture_rate_and_hold_timeout() {
        let (mut scope, args) = scope();
        run(&mut scope, -1.0, 1023, &args);
        assert_eq!(scope.buffer_index(), SCOPE_BUFFER_SIZE - 1);
        run(&mut scope, -1.0, 1, &args);
        assert!(scope.is_waiting());
        assert!(scope.buffer_x().iter().all(|&v| v == -1.0));

        // X never crosses the 0 V level, so the hold time restarts capture
        run(&mut scope, -1.0, 98, &args);
        assert!(scope.is_waiting());
        run(&mut scope, -1.0, 1, &args);
        assert_eq!(scope.buffer_index(), 0);
    }

    #[test]
    fn test_held_input_waits_for_a_fresh_edge() {
        let (mut scope, args) = scope();
        run(&mut scope, 5.0, 1024, &args);
        assert!(scope.is_waiting());
        run(&mut scope, 5.0, 10, &args);
        assert!(scope.is_waiting());
        run(&mut scope, -1.0, 10, &args);
        assert!(scope.is_waiting());
        run(&mut scope, 1.0, 1, &args);
        assert_eq!(scope.buffer_index(), 0);
    }

    #[test]
    fn test_lissajous_runs_free() {
        let (mut scope, args) = scope();
        scope.set_lissajous(true);
        run(&mut scope, -1.0, 1024, &args);
        assert_eq!(scope.buffer_index(), 0);
    }

    #[test]
    fn test_external_trigger_source() {
        let (mut scope, args) = scope();
        scope.io_mut().set_param(Scope::EXTERNAL_PARAM, 1.0);
        scope.process(&args);
        scope.io_mut().set_param(Scope::EXTERNAL_PARAM, 0.0);
        assert!(scope.external());
        assert_eq!(scope.io().lights[Scope::EXTERNAL_LIGHT].brightness(), 1.0);

        // Unpatched trigger input: runs free
        run(&mut scope, 5.0, 1023, &args);
        assert_eq!(scope.buffer_index(), 0);

        // Patched: X edges are ignored, the trigger input restarts capture
        scope.restart();
        scope.io_mut().input_mut(Scope::TRIG_INPUT).connect(1);
        scope.io_mut().input_mut(Scope::TRIG_INPUT).set_voltage(-1.0, 0);
        run(&mut scope, -1.0, 1024, &args);
        assert!(scope.is_waiting());
        run(&mut scope, 5.0, 5, &args);
        assert!(scope.is_waiting());
        scope.io_mut().input_mut(Scope::TRIG_INPUT).set_voltage(10.0, 0);
        scope.process(&args);
        assert_eq!(scope.buffer_index(), 0);
    }

    #[test]
    fn test_stats_and_state() {
        let stats = ScopeStats::of(&[1.0, -1.0, 1.0, -1.0]);
        assert_abs_diff_eq!(stats.vrms, 1.0);
        assert_abs_diff_eq!(stats.vpp, 2.0);
        assert_eq!((stats.vmin, stats.vmax), (-1.0, 1.0));
        assert_eq!(ScopeStats::of(&[]), ScopeStats::default());

        let mut scope = Scope::default();
        scope.set_lissajous(true);
        let mut state = StateStore::new();
        scope.save_state(&mut state);
        let mut restored = Scope::default();
        restored.load_state(&state);
        assert!(restored.lissajous());
        assert!(!restored.external());
    }
}
