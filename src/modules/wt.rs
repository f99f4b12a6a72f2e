//! Wavetable oscillator and wavetable LFO
//!
//! Both read a [`Wavetable`] with bilinear interpolation. The oscillator
//! offers a second engine that steps through the table at a source rate of
//! its own and lets a resampler retime the result to the output rate, which
//! keeps high-resolution tables from aliasing at low pitches. The step is one
//! point per source sample whenever the resampler can cover the ratio, and
//! grows or shrinks just enough to keep it in range otherwise.

use tracing::warn;

use crate::dsp::{BooleanTrigger, ClockDivider, SchmittTrigger, StreamResampler};
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind, PORT_MAX_CHANNELS};
use crate::wavetable::Wavetable;

const C4_HZ: f32 = 261.626;
const RESAMPLER_CHUNK: usize = 32;
/// Largest ratio between output rate and table stepping rate, either way
pub const MAX_RESAMPLE_RATIO: f64 = 256.0;
/// Largest source rate of the resampled engine, in output samples
pub const MAX_DECIMATION: f32 = 16.0;
/// Points per wave in the LFO's default table
pub const LFO_WAVE_LEN: usize = 1024;

/// Synthesis engine of [`WtVco`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WtEngine {
    /// Phase accumulator reading the table at the output rate
    Direct,
    /// Table stepped point by point, then resampled to the output rate
    Resampled,
}

/// Table points advanced per source sample, and the output/source ratio that
/// plays `points_per_second` at `sample_rate`.
///
/// A non-positive rate holds the table still.
pub fn source_stepping(points_per_second: f32, sample_rate: f32) -> (f32, f64) {
    let ideal = points_per_second / sample_rate;
    if !(ideal > 0.0) || !ideal.is_finite() {
        return (0.0, 1.0);
    }
    let step = 1.0f32
        .min(MAX_RESAMPLE_RATIO as f32 * ideal)
        .max(ideal / MAX_DECIMATION);
    (step, (step / ideal) as f64)
}

/// Polyphonic wavetable VCO
pub struct WtVco {
    io: ModuleIo,
    wavetable: Wavetable,
    phase: [f32; PORT_MAX_CHANNELS],
    source_pos: [f32; PORT_MAX_CHANNELS],
    resamplers: Vec<Option<StreamResampler>>,
    sync_triggers: [SchmittTrigger; PORT_MAX_CHANNELS],
    light_divider: ClockDivider,
}

impl WtVco {
    pub const ENGINE_PARAM: usize = 0;
    pub const FREQ_PARAM: usize = 1;
    pub const POS_PARAM: usize = 2;
    pub const FM_PARAM: usize = 3;
    pub const POS_CV_PARAM: usize = 4;

    pub const PITCH_INPUT: usize = 0;
    pub const FM_INPUT: usize = 1;
    pub const SYNC_INPUT: usize = 2;
    pub const POS_INPUT: usize = 3;

    pub const WAVE_OUTPUT: usize = 0;

    pub const PHASE_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::switch("Engine", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Frequency", -54.0, 54.0, 0.0).with_unit("semitones"))
            .param(ParamDef::new("Wavetable position", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Frequency modulation", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Wavetable position CV", -1.0, 1.0, 0.0))
            .input("1V/octave pitch", SignalKind::VoltPerOctave)
            .input("Frequency modulation", SignalKind::CvBipolar)
            .input("Sync", SignalKind::Gate)
            .input("Wavetable position", SignalKind::CvUnipolar)
            .output("Audio", SignalKind::Audio)
            .light("Phase")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        let mut resamplers = Vec::with_capacity(PORT_MAX_CHANNELS);
        for _ in 0..PORT_MAX_CHANNELS {
            match StreamResampler::new(RESAMPLER_CHUNK, MAX_RESAMPLE_RATIO) {
                Ok(r) => resamplers.push(Some(r)),
                Err(e) => {
                    warn!(error = %e, "wavetable resampler unavailable, resampled engine muted");
                    resamplers.push(None);
                }
            }
        }
        Self {
            io: ModuleIo::new(Self::spec()),
            wavetable: Wavetable::default(),
            phase: [0.0; PORT_MAX_CHANNELS],
            source_pos: [0.0; PORT_MAX_CHANNELS],
            resamplers,
            sync_triggers: [SchmittTrigger::default(); PORT_MAX_CHANNELS],
            light_divider: ClockDivider::new(16),
        }
    }

    pub fn wavetable(&self) -> &Wavetable {
        &self.wavetable
    }

    /// Host access for loading files and changing the wave length
    pub fn wavetable_mut(&mut self) -> &mut Wavetable {
        &mut self.wavetable
    }

    pub fn engine(&self) -> WtEngine {
        if self.io.param(Self::ENGINE_PARAM) >= 0.5 {
            WtEngine::Resampled
        } else {
            WtEngine::Direct
        }
    }

    pub fn phase(&self, channel: usize) -> f32 {
        self.phase[channel]
    }

    fn frequency(&self, c: usize, sample_rate: f32) -> f32 {
        let pitch = self.io.param(Self::FREQ_PARAM) / 12.0
            + self.io.input(Self::PITCH_INPUT).get_poly_voltage(c)
            + self.io.input(Self::FM_INPUT).get_poly_voltage(c) * self.io.param(Self::FM_PARAM);
        (C4_HZ * pitch.exp2()).clamp(0.0, sample_rate / 2.0)
    }

    fn position(&self, c: usize) -> f32 {
        let cv = self.io.input(Self::POS_INPUT).get_poly_voltage(c);
        (self.io.param(Self::POS_PARAM) + cv / 10.0 * self.io.param(Self::POS_CV_PARAM)).clamp(0.0, 1.0)
    }

    fn clear_output(&mut self) {
        let out = self.io.output_mut(Self::WAVE_OUTPUT);
        out.set_channels(1);
        out.clear_voltages();
        self.io.light_mut(Self::PHASE_LIGHT).set_brightness(0.0);
    }
}

impl Default for WtVco {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for WtVco {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        if !self.wavetable.is_valid() {
            self.clear_output();
            return;
        }

        let channels = self
            .io
            .max_input_channels(&[Self::PITCH_INPUT, Self::FM_INPUT]);
        let engine = self.engine();
        let wave_len = self.wavetable.wave_len();

        for c in 0..channels {
            let freq = self.frequency(c, args.sample_rate);
            let pos = self.position(c);
            let sync = self.io.input(Self::SYNC_INPUT).get_poly_voltage(c);
            let synced = self.io.input(Self::SYNC_INPUT).is_connected()
                && self.sync_triggers[c].process_with(sync, 0.1, 2.0);

            let out = match engine {
                WtEngine::Direct => {
                    let mut phase = self.phase[c] + freq * args.sample_time;
                    phase -= phase.trunc();
                    if synced {
                        phase = 0.0;
                    }
                    self.phase[c] = phase;
                    self.wavetable.interpolate(phase, pos)
                }
                WtEngine::Resampled => {
                    if synced {
                        self.source_pos[c] = 0.0;
                    }
                    let table = &self.wavetable;
                    let source_pos = &mut self.source_pos[c];
                    match self.resamplers[c].as_mut() {
                        Some(resampler) => {
                            let len = wave_len as f32;
                            let (step, ratio) = source_stepping(freq * len, args.sample_rate);
                            resampler.set_ratio(ratio);
                            let value = resampler.pull(|| {
                                let v = table.sample_at(*source_pos, pos);
                                *source_pos = (*source_pos + step) % len;
                                v
                            });
                            self.phase[c] = *source_pos / len;
                            value
                        }
                        None => 0.0,
                    }
                }
            };
            self.io
                .output_mut(Self::WAVE_OUTPUT)
                .set_voltage(5.0 * out, c);
        }
        self.io.output_mut(Self::WAVE_OUTPUT).set_channels(channels);

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
        self.source_pos = [0.0; PORT_MAX_CHANNELS];
        for resampler in self.resamplers.iter_mut().flatten() {
            resampler.reset();
        }
        for trigger in &mut self.sync_triggers {
            trigger.reset();
        }
    }

    fn save_state(&self, state: &mut StateStore) {
        self.wavetable.save_state(state);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.wavetable.load_state(state);
    }
}

/// Polyphonic wavetable LFO
pub struct WtLfo {
    io: ModuleIo,
    wavetable: Wavetable,
    phase: [f32; PORT_MAX_CHANNELS],
    reset_triggers: [SchmittTrigger; PORT_MAX_CHANNELS],
    offset: bool,
    invert: bool,
    offset_trigger: BooleanTrigger,
    invert_trigger: BooleanTrigger,
    light_divider: ClockDivider,
}

impl WtLfo {
    pub const OFFSET_PARAM: usize = 0;
    pub const INVERT_PARAM: usize = 1;
    pub const FREQ_PARAM: usize = 2;
    pub const POS_PARAM: usize = 3;
    pub const FM_PARAM: usize = 4;
    pub const POS_CV_PARAM: usize = 5;

    pub const FM_INPUT: usize = 0;
    pub const RESET_INPUT: usize = 1;
    pub const POS_INPUT: usize = 2;

    pub const WAVE_OUTPUT: usize = 0;

    pub const PHASE_LIGHT: usize = 0;
    pub const OFFSET_LIGHT: usize = 1;
    pub const INVERT_LIGHT: usize = 2;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::button("Offset 0-10V"))
            .param(ParamDef::button("Invert wave"))
            .param(ParamDef::new("Frequency", -8.0, 10.0, 1.0).with_unit("log2 Hz"))
            .param(ParamDef::new("Wavetable position", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Frequency modulation", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Wavetable position CV", -1.0, 1.0, 0.0))
            .input("Frequency modulation", SignalKind::CvBipolar)
            .input("Reset", SignalKind::Trigger)
            .input("Wavetable position", SignalKind::CvUnipolar)
            .output("Wavetable", SignalKind::CvBipolar)
            .light("Phase")
            .light("Offset")
            .light("Invert")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        Self {
            io: ModuleIo::new(Self::spec()),
            wavetable: Wavetable::geometric(LFO_WAVE_LEN),
            phase: [0.0; PORT_MAX_CHANNELS],
            reset_triggers: [SchmittTrigger::default(); PORT_MAX_CHANNELS],
            offset: false,
            invert: false,
            offset_trigger: BooleanTrigger::default(),
            invert_trigger: BooleanTrigger::default(),
            light_divider: ClockDivider::new(16),
        }
    }

    pub fn wavetable(&self) -> &Wavetable {
        &self.wavetable
    }

    pub fn wavetable_mut(&mut self) -> &mut Wavetable {
        &mut self.wavetable
    }

    pub fn phase(&self, channel: usize) -> f32 {
        self.phase[channel]
    }

    pub fn offset(&self) -> bool {
        self.offset
    }

    pub fn invert(&self) -> bool {
        self.invert
    }
}

impl Default for WtLfo {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for WtLfo {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        if self.offset_trigger.process(self.io.param(Self::OFFSET_PARAM) > 0.0) {
            self.offset = !self.offset;
        }
        if self.invert_trigger.process(self.io.param(Self::INVERT_PARAM) > 0.0) {
            self.invert = !self.invert;
        }

        if !self.wavetable.is_valid() {
            let out = self.io.output_mut(Self::WAVE_OUTPUT);
            out.set_channels(1);
            out.clear_voltages();
            return;
        }

        let channels = self.io.max_input_channels(&[Self::FM_INPUT]);
        let freq_param = self.io.param(Self::FREQ_PARAM);
        let fm_param = self.io.param(Self::FM_PARAM);
        let pos_param = self.io.param(Self::POS_PARAM);
        let pos_cv_param = self.io.param(Self::POS_CV_PARAM);

        for c in 0..channels {
            let reset = self.io.input(Self::RESET_INPUT).get_poly_voltage(c);
            let phase = if self.reset_triggers[c].process_with(reset, 0.1, 2.0) {
                0.0
            } else {
                let pitch = freq_param + self.io.input(Self::FM_INPUT).get_voltage(c) * fm_param;
                let phase = self.phase[c] + pitch.exp2() * args.sample_time;
                phase - phase.trunc()
            };
            self.phase[c] = phase;

            let pos = (pos_param
                + self.io.input(Self::POS_INPUT).get_poly_voltage(c) * pos_cv_param / 10.0)
                .clamp(0.0, 1.0);
            let mut out = self.wavetable.interpolate(phase, pos);
            if self.invert {
                out = -out;
            }
            if self.offset {
                out += 1.0;
            }
            self.io
                .output_mut(Self::WAVE_OUTPUT)
                .set_voltage(5.0 * out, c);
        }
        self.io.output_mut(Self::WAVE_OUTPUT).set_channels(channels);

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let brightness = if channels == 1 { 1.0 - self.phase[0] } else { 1.0 };
            self.io
                .light_mut(Self::PHASE_LIGHT)
                .set_brightness_smooth(brightness, dt);
            let offset = if self.offset { 1.0 } else { 0.0 };
            let invert = if self.invert { 1.0 } else { 0.0 };
            self.io.light_mut(Self::OFFSET_LIGHT).set_brightness(offset);
            self.io.light_mut(Self::INVERT_LIGHT).set_brightness(invert);
        }
    }

    fn reset(&mut self) {
        self.phase = [0.0; PORT_MAX_CHANNELS];
        self.offset = false;
        self.invert = false;
        self.wavetable = Wavetable::geometric(LFO_WAVE_LEN);
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bool("offset", self.offset);
        state.set_bool("invert", self.invert);
        self.wavetable.save_state(state);
    }

    fn load_state(&mut self, state: &StateStore) {
        self.offset = state.get_bool("offset", self.offset);
        self.invert = state.get_bool("invert", self.invert);
        self.wavetable.load_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count()
    }

    fn render_vco(vco: &mut WtVco, frames: usize) -> Vec<f32> {
        let args = ProcessArgs::new(44100.0);
        (0..frames)
            .map(|_| {
                vco.process(&args);
                vco.io().output(WtVco::WAVE_OUTPUT).get_voltage(0)
            })
            .collect()
    }

    #[test]
    fn test_direct_engine_plays_c4() {
        let mut vco = WtVco::default();
        vco.io_mut().output_mut(WtVco::WAVE_OUTPUT).connect(1);
        let out = render_vco(&mut vco, 44100);
        let crossings = rising_crossings(&out);
        assert!((260..=263).contains(&crossings), "crossings {}", crossings);
        assert!(out.iter().all(|v| v.abs() <= 5.0 + 1e-4));
    }

    #[test]
    fn test_resampled_engine_tracks_pitch() {
        let mut vco = WtVco::default();
        vco.io_mut().set_param(WtVco::ENGINE_PARAM, 1.0);
        vco.io_mut().output_mut(WtVco::WAVE_OUTPUT).connect(1);
        assert_eq!(vco.engine(), WtEngine::Resampled);
        let out = render_vco(&mut vco, 44100);
        let crossings = rising_crossings(&out[1000..]);
        // 43100 frames of C4
        assert!((252..=258).contains(&crossings), "crossings {}", crossings);
        let peak = out[1000..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak > 4.5 && peak < 5.5, "peak {}", peak);
    }

    #[test]
    fn test_resampled_engine_tracks_pitch_on_long_tables() {
        let len = crate::wavetable::MAX_WAVE_LEN;
        let samples = (0..len)
            .map(|i| (std::f32::consts::TAU * i as f32 / len as f32).sin())
            .collect();
        let mut vco = WtVco::default();
        *vco.wavetable_mut() = Wavetable::from_samples(samples, len).unwrap();
        vco.io_mut().set_param(WtVco::ENGINE_PARAM, 1.0);
        vco.io_mut().set_param(WtVco::FREQ_PARAM, 24.0);
        vco.io_mut().output_mut(WtVco::WAVE_OUTPUT).connect(1);
        let out = render_vco(&mut vco, 44100);
        // 42100 frames of C6, about 999 cycles
        let crossings = rising_crossings(&out[2000..]);
        assert!((990..=1008).contains(&crossings), "crossings {}", crossings);
    }

    #[test]
    fn test_source_stepping_keeps_ratio_in_range() {
        // One point per source sample when the ratio allows it
        let (step, ratio) = source_stepping(1000.0, 44100.0);
        assert_eq!(step, 1.0);
        assert!((ratio - 44.1).abs() < 1e-3);

        // High rates skip points
        let (step, ratio) = source_stepping(1046.5 * 16384.0, 44100.0);
        assert!(step > 1.0);
        assert!((ratio - 1.0 / MAX_DECIMATION as f64).abs() < 1e-6);

        // Low rates on short tables take fractional steps
        let (step, ratio) = source_stepping(5.0 * 8.0, 48000.0);
        assert!(step < 1.0);
        assert!((ratio - MAX_RESAMPLE_RATIO).abs() < 1e-3);

        assert_eq!(source_stepping(0.0, 48000.0), (0.0, 1.0));
    }

    #[test]
    fn test_hard_sync_restarts_phase() {
        let mut vco = WtVco::default();
        vco.io_mut().input_mut(WtVco::SYNC_INPUT).connect(1);
        let args = ProcessArgs::new(44100.0);
        for _ in 0..50 {
            vco.process(&args);
        }
        assert!(vco.phase(0) > 0.1);
        vco.io_mut().input_mut(WtVco::SYNC_INPUT).set_voltage(10.0, 0);
        vco.process(&args);
        assert_eq!(vco.phase(0), 0.0);
    }

    #[test]
    fn test_invalid_table_silences_output() {
        let mut vco = WtVco::default();
        vco.io_mut().output_mut(WtVco::WAVE_OUTPUT).connect(1);
        vco.wavetable_mut().set_wave_len(1);
        let out = render_vco(&mut vco, 100);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_polyphonic_channels_follow_pitch_input() {
        let mut vco = WtVco::default();
        vco.io_mut().input_mut(WtVco::PITCH_INPUT).connect(3);
        vco.io_mut().output_mut(WtVco::WAVE_OUTPUT).connect(1);
        vco.process(&ProcessArgs::new(44100.0));
        assert_eq!(vco.io().output(WtVco::WAVE_OUTPUT).channels(), 3);
    }

    #[test]
    fn test_lfo_frequency_from_param() {
        let mut lfo = WtLfo::default();
        assert_eq!(lfo.wavetable().wave_len(), LFO_WAVE_LEN);
        let args = ProcessArgs::new(1000.0);
        // Default param 1 gives 2 Hz
        for _ in 0..250 {
            lfo.process(&args);
        }
        assert!((lfo.phase(0) - 0.5).abs() < 1e-3, "phase {}", lfo.phase(0));
    }

    #[test]
    fn test_lfo_reset_input_zeroes_phase() {
        let mut lfo = WtLfo::default();
        lfo.io_mut().input_mut(WtLfo::RESET_INPUT).connect(1);
        let args = ProcessArgs::new(1000.0);
        for _ in 0..100 {
            lfo.process(&args);
        }
        lfo.io_mut().input_mut(WtLfo::RESET_INPUT).set_voltage(10.0, 0);
        lfo.process(&args);
        assert_eq!(lfo.phase(0), 0.0);
    }

    #[test]
    fn test_lfo_offset_and_invert_toggles() {
        let mut lfo = WtLfo::default();
        lfo.io_mut().output_mut(WtLfo::WAVE_OUTPUT).connect(1);
        let args = ProcessArgs::new(1000.0);

        lfo.io_mut().set_param(WtLfo::OFFSET_PARAM, 1.0);
        lfo.process(&args);
        lfo.io_mut().set_param(WtLfo::OFFSET_PARAM, 0.0);
        assert!(lfo.offset());
        let mut min = f32::MAX;
        for _ in 0..1000 {
            lfo.process(&args);
            min = min.min(lfo.io().output(WtLfo::WAVE_OUTPUT).get_voltage(0));
        }
        assert!(min >= -1e-4, "offset min {}", min);

        lfo.io_mut().set_param(WtLfo::INVERT_PARAM, 1.0);
        lfo.process(&args);
        assert!(lfo.invert());

        let mut state = StateStore::new();
        lfo.save_state(&mut state);
        let mut restored = WtLfo::default();
        restored.load_state(&state);
        assert!(restored.offset() && restored.invert());
    }
}
