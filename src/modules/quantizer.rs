//! Chromatic quantizer with a selectable note set

use crate::dsp::approx::{eucdiv, eucmod};
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ModuleSpec, ProcessArgs, SignalKind};

pub const NOTES: usize = 12;
/// Half-semitone buckets per octave
const BUCKETS: usize = 24;
/// Inputs are limited to the ±10 V rail before bucketing
const MAX_PITCH: f32 = 10.0;

pub struct Quantizer {
    io: ModuleIo,
    enabled: [bool; NOTES],
    playing: [bool; NOTES],
    // Bucket i covers [i/24, (i+1)/24) V and maps to the nearest enabled
    // note, in semitones relative to the bucket's octave
    buckets: [i32; BUCKETS],
}

impl Quantizer {
    pub const PITCH_INPUT: usize = 0;
    pub const PITCH_OUTPUT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .input("1V/octave pitch", SignalKind::VoltPerOctave)
            .output("Pitch", SignalKind::VoltPerOctave)
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        let mut quantizer = Self {
            io: ModuleIo::new(Self::spec()),
            enabled: [true; NOTES],
            playing: [false; NOTES],
            buckets: [0; BUCKETS],
        };
        quantizer.update_buckets();
        quantizer
    }

    pub fn enabled_notes(&self) -> &[bool; NOTES] {
        &self.enabled
    }

    /// Notes (pitch classes, 0 = C) produced during the last frame
    pub fn playing_notes(&self) -> &[bool; NOTES] {
        &self.playing
    }

    pub fn set_note_enabled(&mut self, note: usize, enabled: bool) {
        if self.enabled[note] != enabled {
            self.enabled[note] = enabled;
            self.update_buckets();
        }
    }

    pub fn set_enabled_notes(&mut self, enabled: [bool; NOTES]) {
        self.enabled = enabled;
        self.update_buckets();
    }

    /// Quantized pitch for `pitch` volts
    pub fn quantize(&self, pitch: f32) -> f32 {
        self.quantize_note(pitch) as f32 / 12.0
    }

    fn quantize_note(&self, pitch: f32) -> i32 {
        let pitch = pitch.clamp(-MAX_PITCH, MAX_PITCH);
        let bucket = (pitch * BUCKETS as f32).floor() as i32;
        let octave = eucdiv(bucket, BUCKETS as i32);
        let bucket = bucket - octave * BUCKETS as i32;
        self.buckets[bucket as usize] + octave * NOTES as i32
    }

    fn update_buckets(&mut self) {
        // With nothing enabled, every note is a candidate
        let any_enabled = self.enabled.iter().any(|&e| e);
        for (i, slot) in self.buckets.iter_mut().enumerate() {
            let target = ((i + 1) / 2) as i32;
            *slot = (-12..=24)
                .filter(|&note| !any_enabled || self.enabled[eucmod(note, 12) as usize])
                .min_by_key(|&note| ((target - note).abs(), note))
                .unwrap_or(target);
        }
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Quantizer {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, _args: &ProcessArgs) {
        let mut playing = [false; NOTES];
        let channels = self.io.max_input_channels(&[Self::PITCH_INPUT]);
        for c in 0..channels {
            let note = self.quantize_note(self.io.input(Self::PITCH_INPUT).get_voltage(c));
            playing[eucmod(note, 12) as usize] = true;
            self.io
                .output_mut(Self::PITCH_OUTPUT)
                .set_voltage(note as f32 / 12.0, c);
        }
        self.io.output_mut(Self::PITCH_OUTPUT).set_channels(channels);
        self.playing = playing;
    }

    fn reset(&mut self) {
        self.set_enabled_notes([true; NOTES]);
    }

    fn save_state(&self, state: &mut StateStore) {
        state.set_bools("enabledNotes", &self.enabled);
    }

    fn load_state(&mut self, state: &StateStore) {
        state.get_bools("enabledNotes", &mut self.enabled);
        self.update_buckets();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const C_MAJOR: [bool; NOTES] = [
        true, false, true, false, true, true, false, true, false, true, false, true,
    ];

    #[test]
    fn test_extreme_inputs_stay_on_the_rails() {
        let q = Quantizer::default();
        assert_abs_diff_eq!(q.quantize(f32::NEG_INFINITY), q.quantize(-10.0));
        assert_abs_diff_eq!(q.quantize(-1e30), -10.0);
        assert_abs_diff_eq!(q.quantize(f32::INFINITY), 10.0);
        assert_abs_diff_eq!(q.quantize(1e30), q.quantize(10.0));
    }

    #[test]
    fn test_chromatic_rounds_to_nearest_semitone() {
        let q = Quantizer::default();
        assert_abs_diff_eq!(q.quantize(0.0), 0.0);
        assert_abs_diff_eq!(q.quantize(1.0 / 12.0 + 0.01), 1.0 / 12.0, epsilon = 1e-6);
        assert_abs_diff_eq!(q.quantize(1.0 / 12.0 - 0.03), 1.0 / 12.0, epsilon = 1e-6);
        assert_abs_diff_eq!(q.quantize(-0.26), -3.0 / 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_scale_snaps_to_enabled_notes() {
        let mut q = Quantizer::default();
        q.set_enabled_notes(C_MAJOR);
        // C# lies between C and D; the lower note wins the tie
        assert_abs_diff_eq!(q.quantize(1.0 / 12.0), 0.0, epsilon = 1e-6);
        // F# likewise falls to F
        assert_abs_diff_eq!(q.quantize(6.0 / 12.0), 5.0 / 12.0, epsilon = 1e-6);
        // B just below the next octave stays B
        assert_abs_diff_eq!(q.quantize(2.0 + 11.0 / 12.0), 2.0 + 11.0 / 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_no_enabled_notes_behaves_chromatic() {
        let mut q = Quantizer::default();
        q.set_enabled_notes([false; NOTES]);
        assert_abs_diff_eq!(q.quantize(3.0 / 12.0), 3.0 / 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_polyphonic_process_and_playing_notes() {
        let mut q = Quantizer::default();
        q.set_enabled_notes(C_MAJOR);
        q.io_mut().input_mut(Quantizer::PITCH_INPUT).connect(2);
        q.io_mut().output_mut(Quantizer::PITCH_OUTPUT).connect(1);
        q.io_mut().input_mut(Quantizer::PITCH_INPUT).set_voltage(4.0 / 12.0, 0);
        q.io_mut().input_mut(Quantizer::PITCH_INPUT).set_voltage(7.0 / 12.0, 1);
        q.process(&ProcessArgs::default());
        assert_eq!(q.io().output(Quantizer::PITCH_OUTPUT).channels(), 2);
        assert!(q.playing_notes()[4] && q.playing_notes()[7]);
        assert!(!q.playing_notes()[0]);
    }

    #[test]
    fn test_enabled_notes_persist() {
        let mut q = Quantizer::default();
        q.set_enabled_notes(C_MAJOR);
        let mut state = StateStore::new();
        q.save_state(&mut state);
        let mut restored = Quantizer::default();
        restored.load_state(&state);
        assert_eq!(restored.enabled_notes(), &C_MAJOR);
        assert_abs_diff_eq!(restored.quantize(1.0 / 12.0), 0.0, epsilon = 1e-6);
    }
}
