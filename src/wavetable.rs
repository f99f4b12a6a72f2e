//! Wavetable storage, lookup and WAV file exchange
//!
//! A wavetable is a flat run of `wave_count` single-cycle waves, each
//! `wave_len` points long. Lookup interpolates linearly along the wave and
//! between neighbouring waves. File I/O happens on the caller's thread and
//! never from `process`.

#[cfg(feature = "wav")]
use std::path::Path;

#[cfg(feature = "wav")]
use tracing::{info, warn};

use crate::dsp::crossfade;
use crate::error::{Error, Result};
use crate::persist::StateStore;

/// Points per wave in the default table
pub const DEFAULT_WAVE_LEN: usize = 256;
/// Smallest and largest wave lengths offered to the host
pub const MIN_WAVE_LEN: usize = 16;
pub const MAX_WAVE_LEN: usize = 16384;

const DEFAULT_FILENAME: &str = "Basic.wav";
#[cfg(feature = "wav")]
const SAVE_SAMPLE_RATE: u32 = 44100;

#[derive(Debug, Clone, PartialEq)]
pub struct Wavetable {
    samples: Vec<f32>,
    wave_len: usize,
    filename: String,
}

impl Default for Wavetable {
    fn default() -> Self {
        Self::geometric(DEFAULT_WAVE_LEN)
    }
}

impl Wavetable {
    /// Sine, triangle, saw and square, `wave_len` points each
    pub fn geometric(wave_len: usize) -> Self {
        let mut samples = vec![0.0; wave_len * 4];
        for i in 0..wave_len {
            let p = i as f32 / wave_len as f32;
            samples[i] = (std::f32::consts::TAU * p).sin();
            samples[i + wave_len] = if p < 0.25 {
                4.0 * p
            } else if p < 0.75 {
                2.0 - 4.0 * p
            } else {
                4.0 * p - 4.0
            };
            samples[i + 2 * wave_len] = if p < 0.5 { 2.0 * p } else { 2.0 * p - 2.0 };
            samples[i + 3 * wave_len] = if p < 0.5 { 1.0 } else { -1.0 };
        }
        Self {
            samples,
            wave_len,
            filename: DEFAULT_FILENAME.to_string(),
        }
    }

    /// Builds a table from raw samples. The sample count must be a nonzero
    /// multiple of `wave_len`, and `wave_len` at least 2.
    pub fn from_samples(samples: Vec<f32>, wave_len: usize) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::EmptyWavetable);
        }
        if wave_len < 2 || samples.len() % wave_len != 0 {
            return Err(Error::InvalidWavetable {
                samples: samples.len(),
                wave_len,
            });
        }
        Ok(Self {
            samples,
            wave_len,
            filename: String::new(),
        })
    }

    #[inline]
    pub fn at(&self, sample: usize, wave: usize) -> f32 {
        self.samples[sample + wave * self.wave_len]
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn wave_len(&self) -> usize {
        self.wave_len
    }

    pub fn wave_count(&self) -> usize {
        if self.wave_len == 0 {
            0
        } else {
            self.samples.len() / self.wave_len
        }
    }

    /// Whether synthesis can read this table. Invalid tables play silence.
    pub fn is_valid(&self) -> bool {
        self.wave_len >= 2 && self.wave_count() >= 1 && self.samples.len() % self.wave_len == 0
    }

    /// Reinterprets the same samples with a new wave length
    pub fn set_wave_len(&mut self, wave_len: usize) {
        self.wave_len = wave_len;
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
    }

    /// Interpolated value at fractional `index` (in points, wrapping at
    /// `wave_len`) and position `pos` in [0, 1] across the waves.
    pub fn sample_at(&self, index: f32, pos: f32) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        let len = self.wave_len;
        let index = index.max(0.0);
        let i_frac = index - index.trunc();
        let i0 = (index.trunc() as usize) % len;
        let i1 = (i0 + 1) % len;

        let pos = pos.clamp(0.0, 1.0) * (self.wave_count() - 1) as f32;
        let w_frac = pos - pos.trunc();
        let w0 = pos.trunc() as usize;

        let out0 = crossfade(self.at(i0, w0), self.at(i1, w0), i_frac);
        if w_frac > 0.0 {
            let out1 = crossfade(self.at(i0, w0 + 1), self.at(i1, w0 + 1), i_frac);
            crossfade(out0, out1, w_frac)
        } else {
            out0
        }
    }

    /// Interpolated value at `phase` in [0, 1)
    #[inline]
    pub fn interpolate(&self, phase: f32, pos: f32) -> f32 {
        self.sample_at(phase * self.wave_len as f32, pos)
    }

    pub fn save_state(&self, state: &mut StateStore) {
        state.set_i64("waveLen", self.wave_len as i64);
        state.set_str("filename", &self.filename);
    }

    pub fn load_state(&mut self, state: &StateStore) {
        let len = state.get_i64("waveLen", self.wave_len as i64);
        if len > 0 {
            self.wave_len = len as usize;
        }
        if let Some(name) = state.get_str("filename") {
            self.filename = name.to_string();
        }
    }
}

#[cfg(feature = "wav")]
impl Wavetable {
    /// Replaces the samples with the contents of a WAV file, all channels
    /// interleaved. On failure the current table is kept.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match read_wav(path) {
            Ok(samples) => {
                self.samples = samples;
                self.filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                info!(
                    path = %path.display(),
                    samples = self.samples.len(),
                    waves = self.wave_count(),
                    "loaded wavetable"
                );
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "wavetable load failed, keeping previous table");
                Err(e)
            }
        }
    }

    /// Writes the samples as 16-bit mono PCM at 44.1 kHz
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAVE_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &s in &self.samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
        info!(path = %path.display(), samples = self.samples.len(), "saved wavetable");
        Ok(())
    }
}

#[cfg(feature = "wav")]
fn read_wav(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    if samples.is_empty() {
        return Err(Error::EmptyWavetable);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_table_shape() {
        let table = Wavetable::default();
        assert_eq!(table.wave_len(), 256);
        assert_eq!(table.wave_count(), 4);
        assert!(table.is_valid());
        assert_eq!(table.filename(), "Basic.wav");
        // Triangle peaks a quarter in, square flips halfway
        assert_abs_diff_eq!(table.at(64, 1), 1.0, epsilon = 1e-6);
        assert_eq!(table.at(127, 3), 1.0);
        assert_eq!(table.at(128, 3), -1.0);
    }

    #[test]
    fn test_index_wraps_at_wave_len() {
        let table = Wavetable::default();
        for pos in [0.0, 0.3, 0.5, 1.0] {
            assert_eq!(table.sample_at(256.0, pos), table.sample_at(0.0, pos));
            assert_eq!(table.sample_at(256.25, pos), table.sample_at(0.25, pos));
        }
    }

    #[test]
    fn test_position_crossfades_between_waves() {
        let table = Wavetable::default();
        // pos 1/6 sits halfway between sine and triangle
        let expected = 0.5 * (table.at(32, 0) + table.at(32, 1));
        assert_abs_diff_eq!(table.sample_at(32.0, 1.0 / 6.0), expected, epsilon = 1e-5);
        assert_eq!(table.sample_at(10.0, 1.0), table.at(10, 3));
        assert_eq!(table.sample_at(10.0, 7.0), table.at(10, 3));
    }

    #[test]
    fn test_invalid_table_is_silent() {
        let mut table = Wavetable::default();
        table.set_wave_len(1);
        assert!(!table.is_valid());
        assert_eq!(table.interpolate(0.3, 0.0), 0.0);
        table.set_wave_len(300);
        assert!(!table.is_valid());
        assert_eq!(table.interpolate(0.3, 0.0), 0.0);
    }

    #[test]
    fn test_from_samples_validates() {
        assert!(matches!(
            Wavetable::from_samples(Vec::new(), 16),
            Err(Error::EmptyWavetable)
        ));
        assert!(matches!(
            Wavetable::from_samples(vec![0.0; 30], 16),
            Err(Error::InvalidWavetable { samples: 30, wave_len: 16 })
        ));
        let table = Wavetable::from_samples(vec![0.0; 64], 16).unwrap();
        assert_eq!(table.wave_count(), 4);
    }

    #[test]
    fn test_state_round_trip() {
        let mut table = Wavetable::default();
        table.set_wave_len(512);
        table.set_filename("pad.wav");
        let mut state = StateStore::new();
        table.save_state(&mut state);

        let mut restored = Wavetable::default();
        restored.load_state(&state);
        assert_eq!(restored.wave_len(), 512);
        assert_eq!(restored.filename(), "pad.wav");
    }

    #[cfg(feature = "wav")]
    #[test]
    fn test_wav_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.wav");
        let original = Wavetable::default();
        original.save(&path).unwrap();

        let mut loaded = Wavetable::geometric(16);
        loaded.set_wave_len(256);
        loaded.load(&path).unwrap();
        assert_eq!(loaded.samples().len(), original.samples().len());
        assert_eq!(loaded.filename(), "table.wav");
        for (a, b) in loaded.samples().iter().zip(original.samples()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[cfg(feature = "wav")]
    #[test]
    fn test_failed_load_keeps_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Wavetable::default();
        let before = table.clone();
        assert!(table.load(dir.path().join("missing.wav")).is_err());
        assert_eq!(table, before);
    }
}
