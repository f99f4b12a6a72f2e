//! Clocked delay line
//!
//! Dry signal is written into a long history buffer. Instead of reading at a
//! fixed offset, the oldest history is resampled into a short staging buffer
//! at a ratio that nudges the fill level toward the requested delay, so time
//! changes glide like tape rather than click.

use tracing::warn;

use crate::dsp::approx::crossfade;
use crate::dsp::{DoubleRingBuffer, RcFilter, RingBuffer, SchmittTrigger, StreamResampler, Timer};
use crate::persist::EngineSettings;
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind};

/// History length in frames (about 47 s at 44.1 kHz)
pub const HISTORY_SIZE: usize = 1 << 21;
/// Output staging length in frames
pub const STAGING_SIZE: usize = 16;
/// Ratio swing at full correction
pub const RATIO_BASE: f32 = 4.0;
/// Fill error, in frames, that produces full correction
pub const RATIO_SCALE: f32 = 10000.0;

const MAX_RELATIVE_RATIO: f64 = 8.0;
const DEFAULT_CLOCK_FREQ: f32 = 2.0;
// Resampler plus staging latency, subtracted from the target fill
const LATENCY_COMPENSATION: f32 = (STAGING_SIZE + 4) as f32;

pub struct Delay {
    io: ModuleIo,
    history: DoubleRingBuffer<f32>,
    staging: RingBuffer<f32, STAGING_SIZE>,
    resampler: Option<StreamResampler>,
    block: [f32; STAGING_SIZE],
    lowpass: RcFilter,
    highpass: RcFilter,
    last_wet: f32,
    clock_trigger: SchmittTrigger,
    clock_timer: Timer,
    clock_freq: f32,
    clock_phase: f32,
}

impl Delay {
    pub const TIME_PARAM: usize = 0;
    pub const FEEDBACK_PARAM: usize = 1;
    pub const TONE_PARAM: usize = 2;
    pub const MIX_PARAM: usize = 3;
    pub const TIME_CV_PARAM: usize = 4;
    pub const FEEDBACK_CV_PARAM: usize = 5;
    pub const TONE_CV_PARAM: usize = 6;
    pub const MIX_CV_PARAM: usize = 7;

    pub const TIME_INPUT: usize = 0;
    pub const FEEDBACK_INPUT: usize = 1;
    pub const TONE_INPUT: usize = 2;
    pub const MIX_INPUT: usize = 3;
    pub const IN_INPUT: usize = 4;
    pub const CLOCK_INPUT: usize = 5;

    pub const MIX_OUTPUT: usize = 0;
    pub const WET_OUTPUT: usize = 1;

    pub const CLOCK_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::new("Time", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Feedback", 0.0, 1.0, 0.5).with_unit("%"))
            .param(ParamDef::new("Tone", 0.0, 1.0, 0.5))
            .param(ParamDef::new("Mix", 0.0, 1.0, 0.5).with_unit("%"))
            .param(ParamDef::new("Time CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Feedback CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Tone CV", -1.0, 1.0, 0.0))
            .param(ParamDef::new("Mix CV", -1.0, 1.0, 0.0))
            .input("Time", SignalKind::CvBipolar)
            .input("Feedback", SignalKind::CvUnipolar)
            .input("Tone", SignalKind::CvUnipolar)
            .input("Mix", SignalKind::CvUnipolar)
            .input("Audio", SignalKind::Audio)
            .input("Clock", SignalKind::Clock)
            .output("Mix", SignalKind::Audio)
            .output("Wet", SignalKind::Audio)
            .light("Clock")
    }

    pub fn new(_settings: &EngineSettings) -> Self {
        let resampler = match StreamResampler::new(STAGING_SIZE, MAX_RELATIVE_RATIO) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "delay resampler unavailable, output muted");
                None
            }
        };
        Self {
            io: ModuleIo::new(Self::spec()),
            history: DoubleRingBuffer::new(HISTORY_SIZE),
            staging: RingBuffer::default(),
            resampler,
            block: [0.0; STAGING_SIZE],
            lowpass: RcFilter::default(),
            highpass: RcFilter::default(),
            last_wet: 0.0,
            clock_trigger: SchmittTrigger::default(),
            clock_timer: Timer::default(),
            clock_freq: DEFAULT_CLOCK_FREQ,
            clock_phase: 0.0,
        }
    }

    /// Clock rate the delay time is derived from, in Hz
    pub fn clock_freq(&self) -> f32 {
        self.clock_freq
    }

    /// Frames currently buffered in the history
    pub fn history_len(&self) -> usize {
        self.history.size()
    }

    /// Target history fill, in frames, for the current time controls
    pub fn target_index(&self, sample_rate: f32) -> f32 {
        let time_cv = self.io.input(Self::TIME_INPUT).get_voltage(0);
        let pitch = 1000f32.log2() - 10000f32.log2() * self.io.param(Self::TIME_PARAM)
            + time_cv * self.io.param(Self::TIME_CV_PARAM);
        let freq = self.clock_freq / 2.0 * pitch.exp2();
        (sample_rate / freq - LATENCY_COMPENSATION).clamp(2.0, (HISTORY_SIZE - 1) as f32)
    }

    fn knob(&self, param: usize, cv_param: usize, input: usize) -> f32 {
        let cv = self.io.input(input).get_voltage(0);
        (self.io.param(param) + cv / 10.0 * self.io.param(cv_param)).clamp(0.0, 1.0)
    }

    fn track_clock(&mut self, dt: f32) {
        let clock = self.io.input(Self::CLOCK_INPUT);
        if !clock.is_connected() {
            self.clock_freq = DEFAULT_CLOCK_FREQ;
            return;
        }
        let v = clock.get_voltage(0);
        self.clock_timer.process(dt);
        if self.clock_trigger.process_with(v, 0.1, 2.0) {
            let freq = 1.0 / self.clock_timer.time();
            self.clock_timer.reset();
            if (0.001..=1000.0).contains(&freq) {
                self.clock_freq = freq;
            }
        }
    }

    fn refill_staging(&mut self, consume: f32) {
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        let ratio = if consume.abs() >= STAGING_SIZE as f32 {
            RATIO_BASE.powf((consume / RATIO_SCALE).clamp(-1.0, 1.0))
        } else {
            1.0
        };
        resampler.set_ratio(ratio as f64);
        let (used, generated) = resampler.process_from(self.history.start_data(), &mut self.block);
        self.history.start_incr(used);
        for &v in &self.block[..generated] {
            self.staging.push(v);
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Delay {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        self.track_clock(args.sample_time);

        let input = self.io.input(Self::IN_INPUT).get_voltage_sum();
        let feedback = self.knob(Self::FEEDBACK_PARAM, Self::FEEDBACK_CV_PARAM, Self::FEEDBACK_INPUT);
        let dry = input + self.last_wet * feedback;

        let index = self.target_index(args.sample_rate);
        if !self.history.is_full() {
            self.history.push(dry);
        }
        let consume = index - self.history.size() as f32;

        if self.staging.is_empty() {
            self.refill_staging(consume);
        }
        let mut wet = self.staging.shift().unwrap_or(0.0);

        let color = self.knob(Self::TONE_PARAM, Self::TONE_CV_PARAM, Self::TONE_INPUT);
        let color_freq = 100f32.powf(2.0 * color - 1.0);
        let lowpass_hz = (20000.0 * color_freq).clamp(20.0, 20000.0);
        self.lowpass.set_cutoff_freq(lowpass_hz * args.sample_time);
        self.lowpass.process(wet);
        wet = self.lowpass.lowpass();
        let highpass_hz = (20.0 * color_freq).clamp(20.0, 20000.0);
        self.highpass.set_cutoff_freq(highpass_hz * args.sample_time);
        self.highpass.process(wet);
        wet = self.highpass.highpass();
        self.last_wet = wet;

        let mix = self.knob(Self::MIX_PARAM, Self::MIX_CV_PARAM, Self::MIX_INPUT);
        self.io
            .output_mut(Self::MIX_OUTPUT)
            .set_voltage(crossfade(input, wet, mix), 0);
        self.io.output_mut(Self::WET_OUTPUT).set_voltage(wet, 0);

        self.clock_phase += self.clock_freq * args.sample_time;
        self.clock_phase -= self.clock_phase.floor();
        let lit = if self.clock_phase < 0.5 { 1.0 } else { 0.0 };
        self.io
            .light_mut(Self::CLOCK_LIGHT)
            .set_brightness_smooth(lit, args.sample_time);
    }

    fn reset(&mut self) {
        self.history.clear();
        self.staging.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.lowpass.reset();
        self.highpass.reset();
        self.last_wet = 0.0;
        self.clock_trigger.reset();
        self.clock_timer.reset();
        self.clock_phase = 0.0;
    }
}
