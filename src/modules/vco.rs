//! Voltage-Controlled Oscillator
//!
//! Polyphonic sine/triangle/saw/square oscillator running 16 sub-steps per
//! frame and decimating each waveform through a windowed-sinc FIR. Two
//! flavours share the phase accumulator:
//!
//! - **Digital**: coarse pitch snaps to semitones, waveforms are computed
//!   directly (Padé sine, linear triangle and saw, comparator square).
//! - **Analog**: per-voice slow pitch drift, band-limited lookup tables and a
//!   capacitor-coupled square.
//!
//! Sync edges are located to sub-sample precision, so hard sync lands the
//! phase where the reset would have left it rather than at zero.

use std::sync::OnceLock;

use crate::dsp::approx::{sin2pi_pade_05_5_4, wrap_phase};
use crate::dsp::{ClockDivider, Decimator, RcFilter};
use crate::persist::EngineSettings;
use crate::port::{Module, ModuleIo, ModuleSpec, ParamDef, ProcessArgs, SignalKind};
use crate::rng::Rng;
use crate::simd::{group_starts, Float4, GROUPS, LANES};

/// Sub-steps per frame
pub const OVERSAMPLE: usize = 16;
/// Decimator taps per sub-step
pub const QUALITY: usize = 16;
/// Frequency at 0 V (C4)
pub const C4_HZ: f32 = 261.626;

const TABLE_SIZE: usize = 2048;
const TABLE_HARMONICS: usize = 64;
const DRIFT_DIVISION: u32 = 32;
const DRIFT_TAU: f32 = 100.0;
const DRIFT_SEMITONES: f32 = 3.0;
const SQUARE_COUPLING_HZ: f32 = 40.0;

struct AnalogTables {
    sine: Vec<f32>,
    triangle: Vec<f32>,
    saw: Vec<f32>,
}

/// Additive tables generated on first use and shared by every instance
fn analog_tables() -> &'static AnalogTables {
    static TABLES: OnceLock<AnalogTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let tau = std::f32::consts::TAU;
        let pi2 = std::f32::consts::PI * std::f32::consts::PI;
        let build = |partial: &dyn Fn(usize, f32) -> f32| -> Vec<f32> {
            let mut table: Vec<f32> = (0..TABLE_SIZE)
                .map(|i| {
                    let t = i as f32 / TABLE_SIZE as f32;
                    (1..=TABLE_HARMONICS).map(|n| partial(n, t)).sum()
                })
                .collect();
            let peak = table.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            if peak > 0.0 {
                for v in &mut table {
                    *v /= peak;
                }
            }
            table
        };
        // Lanczos sigma tames Gibbs ringing in the truncated series
        let sigma = |n: usize| {
            let x = std::f32::consts::PI * n as f32 / (TABLE_HARMONICS + 1) as f32;
            x.sin() / x
        };

        AnalogTables {
            // Sine with a faint odd overtone
            sine: build(&|n, t| match n {
                1 => (tau * t).sin(),
                3 => 0.02 * (tau * 3.0 * t).sin(),
                _ => 0.0,
            }),
            triangle: build(&|n, t| {
                if n % 2 == 0 {
                    return 0.0;
                }
                let k = (n - 1) / 2;
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sigma(n) * sign * 8.0 / pi2 * (tau * n as f32 * t).sin() / (n * n) as f32
            }),
            saw: build(&|n, t| {
                let sign = if n % 2 == 1 { 1.0 } else { -1.0 };
                sigma(n) * sign * 2.0 / std::f32::consts::PI * (tau * n as f32 * t).sin()
                    / n as f32
            }),
        }
    })
}

#[inline]
fn table_lookup(table: &[f32], phase: f32) -> f32 {
    let pos = phase * TABLE_SIZE as f32;
    let i = (pos as usize).min(TABLE_SIZE - 1);
    let frac = pos - i as f32;
    let a = table[i];
    let b = table[(i + 1) % TABLE_SIZE];
    a + (b - a) * frac
}

/// Per-lane sync event inside one frame
#[derive(Debug, Clone, Copy)]
struct SyncEvent {
    index: usize,
    frac: f32,
}

/// Polyphonic analog/digital oscillator
pub struct Vco {
    io: ModuleIo,
    phase: [Float4; GROUPS],
    /// +1 forward, -1 reflected by soft sync
    direction: [Float4; GROUPS],
    last_sync: [Float4; GROUPS],
    drift: [Float4; GROUPS],
    drift_divider: ClockDivider,
    light_divider: ClockDivider,
    sin_decimators: Vec<Decimator<Float4>>,
    tri_decimators: Vec<Decimator<Float4>>,
    saw_decimators: Vec<Decimator<Float4>>,
    sqr_decimators: Vec<Decimator<Float4>>,
    sqr_filters: [RcFilter<Float4>; GROUPS],
    rng: Rng,
}

impl Vco {
    pub const MODE_PARAM: usize = 0;
    pub const SYNC_PARAM: usize = 1;
    pub const FREQ_PARAM: usize = 2;
    pub const FINE_PARAM: usize = 3;
    pub const FM_PARAM: usize = 4;
    pub const PW_PARAM: usize = 5;
    pub const PW_CV_PARAM: usize = 6;

    pub const PITCH_INPUT: usize = 0;
    pub const FM_INPUT: usize = 1;
    pub const SYNC_INPUT: usize = 2;
    pub const PW_INPUT: usize = 3;

    pub const SIN_OUTPUT: usize = 0;
    pub const TRI_OUTPUT: usize = 1;
    pub const SAW_OUTPUT: usize = 2;
    pub const SQR_OUTPUT: usize = 3;

    pub const FREQ_LIGHT: usize = 0;

    pub fn spec() -> ModuleSpec {
        ModuleSpec::new()
            .param(ParamDef::switch("Analog mode", 0.0, 1.0, 1.0))
            .param(ParamDef::switch("Sync mode (soft/hard)", 0.0, 1.0, 1.0))
            .param(ParamDef::new("Frequency", -54.0, 54.0, 0.0).with_unit("semitones"))
            .param(ParamDef::new("Fine frequency", -1.0, 1.0, 0.0).with_unit("semitones"))
            .param(ParamDef::new("Frequency modulation", 0.0, 1.0, 0.0))
            .param(ParamDef::new("Pulse width", 0.01, 0.99, 0.5))
            .param(ParamDef::new("Pulse width modulation", 0.0, 1.0, 0.0))
            .input("1V/octave pitch", SignalKind::VoltPerOctave)
            .input("Frequency modulation", SignalKind::CvBipolar)
            .input("Sync", SignalKind::Audio)
            .input("Pulse width modulation", SignalKind::CvBipolar)
            .output("Sine", SignalKind::Audio)
            .output("Triangle", SignalKind::Audio)
            .output("Sawtooth", SignalKind::Audio)
            .output("Square", SignalKind::Audio)
            .light("Frequency")
    }

    pub fn new(settings: &EngineSettings) -> Self {
        let decimators = || {
            (0..GROUPS)
                .map(|_| Decimator::new(OVERSAMPLE, QUALITY))
                .collect::<Vec<_>>()
        };
        Self {
            io: ModuleIo::new(Self::spec()),
            phase: [Float4::ZERO; GROUPS],
            direction: [Float4::splat(1.0); GROUPS],
            last_sync: [Float4::ZERO; GROUPS],
            drift: [Float4::ZERO; GROUPS],
            drift_divider: ClockDivider::new(DRIFT_DIVISION),
            light_divider: ClockDivider::new(16),
            sin_decimators: decimators(),
            tri_decimators: decimators(),
            saw_decimators: decimators(),
            sqr_decimators: decimators(),
            sqr_filters: [RcFilter::default(); GROUPS],
            rng: settings.rng(),
        }
    }

    /// Current phase of `channel`, in [0, 1)
    pub fn phase(&self, channel: usize) -> f32 {
        self.phase[channel / LANES][channel % LANES]
    }

    fn is_analog(&self) -> bool {
        self.io.param(Self::MODE_PARAM) < 0.5
    }

    /// Pitch in volts for a group, FM included
    fn group_pitch(&self, c: usize, analog: bool) -> Float4 {
        let mut coarse = self.io.param(Self::FREQ_PARAM);
        if !analog {
            coarse = coarse.round();
        }
        let fine = self.io.param(Self::FINE_PARAM);
        let mut pitch = Float4::splat((coarse + fine) / 12.0)
            + self.io.input(Self::PITCH_INPUT).get_voltage_simd(c);
        if analog {
            pitch += self.drift[c / LANES] * (DRIFT_SEMITONES / 12.0);
        }
        let fm_amount = self.io.param(Self::FM_PARAM);
        pitch + self.io.input(Self::FM_INPUT).get_poly_voltage_simd(c) * fm_amount
    }

    fn detect_sync(&mut self, c: usize) -> [Option<SyncEvent>; LANES] {
        let mut events = [None; LANES];
        let input = self.io.input(Self::SYNC_INPUT);
        if !input.is_connected() {
            return events;
        }
        let g = c / LANES;
        let sync = input.get_poly_voltage_simd(c) - 0.01;
        let last = self.last_sync[g];
        for lane in 0..LANES {
            if last[lane] <= 0.0 && sync[lane] > 0.0 {
                let t0 = (-last[lane] / (sync[lane] - last[lane])).clamp(0.0, 0.999_999);
                let pos = t0 * OVERSAMPLE as f32;
                let index = pos as usize;
                events[lane] = Some(SyncEvent {
                    index,
                    frac: pos - index as f32,
                });
            }
        }
        self.last_sync[g] = sync;
        events
    }
}

impl Default for Vco {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Module for Vco {
    fn io(&self) -> &ModuleIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ModuleIo {
        &mut self.io
    }

    fn process(&mut self, args: &ProcessArgs) {
        let analog = self.is_analog();
        let soft = self.io.param(Self::SYNC_PARAM) < 0.5;
        let channels = self.io.max_input_channels(&[Self::PITCH_INPUT]);

        if analog && self.drift_divider.process() {
            for c in group_starts(channels) {
                let g = c / LANES;
                for lane in 0..LANES {
                    let d = self.drift[g][lane];
                    self.drift[g][lane] = d + (self.rng.normal() - d / DRIFT_TAU) / args.sample_rate;
                }
            }
        }

        let want_sin = self.io.output(Self::SIN_OUTPUT).is_connected();
        let want_tri = self.io.output(Self::TRI_OUTPUT).is_connected();
        let want_saw = self.io.output(Self::SAW_OUTPUT).is_connected();
        let want_sqr = self.io.output(Self::SQR_OUTPUT).is_connected();
        let tables = analog_tables();
        let coupling = SQUARE_COUPLING_HZ / (args.sample_rate * OVERSAMPLE as f32);

        let pw_param = self.io.param(Self::PW_PARAM);
        let pw_cv = self.io.param(Self::PW_CV_PARAM);
        let mut light_pitch = 0.0;

        for c in group_starts(channels) {
            let g = c / LANES;
            let pitch = self.group_pitch(c, analog);
            if c == 0 {
                light_pitch = pitch[0];
            }
            let freq = Float4::pow_base(2.0, pitch) * C4_HZ;
            let delta_phase = (freq * args.sample_time).clamp(1e-6, 0.35);
            let pw = (Float4::splat(pw_param)
                + self.io.input(Self::PW_INPUT).get_poly_voltage_simd(c) * (pw_cv / 10.0))
                .clamp(0.01, 0.99);

            let events = self.detect_sync(c);

            let mut sin = [Float4::ZERO; OVERSAMPLE];
            let mut tri = [Float4::ZERO; OVERSAMPLE];
            let mut saw = [Float4::ZERO; OVERSAMPLE];
            let mut sqr = [Float4::ZERO; OVERSAMPLE];
            self.sqr_filters[g].set_cutoff_freq(coupling);

            let step = delta_phase * (1.0 / OVERSAMPLE as f32);
            let mut phase = self.phase[g];
            let mut direction = self.direction[g];

            for i in 0..OVERSAMPLE {
                for lane in 0..LANES {
                    if soft {
                        if let Some(ev) = events[lane] {
                            if ev.index == i {
                                direction[lane] = -direction[lane];
                            }
                        }
                    }
                }

                if analog {
                    sin[i] = phase.map(|p| table_lookup(&tables.sine, p));
                    tri[i] = phase.map(|p| table_lookup(&tables.triangle, p));
                    saw[i] = phase.map(|p| table_lookup(&tables.saw, p));
                } else {
                    sin[i] = phase.map(sin2pi_pade_05_5_4);
                    tri[i] = phase.map(|p| 1.0 - 4.0 * (p - 0.25).abs().min((p - 1.25).abs()));
                    saw[i] = phase.map(|p| 2.0 * wrap_phase(p + 0.5) - 1.0);
                }
                let raw_sqr = Float4::select(phase.lt_lanes(pw), Float4::splat(1.0), Float4::splat(-1.0));
                sqr[i] = if analog {
                    self.sqr_filters[g].process(raw_sqr);
                    self.sqr_filters[g].highpass()
                } else {
                    raw_sqr
                };

                let mut next = phase + step * direction;
                for lane in 0..LANES {
                    if let Some(ev) = events[lane] {
                        if !soft && ev.index == i {
                            // Land where a reset at the exact crossing would have left us
                            next[lane] = (1.0 - ev.frac) * step[lane];
                        }
                    }
                }
                phase = next.map(wrap_phase);
            }

            self.phase[g] = phase;
            self.direction[g] = direction;

            if want_sin {
                let v = self.sin_decimators[g].process(&sin) * 5.0;
                self.io.output_mut(Self::SIN_OUTPUT).set_voltage_simd(v, c);
            }
            if want_tri {
                let v = self.tri_decimators[g].process(&tri) * 5.0;
                self.io.output_mut(Self::TRI_OUTPUT).set_voltage_simd(v, c);
            }
            if want_saw {
                let v = self.saw_decimators[g].process(&saw) * 5.0;
                self.io.output_mut(Self::SAW_OUTPUT).set_voltage_simd(v, c);
            }
            if want_sqr {
                let v = self.sqr_decimators[g].process(&sqr) * 5.0;
                self.io.output_mut(Self::SQR_OUTPUT).set_voltage_simd(v, c);
            }
        }

        for id in [
            Self::SIN_OUTPUT,
            Self::TRI_OUTPUT,
            Self::SAW_OUTPUT,
            Self::SQR_OUTPUT,
        ] {
            self.io.output_mut(id).set_channels(channels);
        }

        if self.light_divider.process() {
            let dt = args.sample_time * self.light_divider.division() as f32;
            let brightness = ((light_pitch + 4.0) / 8.0).clamp(0.0, 1.0);
            self.io
                .light_mut(Self::FREQ_LIGHT)
                .set_brightness_smooth(brightness, dt);
        }
    }

    fn reset(&mut self) {
        self.phase = [Float4::ZERO; GROUPS];
        self.direction = [Float4::splat(1.0); GROUPS];
        self.last_sync = [Float4::ZERO; GROUPS];
        self.drift = [Float4::ZERO; GROUPS];
        for d in self
            .sin_decimators
            .iter_mut()
            .chain(self.tri_decimators.iter_mut())
            .chain(self.saw_decimators.iter_mut())
            .chain(self.sqr_decimators.iter_mut())
        {
            d.reset();
        }
        for f in &mut self.sqr_filters {
            f.reset();
        }
    }
}
