//! Shared DSP building blocks
//!
//! Small, allocation-free primitives used by the modules: edge detection and
//! timing, one-pole filters and the oversampling decimator, fast math
//! approximations, ring buffers and the resampler wrapper.

pub mod approx;
pub mod filter;
pub mod resample;
pub mod ring;
pub mod trigger;

pub use approx::{crossfade, exp2_taylor5, rescale, sin2pi_pade_05_5_4, softclip, tanh_pade};
pub use filter::{Decimator, IirOnePole, RcFilter, SlewLimiter};
pub use resample::StreamResampler;
pub use ring::{DoubleRingBuffer, RingBuffer};
pub use trigger::{
    BooleanTrigger, ClockDivider, PulseGenerator, SchmittTrigger, SchmittTrigger4, Timer,
};
