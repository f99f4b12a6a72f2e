//! # Polyrack: Polyphonic Modular Synthesis Modules
//!
//! `polyrack` is a library of real-time modular synthesizer modules. Each
//! module consumes and produces per-sample voltages on polyphonic ports
//! carrying up to 16 channels, and is driven one frame at a time by a host
//! that owns the cables, the UI and the audio device.
//!
//! ## Architecture
//!
//! - **Ports and modules** ([`port`]): polyphonic [`Port`]s, params, lights
//!   and the [`Module`] trait the host calls once per frame.
//! - **SIMD groups** ([`simd`]): channels are processed four at a time as
//!   [`Float4`] lanes.
//! - **DSP primitives** ([`dsp`]): triggers, clock dividers, one-pole
//!   filters, decimation, ring buffers and stream resampling.
//! - **Modules** ([`modules`]): oscillators, envelopes, the ladder filter,
//!   the resampled delay, wavetables, noise, the sequencer and utilities.
//! - **Registry** ([`registry`]): slug-based construction into [`AnyModule`].
//!
//! ## Quick Start
//!
//! ```rust
//! use polyrack::prelude::*;
//!
//! let settings = EngineSettings::new(48000.0).with_seed(1);
//! let registry = ModuleRegistry::with_builtins();
//! let mut vco = registry.create("VCO", &settings).unwrap();
//! vco.io_mut().output_mut(Vco::SIN_OUTPUT).connect(1);
//!
//! let mut args = ProcessArgs::new(settings.sample_rate);
//! for _ in 0..480 {
//!     vco.process(&args);
//!     args = args.next();
//! }
//! let v = vco.io().output(Vco::SIN_OUTPUT).get_voltage(0);
//! assert!(v.abs() <= 5.5);
//! ```

pub mod dsp;
pub mod error;
pub mod modules;
pub mod persist;
pub mod port;
pub mod registry;
pub mod rng;
pub mod simd;
pub mod wavetable;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::persist::{EngineSettings, StateStore};
    pub use crate::port::{
        Light, Module, ModuleIo, ModuleSpec, Param, ParamDef, Port, PortDef, ProcessArgs,
        SignalKind, PORT_MAX_CHANNELS,
    };
    pub use crate::registry::{builtin_descriptors, AnyModule, ModuleDescriptor, ModuleRegistry};
    pub use crate::rng::Rng;
    pub use crate::simd::{Float4, Mask4};
    pub use crate::wavetable::Wavetable;

    pub use crate::modules::{
        Adsr, Compare, CvMix, Delay, EightVert, Fade, Gates, Lfo, Logic, Merge, MidSide, Mixer,
        Mult, Mutes, Noise, Octave, PanLaw, Process, Pulses, Push, Quantizer, Random,
        RandomValues, Rescale, Scope, ScopeStats, Seq3, SequentialSwitch, Shasr, Split, Sum,
        SwitchKind, Unity, Vca, Vca1, VcMixer, Vcf, Vco, WtEngine, WtLfo, WtVco,
    };
}

pub use prelude::*;
