//! Built-in modules
//!
//! Every module owns a [`ModuleIo`](crate::port::ModuleIo) described by its
//! `spec()`, exposes its param/input/output/light ids as associated
//! constants and is constructed from [`EngineSettings`](crate::persist::EngineSettings).

pub mod adsr;
pub mod delay;
pub mod lfo;
pub mod logic;
pub mod mixer;
pub mod noise;
pub mod quantizer;
pub mod scope;
pub mod seq;
pub mod switch;
pub mod utility;
pub mod vcf;
pub mod vco;
pub mod wt;

pub use adsr::Adsr;
pub use delay::Delay;
pub use lfo::{Lfo, Random, RandomValues};
pub use logic::{Compare, Comparison, Gates, Logic, Process, Shasr};
pub use mixer::{CvMix, EightVert, Fade, MidSide, Mixer, PanLaw, Unity, Vca, Vca1, VcMixer};
pub use noise::{GrayFilter, Noise, PinkNoiseGenerator};
pub use quantizer::Quantizer;
pub use scope::{Scope, ScopeStats};
pub use seq::Seq3;
pub use switch::{SequentialSwitch, SwitchKind};
pub use utility::{Merge, Mult, Mutes, Octave, Pulses, Push, Rescale, Split, Sum};
pub use vcf::Vcf;
pub use vco::Vco;
pub use wt::{WtEngine, WtLfo, WtVco};
