//! Module registry
//!
//! Modules are created by slug through a [`ModuleRegistry`] populated from
//! [`builtin_descriptors`] (or any caller-supplied descriptors). The created
//! instance is an [`AnyModule`], a closed sum over the built-in module types
//! that dispatches [`Module`] calls with a `match`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::modules::*;
use crate::persist::{EngineSettings, StateStore};
use crate::port::{Module, ModuleIo, ProcessArgs};

macro_rules! any_module {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Any built-in module
        pub enum AnyModule {
            $($variant($ty)),*
        }

        impl AnyModule {
            /// The wrapped module as a trait object
            pub fn as_module(&self) -> &dyn Module {
                match self {
                    $(AnyModule::$variant(m) => m),*
                }
            }

            pub fn as_module_mut(&mut self) -> &mut dyn Module {
                match self {
                    $(AnyModule::$variant(m) => m),*
                }
            }

            /// Type name of the wrapped module
            pub fn type_name(&self) -> &'static str {
                match self {
                    $(AnyModule::$variant(_) => stringify!($variant)),*
                }
            }
        }

        impl Module for AnyModule {
            fn io(&self) -> &ModuleIo {
                match self {
                    $(AnyModule::$variant(m) => m.io()),*
                }
            }

            fn io_mut(&mut self) -> &mut ModuleIo {
                match self {
                    $(AnyModule::$variant(m) => m.io_mut()),*
                }
            }

            #[inline]
            fn process(&mut self, args: &ProcessArgs) {
                match self {
                    $(AnyModule::$variant(m) => m.process(args)),*
                }
            }

            fn reset(&mut self) {
                match self {
                    $(AnyModule::$variant(m) => m.reset()),*
                }
            }

            fn set_sample_rate(&mut self, sample_rate: f32) {
                match self {
                    $(AnyModule::$variant(m) => m.set_sample_rate(sample_rate)),*
                }
            }

            fn save_state(&self, store: &mut StateStore) {
                match self {
                    $(AnyModule::$variant(m) => m.save_state(store)),*
                }
            }

            fn load_state(&mut self, store: &StateStore) {
                match self {
                    $(AnyModule::$variant(m) => m.load_state(store)),*
                }
            }
        }

        $(
            impl From<$ty> for AnyModule {
                fn from(module: $ty) -> Self {
                    AnyModule::$variant(module)
                }
            }
        )*
    };
}

any_module! {
    Vco(Vco),
    Adsr(Adsr),
    Vcf(Vcf),
    Delay(Delay),
    WtVco(WtVco),
    WtLfo(WtLfo),
    Noise(Noise),
    Seq3(Seq3),
    Lfo(Lfo),
    Random(Random),
    RandomValues(RandomValues),
    Vca(Vca),
    Vca1(Vca1),
    VcMixer(VcMixer),
    Mixer(Mixer),
    CvMix(CvMix),
    Logic(Logic),
    Compare(Compare),
    Fade(Fade),
    Gates(Gates),
    Process(Process),
    Mutes(Mutes),
    Split(Split),
    Merge(Merge),
    Sum(Sum),
    Mult(Mult),
    Unity(Unity),
    Octave(Octave),
    Quantizer(Quantizer),
    Push(Push),
    Pulses(Pulses),
    EightVert(EightVert),
    MidSide(MidSide),
    Rescale(Rescale),
    SequentialSwitch(SequentialSwitch),
    Shasr(Shasr),
    Scope(Scope),
}

/// Module factory function type
pub type ModuleFactory = fn(&EngineSettings) -> AnyModule;

/// How to build one kind of module, plus what to call it
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    pub slug: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub factory: ModuleFactory,
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("slug", &self.slug)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl ModuleDescriptor {
    pub fn create(&self, settings: &EngineSettings) -> AnyModule {
        (self.factory)(settings)
    }
}

macro_rules! descriptor {
    ($slug:literal, $name:literal, $category:literal, $description:literal, $factory:expr) => {
        ModuleDescriptor {
            slug: $slug,
            name: $name,
            category: $category,
            description: $description,
            factory: |settings| AnyModule::from($factory(settings)),
        }
    };
}

/// Descriptors for every built-in module
pub fn builtin_descriptors() -> Vec<ModuleDescriptor> {
    vec![
        // Oscillators
        descriptor!("VCO", "VCO", "Oscillator", "Sine, triangle, saw and square oscillator with analog mode and sync", Vco::new),
        descriptor!("WTVCO", "WT VCO", "Oscillator", "Wavetable oscillator", WtVco::new),
        descriptor!("LFO", "LFO", "Oscillator", "Low-frequency oscillator", Lfo::new),
        descriptor!("WTLFO", "WT LFO", "Oscillator", "Wavetable low-frequency oscillator", WtLfo::new),
        descriptor!("Noise", "Noise", "Noise", "White, pink, red, violet, blue, gray and black noise", Noise::new),
        descriptor!("Random", "Random", "Random", "Clocked random voltages with interpolation shapes", Random::new),
        descriptor!("RandomValues", "Random Values", "Random", "Seven random voltages redrawn per channel on trigger", RandomValues::new),
        // Shaping
        descriptor!("ADSR", "ADSR", "Envelope", "Polyphonic ADSR envelope generator", Adsr::new),
        descriptor!("VCF", "VCF", "Filter", "Four-pole ladder filter with lowpass, highpass and bandpass outputs", Vcf::new),
        descriptor!("Delay", "Delay", "Delay", "Resampled delay line with feedback and tone", Delay::new),
        descriptor!("VCA", "VCA", "Amplifier", "Dual linear and exponential VCA", Vca::new),
        descriptor!("VCA-1", "VCA-1", "Amplifier", "Polyphonic VCA with linear or exponential response", Vca1::new),
        // Mixing
        descriptor!("VCMixer", "VC Mixer", "Mixer", "Four-channel mixer with CV level control", VcMixer::new),
        descriptor!("Mixer", "Mixer", "Mixer", "Six-input mixer", Mixer::new),
        descriptor!("CVMix", "CV Mix", "Mixer", "Three-input CV mixer with attenuverters", CvMix::new),
        descriptor!("Fade", "Fade", "Mixer", "Crossfader with selectable pan law", Fade::new),
        descriptor!("Unity", "Unity", "Mixer", "Dual six-input unity-gain mixer", Unity::new),
        descriptor!("MidSide", "Mid/Side", "Mixer", "Stereo mid/side encoder and decoder", MidSide::new),
        // Logic
        descriptor!("Logic", "Logic", "Logic", "Boolean logic on two gates", Logic::new),
        descriptor!("Compare", "Compare", "Logic", "Window comparator with min/max outputs", Compare::new),
        descriptor!("Gates", "Gates", "Logic", "Edge detection, flip-flop and gate length", Gates::new),
        descriptor!("Process", "Process", "Logic", "Sample and hold, track and hold and slew", Process::new),
        descriptor!("Push", "Push", "Logic", "Push button with hold", Push::new),
        descriptor!("Pulses", "Pulses", "Logic", "Ten trigger buttons", Pulses::new),
        descriptor!("SHASR", "SHASR", "Random", "Eight chained sample and holds", Shasr::new),
        // Sequencing
        descriptor!("SEQ3", "SEQ-3", "Sequencer", "Eight-step three-row sequencer", Seq3::new),
        descriptor!("SequentialSwitch1", "Sequential Switch 1→4", "Switch", "Clocked one-to-four router", SequentialSwitch::one_to_four),
        descriptor!("SequentialSwitch2", "Sequential Switch 4→1", "Switch", "Clocked four-to-one selector", SequentialSwitch::four_to_one),
        // Utilities
        descriptor!("Quantizer", "Quantizer", "Utility", "Chromatic quantizer with selectable notes", Quantizer::new),
        descriptor!("Octave", "Octave", "Utility", "Octave shifter", Octave::new),
        descriptor!("Rescale", "Rescale", "Utility", "Gain, offset and min/max limiting with reflection", Rescale::new),
        descriptor!("8vert", "8vert", "Utility", "Eight chained attenuverters", EightVert::new),
        descriptor!("Mutes", "Mutes", "Utility", "Ten mute switches", Mutes::new),
        descriptor!("Scope", "Scope", "Visual", "Two-channel triggered oscilloscope", Scope::new),
        // Polyphony
        descriptor!("Split", "Split", "Polyphonic", "Polyphonic cable to sixteen mono outputs", Split::new),
        descriptor!("Merge", "Merge", "Polyphonic", "Sixteen mono inputs to one polyphonic cable", Merge::new),
        descriptor!("Sum", "Sum", "Polyphonic", "Sum of all channels", Sum::new),
        descriptor!("Mult", "Mult", "Polyphonic", "One input copied to eight outputs", Mult::new),
    ]
}

/// Registry of module types available for instantiation
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    descriptors: BTreeMap<&'static str, ModuleDescriptor>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in module
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            // Built-in slugs are unique
            registry.descriptors.insert(descriptor.slug, descriptor);
        }
        debug!(count = registry.len(), "registered built-in modules");
        registry
    }

    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<()> {
        if self.descriptors.contains_key(descriptor.slug) {
            return Err(Error::DuplicateModule(descriptor.slug.to_string()));
        }
        debug!(slug = descriptor.slug, "registered module");
        self.descriptors.insert(descriptor.slug, descriptor);
        Ok(())
    }

    /// Instantiate a module by slug
    pub fn create(&self, slug: &str, settings: &EngineSettings) -> Result<AnyModule> {
        let descriptor = self
            .get(slug)
            .ok_or_else(|| Error::UnknownModule(slug.to_string()))?;
        debug!(slug, sample_rate = settings.sample_rate, "creating module");
        let mut module = descriptor.create(settings);
        module.set_sample_rate(settings.sample_rate);
        Ok(module)
    }

    pub fn get(&self, slug: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.get(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.descriptors.contains_key(slug)
    }

    /// Descriptors in slug order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.descriptors.values()
    }

    pub fn list_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a ModuleDescriptor> {
        self.iter().filter(move |d| d.category == category)
    }

    /// All unique categories, sorted
    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories: Vec<_> = self.iter().map(|d| d.category).collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
