//! Ports, Parameters and the Module Interface
//!
//! This module defines the host-facing surface every module shares:
//!
//! - [`Port`]: a polyphonic jack carrying up to [`PORT_MAX_CHANNELS`] voltages
//! - [`Param`]: a knob, switch or button value, already range-mapped by the host
//! - [`Light`]: a write-only brightness sink read by the UI at its own rate
//! - [`ModuleIo`]: the params/inputs/outputs/lights owned by one module
//! - [`Module`]: the per-frame processing contract
//!
//! Descriptive metadata ([`PortDef`], [`ParamDef`], [`ModuleSpec`]) is kept
//! separate from runtime values so hosts can introspect a module without
//! touching its audio state.

use crate::persist::StateStore;
use crate::simd::{Float4, LANES};
use serde::{Deserialize, Serialize};

/// Maximum number of polyphonic channels carried by one cable
pub const PORT_MAX_CHANNELS: usize = 16;

/// Semantic signal classification following hardware modular conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Audio signal, AC-coupled, typically ±5V peak
    Audio,

    /// Bipolar control voltage, ±5V (LFO, pitch bend, modulation)
    CvBipolar,

    /// Unipolar control voltage, 0–10V (envelope, velocity, expression)
    CvUnipolar,

    /// Pitch CV following 1V/octave standard
    /// Reference: 0V = C4 (middle C, 261.626 Hz)
    VoltPerOctave,

    /// Gate signal, 0V (low) or 10V (high)
    Gate,

    /// Trigger signal, short 10V pulse (~1ms)
    Trigger,

    /// Clock signal, regular trigger pulses at tempo
    Clock,
}

impl SignalKind {
    /// Returns the typical voltage range (min, max) for this signal type
    pub fn voltage_range(&self) -> (f32, f32) {
        match self {
            SignalKind::Audio => (-5.0, 5.0),
            SignalKind::CvBipolar => (-5.0, 5.0),
            SignalKind::CvUnipolar => (0.0, 10.0),
            SignalKind::VoltPerOctave => (-5.0, 5.0),
            SignalKind::Gate | SignalKind::Trigger | SignalKind::Clock => (0.0, 10.0),
        }
    }

    /// Whether the signal is interpreted as a logic level
    pub fn is_logic(&self) -> bool {
        matches!(
            self,
            SignalKind::Gate | SignalKind::Trigger | SignalKind::Clock
        )
    }
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Human-readable name (e.g., "V/Oct", "Gate", "Sine")
    pub name: String,

    /// Signal type for validation and UI hints
    pub kind: SignalKind,

    /// Optional longer description shown by hosts
    pub description: Option<String>,
}

impl PortDef {
    pub fn new(name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How a parameter behaves on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Continuous knob or slider
    Continuous,
    /// Discrete switch with integer positions
    Switch,
    /// Momentary push button (1 while held)
    Button,
}

/// Parameter definition for UI binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub kind: ParamKind,
    pub unit: String,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            default,
            kind: ParamKind::Continuous,
            unit: String::new(),
        }
    }

    pub fn switch(name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        Self {
            kind: ParamKind::Switch,
            ..Self::new(name, min, max, default)
        }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self {
            kind: ParamKind::Button,
            ..Self::new(name, 0.0, 1.0, 0.0)
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Descriptive layout of a module's params, ports and lights
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub params: Vec<ParamDef>,
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
    pub lights: Vec<String>,
}

impl ModuleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, def: ParamDef) -> Self {
        self.params.push(def);
        self
    }

    pub fn input(mut self, name: impl Into<String>, kind: SignalKind) -> Self {
        self.inputs.push(PortDef::new(name, kind));
        self
    }

    pub fn output(mut self, name: impl Into<String>, kind: SignalKind) -> Self {
        self.outputs.push(PortDef::new(name, kind));
        self
    }

    /// Adds an output with a full definition (description included)
    pub fn output_def(mut self, def: PortDef) -> Self {
        self.outputs.push(def);
        self
    }

    pub fn light(mut self, name: impl Into<String>) -> Self {
        self.lights.push(name.into());
        self
    }

    pub fn input_by_name(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }

    pub fn param_by_name(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

/// A polyphonic jack.
///
/// A port with zero channels is disconnected. Only the host connects or
/// disconnects a port; modules may change the channel count of a connected
/// output but never disconnect it.
#[derive(Debug, Clone, Copy)]
pub struct Port {
    voltages: [f32; PORT_MAX_CHANNELS],
    channels: u8,
}

impl Default for Port {
    fn default() -> Self {
        Self::new()
    }
}

impl Port {
    pub const fn new() -> Self {
        Self {
            voltages: [0.0; PORT_MAX_CHANNELS],
            channels: 0,
        }
    }

    /// Host side: plug a cable carrying `channels` channels.
    pub fn connect(&mut self, channels: usize) {
        let channels = channels.clamp(1, PORT_MAX_CHANNELS);
        for v in &mut self.voltages[channels..] {
            *v = 0.0;
        }
        self.channels = channels as u8;
    }

    /// Host side: unplug the cable. All lanes read as 0V.
    pub fn disconnect(&mut self) {
        self.voltages = [0.0; PORT_MAX_CHANNELS];
        self.channels = 0;
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels as usize
    }

    /// Sets the channel count of a connected port, zeroing dropped lanes.
    ///
    /// Has no effect on a disconnected port, and never disconnects one: a
    /// request for 0 channels keeps 1.
    pub fn set_channels(&mut self, channels: usize) {
        if self.channels == 0 {
            return;
        }
        let channels = channels.clamp(1, PORT_MAX_CHANNELS);
        let old = self.channels as usize;
        if channels < old {
            for v in &mut self.voltages[channels..old] {
                *v = 0.0;
            }
        }
        self.channels = channels as u8;
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.channels > 0
    }

    #[inline]
    pub fn is_monophonic(&self) -> bool {
        self.channels == 1
    }

    #[inline]
    pub fn is_polyphonic(&self) -> bool {
        self.channels > 1
    }

    #[inline]
    pub fn get_voltage(&self, channel: usize) -> f32 {
        self.voltages[channel]
    }

    #[inline]
    pub fn set_voltage(&mut self, voltage: f32, channel: usize) {
        self.voltages[channel] = voltage;
    }

    /// Reads `channel`, repeating channel 0 when the cable is monophonic
    #[inline]
    pub fn get_poly_voltage(&self, channel: usize) -> f32 {
        if self.is_monophonic() {
            self.voltages[0]
        } else {
            self.voltages[channel]
        }
    }

    /// Reads `channel`, or `normal` when disconnected
    #[inline]
    pub fn get_normal_voltage(&self, normal: f32, channel: usize) -> f32 {
        if self.is_connected() {
            self.voltages[channel]
        } else {
            normal
        }
    }

    #[inline]
    pub fn get_normal_poly_voltage(&self, normal: f32, channel: usize) -> f32 {
        if self.is_connected() {
            self.get_poly_voltage(channel)
        } else {
            normal
        }
    }

    /// Reads the group of four lanes starting at `channel`
    #[inline]
    pub fn get_voltage_simd(&self, channel: usize) -> Float4 {
        let mut out = [0.0; LANES];
        out.copy_from_slice(&self.voltages[channel..channel + LANES]);
        Float4(out)
    }

    #[inline]
    pub fn get_poly_voltage_simd(&self, channel: usize) -> Float4 {
        if self.is_monophonic() {
            Float4::splat(self.voltages[0])
        } else {
            self.get_voltage_simd(channel)
        }
    }

    #[inline]
    pub fn get_normal_poly_voltage_simd(&self, normal: f32, channel: usize) -> Float4 {
        if self.is_connected() {
            self.get_poly_voltage_simd(channel)
        } else {
            Float4::splat(normal)
        }
    }

    #[inline]
    pub fn set_voltage_simd(&mut self, voltage: Float4, channel: usize) {
        self.voltages[channel..channel + LANES].copy_from_slice(&voltage.0);
    }

    /// Sum of all active channels
    pub fn get_voltage_sum(&self) -> f32 {
        self.voltages[..self.channels()].iter().sum()
    }

    /// Active channel voltages
    pub fn voltages(&self) -> &[f32] {
        &self.voltages[..self.channels()]
    }

    /// Copies `voltages` into the leading lanes
    pub fn write_voltages(&mut self, voltages: &[f32]) {
        let n = voltages.len().min(PORT_MAX_CHANNELS);
        self.voltages[..n].copy_from_slice(&voltages[..n]);
    }

    /// Zero every lane without changing the channel count
    pub fn clear_voltages(&mut self) {
        self.voltages = [0.0; PORT_MAX_CHANNELS];
    }
}

/// Current value of a knob, switch or button
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Param {
    value: f32,
}

impl Param {
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }
}

/// Falling light brightness decays at this rate (1/s); rising is instant
const LIGHT_LAMBDA: f32 = 30.0;

/// Write-only brightness indicator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Light {
    brightness: f32,
}

impl Light {
    #[inline]
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    #[inline]
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness;
    }

    /// Rises immediately, falls exponentially over `delta_time`
    #[inline]
    pub fn set_brightness_smooth(&mut self, brightness: f32, delta_time: f32) {
        if brightness < self.brightness {
            self.brightness += (brightness - self.brightness) * LIGHT_LAMBDA * delta_time;
        } else {
            self.brightness = brightness;
        }
    }
}

/// Per-frame context passed to [`Module::process`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessArgs {
    pub sample_rate: f32,
    pub sample_time: f32,
    pub frame: u64,
}

impl ProcessArgs {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            sample_time: 1.0 / sample_rate,
            frame: 0,
        }
    }

    /// Context for the following frame
    #[inline]
    pub fn next(&self) -> Self {
        Self {
            frame: self.frame + 1,
            ..*self
        }
    }
}

impl Default for ProcessArgs {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

/// The params, ports and lights owned by one module instance
#[derive(Debug, Clone)]
pub struct ModuleIo {
    spec: ModuleSpec,
    pub params: Vec<Param>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub lights: Vec<Light>,
}

impl ModuleIo {
    /// Allocates runtime storage for `spec`, with params at their defaults
    pub fn new(spec: ModuleSpec) -> Self {
        let params = spec
            .params
            .iter()
            .map(|p| Param { value: p.default })
            .collect();
        let inputs = vec![Port::new(); spec.inputs.len()];
        let outputs = vec![Port::new(); spec.outputs.len()];
        let lights = vec![Light::default(); spec.lights.len()];
        Self {
            spec,
            params,
            inputs,
            outputs,
            lights,
        }
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    #[inline]
    pub fn param(&self, id: usize) -> f32 {
        self.params[id].value
    }

    #[inline]
    pub fn set_param(&mut self, id: usize, value: f32) {
        self.params[id].value = value;
    }

    /// Restore every param to its declared default
    pub fn reset_params(&mut self) {
        for (param, def) in self.params.iter_mut().zip(&self.spec.params) {
            param.value = def.default;
        }
    }

    #[inline]
    pub fn input(&self, id: usize) -> &Port {
        &self.inputs[id]
    }

    #[inline]
    pub fn input_mut(&mut self, id: usize) -> &mut Port {
        &mut self.inputs[id]
    }

    #[inline]
    pub fn output(&self, id: usize) -> &Port {
        &self.outputs[id]
    }

    #[inline]
    pub fn output_mut(&mut self, id: usize) -> &mut Port {
        &mut self.outputs[id]
    }

    #[inline]
    pub fn light_mut(&mut self, id: usize) -> &mut Light {
        &mut self.lights[id]
    }

    /// Snapshot of all light brightnesses for a UI consumer
    pub fn light_snapshot(&self) -> Vec<f32> {
        self.lights.iter().map(Light::brightness).collect()
    }

    /// Channel count derived from the widest of the given inputs, at least 1
    pub fn max_input_channels(&self, inputs: &[usize]) -> usize {
        inputs
            .iter()
            .map(|&i| self.inputs[i].channels())
            .max()
            .unwrap_or(0)
            .max(1)
    }
}

/// Per-frame processing contract implemented by every module.
///
/// `process` is called once per audio frame. It must not block, allocate or
/// perform I/O.
pub trait Module: Send {
    /// Runtime params, ports and lights
    fn io(&self) -> &ModuleIo;

    fn io_mut(&mut self) -> &mut ModuleIo;

    /// Process one frame
    fn process(&mut self, args: &ProcessArgs);

    /// Return internal state to power-on values (params untouched)
    fn reset(&mut self) {}

    /// Called by the host when the engine sample rate changes
    fn set_sample_rate(&mut self, _sample_rate: f32) {}

    /// Write persistent fields into `store`
    fn save_state(&self, _store: &mut StateStore) {}

    /// Read persistent fields from `store`; missing fields keep current values
    fn load_state(&mut self, _store: &StateStore) {}
}
