//! Engine Settings and Module State Persistence
//!
//! [`EngineSettings`] configures module construction. [`StateStore`] is the
//! key-value object a module writes its non-parameter state into (toggles,
//! modes, step gates) so a host can save and restore a patch. The host treats
//! the JSON value as opaque.

use crate::error::Result;
use crate::rng::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_sample_rate() -> f32 {
    44100.0
}

/// Construction-time configuration shared by every module in a patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,

    /// Fixed seed for every random source; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            seed: None,
        }
    }
}

impl EngineSettings {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// A fresh generator for one module
    pub fn rng(&self) -> Rng {
        Rng::from_optional_seed(self.seed)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Typed key-value state with get-with-default accessors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    fields: Map<String, Value>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.fields.insert(key.to_string(), Value::Bool(value));
    }

    pub fn set_f32(&mut self, key: &str, value: f32) {
        // Non-finite floats have no JSON form
        let value = serde_json::Number::from_f64(value as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
    }

    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.fields.insert(key.to_string(), Value::from(value));
    }

    pub fn set_bools(&mut self, key: &str, values: &[bool]) {
        let array = values.iter().copied().map(Value::Bool).collect();
        self.fields.insert(key.to_string(), Value::Array(array));
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), Value::from(value));
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.fields
            .get(key)
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.fields
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    /// Fill `out` from a stored bool array. Entries that are missing or not
    /// bools leave the slot unchanged.
    pub fn get_bools(&self, key: &str, out: &mut [bool]) {
        if let Some(Value::Array(values)) = self.fields.get(key) {
            for (slot, value) in out.iter_mut().zip(values) {
                if let Some(b) = value.as_bool() {
                    *slot = b;
                }
            }
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Accepts any JSON object; other values yield an empty store.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                fields: fields.clone(),
            },
            _ => Self::default(),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    pub fn parse(json: &str) -> Result<Self> {
        let fields: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings = EngineSettings::from_json("{}").unwrap();
        assert_eq!(settings.sample_rate, 44100.0);
        assert_eq!(settings.seed, None);
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let settings = EngineSettings::new(48000.0).with_seed(3);
        let json = settings.to_json().unwrap();
        assert_eq!(EngineSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_seeded_settings_are_deterministic() {
        let settings = EngineSettings::default().with_seed(11);
        assert_eq!(settings.rng().next_u64(), settings.rng().next_u64());
    }

    #[test]
    fn test_store_typed_access_with_defaults() {
        let mut store = StateStore::new();
        store.set_bool("running", false);
        store.set_f32("level", 0.25);
        store.set_i64("octave", -2);
        store.set_bools("gates", &[true, false, true]);

        assert!(!store.get_bool("running", true));
        assert!(store.get_bool("missing", true));
        assert!((store.get_f32("level", 0.0) - 0.25).abs() < 1e-6);
        assert_eq!(store.get_i64("octave", 0), -2);

        let mut gates = [false; 8];
        gates[7] = true;
        store.get_bools("gates", &mut gates);
        assert_eq!(gates, [true, false, true, false, false, false, false, true]);
    }

    #[test]
    fn test_store_wrong_type_uses_default() {
        let mut store = StateStore::new();
        store.set_i64("flag", 1);
        assert!(store.get_bool("flag", true));
    }

    #[test]
    fn test_store_string_roundtrip() {
        let mut store = StateStore::new();
        store.set_bools("mutes", &[true, true]);
        let text = store.to_json_string().unwrap();
        let back = StateStore::parse(&text).unwrap();
        assert_eq!(back, store);
        assert!(StateStore::parse("[1, 2]").is_err());
    }
}
