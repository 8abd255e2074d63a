use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::MeshResult;
use crate::model::DataRecord;

pub mod kinds;
pub mod registry;

pub use registry::EntityRegistry;

/// One produced output attribute: a flat payload plus its size descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    pub sizes: Vec<usize>,
    pub elements: Vec<f32>,
}

impl AttributeData {
    /// A one-dimensional payload.
    pub fn vector(elements: Vec<f32>) -> Self {
        Self {
            sizes: vec![elements.len()],
            elements,
        }
    }
}

/// Outputs produced by one update, keyed by attribute name.
pub type Outputs = BTreeMap<String, AttributeData>;

/// The inputs resolved for one update.
///
/// An attribute with no entry is unavailable this tick; the entity decides
/// whether it can proceed without it.
#[derive(Debug, Default)]
pub struct ResolvedInputs {
    values: BTreeMap<String, DataRecord>,
}

impl ResolvedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: &str, record: DataRecord) {
        self.values.insert(attribute.to_string(), record);
    }

    pub fn get(&self, attribute: &str) -> Option<&DataRecord> {
        self.values.get(attribute)
    }

    pub fn is_available(&self, attribute: &str) -> bool {
        self.values.contains_key(attribute)
    }
}

/// The capability set every concrete entity type implements.
///
/// An entity is pure with respect to its inputs and config, except for
/// internally retained working buffers, which may be lazily resized when the
/// required shape changes between ticks. All durable entity state lives in
/// data records keyed by entity name and output attribute.
pub trait Entity: Send {
    /// The type tag this entity registers under.
    fn entity_type(&self) -> &'static str;

    /// Declared input attribute names, static per type.
    fn inputs(&self) -> &'static [&'static str];

    /// Declared output attribute names, static per type.
    fn outputs(&self) -> &'static [&'static str];

    /// The config document materialized at creation time, with all
    /// recognized fields present and defaulted.
    fn default_config(&self) -> Value;

    /// One update step. Returning an empty output set is a valid no-op, e.g.
    /// when a required input is unavailable.
    fn update(&mut self, inputs: &ResolvedInputs, config: &mut Value) -> MeshResult<Outputs>;
}

/// Reads a numeric config field, tolerating a missing or re-typed value.
pub(crate) fn config_f64(config: &Value, field: &str, default: f64) -> f64 {
    match config.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn config_usize(config: &Value, field: &str, default: usize) -> usize {
    config_f64(config, field, default as f64).max(0.0) as usize
}

pub(crate) fn config_u64(config: &Value, field: &str, default: u64) -> u64 {
    config_f64(config, field, default as f64).max(0.0) as u64
}
