use serde_json::{json, Value};

use crate::entity::{config_f64, config_usize, AttributeData, Entity, Outputs, ResolvedInputs};
use crate::error::MeshResult;

pub const ENTITY_TYPE: &str = "constant";

pub const OUTPUT: &str = "output";

/// Produces a fixed-value vector every tick. Useful as a source when wiring
/// or debugging a graph.
pub struct ConstantEntity;

impl ConstantEntity {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConstantEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for ConstantEntity {
    fn entity_type(&self) -> &'static str {
        ENTITY_TYPE
    }

    fn inputs(&self) -> &'static [&'static str] {
        &[]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &[OUTPUT]
    }

    fn default_config(&self) -> Value {
        json!({
            "elements": 1,
            "value": 0.0,
        })
    }

    fn update(&mut self, _inputs: &ResolvedInputs, config: &mut Value) -> MeshResult<Outputs> {
        let elements = config_usize(config, "elements", 1);
        let value = config_f64(config, "value", 0.0) as f32;

        let mut outputs = Outputs::new();
        outputs.insert(
            OUTPUT.to_string(),
            AttributeData::vector(vec![value; elements]),
        );
        Ok(outputs)
    }
}
