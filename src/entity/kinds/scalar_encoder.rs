use serde_json::{json, Value};

use crate::entity::{config_f64, config_usize, AttributeData, Entity, Outputs, ResolvedInputs};
use crate::error::MeshResult;

pub const ENTITY_TYPE: &str = "scalar-encoder";

pub const INPUT: &str = "input";
pub const OUTPUT: &str = "output";

/// Encodes each scalar input element into a sliding block of active bits.
///
/// With `bits` total bits and `density` active bits there are
/// `bits - density + 1` buckets over `[min, max]`; adjacent buckets overlap
/// in all but one bit, so nearby values share most of their code.
pub struct ScalarEncoderEntity {
    // Working buffer, lazily resized when the input shape changes.
    code: Vec<f32>,
}

impl ScalarEncoderEntity {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }
}

impl Default for ScalarEncoderEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for ScalarEncoderEntity {
    fn entity_type(&self) -> &'static str {
        ENTITY_TYPE
    }

    fn inputs(&self) -> &'static [&'static str] {
        &[INPUT]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &[OUTPUT]
    }

    fn default_config(&self) -> Value {
        json!({
            "bits": 8,
            "density": 2,
            "min": 0.0,
            "max": 1.0,
        })
    }

    fn update(&mut self, inputs: &ResolvedInputs, config: &mut Value) -> MeshResult<Outputs> {
        let input = match inputs.get(INPUT) {
            Some(record) => record,
            // Not ready yet; produce nothing this tick.
            None => return Ok(Outputs::new()),
        };

        let bits = config_usize(config, "bits", 8).max(1);
        let density = config_usize(config, "density", 2).clamp(1, bits);
        let min = config_f64(config, "min", 0.0) as f32;
        let max = config_f64(config, "max", 1.0) as f32;
        let bins = bits - density + 1;

        let required = input.elements.len() * bits;
        if self.code.len() != required {
            self.code.resize(required, 0.0);
        }
        self.code.fill(0.0);

        for (index, value) in input.elements.iter().enumerate() {
            let range = max - min;
            let unit = if range > 0.0 {
                ((value - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let bucket = ((unit * bins as f32) as usize).min(bins - 1);
            let offset = index * bits + bucket;
            for bit in 0..density {
                self.code[offset + bit] = 1.0;
            }
        }

        let mut outputs = Outputs::new();
        outputs.insert(
            OUTPUT.to_string(),
            AttributeData {
                sizes: vec![input.elements.len(), bits],
                elements: self.code.clone(),
            },
        );
        Ok(outputs)
    }
}
