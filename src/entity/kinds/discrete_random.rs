use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::entity::{
    config_f64, config_u64, config_usize, AttributeData, Entity, Outputs, ResolvedInputs,
};
use crate::error::MeshResult;

pub const ENTITY_TYPE: &str = "discrete-random";

pub const OUTPUT: &str = "output";

/// Emits a vector of values drawn uniformly from a set of discrete levels in
/// `[min, max]`, one fresh draw per tick.
///
/// With the default two levels the output is a random binary vector. The
/// generator is seeded from config so experiment runs are reproducible.
pub struct DiscreteRandomEntity {
    rng: Option<StdRng>,
}

impl DiscreteRandomEntity {
    pub fn new() -> Self {
        Self { rng: None }
    }
}

impl Default for DiscreteRandomEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for DiscreteRandomEntity {
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
            "levels": 2,
            "min": 0.0,
            "max": 1.0,
            "seed": 0,
        })
    }

    fn update(&mut self, _inputs: &ResolvedInputs, config: &mut Value) -> MeshResult<Outputs> {
        let elements = config_usize(config, "elements", 1);
        let levels = config_usize(config, "levels", 2).max(1);
        let min = config_f64(config, "min", 0.0) as f32;
        let max = config_f64(config, "max", 1.0) as f32;

        let rng = self.rng.get_or_insert_with(|| {
            let seed = config_u64(config, "seed", 0);
            StdRng::seed_from_u64(seed)
        });

        let mut values = Vec::with_capacity(elements);
        for _ in 0..elements {
            let level = rng.gen_range(0..levels);
            let fraction = if levels > 1 {
                level as f32 / (levels - 1) as f32
            } else {
                0.0
            };
            values.push(min + fraction * (max - min));
        }

        let mut outputs = Outputs::new();
        outputs.insert(OUTPUT.to_string(), AttributeData::vector(values));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_element_count_and_range() {
        let mut entity = DiscreteRandomEntity::new();
        let mut config = json!({"elements": 16, "levels": 2, "min": 0.0, "max": 1.0, "seed": 7});
        let outputs = entity.update(&ResolvedInputs::new(), &mut config).unwrap();
        let output = &outputs[OUTPUT];
        assert_eq!(output.elements.len(), 16);
        assert!(output
            .elements
            .iter()
            .all(|v| *v == 0.0 || *v == 1.0));
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let draw = |seed: u64| {
            let mut entity = DiscreteRandomEntity::new();
            let mut config = json!({"elements": 8, "levels": 4, "seed": seed});
            let first = entity.update(&ResolvedInputs::new(), &mut config).unwrap()[OUTPUT]
                .elements
                .clone();
            let second = entity.update(&ResolvedInputs::new(), &mut config).unwrap()[OUTPUT]
                .elements
                .clone();
            (first, second)
        };
        let (a1, a2) = draw(42);
        let (b1, b2) = draw(42);
        assert_eq!(a1, b1);
        assert_eq!(a2, b2);
    }
}
