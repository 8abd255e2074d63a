use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::entity::{
    config_f64, config_u64, config_usize, AttributeData, Entity, Outputs, ResolvedInputs,
};
use crate::error::MeshResult;

pub const ENTITY_TYPE: &str = "growing-neural-gas";

pub const INPUT: &str = "input";
pub const OUTPUT: &str = "output";

/// A competitive-learning clusterer over a fixed pool of cells.
///
/// Each tick the cell whose weight vector is nearest the input (by summed
/// squared error) wins; the winner's weights move toward the input and the
/// output is the one-hot activity of the winning cell. Weights are retained
/// across ticks and lazily resized when the input shape changes.
pub struct GrowingNeuralGasEntity {
    weights: Vec<f32>,
    input_len: usize,
    rng: Option<StdRng>,
}

impl GrowingNeuralGasEntity {
    pub fn new() -> Self {
        Self {
            weights: Vec::new(),
            input_len: 0,
            rng: None,
        }
    }

    fn reset_weights(&mut self, cells: usize, input_len: usize, seed: u64) {
        let rng = self
            .rng
            .get_or_insert_with(|| StdRng::seed_from_u64(seed));
        self.input_len = input_len;
        self.weights = (0..cells * input_len)
            .map(|_| rng.gen_range(0.0..1.0))
            .collect();
    }

    /// Summed squared error between the input and one cell's weight vector.
    fn sum_sq_error(&self, cell: usize, input: &[f32]) -> f32 {
        let offset = cell * self.input_len;
        input
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let diff = value - self.weights[offset + i];
                diff * diff
            })
            .sum()
    }
}

impl Default for GrowingNeuralGasEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for GrowingNeuralGasEntity {
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
            "cells": 8,
            "learningRate": 0.1,
            "seed": 0,
        })
    }

    fn update(&mut self, inputs: &ResolvedInputs, config: &mut Value) -> MeshResult<Outputs> {
        let input = match inputs.get(INPUT) {
            Some(record) if !record.elements.is_empty() => record,
            _ => return Ok(Outputs::new()),
        };

        let cells = config_usize(config, "cells", 8).max(1);
        let learning_rate = config_f64(config, "learningRate", 0.1) as f32;
        let seed = config_u64(config, "seed", 0);

        if self.weights.len() != cells * input.elements.len() {
            self.reset_weights(cells, input.elements.len(), seed);
        }

        let mut winner = 0;
        let mut best = f32::MAX;
        for cell in 0..cells {
            let error = self.sum_sq_error(cell, &input.elements);
            if error < best {
                best = error;
                winner = cell;
            }
        }

        let offset = winner * self.input_len;
        for (i, value) in input.elements.iter().enumerate() {
            let weight = &mut self.weights[offset + i];
            *weight += learning_rate * (value - *weight);
        }

        let mut activity = vec![0.0; cells];
        activity[winner] = 1.0;

        let mut outputs = Outputs::new();
        outputs.insert(OUTPUT.to_string(), AttributeData::vector(activity));
        Ok(outputs)
    }
}
