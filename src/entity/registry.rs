use std::collections::HashMap;

use serde_json::Value;

use super::kinds;
use super::Entity;
use crate::error::{MeshError, MeshResult};

type EntityConstructor = Box<dyn Fn() -> Box<dyn Entity> + Send + Sync>;

/// Maps entity type names to constructors.
///
/// The registry replaces inheritance-based dispatch: a type tag selects a
/// constructor, and every instance satisfies the [`Entity`] capability set.
pub struct EntityRegistry {
    constructors: HashMap<String, EntityConstructor>,
}

impl EntityRegistry {
    /// An empty registry. Most callers want [`EntityRegistry::with_builtin_kinds`].
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every built-in entity kind registered.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(kinds::constant::ENTITY_TYPE, || {
            Box::new(kinds::constant::ConstantEntity::new())
        });
        registry.register(kinds::discrete_random::ENTITY_TYPE, || {
            Box::new(kinds::discrete_random::DiscreteRandomEntity::new())
        });
        registry.register(kinds::scalar_encoder::ENTITY_TYPE, || {
            Box::new(kinds::scalar_encoder::ScalarEncoderEntity::new())
        });
        registry.register(kinds::growing_neural_gas::ENTITY_TYPE, || {
            Box::new(kinds::growing_neural_gas::GrowingNeuralGasEntity::new())
        });
        registry
    }

    /// Registers a constructor for a type name, replacing any existing one.
    pub fn register<F>(&mut self, entity_type: &str, constructor: F)
    where
        F: Fn() -> Box<dyn Entity> + Send + Sync + 'static,
    {
        self.constructors
            .insert(entity_type.to_string(), Box::new(constructor));
    }

    /// Constructs a fresh instance of the given type.
    pub fn create(&self, entity_type: &str) -> MeshResult<Box<dyn Entity>> {
        match self.constructors.get(entity_type) {
            Some(constructor) => Ok(constructor()),
            None => Err(MeshError::Registry(format!(
                "unknown entity type '{}'",
                entity_type
            ))),
        }
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.constructors.contains_key(entity_type)
    }

    /// The default config document for a type.
    pub fn default_config_for(&self, entity_type: &str) -> MeshResult<Value> {
        Ok(self.create(entity_type)?.default_config())
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::with_builtin_kinds()
    }
}
