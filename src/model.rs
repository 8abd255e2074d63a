//! Persisted record shapes and the `entity:attribute` key syntax.
//!
//! These are the serialized documents stored by [`crate::store`] and exchanged
//! over the coordination HTTP API. The wire (JSON) field names follow the
//! teacher framework's naming (`type`, `refKeys`, `dataKey`, …); the Rust field
//! names stay idiomatic and are mapped with `#[serde(rename)]`.

use serde::{Deserialize, Serialize};

/// Separator between an entity name and one of its attributes in a data key:
/// `entityName ':' attributeSuffix`. Illegal inside entity names.
pub const KEY_DELIMITER: char = ':';

/// Fan-in delimiter inside a producer expression (`ref_keys`): multiple
/// producer keys concatenated in textual order.
pub const REFERENCE_DELIMITER: &str = ",";

/// A named entity with durable configuration and a place in the parent forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Globally unique identity of the entity.
    pub name: String,
    /// The entity's type name (`type` on the wire), resolved through the
    /// registry to a factory.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// The node that hosts the entity.
    pub node: String,
    /// Optional parent; parent pointers form a forest.
    #[serde(default)]
    pub parent: Option<String>,
    /// The entity's configuration as a JSON-encoded string. Empty until
    /// materialized from the type's defaults.
    #[serde(default)]
    pub config: String,
}

impl EntityRecord {
    /// A record with an empty config, to be materialized from the type's
    /// defaults on registration.
    pub fn new(name: &str, entity_type: &str, node: &str, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            node: node.to_string(),
            parent: parent.map(|p| p.to_string()),
            config: String::new(),
        }
    }
}

/// A persisted data value: a flat `f32` payload with a multi-dimensional size
/// descriptor, optionally carrying the producer expression it was resolved
/// from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// The data key (`name` on the wire): `entity:attribute`.
    pub name: String,
    /// Optional producer expression this value derives from.
    #[serde(rename = "refKeys")]
    pub ref_keys: Option<String>,
    /// Multi-dimensional size descriptor.
    pub sizes: Vec<usize>,
    /// Flat element payload.
    pub elements: Vec<f32>,
}

impl DataRecord {
    /// A concrete value with no reference expression.
    pub fn new(name: &str, sizes: Vec<usize>, elements: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            ref_keys: None,
            sizes,
            elements,
        }
    }

    /// A name-only stub, used when listing known keys.
    pub fn meta(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ref_keys: None,
            sizes: Vec::new(),
            elements: Vec::new(),
        }
    }
}

/// A reference edge, stored independently of both endpoints: the consumer
/// `data_key` and the producer expression `ref_keys`. Setting replaces any
/// prior edge entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataReferenceRecord {
    #[serde(rename = "dataKey")]
    pub data_key: String,
    #[serde(rename = "refKeys")]
    pub ref_keys: String,
}

/// A bulk config-path assignment: write `config_value` at `config_path` on
/// `entity_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPathRecord {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(rename = "configPath")]
    pub config_path: String,
    #[serde(rename = "configValue")]
    pub config_value: String,
}

/// Builds the data key for an entity's attribute: `entity:attribute`.
pub fn data_key(entity: &str, attribute: &str) -> String {
    format!("{}{}{}", entity, KEY_DELIMITER, attribute)
}

/// Splits a data key into `(entity, attribute)` on the first delimiter.
/// Returns `None` when the key carries no delimiter.
pub fn split_data_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_DELIMITER)
}

/// An entity name is valid when it is non-empty and contains no key delimiter
/// (`:` is reserved for the `entity:attribute` key syntax).
pub fn is_valid_entity_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(KEY_DELIMITER)
}
