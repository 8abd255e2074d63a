use std::collections::BTreeSet;
use std::str::FromStr;

use log::info;

use crate::entity::EntityRegistry;
use crate::error::{MeshError, MeshResult};
use crate::graph::DataRefGraph;
use crate::model::{data_key, split_data_key, DataRecord, EntityRecord};
use crate::node::MeshNode;
use crate::store::PersistenceStore;

/// What an export collects: the entity records themselves, or their
/// persisted output data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeKind {
    Entity,
    Data,
}

impl FromStr for SubtreeKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entity" => Ok(SubtreeKind::Entity),
            "data" => Ok(SubtreeKind::Data),
            other => Err(MeshError::Config(format!(
                "unknown subtree kind '{}'",
                other
            ))),
        }
    }
}

/// Collects the subtree rooted at `root`, depth-first with every parent
/// preceding its children.
pub fn collect_entity_subtree(
    store: &PersistenceStore,
    root: &str,
) -> MeshResult<Vec<EntityRecord>> {
    let mut records = Vec::new();
    add_entity_subtree(store, root, &mut records)?;
    Ok(records)
}

fn add_entity_subtree(
    store: &PersistenceStore,
    name: &str,
    records: &mut Vec<EntityRecord>,
) -> MeshResult<()> {
    let record = store
        .get_entity(name)?
        .ok_or_else(|| MeshError::Config(format!("unknown entity '{}'", name)))?;
    records.push(record);

    for child in store.children_of(name)? {
        add_entity_subtree(store, &child, records)?;
    }
    Ok(())
}

/// Collects the persisted *output* data of every entity in the subtree.
/// Inputs are reference-resolved, not copied.
pub fn collect_data_subtree(
    store: &PersistenceStore,
    registry: &EntityRegistry,
    root: &str,
) -> MeshResult<Vec<DataRecord>> {
    let mut data = Vec::new();
    for record in collect_entity_subtree(store, root)? {
        let entity = registry.create(&record.entity_type)?;
        for attribute in entity.outputs() {
            if let Some(output) = store.get_data(&data_key(&record.name, attribute))? {
                data.push(output);
            }
        }
    }
    Ok(data)
}

/// Serializes a subtree for checkpointing, viewing or resuming elsewhere.
pub fn export_subtree(
    store: &PersistenceStore,
    registry: &EntityRegistry,
    root: &str,
    kind: SubtreeKind,
) -> MeshResult<String> {
    let serialized = match kind {
        SubtreeKind::Entity => serde_json::to_string(&collect_entity_subtree(store, root)?)?,
        SubtreeKind::Data => {
            serde_json::to_string(&collect_data_subtree(store, registry, root)?)?
        }
    };
    Ok(serialized)
}

/// Imports an exported subtree: entities first, parents before children,
/// then data.
///
/// The collections are validated as a whole before anything is written, so a
/// mutually inconsistent import rejects cleanly instead of partially
/// registering. The underlying store only guarantees per-key atomicity; the
/// validation pass is what makes the import one logical transaction.
pub fn import_subtree(node: &MeshNode, entities_json: &str, data_json: &str) -> MeshResult<()> {
    let entities: Vec<EntityRecord> = serde_json::from_str(entities_json)?;
    let data: Vec<DataRecord> = if data_json.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(data_json)?
    };

    let names: BTreeSet<&str> = entities.iter().map(|record| record.name.as_str()).collect();

    for record in &entities {
        if !node.registry().contains(&record.entity_type) {
            return Err(MeshError::ImportIntegrity(format!(
                "entity '{}' has unknown type '{}'",
                record.name, record.entity_type
            )));
        }
        if let Some(parent) = &record.parent {
            if !names.contains(parent.as_str()) && node.store().get_entity(parent)?.is_none() {
                return Err(MeshError::ImportIntegrity(format!(
                    "entity '{}' references missing parent '{}'",
                    record.name, parent
                )));
            }
        }
    }

    for record in &data {
        if let Some(expr) = &record.ref_keys {
            for producer_key in DataRefGraph::producers(expr) {
                let producer = split_data_key(producer_key)
                    .map(|(entity, _)| entity)
                    .unwrap_or(producer_key);
                if !names.contains(producer) {
                    return Err(MeshError::ImportIntegrity(format!(
                        "data '{}' references producer entity '{}' absent from the import",
                        record.name, producer
                    )));
                }
            }
        }
    }

    for record in order_parents_first(&entities)? {
        info!(
            "Persisting entity of type: {}, hosted at node: {}",
            record.entity_type, record.node
        );
        node.create_entity_record(record.clone())?;
    }

    for record in &data {
        node.import_data_record(record)?;
    }

    Ok(())
}

/// Orders entity records so every parent precedes its children. Fails when
/// the parent pointers inside the collection form a cycle.
fn order_parents_first(entities: &[EntityRecord]) -> MeshResult<Vec<&EntityRecord>> {
    let names: BTreeSet<&str> = entities.iter().map(|record| record.name.as_str()).collect();
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut remaining: Vec<&EntityRecord> = entities.iter().collect();
    let mut ordered = Vec::with_capacity(entities.len());

    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|record| {
            let ready = match &record.parent {
                None => true,
                Some(parent) => {
                    !names.contains(parent.as_str()) || emitted.contains(parent.as_str())
                }
            };
            if ready {
                emitted.insert(record.name.as_str());
                ordered.push(*record);
            }
            !ready
        });
        if remaining.len() == before {
            return Err(MeshError::ImportIntegrity(
                "parent pointers form a cycle".to_string(),
            ));
        }
    }

    Ok(ordered)
}
