use std::fs;

use log::info;

use crate::error::{MeshError, MeshResult};
use crate::model::{ConfigPathRecord, DataRecord, DataReferenceRecord, EntityRecord};
use crate::node::MeshNode;

/// Startup-time bulk loaders.
///
/// Each reads a JSON array of records from a file and applies it through the
/// node. Failures surface as [`MeshError::StartupLoad`]; the binary treats
/// them as fatal. This fail-fast policy is deliberate and distinct from the
/// per-entity fault isolation of the steady state.

/// Imports entities from their serialized form.
pub fn import_entities(node: &MeshNode, json: &str) -> MeshResult<usize> {
    let records: Vec<EntityRecord> = serde_json::from_str(json)?;
    let count = records.len();
    for record in records {
        info!(
            "Persisting entity of type: {}, hosted at node: {}",
            record.entity_type, record.node
        );
        node.create_entity_record(record)?;
    }
    Ok(count)
}

/// Imports data records, registering any reference edges they carry.
pub fn import_data(node: &MeshNode, json: &str) -> MeshResult<usize> {
    let records: Vec<DataRecord> = serde_json::from_str(json)?;
    let count = records.len();
    for record in &records {
        node.import_data_record(record)?;
    }
    Ok(count)
}

/// Applies a list of data reference assignments.
pub fn import_data_references(node: &MeshNode, json: &str) -> MeshResult<usize> {
    let records: Vec<DataReferenceRecord> = serde_json::from_str(json)?;
    let count = records.len();
    for record in &records {
        info!(
            "Persisting data input reference for data: {} with input data keys: {}",
            record.data_key, record.ref_keys
        );
        node.graph().set_reference(&record.data_key, &record.ref_keys)?;
    }
    Ok(count)
}

/// Applies a list of config path assignments.
pub fn import_config_paths(node: &MeshNode, json: &str) -> MeshResult<usize> {
    let records: Vec<ConfigPathRecord> = serde_json::from_str(json)?;
    let count = records.len();
    for record in &records {
        info!(
            "Persisting entity: {} config path: {} value: {}",
            record.entity_name, record.config_path, record.config_value
        );
        node.set_config_path(&record.entity_name, &record.config_path, &record.config_value)?;
    }
    Ok(count)
}

pub fn load_entities(node: &MeshNode, path: &str) -> MeshResult<usize> {
    import_entities(node, &read_load_file(path)?).map_err(startup_failure(path))
}

pub fn load_data(node: &MeshNode, path: &str) -> MeshResult<usize> {
    import_data(node, &read_load_file(path)?).map_err(startup_failure(path))
}

pub fn load_data_references(node: &MeshNode, path: &str) -> MeshResult<usize> {
    import_data_references(node, &read_load_file(path)?).map_err(startup_failure(path))
}

pub fn load_config_paths(node: &MeshNode, path: &str) -> MeshResult<usize> {
    import_config_paths(node, &read_load_file(path)?).map_err(startup_failure(path))
}

fn read_load_file(path: &str) -> MeshResult<String> {
    fs::read_to_string(path)
        .map_err(|e| MeshError::StartupLoad(format!("cannot read '{}': {}", path, e)))
}

fn startup_failure(path: &str) -> impl FnOnce(MeshError) -> MeshError + '_ {
    move |e| match e {
        already @ MeshError::StartupLoad(_) => already,
        other => MeshError::StartupLoad(format!("loading '{}' failed: {}", path, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PersistenceStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_node(dir: &tempfile::TempDir) -> MeshNode {
        let store = Arc::new(PersistenceStore::open(dir.path().join("db")).unwrap());
        MeshNode::with_store("node-1", store)
    }

    #[test]
    fn loads_entities_references_and_configs() {
        let dir = tempdir().unwrap();
        let node = test_node(&dir);

        let entities_path = dir.path().join("entities.json");
        fs::write(
            &entities_path,
            r#"[
                {"name": "model", "type": "discrete-random", "node": "node-1", "parent": null},
                {"name": "classifier", "type": "growing-neural-gas", "node": "node-1", "parent": "model"}
            ]"#,
        )
        .unwrap();

        let references_path = dir.path().join("references.json");
        fs::write(
            &references_path,
            r#"[{"dataKey": "classifier:input", "refKeys": "model:output"}]"#,
        )
        .unwrap();

        let configs_path = dir.path().join("configs.json");
        fs::write(
            &configs_path,
            r#"[{"entityName": "model", "configPath": "elements", "configValue": "2"}]"#,
        )
        .unwrap();

        assert_eq!(load_entities(&node, entities_path.to_str().unwrap()).unwrap(), 2);
        assert_eq!(
            load_data_references(&node, references_path.to_str().unwrap()).unwrap(),
            1
        );
        assert_eq!(
            load_config_paths(&node, configs_path.to_str().unwrap()).unwrap(),
            1
        );

        assert_eq!(node.get_config_path("model", "elements").unwrap(), "2");
        assert_eq!(
            node.graph().reference("classifier:input").unwrap().unwrap(),
            "model:output"
        );
    }

    #[test]
    fn missing_file_is_a_startup_failure() {
        let dir = tempdir().unwrap();
        let node = test_node(&dir);
        let err = load_entities(&node, "/no/such/file.json").unwrap_err();
        assert!(matches!(err, MeshError::StartupLoad(_)));
    }

    #[test]
    fn malformed_file_is_a_startup_failure() {
        let dir = tempdir().unwrap();
        let node = test_node(&dir);
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not an array").unwrap();
        let err = load_entities(&node, path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, MeshError::StartupLoad(_)));
    }

    #[test]
    fn imported_data_registers_reference_edges() {
        let dir = tempdir().unwrap();
        let node = test_node(&dir);
        let json = r#"[
            {"name": "model:output", "refKeys": null, "sizes": [2], "elements": [1.0, 0.0]},
            {"name": "classifier:input", "refKeys": "model:output", "sizes": [], "elements": []}
        ]"#;
        assert_eq!(import_data(&node, json).unwrap(), 2);

        let resolved = node.graph().resolve("classifier:input").unwrap().unwrap();
        assert_eq!(resolved.elements, vec![1.0, 0.0]);
    }
}
