use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use crate::error::{MeshError, MeshResult};
use crate::model::{DataRecord, DataReferenceRecord, EntityRecord};

/// Durable, per-key-atomic storage for entity, data and reference records.
///
/// Backed by sled with one tree per record kind. Every write replaces the
/// whole document for its key and is flushed before returning, so concurrent
/// writers to the same key never interleave a partial document. No cross-key
/// transactions are provided.
#[derive(Clone)]
pub struct PersistenceStore {
    db: sled::Db,
    entities_tree: sled::Tree,
    data_tree: sled::Tree,
    references_tree: sled::Tree,
}

impl PersistenceStore {
    /// Opens (or creates) a store rooted at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let db = sled::open(path)?;
        let entities_tree = db.open_tree("entities")?;
        let data_tree = db.open_tree("data")?;
        let references_tree = db.open_tree("references")?;

        Ok(Self {
            db,
            entities_tree,
            data_tree,
            references_tree,
        })
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Creates or replaces the record for an entity, as one atomic write.
    pub fn upsert_entity(&self, record: &EntityRecord) -> MeshResult<()> {
        self.store_in_tree(&self.entities_tree, &record.name, record)
    }

    pub fn get_entity(&self, name: &str) -> MeshResult<Option<EntityRecord>> {
        self.get_from_tree(&self.entities_tree, name)
    }

    /// Names of the entities whose stored parent equals the argument.
    ///
    /// Ordering follows sled key order, so it is stable for a given store
    /// state.
    pub fn children_of(&self, name: &str) -> MeshResult<Vec<String>> {
        let mut children = Vec::new();
        for record in self.list_entities()? {
            if record.parent.as_deref() == Some(name) {
                children.push(record.name);
            }
        }
        Ok(children)
    }

    pub fn list_entities(&self) -> MeshResult<Vec<EntityRecord>> {
        self.list_items_in_tree(&self.entities_tree)
            .map(|items| items.into_iter().map(|(_, record)| record).collect())
    }

    /// Creates or replaces a data record, as one atomic write.
    pub fn upsert_data(&self, record: &DataRecord) -> MeshResult<()> {
        self.store_in_tree(&self.data_tree, &record.name, record)
    }

    pub fn get_data(&self, key: &str) -> MeshResult<Option<DataRecord>> {
        self.get_from_tree(&self.data_tree, key)
    }

    pub fn list_data_keys(&self) -> MeshResult<Vec<String>> {
        self.list_keys_in_tree(&self.data_tree)
    }

    /// Stores a reference edge, replacing any prior edge for the same key.
    pub fn upsert_reference(&self, record: &DataReferenceRecord) -> MeshResult<()> {
        self.store_in_tree(&self.references_tree, &record.data_key, record)
    }

    pub fn get_reference(&self, data_key: &str) -> MeshResult<Option<DataReferenceRecord>> {
        self.get_from_tree(&self.references_tree, data_key)
    }

    pub fn list_references(&self) -> MeshResult<Vec<DataReferenceRecord>> {
        self.list_items_in_tree(&self.references_tree)
            .map(|items| items.into_iter().map(|(_, record)| record).collect())
    }

    // ========== GENERIC TREE OPERATIONS ==========

    fn store_in_tree<T: Serialize>(
        &self,
        tree: &sled::Tree,
        key: &str,
        item: &T,
    ) -> MeshResult<()> {
        let bytes = serde_json::to_vec(item)
            .map_err(|e| MeshError::Serialization(format!("Serialization failed: {}", e)))?;

        tree.insert(key.as_bytes(), bytes)
            .map_err(|e| MeshError::Store(format!("Store failed: {}", e)))?;

        // Ensure the data is durably written to disk
        tree.flush()
            .map_err(|e| MeshError::Store(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn get_from_tree<T: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        key: &str,
    ) -> MeshResult<Option<T>> {
        match tree.get(key.as_bytes()) {
            Ok(Some(bytes)) => {
                let item = serde_json::from_slice(&bytes).map_err(|e| {
                    MeshError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(item))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(MeshError::Store(format!("Retrieval failed: {}", e))),
        }
    }

    fn list_keys_in_tree(&self, tree: &sled::Tree) -> MeshResult<Vec<String>> {
        let mut keys = Vec::new();
        for result in tree.iter() {
            let (key, _) =
                result.map_err(|e| MeshError::Store(format!("Tree iteration failed: {}", e)))?;
            keys.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(keys)
    }

    fn list_items_in_tree<T: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
    ) -> MeshResult<Vec<(String, T)>> {
        let mut items = Vec::new();
        for result in tree.iter() {
            let (key, value) =
                result.map_err(|e| MeshError::Store(format!("Tree iteration failed: {}", e)))?;
            let key_str = String::from_utf8_lossy(&key).to_string();
            let item = serde_json::from_slice(&value).map_err(|e| {
                MeshError::Serialization(format!(
                    "Deserialization failed for key '{}': {}",
                    key_str, e
                ))
            })?;
            items.push((key_str, item));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, PersistenceStore) {
        let dir = tempdir().unwrap();
        let store = PersistenceStore::open(dir.path().join("db")).unwrap();
        (dir, store)
    }

    #[test]
    fn upsert_entity_is_idempotent() {
        let (_dir, store) = test_store();
        let record = EntityRecord::new("model", "discrete-random", "node-1", None);
        store.upsert_entity(&record).unwrap();
        store.upsert_entity(&record).unwrap();
        assert_eq!(store.get_entity("model").unwrap().unwrap(), record);
    }

    #[test]
    fn missing_entity_is_absent() {
        let (_dir, store) = test_store();
        assert!(store.get_entity("nope").unwrap().is_none());
        assert!(store.get_data("nope:out").unwrap().is_none());
    }

    #[test]
    fn children_match_stored_parent() {
        let (_dir, store) = test_store();
        store
            .upsert_entity(&EntityRecord::new("root", "constant", "node-1", None))
            .unwrap();
        store
            .upsert_entity(&EntityRecord::new("b", "constant", "node-1", Some("root")))
            .unwrap();
        store
            .upsert_entity(&EntityRecord::new("a", "constant", "node-1", Some("root")))
            .unwrap();
        store
            .upsert_entity(&EntityRecord::new("other", "constant", "node-1", None))
            .unwrap();

        let children = store.children_of("root").unwrap();
        assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
        assert!(store.children_of("other").unwrap().is_empty());
    }

    #[test]
    fn data_round_trips_bit_exact() {
        let (_dir, store) = test_store();
        let record = DataRecord::new("model:output", vec![3], vec![0.1, -2.5, f32::MIN_POSITIVE]);
        store.upsert_data(&record).unwrap();
        let fetched = store.get_data("model:output").unwrap().unwrap();
        assert_eq!(fetched.elements, record.elements);
        assert_eq!(fetched.sizes, vec![3]);
    }

    #[test]
    fn reference_replaces_on_set() {
        let (_dir, store) = test_store();
        store
            .upsert_reference(&DataReferenceRecord {
                data_key: "b:in".to_string(),
                ref_keys: "a:out".to_string(),
            })
            .unwrap();
        store
            .upsert_reference(&DataReferenceRecord {
                data_key: "b:in".to_string(),
                ref_keys: "c:out".to_string(),
            })
            .unwrap();
        let edge = store.get_reference("b:in").unwrap().unwrap();
        assert_eq!(edge.ref_keys, "c:out");
    }
}
