use std::sync::Arc;

use crate::error::MeshResult;
use crate::model::{DataRecord, DataReferenceRecord, REFERENCE_DELIMITER};
use crate::store::PersistenceStore;

/// The table of edges from consumer data keys to producer key expressions,
/// and the resolution of a consumer's current value through them.
///
/// Edges are persisted in the store's reference tree, independently of either
/// endpoint. Resolution reads the latest producer value(s); an unset edge or
/// an unwritten producer resolves to `None`, never an error.
#[derive(Clone)]
pub struct DataRefGraph {
    store: Arc<PersistenceStore>,
}

impl DataRefGraph {
    pub fn new(store: Arc<PersistenceStore>) -> Self {
        Self { store }
    }

    /// Splits a producer expression into its producer keys, in textual order.
    pub fn producers(expr: &str) -> Vec<&str> {
        expr.split(REFERENCE_DELIMITER)
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .collect()
    }

    /// Upserts the edge for `consumer_key`, replacing any prior edge.
    pub fn set_reference(&self, consumer_key: &str, producer_expr: &str) -> MeshResult<()> {
        self.store.upsert_reference(&DataReferenceRecord {
            data_key: consumer_key.to_string(),
            ref_keys: producer_expr.to_string(),
        })
    }

    /// The stored producer expression for `consumer_key`, if any.
    pub fn reference(&self, consumer_key: &str) -> MeshResult<Option<String>> {
        Ok(self
            .store
            .get_reference(consumer_key)?
            .map(|record| record.ref_keys))
    }

    /// Resolves the consumer's current value by reading the latest producer
    /// value(s).
    ///
    /// Fan-in rule: when the expression names multiple producers, their
    /// element sequences are concatenated in the textual order of the
    /// expression and the size descriptor collapses to the combined length.
    /// Any producer without a persisted value makes the whole resolution
    /// unavailable.
    pub fn resolve(&self, consumer_key: &str) -> MeshResult<Option<DataRecord>> {
        let expr = match self.reference(consumer_key)? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        let producers = Self::producers(&expr);
        match producers.as_slice() {
            [] => Ok(None),
            [single] => {
                let record = match self.store.get_data(single)? {
                    Some(record) => record,
                    None => return Ok(None),
                };
                Ok(Some(DataRecord {
                    name: consumer_key.to_string(),
                    ref_keys: Some(expr.clone()),
                    sizes: record.sizes,
                    elements: record.elements,
                }))
            }
            many => {
                let mut elements = Vec::new();
                for key in many {
                    match self.store.get_data(key)? {
                        Some(record) => elements.extend_from_slice(&record.elements),
                        None => return Ok(None),
                    }
                }
                let total = elements.len();
                Ok(Some(DataRecord {
                    name: consumer_key.to_string(),
                    ref_keys: Some(expr.clone()),
                    sizes: vec![total],
                    elements,
                }))
            }
        }
    }

    /// Substring discovery over known data keys, for introspection and
    /// external listing endpoints.
    pub fn find_by_filter(&self, filter: &str) -> MeshResult<Vec<DataRecord>> {
        let mut results = Vec::new();
        for key in self.store.list_data_keys()? {
            if key.contains(filter) {
                if let Some(record) = self.store.get_data(&key)? {
                    results.push(record);
                }
            }
        }
        Ok(results)
    }

    /// All known data keys.
    pub fn data_keys(&self) -> MeshResult<Vec<String>> {
        self.store.list_data_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_graph() -> (tempfile::TempDir, Arc<PersistenceStore>, DataRefGraph) {
        let dir = tempdir().unwrap();
        let store = Arc::new(PersistenceStore::open(dir.path().join("db")).unwrap());
        let graph = DataRefGraph::new(Arc::clone(&store));
        (dir, store, graph)
    }

    #[test]
    fn unset_reference_resolves_to_none() {
        let (_dir, _store, graph) = test_graph();
        assert!(graph.resolve("e2:in").unwrap().is_none());
    }

    #[test]
    fn unwritten_producer_resolves_to_none() {
        let (_dir, _store, graph) = test_graph();
        graph.set_reference("e2:in", "e1:out").unwrap();
        assert!(graph.resolve("e2:in").unwrap().is_none());
    }

    #[test]
    fn single_producer_resolves_bit_exact() {
        let (_dir, store, graph) = test_graph();
        graph.set_reference("e2:in", "e1:out").unwrap();
        let elements = vec![0.25_f32, -1.5, 3.0e-7];
        store
            .upsert_data(&DataRecord::new("e1:out", vec![3], elements.clone()))
            .unwrap();

        let resolved = graph.resolve("e2:in").unwrap().unwrap();
        assert_eq!(resolved.name, "e2:in");
        assert_eq!(resolved.elements, elements);
        assert_eq!(resolved.sizes, vec![3]);
    }

    #[test]
    fn fan_in_concatenates_in_textual_order() {
        let (_dir, store, graph) = test_graph();
        store
            .upsert_data(&DataRecord::new("b:out", vec![2], vec![3.0, 4.0]))
            .unwrap();
        store
            .upsert_data(&DataRecord::new("a:out", vec![2], vec![1.0, 2.0]))
            .unwrap();
        graph.set_reference("c:in", "b:out,a:out").unwrap();

        let resolved = graph.resolve("c:in").unwrap().unwrap();
        assert_eq!(resolved.elements, vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(resolved.sizes, vec![4]);
    }

    #[test]
    fn fan_in_with_missing_producer_is_unavailable() {
        let (_dir, store, graph) = test_graph();
        store
            .upsert_data(&DataRecord::new("a:out", vec![1], vec![1.0]))
            .unwrap();
        graph.set_reference("c:in", "a:out,missing:out").unwrap();
        assert!(graph.resolve("c:in").unwrap().is_none());
    }

    #[test]
    fn replace_on_set() {
        let (_dir, store, graph) = test_graph();
        store
            .upsert_data(&DataRecord::new("a:out", vec![1], vec![1.0]))
            .unwrap();
        store
            .upsert_data(&DataRecord::new("b:out", vec![1], vec![2.0]))
            .unwrap();
        graph.set_reference("c:in", "a:out").unwrap();
        graph.set_reference("c:in", "b:out").unwrap();
        let resolved = graph.resolve("c:in").unwrap().unwrap();
        assert_eq!(resolved.elements, vec![2.0]);
    }

    #[test]
    fn filter_matches_substrings() {
        let (_dir, store, graph) = test_graph();
        store
            .upsert_data(&DataRecord::new("model:output", vec![1], vec![0.0]))
            .unwrap();
        store
            .upsert_data(&DataRecord::new("classifier:output", vec![1], vec![0.0]))
            .unwrap();

        let all = graph.find_by_filter("output").unwrap();
        assert_eq!(all.len(), 2);
        let model_only = graph.find_by_filter("model").unwrap();
        assert_eq!(model_only.len(), 1);
        assert_eq!(model_only[0].name, "model:output");
    }
}
