use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, warn};
use serde_json::Value;

use crate::config_path;
use crate::entity::{Entity, EntityRegistry, ResolvedInputs};
use crate::error::{MeshError, MeshResult};
use crate::graph::DataRefGraph;
use crate::model::{data_key, is_valid_entity_name, split_data_key, DataRecord, EntityRecord};
use crate::store::PersistenceStore;

pub mod config;
pub mod scheduler;

pub use config::{load_node_config, NodeConfig, PeerConfig};
pub use scheduler::Scheduler;

/// Lifecycle state of a local entity.
///
/// Updated is the steady state, re-entered every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Unconfigured,
    Ready,
    Updated,
}

struct EntityRuntime {
    entity: Box<dyn Entity>,
    state: EntityState,
}

/// Outcome of one tick over the local entity set.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub updated: usize,
    pub failed: Vec<String>,
}

/// A node owns a local set of entities and drives repeated ticks over them,
/// composing the reference graph and the persistence store to resolve inputs
/// before each update and persist outputs after.
///
/// Entities never share mutable memory; all communication between them goes
/// through persisted data and reference resolution, which is what makes
/// cross-node distribution transparent to entity authors.
pub struct MeshNode {
    name: String,
    store: Arc<PersistenceStore>,
    graph: DataRefGraph,
    registry: EntityRegistry,
    runtimes: Mutex<HashMap<String, EntityRuntime>>,
    // Serializes read-modify-write cycles on entity config documents.
    config_lock: Mutex<()>,
    ticks: AtomicU64,
}

impl MeshNode {
    /// Opens the store at the configured path and builds a node with the
    /// built-in entity kinds registered.
    pub fn new(config: NodeConfig) -> MeshResult<Self> {
        let store = Arc::new(PersistenceStore::open(&config.storage_path)?);
        Ok(Self::with_store(&config.node_name, store))
    }

    /// Builds a node over an already-open store.
    pub fn with_store(name: &str, store: Arc<PersistenceStore>) -> Self {
        let graph = DataRefGraph::new(Arc::clone(&store));
        Self {
            name: name.to_string(),
            store,
            graph,
            registry: EntityRegistry::with_builtin_kinds(),
            runtimes: Mutex::new(HashMap::new()),
            config_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<PersistenceStore> {
        &self.store
    }

    pub fn graph(&self) -> &DataRefGraph {
        &self.graph
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Creates an entity, materializing its persisted config from the type's
    /// defaults.
    pub fn create_entity(
        &self,
        name: &str,
        entity_type: &str,
        parent: Option<&str>,
    ) -> MeshResult<()> {
        self.create_entity_record(EntityRecord::new(name, entity_type, &self.name, parent))
    }

    /// Creates an entity from a full record, e.g. during import.
    ///
    /// The persisted config starts from the type's default document so every
    /// recognized field is present, then any fields carried by the record
    /// overlay the defaults.
    pub fn create_entity_record(&self, mut record: EntityRecord) -> MeshResult<()> {
        if !is_valid_entity_name(&record.name) {
            return Err(MeshError::Config(format!(
                "invalid entity name '{}'",
                record.name
            )));
        }

        let mut config = self.registry.default_config_for(&record.entity_type)?;
        if !record.config.is_empty() {
            let provided: Value = serde_json::from_str(&record.config)?;
            if let (Some(base), Some(overlay)) = (config.as_object_mut(), provided.as_object()) {
                for (key, value) in overlay {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        record.config = serde_json::to_string(&config)?;
        self.store.upsert_entity(&record)
    }

    /// Wires one entity attribute as a reference input to another.
    pub fn set_data_reference(
        &self,
        consumer_entity: &str,
        consumer_attribute: &str,
        producer_entity: &str,
        producer_attribute: &str,
    ) -> MeshResult<()> {
        self.graph.set_reference(
            &data_key(consumer_entity, consumer_attribute),
            &data_key(producer_entity, producer_attribute),
        )
    }

    /// Persists a data record, registering its reference edge when the record
    /// carries one.
    pub fn import_data_record(&self, record: &DataRecord) -> MeshResult<()> {
        if let Some(expr) = &record.ref_keys {
            self.graph.set_reference(&record.name, expr)?;
        }
        self.store.upsert_data(record)
    }

    /// The entity's whole config document, as stored.
    pub fn get_config(&self, entity_name: &str) -> MeshResult<String> {
        let record = self.require_entity(entity_name)?;
        Ok(record.config)
    }

    /// Reads one config property by dot path.
    pub fn get_config_path(&self, entity_name: &str, path: &str) -> MeshResult<String> {
        let record = self.require_entity(entity_name)?;
        let doc: Value = parse_config(&record.config)?;
        config_path::read_path(&doc, path)
    }

    /// Writes one config property by dot path, re-persisting the whole
    /// document as a single atomic entity update.
    pub fn set_config_path(&self, entity_name: &str, path: &str, value: &str) -> MeshResult<()> {
        let _guard = self
            .config_lock
            .lock()
            .map_err(|_| MeshError::Store("config lock poisoned".to_string()))?;

        let mut record = self.require_entity(entity_name)?;
        let mut doc: Value = parse_config(&record.config)?;
        config_path::write_path(&mut doc, path, value)?;
        record.config = serde_json::to_string(&doc)?;
        self.store.upsert_entity(&record)
    }

    /// The entities hosted by this node, in stable (name) order.
    pub fn local_entities(&self) -> MeshResult<Vec<EntityRecord>> {
        Ok(self
            .store
            .list_entities()?
            .into_iter()
            .filter(|record| record.node == self.name)
            .collect())
    }

    /// The lifecycle state of a local entity: `Unconfigured` while it only
    /// exists in the store, `Ready` once instantiated, `Updated` after a
    /// successful update.
    pub fn entity_state(&self, name: &str) -> Option<EntityState> {
        if let Ok(runtimes) = self.runtimes.lock() {
            if let Some(runtime) = runtimes.get(name) {
                return Some(runtime.state);
            }
        }
        match self.store.get_entity(name) {
            Ok(Some(_)) => Some(EntityState::Unconfigured),
            _ => None,
        }
    }

    /// One full pass of resolve-inputs, update, persist-outputs across the
    /// local entity set.
    ///
    /// Entities connected by a same-tick data dependency run in topological
    /// order; cycles are permitted, with back-edges reading the prior tick's
    /// persisted value. A failing entity is logged and skipped without
    /// aborting the tick for others.
    pub fn tick(&self) -> MeshResult<TickSummary> {
        let records = self.local_entities()?;
        let by_name: BTreeMap<String, EntityRecord> = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        let mut runtimes = self
            .runtimes
            .lock()
            .map_err(|_| MeshError::Store("runtime lock poisoned".to_string()))?;

        // Drop instances for entities removed out-of-band.
        runtimes.retain(|name, _| by_name.contains_key(name));

        for (name, record) in &by_name {
            if !runtimes.contains_key(name) {
                match self.registry.create(&record.entity_type) {
                    Ok(entity) => {
                        runtimes.insert(
                            name.clone(),
                            EntityRuntime {
                                entity,
                                state: EntityState::Ready,
                            },
                        );
                    }
                    Err(e) => {
                        warn!("Entity '{}' cannot be instantiated: {}", name, e);
                    }
                }
            }
        }

        let order = self.update_order(&by_name, &runtimes)?;

        let mut updated = 0;
        let mut failed = Vec::new();

        for name in &order {
            let record = &by_name[name];
            let runtime = match runtimes.get_mut(name) {
                Some(runtime) => runtime,
                None => continue,
            };

            let mut resolved = ResolvedInputs::new();
            for attribute in runtime.entity.inputs() {
                if let Some(data) = self.graph.resolve(&data_key(name, attribute))? {
                    resolved.insert(attribute, data);
                }
            }

            let mut doc = match parse_config(&record.config) {
                Ok(doc) => doc,
                Err(e) => {
                    error!("Entity '{}' has an unreadable config: {}", name, e);
                    failed.push(name.clone());
                    continue;
                }
            };
            let doc_before = doc.clone();

            let entity = &mut runtime.entity;
            let outcome = catch_unwind(AssertUnwindSafe(|| entity.update(&resolved, &mut doc)));

            match outcome {
                Ok(Ok(outputs)) => {
                    for (attribute, data) in outputs {
                        self.store.upsert_data(&DataRecord::new(
                            &data_key(name, &attribute),
                            data.sizes,
                            data.elements,
                        ))?;
                    }
                    if doc != doc_before {
                        self.persist_config(record, &doc)?;
                    }
                    runtime.state = EntityState::Updated;
                    updated += 1;
                }
                Ok(Err(e)) => {
                    let failure = MeshError::EntityUpdate {
                        entity: name.clone(),
                        message: e.to_string(),
                    };
                    error!("{}", failure);
                    failed.push(name.clone());
                }
                Err(panic) => {
                    let failure = MeshError::EntityUpdate {
                        entity: name.clone(),
                        message: panic_message(panic),
                    };
                    error!("{}", failure);
                    failed.push(name.clone());
                }
            }
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TickSummary {
            tick,
            updated,
            failed,
        })
    }

    /// Topological order over the same-tick reference edges between local
    /// entities. Cycles are broken deterministically at the lexicographically
    /// smallest remaining name; the broken edges resolve to the prior tick's
    /// persisted values.
    fn update_order(
        &self,
        records: &BTreeMap<String, EntityRecord>,
        runtimes: &HashMap<String, EntityRuntime>,
    ) -> MeshResult<Vec<String>> {
        let mut dependencies: BTreeMap<String, BTreeSet<String>> = records
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();

        for name in records.keys() {
            let runtime = match runtimes.get(name) {
                Some(runtime) => runtime,
                None => continue,
            };
            for attribute in runtime.entity.inputs() {
                let consumer_key = data_key(name, attribute);
                let expr = match self.graph.reference(&consumer_key)? {
                    Some(expr) => expr,
                    None => continue,
                };
                for producer_key in DataRefGraph::producers(&expr) {
                    if let Some((producer, _)) = split_data_key(producer_key) {
                        if producer != name && records.contains_key(producer) {
                            if let Some(deps) = dependencies.get_mut(name) {
                                deps.insert(producer.to_string());
                            }
                        }
                    }
                }
            }
        }

        Ok(topological_order(dependencies))
    }

    fn persist_config(&self, record: &EntityRecord, doc: &Value) -> MeshResult<()> {
        let _guard = self
            .config_lock
            .lock()
            .map_err(|_| MeshError::Store("config lock poisoned".to_string()))?;
        let mut updated = record.clone();
        updated.config = serde_json::to_string(doc)?;
        self.store.upsert_entity(&updated)
    }

    fn require_entity(&self, name: &str) -> MeshResult<EntityRecord> {
        self.store
            .get_entity(name)?
            .ok_or_else(|| MeshError::Config(format!("unknown entity '{}'", name)))
    }
}

fn parse_config(config: &str) -> MeshResult<Value> {
    if config.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    Ok(serde_json::from_str(config)?)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic in entity update".to_string()
    }
}

/// Kahn's algorithm over the dependency map, with deterministic tie-breaking
/// and deterministic cycle-breaking.
fn topological_order(mut dependencies: BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(first) = dependencies.keys().next().cloned() {
        let next = dependencies
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            // Every remaining entity waits on another: a cycle. Emit the
            // smallest name; its incoming edges become back-edges.
            .unwrap_or(first);

        dependencies.remove(&next);
        for deps in dependencies.values_mut() {
            deps.remove(&next);
        }
        order.push(next);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_node() -> (tempfile::TempDir, MeshNode) {
        let dir = tempdir().unwrap();
        let store = Arc::new(PersistenceStore::open(dir.path().join("db")).unwrap());
        let node = MeshNode::with_store("node-1", store);
        (dir, node)
    }

    #[test]
    fn create_entity_materializes_defaults() {
        let (_dir, node) = test_node();
        node.create_entity("model", "discrete-random", None).unwrap();

        let record = node.store().get_entity("model").unwrap().unwrap();
        let config: Value = serde_json::from_str(&record.config).unwrap();
        assert_eq!(config["elements"], 1);
        assert_eq!(config["levels"], 2);
    }

    #[test]
    fn create_entity_record_overlays_provided_config() {
        let (_dir, node) = test_node();
        let mut record = EntityRecord::new("model", "discrete-random", "node-1", None);
        record.config = r#"{"elements": 5}"#.to_string();
        node.create_entity_record(record).unwrap();

        let stored = node.store().get_entity("model").unwrap().unwrap();
        let config: Value = serde_json::from_str(&stored.config).unwrap();
        assert_eq!(config["elements"], 5);
        // untouched defaults are still present
        assert_eq!(config["levels"], 2);
    }

    #[test]
    fn invalid_entity_name_is_rejected() {
        let (_dir, node) = test_node();
        assert!(node.create_entity("bad:name", "constant", None).is_err());
    }

    #[test]
    fn config_path_round_trip_through_node() {
        let (_dir, node) = test_node();
        node.create_entity("model", "discrete-random", None).unwrap();
        node.set_config_path("model", "elements", "2").unwrap();
        assert_eq!(node.get_config_path("model", "elements").unwrap(), "2");

        let err = node.get_config_path("model", "missing.path").unwrap_err();
        assert!(matches!(err, MeshError::PathNotFound(_)));
    }

    #[test]
    fn failed_path_write_leaves_store_unchanged() {
        let (_dir, node) = test_node();
        node.create_entity("model", "discrete-random", None).unwrap();
        let before = node.get_config("model").unwrap();
        assert!(node.set_config_path("model", "missing.path", "1").is_err());
        assert_eq!(node.get_config("model").unwrap(), before);
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        deps.insert("sink".into(), ["mid"].iter().map(|s| s.to_string()).collect());
        deps.insert("mid".into(), ["source"].iter().map(|s| s.to_string()).collect());
        deps.insert("source".into(), BTreeSet::new());

        let order = topological_order(deps);
        assert_eq!(order, vec!["source", "mid", "sink"]);
    }

    #[test]
    fn topological_order_breaks_cycles_deterministically() {
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        deps.insert("a".into(), ["b"].iter().map(|s| s.to_string()).collect());
        deps.insert("b".into(), ["a"].iter().map(|s| s.to_string()).collect());

        let order = topological_order(deps);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn tick_resolves_inputs_and_persists_outputs() {
        let (_dir, node) = test_node();
        node.create_entity("model", "discrete-random", None).unwrap();
        node.create_entity("classifier", "growing-neural-gas", Some("model"))
            .unwrap();
        node.set_data_reference("classifier", "input", "model", "output")
            .unwrap();
        node.set_config_path("model", "elements", "2").unwrap();

        assert_eq!(node.entity_state("model"), Some(EntityState::Unconfigured));

        let summary = node.tick().unwrap();
        assert_eq!(summary.tick, 1);
        assert!(summary.failed.is_empty());

        let resolved = node.graph().resolve("classifier:input").unwrap().unwrap();
        let produced = node.store().get_data("model:output").unwrap().unwrap();
        assert_eq!(resolved.elements, produced.elements);
        assert_eq!(resolved.elements.len(), 2);

        assert_eq!(node.entity_state("model"), Some(EntityState::Updated));
    }

    #[test]
    fn unwired_entities_are_order_independent() {
        let (_dir, node) = test_node();
        node.create_entity("left", "constant", None).unwrap();
        node.create_entity("right", "constant", None).unwrap();
        node.set_config_path("left", "value", "1.5").unwrap();
        node.set_config_path("right", "value", "2.5").unwrap();

        node.tick().unwrap();
        let left = node.store().get_data("left:output").unwrap().unwrap();
        let right = node.store().get_data("right:output").unwrap().unwrap();
        assert_eq!(left.elements, vec![1.5]);
        assert_eq!(right.elements, vec![2.5]);
    }

    struct FailingEntity;

    impl Entity for FailingEntity {
        fn entity_type(&self) -> &'static str {
            "failing"
        }
        fn inputs(&self) -> &'static [&'static str] {
            &[]
        }
        fn outputs(&self) -> &'static [&'static str] {
            &["output"]
        }
        fn default_config(&self) -> Value {
            serde_json::json!({})
        }
        fn update(
            &mut self,
            _inputs: &ResolvedInputs,
            _config: &mut Value,
        ) -> MeshResult<crate::entity::Outputs> {
            panic!("boom");
        }
    }

    #[test]
    fn failing_entity_does_not_abort_the_tick() {
        let (_dir, mut node) = test_node();
        node.registry_mut()
            .register("failing", || Box::new(FailingEntity));
        node.create_entity("broken", "failing", None).unwrap();
        node.create_entity("steady", "constant", None).unwrap();

        let summary = node.tick().unwrap();
        assert_eq!(summary.failed, vec!["broken".to_string()]);
        assert!(node.store().get_data("steady:output").unwrap().is_some());

        // a second tick is equally unaffected
        let summary = node.tick().unwrap();
        assert_eq!(summary.updated, 1);
    }

    #[test]
    fn failing_entity_retains_previous_outputs() {
        let (_dir, mut node) = test_node();

        struct FlakyEntity {
            calls: u32,
        }
        impl Entity for FlakyEntity {
            fn entity_type(&self) -> &'static str {
                "flaky"
            }
            fn inputs(&self) -> &'static [&'static str] {
                &[]
            }
            fn outputs(&self) -> &'static [&'static str] {
                &["output"]
            }
            fn default_config(&self) -> Value {
                serde_json::json!({})
            }
            fn update(
                &mut self,
                _inputs: &ResolvedInputs,
                _config: &mut Value,
            ) -> MeshResult<crate::entity::Outputs> {
                self.calls += 1;
                if self.calls > 1 {
                    return Err(MeshError::EntityUpdate {
                        entity: "flaky".to_string(),
                        message: "transient".to_string(),
                    });
                }
                let mut outputs = crate::entity::Outputs::new();
                outputs.insert(
                    "output".to_string(),
                    crate::entity::AttributeData::vector(vec![7.0]),
                );
                Ok(outputs)
            }
        }

        node.registry_mut()
            .register("flaky", || Box::new(FlakyEntity { calls: 0 }));
        node.create_entity("flaky-1", "flaky", None).unwrap();

        node.tick().unwrap();
        node.tick().unwrap();

        let data = node.store().get_data("flaky-1:output").unwrap().unwrap();
        assert_eq!(data.elements, vec![7.0]);
    }

    #[test]
    fn recurrent_wiring_reads_prior_tick_value() {
        let (_dir, node) = test_node();
        node.create_entity("echo", "growing-neural-gas", None).unwrap();
        // feed the entity its own output: a cycle of length one
        node.set_data_reference("echo", "input", "echo", "output")
            .unwrap();

        // no persisted output yet, so the first tick has no input and is a
        // no-op for this entity
        node.tick().unwrap();
        assert!(node.store().get_data("echo:output").unwrap().is_none());

        // seed the output, then the next tick consumes the prior value
        node.store()
            .upsert_data(&DataRecord::new("echo:output", vec![2], vec![0.3, 0.7]))
            .unwrap();
        let summary = node.tick().unwrap();
        assert!(summary.failed.is_empty());
        let data = node.store().get_data("echo:output").unwrap().unwrap();
        assert!(!data.elements.is_empty());
    }
}
