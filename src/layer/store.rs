//! Project-wide layer and relation registry

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{Relation, VectorLayer};

/// Layers and relations known to a project, looked up by id or by name.
///
/// Insertion order is kept so that name lookups are deterministic when
/// two layers share a name.
#[derive(Default)]
pub struct LayerStore {
    layers: RwLock<IndexMap<String, Arc<dyn VectorLayer>>>,
    relations: RwLock<IndexMap<String, Relation>>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `layer`, replacing any layer with the same id
    pub fn add_layer(&self, layer: Arc<dyn VectorLayer>) {
        log::debug!("layer store: adding '{}' ({})", layer.name(), layer.id());
        self.layers.write().insert(layer.id().to_string(), layer);
    }

    pub fn remove_layer(&self, id: &str) -> Option<Arc<dyn VectorLayer>> {
        self.layers.write().shift_remove(id)
    }

    pub fn layer(&self, id: &str) -> Option<Arc<dyn VectorLayer>> {
        self.layers.read().get(id).cloned()
    }

    pub fn layers_by_name(&self, name: &str) -> Vec<Arc<dyn VectorLayer>> {
        self.layers
            .read()
            .values()
            .filter(|layer| layer.name() == name)
            .cloned()
            .collect()
    }

    /// Layer whose id is `text`, otherwise the first layer named `text`
    pub fn resolve(&self, text: &str) -> Option<Arc<dyn VectorLayer>> {
        let layers = self.layers.read();
        layers
            .get(text)
            .or_else(|| layers.values().find(|layer| layer.name() == text))
            .cloned()
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.layers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.read().is_empty()
    }

    /// Add `relation`, replacing any relation with the same id
    pub fn add_relation(&self, relation: Relation) {
        log::debug!(
            "layer store: adding relation '{}' ({} -> {})",
            relation.id(),
            relation.referencing_layer(),
            relation.referenced_layer()
        );
        self.relations
            .write()
            .insert(relation.id().to_string(), relation);
    }

    pub fn remove_relation(&self, id: &str) -> Option<Relation> {
        self.relations.write().shift_remove(id)
    }

    pub fn relation(&self, id: &str) -> Option<Relation> {
        self.relations.read().get(id).cloned()
    }

    pub fn relations_by_name(&self, name: &str) -> Vec<Relation> {
        self.relations
            .read()
            .values()
            .filter(|relation| relation.name() == name)
            .cloned()
            .collect()
    }

    /// Relation whose id is `text` and whose parent is `referenced_layer`,
    /// otherwise the first relation named `text`, provided it has that parent
    pub fn resolve_relation(&self, text: &str, referenced_layer: &str) -> Option<Relation> {
        let relations = self.relations.read();
        let by_id = relations
            .get(text)
            .filter(|relation| {
                relation.is_valid() && relation.referenced_layer() == referenced_layer
            });
        by_id
            .or_else(|| {
                relations
                    .values()
                    .find(|relation| relation.name() == text)
                    .filter(|relation| relation.referenced_layer() == referenced_layer)
            })
            .cloned()
    }
}

impl std::fmt::Debug for LayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStore")
            .field("layers", &self.layer_ids())
            .field("relations", &self.relations.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Fields;
    use crate::layer::MemoryLayer;

    fn layer(id: &str, name: &str) -> Arc<dyn VectorLayer> {
        Arc::new(MemoryLayer::new(id, name, Fields::from_names(["a"])))
    }

    #[test]
    fn test_resolve_prefers_id() {
        let store = LayerStore::new();
        store.add_layer(layer("roads_1", "roads"));
        store.add_layer(layer("roads", "other"));

        assert_eq!(store.resolve("roads").map(|l| l.name().to_string()), Some("other".into()));
        assert_eq!(store.resolve("roads_1").map(|l| l.id().to_string()), Some("roads_1".into()));
        assert!(store.resolve("rivers").is_none());
    }

    #[test]
    fn test_remove_layer() {
        let store = LayerStore::new();
        store.add_layer(layer("a", "A"));
        store.add_layer(layer("b", "A"));
        assert_eq!(store.layers_by_name("A").len(), 2);

        assert!(store.remove_layer("a").is_some());
        assert_eq!(store.layer_ids(), vec!["b".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_resolve_relation_checks_parent_layer() {
        let store = LayerStore::new();
        store.add_relation(
            Relation::new("rel_1", "districts", "districts_1", "regions_1")
                .with_field_pair("region", "code"),
        );

        let by_id = store.resolve_relation("rel_1", "regions_1");
        assert_eq!(by_id.map(|r| r.name().to_string()), Some("districts".into()));
        let by_name = store.resolve_relation("districts", "regions_1");
        assert_eq!(by_name.map(|r| r.id().to_string()), Some("rel_1".into()));

        assert!(store.resolve_relation("rel_1", "districts_1").is_none());
        assert!(store.resolve_relation("rivers", "regions_1").is_none());

        assert!(store.remove_relation("rel_1").is_some());
        assert!(store.relation("rel_1").is_none());
    }
}
