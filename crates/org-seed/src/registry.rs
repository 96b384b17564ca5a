//! The identity registry: source-id to target-id mappings, per object.
//!
//! The registry is append-only. A `(object, source id)` pair maps to at most
//! one target id for the lifetime of a run, and entries are never removed or
//! overwritten. Because record ids carry a 3-character prefix identifying
//! their object type, a source id is globally unique and reverse lookup
//! across the whole registry is well-defined.

use std::collections::BTreeMap;

use tracing::warn;

/// In-memory source-id → target-id mapping collection.
#[derive(Debug, Default, Clone)]
pub struct IdentityRegistry {
    maps: BTreeMap<String, BTreeMap<String, String>>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping. The first write for a `(object, source id)` pair
    /// wins; a conflicting second write is ignored and logged.
    pub fn register(
        &mut self,
        object: &str,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> bool {
        let source_id = source_id.into();
        let map = self.maps.entry(object.to_string()).or_default();
        if map.contains_key(&source_id) {
            warn!("{}: ignoring duplicate registration for {}", object, source_id);
            return false;
        }
        map.insert(source_id, target_id.into());
        true
    }

    /// Target id for a source id under a specific object.
    pub fn resolve(&self, object: &str, source_id: &str) -> Option<&str> {
        self.maps
            .get(object)
            .and_then(|m| m.get(source_id))
            .map(String::as_str)
    }

    /// Target id for a source id under any object. Source ids are globally
    /// unique, so at most one map can hold the key.
    pub fn resolve_any(&self, source_id: &str) -> Option<&str> {
        self.maps
            .values()
            .find_map(|m| m.get(source_id))
            .map(String::as_str)
    }

    /// Whether an object has at least one mapping.
    pub fn has_entries(&self, object: &str) -> bool {
        self.maps.get(object).map(|m| !m.is_empty()).unwrap_or(false)
    }

    /// Source ids registered under one object, in insertion-stable (sorted)
    /// order.
    pub fn source_ids_for(&self, object: &str) -> Vec<String> {
        self.maps
            .get(object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every source id in the registry, across all objects.
    pub fn all_source_ids(&self) -> Vec<String> {
        self.maps.values().flat_map(|m| m.keys().cloned()).collect()
    }

    /// Total number of mappings.
    pub fn len(&self) -> usize {
        self.maps.values().map(BTreeMap::len).sum()
    }

    /// Whether the registry holds no mappings at all.
    pub fn is_empty(&self) -> bool {
        self.maps.values().all(BTreeMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = IdentityRegistry::new();
        assert!(registry.register("Account", "001A", "001X"));
        assert_eq!(registry.resolve("Account", "001A"), Some("001X"));
        assert_eq!(registry.resolve("Contact", "001A"), None);
    }

    #[test]
    fn test_first_write_wins() {
        let mut registry = IdentityRegistry::new();
        assert!(registry.register("Account", "001A", "001X"));
        assert!(!registry.register("Account", "001A", "001Y"));
        assert_eq!(registry.resolve("Account", "001A"), Some("001X"));
    }

    #[test]
    fn test_resolve_any_scans_all_objects() {
        let mut registry = IdentityRegistry::new();
        registry.register("Account", "001A", "001X");
        registry.register("Contact", "003A", "003X");
        assert_eq!(registry.resolve_any("003A"), Some("003X"));
        assert_eq!(registry.resolve_any("001A"), Some("001X"));
        assert_eq!(registry.resolve_any("005Z"), None);
    }

    #[test]
    fn test_source_id_resolves_to_at_most_one_target() {
        let mut registry = IdentityRegistry::new();
        registry.register("Account", "001A", "001X");
        registry.register("Contact", "003A", "003X");
        let hits: Vec<&str> = ["001A", "003A", "005Z"]
            .iter()
            .filter_map(|id| registry.resolve_any(id))
            .collect();
        assert_eq!(hits, vec!["001X", "003X"]);
    }

    #[test]
    fn test_all_source_ids_spans_objects() {
        let mut registry = IdentityRegistry::new();
        registry.register("Account", "001A", "001X");
        registry.register("Account", "001B", "001Y");
        registry.register("Contact", "003A", "003X");
        let mut ids = registry.all_source_ids();
        ids.sort();
        assert_eq!(ids, vec!["001A", "001B", "003A"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_has_entries() {
        let mut registry = IdentityRegistry::new();
        assert!(!registry.has_entries("Account"));
        registry.register("Account", "001A", "001X");
        assert!(registry.has_entries("Account"));
        assert!(!registry.is_empty());
    }
}
