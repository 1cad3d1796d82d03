//! Node type registry
//!
//! Maps node type ids to their declarations. The compiler builds one
//! registry per workflow from its declared node types; callers can also
//! assemble a shared catalog and merge per-workflow declarations into it.
//!
//! # Usage
//!
//! ```ignore
//! use flow_model::{NodeType, NodeTypeRegistry};
//!
//! let mut registry = NodeTypeRegistry::new();
//! registry.register(NodeType::function("Fetch"));
//! registry.merge(NodeTypeRegistry::from_types(&workflow.node_types));
//! ```

use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::node::NodeType;

/// Registry of node types keyed by id
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    entries: BTreeMap<String, NodeType>,
}

impl NodeTypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Build a registry from declarations, keeping the first of any duplicates
    pub fn from_types(types: &[NodeType]) -> Self {
        let mut registry = Self::new();
        for node_type in types {
            if registry.try_register(node_type.clone()).is_err() {
                log::debug!("Ignoring duplicate declaration of node type '{}'", node_type.id);
            }
        }
        registry
    }

    /// Register a node type, replacing and returning any previous entry
    pub fn register(&mut self, node_type: NodeType) -> Option<NodeType> {
        self.entries.insert(node_type.id.clone(), node_type)
    }

    /// Register a node type, failing if the id is taken
    pub fn try_register(&mut self, node_type: NodeType) -> Result<()> {
        if self.entries.contains_key(&node_type.id) {
            return Err(ModelError::DuplicateNodeType(node_type.id));
        }
        self.entries.insert(node_type.id.clone(), node_type);
        Ok(())
    }

    /// Get a node type by id
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.entries.get(id)
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// List all registered ids in sorted order
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same id.
    pub fn merge(&mut self, other: NodeTypeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeVariant;

    #[test]
    fn test_from_types_keeps_first_duplicate() {
        let types = vec![
            NodeType::function("Fetch"),
            NodeType::expression("Fetch"),
            NodeType::stub("Store"),
        ];
        let registry = NodeTypeRegistry::from_types(&types);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("Fetch").map(|t| t.variant), Some(NodeVariant::Function));
        assert_eq!(registry.node_types(), vec!["Fetch", "Store"]);
    }

    #[test]
    fn test_try_register_rejects_duplicates() {
        let mut registry = NodeTypeRegistry::new();
        registry.try_register(NodeType::function("Fetch")).unwrap();
        let err = registry.try_register(NodeType::function("Fetch")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateNodeType(id) if id == "Fetch"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = NodeTypeRegistry::new();
        base.register(NodeType::function("Fetch"));

        let mut plugin = NodeTypeRegistry::new();
        plugin.register(NodeType::stub("Fetch"));
        plugin.register(NodeType::expression("Format"));

        base.merge(plugin);
        assert!(base.has_node_type("Format"));
        assert_eq!(base.get("Fetch").map(|t| t.variant), Some(NodeVariant::Stub));
    }
}
