//! Node type catalog entries
//!
//! A `NodeType` is the declaration of a reusable computation unit: its
//! ports, its variant and how its step inputs combine. Node types are
//! immutable once handed to the compiler and are referenced by id from
//! instances.
//!
//! # Example
//!
//! ```ignore
//! use flow_model::{DataType, NodeType};
//!
//! let add = NodeType::function("Add")
//!     .with_input("a", DataType::Number)
//!     .with_input("b", DataType::Number)
//!     .with_output("sum", DataType::Number);
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{ports, DataType, Direction, Port};

/// Variant of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeVariant {
    /// Declared but implemented elsewhere
    Stub,
    /// Scheduled unit with step ports
    Function,
    /// Pure data transform, inlined before its consumers
    Expression,
}

/// How multiple step predecessors combine into readiness
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteWhen {
    /// Every predecessor must have run
    #[default]
    Conjunction,
    /// Any single predecessor suffices
    Disjunction,
    /// Readiness decided by a predicate registered under this name
    Custom(String),
}

/// Definition of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Stub, function or expression
    pub variant: NodeVariant,
    /// Input and output ports
    pub ports: Vec<Port>,
    /// Step input combination rule
    #[serde(default)]
    pub execute_when: ExecuteWhen,
    /// Description of what the node does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeType {
    /// Create a node type with no ports
    pub fn new(id: impl Into<String>, variant: NodeVariant) -> Self {
        Self {
            id: id.into(),
            variant,
            ports: Vec::new(),
            execute_when: ExecuteWhen::default(),
            description: None,
        }
    }

    /// Create a function node type with the standard step ports
    pub fn function(id: impl Into<String>) -> Self {
        Self::new(id, NodeVariant::Function).with_standard_step_ports()
    }

    /// Create a stub node type with the standard step ports
    pub fn stub(id: impl Into<String>) -> Self {
        Self::new(id, NodeVariant::Stub).with_standard_step_ports()
    }

    /// Create an expression node type (data ports only)
    pub fn expression(id: impl Into<String>) -> Self {
        Self::new(id, NodeVariant::Expression)
    }

    fn with_standard_step_ports(self) -> Self {
        self.with_port(Port::step_input(ports::EXECUTE))
            .with_port(Port::step_output(ports::ON_SUCCESS))
            .with_port(Port::step_output(ports::ON_FAILURE))
    }

    /// Append a port, assigning the next order in its direction
    pub fn with_port(mut self, port: Port) -> Self {
        let order = self
            .ports
            .iter()
            .filter(|p| p.direction == port.direction)
            .count() as u32;
        self.ports.push(port.with_order(order));
        self
    }

    /// Append a required data input
    pub fn with_input(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.with_port(Port::data_input(name, data_type))
    }

    /// Append an optional data input
    pub fn with_optional_input(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.with_port(Port::data_input(name, data_type).optional())
    }

    /// Append a data output
    pub fn with_output(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.with_port(Port::data_output(name, data_type))
    }

    /// Set the step combination rule
    pub fn with_execute_when(mut self, execute_when: ExecuteWhen) -> Self {
        self.execute_when = execute_when;
        self
    }

    /// Add a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_expression(&self) -> bool {
        self.variant == NodeVariant::Expression
    }

    /// Find a port by name and direction
    pub fn find_port(&self, name: &str, direction: Direction) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.name == name && p.direction == direction)
    }

    pub fn find_input(&self, name: &str) -> Option<&Port> {
        self.find_port(name, Direction::Input)
    }

    pub fn find_output(&self, name: &str) -> Option<&Port> {
        self.find_port(name, Direction::Output)
    }

    /// Ports of one direction sorted by their declared order
    pub fn ports_in(&self, direction: Direction) -> Vec<&Port> {
        let mut ports: Vec<&Port> = self
            .ports
            .iter()
            .filter(|p| p.direction == direction)
            .collect();
        ports.sort_by_key(|p| p.order);
        ports
    }

    /// Unscoped data inputs in order; these become a step's input bindings
    pub fn data_inputs(&self) -> Vec<&Port> {
        self.ports_in(Direction::Input)
            .into_iter()
            .filter(|p| p.is_data() && p.scope.is_none())
            .collect()
    }

    /// Whether the type has a step port of the given direction
    pub fn has_step_port(&self, direction: Direction) -> bool {
        self.ports
            .iter()
            .any(|p| p.is_step() && p.direction == direction)
    }

    /// Names of the scopes this type declares, in first-declared order
    pub fn scopes(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.ports
            .iter()
            .filter_map(|p| p.scope.as_deref())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    pub fn declares_scope(&self, scope: &str) -> bool {
        self.ports.iter().any(|p| p.scope.as_deref() == Some(scope))
    }

    /// Ports bridging into a scope, in order
    pub fn scoped_ports(&self, scope: &str, direction: Direction) -> Vec<&Port> {
        self.ports_in(direction)
            .into_iter()
            .filter(|p| p.scope.as_deref() == Some(scope))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_has_standard_step_ports() {
        let node = NodeType::function("Fetch");
        assert!(node.find_input(ports::EXECUTE).is_some_and(|p| p.is_step()));
        assert!(node.find_output(ports::ON_SUCCESS).is_some_and(|p| p.is_step()));
        assert!(node.find_output(ports::ON_FAILURE).is_some_and(|p| p.is_step()));
        assert!(node.has_step_port(Direction::Input));
    }

    #[test]
    fn test_expression_has_no_step_ports() {
        let node = NodeType::expression("Concat")
            .with_input("left", DataType::String)
            .with_input("right", DataType::String)
            .with_output("joined", DataType::String);
        assert!(node.is_expression());
        assert!(!node.has_step_port(Direction::Input));
        assert!(!node.has_step_port(Direction::Output));
    }

    #[test]
    fn test_port_order_is_per_direction() {
        let node = NodeType::function("Add")
            .with_input("a", DataType::Number)
            .with_optional_input("b", DataType::Number)
            .with_output("sum", DataType::Number);

        let names: Vec<&str> = node.data_inputs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(node.find_input("a").map(|p| p.order), Some(1));
        assert_eq!(node.find_output("sum").map(|p| p.order), Some(2));
    }

    #[test]
    fn test_scopes() {
        let node = NodeType::function("ForEach")
            .with_input("items", DataType::Array)
            .with_port(Port::step_output("start").in_scope("iteration"))
            .with_port(Port::data_output("item", DataType::Any).in_scope("iteration"))
            .with_port(Port::data_input("processed", DataType::Any).in_scope("iteration"))
            .with_output("results", DataType::Array);

        assert_eq!(node.scopes(), vec!["iteration"]);
        assert!(node.declares_scope("iteration"));
        assert!(!node.declares_scope("body"));
        assert_eq!(node.scoped_ports("iteration", Direction::Output).len(), 2);
        assert_eq!(node.data_inputs().len(), 1);
    }
}
