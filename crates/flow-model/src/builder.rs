//! Fluent builder for workflow graphs
//!
//! Provides a fluent API for constructing workflows programmatically,
//! mainly for tests and for front ends that assemble graphs in code.

use serde_json::Value;

use crate::node::NodeType;
use crate::types::{DataType, Port};
use crate::workflow::{
    Connection, NodeInstance, PortBinding, PortRef, Scope, ScopeRef, Workflow,
};

/// Fluent builder for constructing workflows
///
/// # Example
///
/// ```ignore
/// let workflow = WorkflowBuilder::new("double")
///     .parameter("value", DataType::Number)
///     .returns("result", DataType::Number)
///     .node_type(NodeType::function("Double")
///         .with_input("value", DataType::Number)
///         .with_output("doubled", DataType::Number))
///     .add_instance("double", "Double")
///     .connect("Start", "execute", "double", "execute")
///     .connect("Start", "value", "double", "value")
///     .connect("double", "onSuccess", "Exit", "onSuccess")
///     .connect("double", "doubled", "Exit", "result")
///     .build();
/// ```
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::new(name),
        }
    }

    /// Enable or disable strict type checking
    pub fn strict_types(mut self, strict: bool) -> Self {
        self.workflow.strict_types = strict;
        self
    }

    /// Declare a required workflow parameter
    pub fn parameter(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.parameter_port(Port::data_output(name, data_type))
    }

    /// Declare a workflow parameter from a full port definition
    pub fn parameter_port(mut self, port: Port) -> Self {
        let order = self.workflow.parameters.len() as u32;
        self.workflow.parameters.push(port.with_order(order));
        self
    }

    /// Declare a workflow return value
    pub fn returns(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.returns_port(Port::data_input(name, data_type))
    }

    /// Declare a workflow return value from a full port definition
    pub fn returns_port(mut self, port: Port) -> Self {
        let order = self.workflow.returns.len() as u32;
        self.workflow.returns.push(port.with_order(order));
        self
    }

    /// Register a node type
    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.workflow.node_types.push(node_type);
        self
    }

    /// Add a top-level instance
    pub fn add_instance(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.workflow.instances.push(NodeInstance::new(id, node_type));
        self
    }

    /// Add an instance inside a parent's scope, recording it in the scope table
    pub fn add_scoped_instance(
        mut self,
        id: impl Into<String>,
        node_type: impl Into<String>,
        parent: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let scope_ref = ScopeRef::new(parent, scope);

        let existing = self
            .workflow
            .scopes
            .iter()
            .position(|s| s.parent == scope_ref.instance && s.name == scope_ref.scope);
        match existing {
            Some(position) => self.workflow.scopes[position].children.push(id.clone()),
            None => {
                let mut entry = Scope::new(scope_ref.instance.clone(), scope_ref.scope.clone());
                entry.children.push(id.clone());
                self.workflow.scopes.push(entry);
            }
        }

        self.workflow
            .instances
            .push(NodeInstance::new(id, node_type).in_scope(scope_ref));
        self
    }

    /// Bind a literal to an input of the most recently added instance
    ///
    /// Must be called immediately after `add_instance`.
    pub fn with_literal(self, port: impl Into<String>, value: Value) -> Self {
        self.with_binding(port, PortBinding::Literal(value))
    }

    /// Bind an expression to an input of the most recently added instance
    pub fn with_expression(self, port: impl Into<String>, code: impl Into<String>) -> Self {
        self.with_binding(port, PortBinding::Expression(code.into()))
    }

    fn with_binding(mut self, port: impl Into<String>, binding: PortBinding) -> Self {
        if let Some(instance) = self.workflow.instances.last_mut() {
            instance.bindings.insert(port.into(), binding);
        }
        self
    }

    /// Connect two ports
    pub fn connect(
        self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.add_connection(Connection::new(
            PortRef::new(source, source_port),
            PortRef::new(target, target_port),
        ))
    }

    /// Connect a parent's scoped output to a port inside the scope
    pub fn connect_scoped(
        self,
        parent: impl Into<String>,
        parent_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        self.add_connection(Connection::new(
            PortRef::new(parent, parent_port).in_scope(scope),
            PortRef::new(target, target_port),
        ))
    }

    /// Connect a port inside a scope to a parent's scoped input
    pub fn connect_into_scope(
        self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        parent: impl Into<String>,
        parent_port: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        self.add_connection(Connection::new(
            PortRef::new(source, source_port),
            PortRef::new(parent, parent_port).in_scope(scope),
        ))
    }

    /// Add a prepared connection
    pub fn add_connection(mut self, connection: Connection) -> Self {
        self.workflow.connections.push(connection);
        self
    }

    /// Build the workflow without validation
    pub fn build(self) -> Workflow {
        self.workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use crate::workflow::{EXIT, START};

    #[test]
    fn test_workflow_builder_basic() {
        let workflow = WorkflowBuilder::new("greet")
            .strict_types(true)
            .parameter("name", DataType::String)
            .returns("greeting", DataType::String)
            .node_type(
                NodeType::function("Greet")
                    .with_input("name", DataType::String)
                    .with_optional_input("punctuation", DataType::String)
                    .with_output("greeting", DataType::String),
            )
            .add_instance("greet", "Greet")
            .with_literal("punctuation", serde_json::json!("!"))
            .connect(START, "execute", "greet", "execute")
            .connect(START, "name", "greet", "name")
            .connect("greet", "greeting", EXIT, "greeting")
            .build();

        assert!(workflow.strict_types);
        assert_eq!(workflow.instances.len(), 1);
        assert_eq!(workflow.connections.len(), 3);
        assert_eq!(
            workflow.instances[0].bindings.get("punctuation"),
            Some(&PortBinding::Literal(serde_json::json!("!")))
        );
        assert_eq!(workflow.parameters[0].direction, Direction::Output);
        assert_eq!(workflow.returns[0].direction, Direction::Input);
    }

    #[test]
    fn test_scoped_instances_fill_scope_table() {
        let workflow = WorkflowBuilder::new("loop")
            .add_instance("loop", "ForEach")
            .add_scoped_instance("a", "Step", "loop", "iteration")
            .add_scoped_instance("b", "Step", "loop", "iteration")
            .connect_scoped("loop", "item", "a", "value", "iteration")
            .connect_into_scope("b", "out", "loop", "processed", "iteration")
            .build();

        assert_eq!(workflow.scopes.len(), 1);
        assert_eq!(workflow.scopes[0].children, vec!["a", "b"]);
        assert_eq!(
            workflow.instances[2].parent_scope,
            Some(ScopeRef::new("loop", "iteration"))
        );
        assert_eq!(workflow.connections[0].from.scope.as_deref(), Some("iteration"));
        assert_eq!(workflow.connections[1].to.scope.as_deref(), Some("iteration"));
    }
}
