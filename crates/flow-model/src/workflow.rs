//! Workflow graphs: instances, connections and scopes
//!
//! A workflow wires node instances together between two implicit
//! pseudo-nodes. `Start` exposes one output per workflow parameter plus
//! the `execute` step output; `Exit` exposes one input per return value
//! plus the `onSuccess`/`onFailure` step inputs.
//!
//! Scoped instances form nested sub-graphs owned by a parent instance.
//! They reference their parent by id through [`ScopeRef`], and the
//! workflow's scope table lists the members of each scope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::node::NodeType;
use crate::types::{ports, Direction, NodeId, Port, PortName};

/// Id of the workflow entry pseudo-node
pub const START: &str = "Start";

/// Id of the workflow exit pseudo-node
pub const EXIT: &str = "Exit";

/// Whether an id names one of the boundary pseudo-nodes
pub fn is_boundary(id: &str) -> bool {
    id == START || id == EXIT
}

/// Reference to a named scope on a parent instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRef {
    /// Parent instance id
    pub instance: NodeId,
    /// Scope name declared by the parent's node type
    pub scope: String,
}

impl ScopeRef {
    pub fn new(instance: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instance, self.scope)
    }
}

/// Per-instance value for an input port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortBinding {
    /// Literal JSON value
    Literal(serde_json::Value),
    /// Source expression evaluated by the generated code
    Expression(String),
}

/// A node instance in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    /// Unique identifier within the workflow
    pub id: NodeId,
    /// Node type id
    pub node_type: String,
    /// Scope this instance lives in, if nested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_scope: Option<ScopeRef>,
    /// Values bound directly to input ports
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<PortName, PortBinding>,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            parent_scope: None,
            bindings: BTreeMap::new(),
        }
    }

    /// Place this instance inside a parent's scope
    pub fn in_scope(mut self, scope: ScopeRef) -> Self {
        self.parent_scope = Some(scope);
        self
    }

    /// Bind a value to an input port
    pub fn with_binding(mut self, port: impl Into<String>, binding: PortBinding) -> Self {
        self.bindings.insert(port.into(), binding);
        self
    }
}

/// One end of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRef {
    /// Node id (an instance, `Start` or `Exit`)
    pub node: NodeId,
    /// Port name on that node
    pub port: PortName,
    /// Scope of the port when it bridges into a parent's scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl PortRef {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            scope: None,
        }
    }

    /// Target a scoped port on a parent instance
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Parse `node.port`
    pub fn parse(text: &str) -> Result<Self> {
        match text.split_once('.') {
            Some((node, port)) if !node.is_empty() && !port.is_empty() => {
                Ok(Self::new(node, port))
            }
            _ => Err(ModelError::InvalidPortRef(text.to_string())),
        }
    }
}

impl FromStr for PortRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}.{}[{}]", self.node, self.port, scope),
            None => write!(f, "{}.{}", self.node, self.port),
        }
    }
}

/// A directed connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from: PortRef,
    pub to: PortRef,
}

impl Connection {
    pub fn new(from: PortRef, to: PortRef) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A named sub-graph attached to a parent instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Parent instance id
    pub parent: NodeId,
    /// Scope name declared by the parent's node type
    pub name: String,
    /// Ids of the instances nested in this scope
    pub children: Vec<NodeId>,
}

impl Scope {
    pub fn new(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn scope_ref(&self) -> ScopeRef {
        ScopeRef::new(self.parent.clone(), self.name.clone())
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.children.iter().any(|c| c == instance_id)
    }
}

/// A complete workflow graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Workflow name
    pub name: String,
    /// Promote type coercion warnings to errors
    #[serde(default)]
    pub strict_types: bool,
    /// Declared parameters, exposed as outputs of `Start`
    #[serde(default)]
    pub parameters: Vec<Port>,
    /// Declared return values, exposed as inputs of `Exit`
    #[serde(default)]
    pub returns: Vec<Port>,
    /// Node types available to this workflow
    #[serde(default)]
    pub node_types: Vec<NodeType>,
    /// Node instances in declaration order
    #[serde(default)]
    pub instances: Vec<NodeInstance>,
    /// Connections between ports
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Scope membership table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<Scope>,
}

impl Workflow {
    /// Create a new empty workflow
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a workflow from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the workflow to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Find an instance by id
    pub fn find_instance(&self, id: &str) -> Option<&NodeInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Find the first node type with the given id
    pub fn find_node_type(&self, id: &str) -> Option<&NodeType> {
        self.node_types.iter().find(|t| t.id == id)
    }

    /// Find a scope entry by parent and name
    pub fn find_scope(&self, parent: &str, name: &str) -> Option<&Scope> {
        self.scopes
            .iter()
            .find(|s| s.parent == parent && s.name == name)
    }

    /// Get connections coming into a node
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.to.node == node_id)
    }

    /// Get connections going out of a node
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.from.node == node_id)
    }

    /// Ports of the `Start` pseudo-node
    pub fn start_ports(&self) -> Vec<Port> {
        let mut start = vec![Port::step_output(ports::EXECUTE)];
        start.extend(
            self.parameters
                .iter()
                .map(|p| p.clone().with_direction(Direction::Output)),
        );
        start
    }

    /// Ports of the `Exit` pseudo-node
    pub fn exit_ports(&self) -> Vec<Port> {
        let mut exit = vec![
            Port::step_input(ports::ON_SUCCESS),
            Port::step_input(ports::ON_FAILURE),
        ];
        exit.extend(
            self.returns
                .iter()
                .map(|p| p.clone().with_direction(Direction::Input)),
        );
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_port_ref_parse() {
        let port = PortRef::parse("fetch.onSuccess").unwrap();
        assert_eq!(port.node, "fetch");
        assert_eq!(port.port, "onSuccess");
        assert!("fetch".parse::<PortRef>().is_err());
        assert!(".port".parse::<PortRef>().is_err());
    }

    #[test]
    fn test_boundary_ports() {
        let mut workflow = Workflow::new("wf");
        workflow.parameters.push(Port::data_input("amount", DataType::Number));
        workflow.returns.push(Port::data_output("total", DataType::Number));

        let start = workflow.start_ports();
        assert_eq!(start.len(), 2);
        assert!(start.iter().all(|p| p.is_output()));

        let exit = workflow.exit_ports();
        assert_eq!(exit.len(), 3);
        assert!(exit.iter().all(|p| p.is_input()));
        assert!(exit[0].is_step() && exit[1].is_step());
        assert!(is_boundary(START) && is_boundary(EXIT) && !is_boundary("a"));
    }

    #[test]
    fn test_incoming_outgoing() {
        let mut workflow = Workflow::new("wf");
        workflow.connections.push(Connection::new(
            PortRef::new(START, ports::EXECUTE),
            PortRef::new("a", ports::EXECUTE),
        ));
        workflow.connections.push(Connection::new(
            PortRef::new("a", ports::ON_SUCCESS),
            PortRef::new(EXIT, ports::ON_SUCCESS),
        ));

        assert_eq!(workflow.incoming("a").count(), 1);
        assert_eq!(workflow.outgoing("a").count(), 1);
        assert_eq!(workflow.outgoing(START).count(), 1);
        assert_eq!(
            workflow.connections[1].to_string(),
            "a.onSuccess -> Exit.onSuccess"
        );
    }

    #[test]
    fn test_workflow_json_roundtrip() {
        let mut workflow = Workflow::new("roundtrip");
        workflow.strict_types = true;
        workflow.instances.push(
            NodeInstance::new("child", "Double")
                .in_scope(ScopeRef::new("loop", "iteration"))
                .with_binding("factor", PortBinding::Literal(serde_json::json!(2))),
        );
        workflow.scopes.push(Scope {
            parent: "loop".to_string(),
            name: "iteration".to_string(),
            children: vec!["child".to_string()],
        });

        let json = workflow.to_json().unwrap();
        let restored = Workflow::from_json(&json).unwrap();
        assert_eq!(restored, workflow);
        assert!(restored.find_scope("loop", "iteration").is_some_and(|s| s.contains("child")));
    }
}
