//! Read-only lookup tables over a workflow
//!
//! `GraphIndex` resolves instances, node types and ports once so that
//! validation rules and the scheduler can query the graph without
//! rescanning it. It never mutates the workflow.

use std::collections::BTreeMap;

use crate::node::NodeType;
use crate::registry::NodeTypeRegistry;
use crate::types::{Direction, Port};
use crate::workflow::{Connection, NodeInstance, PortRef, ScopeRef, Workflow, EXIT, START};

/// The sub-graph an instance or port endpoint lives in
///
/// `None` is the top level of the workflow; `Some` is the inside of a
/// parent instance's scope.
pub type Region = Option<ScopeRef>;

/// Indexed view of a workflow
pub struct GraphIndex<'a> {
    workflow: &'a Workflow,
    registry: NodeTypeRegistry,
    start_ports: Vec<Port>,
    exit_ports: Vec<Port>,
    positions: BTreeMap<&'a str, usize>,
    incoming: BTreeMap<&'a str, Vec<usize>>,
    outgoing: BTreeMap<&'a str, Vec<usize>>,
}

impl<'a> GraphIndex<'a> {
    /// Index a workflow
    pub fn new(workflow: &'a Workflow) -> Self {
        let mut positions = BTreeMap::new();
        for (position, instance) in workflow.instances.iter().enumerate() {
            positions.entry(instance.id.as_str()).or_insert(position);
        }

        let mut incoming: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut outgoing: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, connection) in workflow.connections.iter().enumerate() {
            outgoing
                .entry(connection.from.node.as_str())
                .or_default()
                .push(idx);
            incoming
                .entry(connection.to.node.as_str())
                .or_default()
                .push(idx);
        }

        Self {
            workflow,
            registry: NodeTypeRegistry::from_types(&workflow.node_types),
            start_ports: workflow.start_ports(),
            exit_ports: workflow.exit_ports(),
            positions,
            incoming,
            outgoing,
        }
    }

    pub fn workflow(&self) -> &'a Workflow {
        self.workflow
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    /// Find an instance by id
    pub fn instance(&self, id: &str) -> Option<&'a NodeInstance> {
        self.positions
            .get(id)
            .map(|&position| &self.workflow.instances[position])
    }

    /// Declaration position of an instance
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Whether an id names an instance or a boundary pseudo-node
    pub fn has_node(&self, id: &str) -> bool {
        id == START || id == EXIT || self.positions.contains_key(id)
    }

    /// Resolve the node type of an instance
    pub fn node_type_of(&self, id: &str) -> Option<&NodeType> {
        self.instance(id)
            .and_then(|instance| self.registry.get(&instance.node_type))
    }

    pub fn is_expression(&self, id: &str) -> bool {
        self.node_type_of(id).is_some_and(|t| t.is_expression())
    }

    /// All ports of a node, boundary pseudo-nodes included
    pub fn node_ports(&self, id: &str) -> Option<&[Port]> {
        match id {
            START => Some(&self.start_ports),
            EXIT => Some(&self.exit_ports),
            _ => self.node_type_of(id).map(|t| t.ports.as_slice()),
        }
    }

    /// Resolve a port reference in the given direction
    pub fn resolve(&self, port_ref: &PortRef, direction: Direction) -> Option<&Port> {
        self.node_ports(&port_ref.node)?.iter().find(|p| {
            p.name == port_ref.port
                && p.direction == direction
                && (port_ref.scope.is_none() || p.scope == port_ref.scope)
        })
    }

    pub fn source_port(&self, connection: &Connection) -> Option<&Port> {
        self.resolve(&connection.from, Direction::Output)
    }

    pub fn target_port(&self, connection: &Connection) -> Option<&Port> {
        self.resolve(&connection.to, Direction::Input)
    }

    /// Whether a connection carries control flow
    ///
    /// Decided by the source port; unresolved connections are neither
    /// step nor data.
    pub fn is_step(&self, connection: &Connection) -> bool {
        self.source_port(connection).is_some_and(|p| p.is_step())
    }

    pub fn is_data(&self, connection: &Connection) -> bool {
        self.source_port(connection).is_some_and(|p| p.is_data())
    }

    /// Connections into a node, with their positions
    pub fn incoming(&self, id: &str) -> Vec<(usize, &'a Connection)> {
        self.connections_at(&self.incoming, id)
    }

    /// Connections out of a node, with their positions
    pub fn outgoing(&self, id: &str) -> Vec<(usize, &'a Connection)> {
        self.connections_at(&self.outgoing, id)
    }

    fn connections_at(
        &self,
        table: &BTreeMap<&'a str, Vec<usize>>,
        id: &str,
    ) -> Vec<(usize, &'a Connection)> {
        table
            .get(id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| (idx, &self.workflow.connections[idx]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Connections into one input port
    pub fn connections_into(&self, node: &str, port: &str) -> Vec<(usize, &'a Connection)> {
        self.incoming(node)
            .into_iter()
            .filter(|(_, c)| c.to.port == port)
            .collect()
    }

    /// Region an instance is declared in
    pub fn region_of(&self, id: &str) -> Region {
        self.instance(id).and_then(|i| i.parent_scope.clone())
    }

    /// Region a connection endpoint belongs to
    ///
    /// A parent's scoped ports belong to the inside of that scope.
    pub fn endpoint_region(&self, port_ref: &PortRef, direction: Direction) -> Option<Region> {
        let port = self.resolve(port_ref, direction)?;
        if port_ref.node == START || port_ref.node == EXIT {
            return Some(None);
        }
        if let Some(scope) = &port.scope {
            return Some(Some(ScopeRef::new(port_ref.node.clone(), scope.clone())));
        }
        Some(self.region_of(&port_ref.node))
    }

    /// Instances declared directly in a region, in declaration order
    ///
    /// Later instances reusing an earlier id are skipped.
    pub fn members(&self, region: &Region) -> Vec<&'a NodeInstance> {
        self.workflow
            .instances
            .iter()
            .enumerate()
            .filter(|(position, i)| {
                &i.parent_scope == region && self.position(&i.id) == Some(*position)
            })
            .map(|(_, i)| i)
            .collect()
    }

    /// Whether `inner` is `outer` or nested somewhere inside it
    pub fn is_within(&self, inner: &Region, outer: &Region) -> bool {
        let mut current = inner.clone();
        for _ in 0..=self.workflow.instances.len() {
            if &current == outer {
                return true;
            }
            match current {
                Some(scope) => current = self.region_of(&scope.instance),
                None => return false,
            }
        }
        false
    }

    /// Depth of nesting of a region, `0` for the top level
    ///
    /// Returns `None` when scope nesting loops back on itself.
    pub fn depth(&self, region: &Region) -> Option<usize> {
        let mut current = region.clone();
        for depth in 0..=self.workflow.instances.len() {
            match current {
                Some(scope) => current = self.region_of(&scope.instance),
                None => return Some(depth),
            }
        }
        None
    }
}
