//! Graph shape: step cycles and data dependency cycles
//!
//! Step cycles are searched per region with a three-color depth-first
//! search; scoped ports never contribute edges, so each scope body is
//! checked on its own. Data cycles are searched on the combined
//! dependency graph, where a scoped instance also points at its parent
//! (the parent cannot finish before its body has run).

use std::collections::BTreeMap;

use flow_model::{is_boundary, Connection};

use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Rejects cyclic control and data flow
pub struct GraphShapeRule;

impl ValidationRule for GraphShapeRule {
    fn id(&self) -> &'static str {
        "graph-shape"
    }

    fn description(&self) -> &'static str {
        "Step flow is acyclic in every scope and no value depends on itself"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let nodes: Vec<&str> = ctx.workflow.instances.iter().map(|i| i.id.as_str()).collect();

        let step_graph = step_adjacency(ctx);
        for cycle in CycleSearch::run(&nodes, &step_graph) {
            let start = cycle.nodes[0];
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::CycleDetected,
                format!("Step cycle detected: {}", cycle.render()),
                Location::node(start).in_scope(ctx.index.region_of(start)),
            ));
        }

        let dependency_graph = dependency_adjacency(ctx);
        for cycle in CycleSearch::run(&nodes, &dependency_graph) {
            if !cycle.has_data {
                continue;
            }
            let start = cycle.nodes[0];
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::DataCycleDetected,
                format!("Data dependency cycle detected: {}", cycle.render()),
                Location::node(start).in_scope(ctx.index.region_of(start)),
            ));
        }

        diagnostics
    }
}

/// Outgoing edges per node; the flag marks edges carrying data
type Adjacency<'a> = BTreeMap<&'a str, Vec<(&'a str, bool)>>;

fn add_edge<'a>(adjacency: &mut Adjacency<'a>, from: &'a str, to: &'a str, data: bool) {
    let edges = adjacency.entry(from).or_default();
    match edges.iter_mut().find(|(target, _)| *target == to) {
        Some(edge) => edge.1 |= data,
        None => edges.push((to, data)),
    }
}

/// Whether a connection joins two instances through unscoped ports
fn plain_instance_edge(ctx: &ValidationContext<'_>, connection: &Connection) -> bool {
    if is_boundary(&connection.from.node) || is_boundary(&connection.to.node) {
        return false;
    }
    let unscoped = |port: Option<&flow_model::Port>| port.is_some_and(|p| p.scope.is_none());
    unscoped(ctx.index.source_port(connection)) && unscoped(ctx.index.target_port(connection))
}

fn step_adjacency<'a>(ctx: &ValidationContext<'a>) -> Adjacency<'a> {
    let workflow = ctx.workflow;
    let mut adjacency = Adjacency::new();
    for connection in &workflow.connections {
        if !ctx.index.is_step(connection) || !plain_instance_edge(ctx, connection) {
            continue;
        }
        if ctx.index.region_of(&connection.from.node) != ctx.index.region_of(&connection.to.node) {
            continue;
        }
        add_edge(&mut adjacency, &connection.from.node, &connection.to.node, false);
    }
    adjacency
}

fn dependency_adjacency<'a>(ctx: &ValidationContext<'a>) -> Adjacency<'a> {
    let workflow = ctx.workflow;
    let mut adjacency = Adjacency::new();
    for connection in &workflow.connections {
        if plain_instance_edge(ctx, connection) {
            let data = ctx.index.is_data(connection);
            add_edge(&mut adjacency, &connection.from.node, &connection.to.node, data);
        }
    }
    for instance in &workflow.instances {
        if let Some(scope) = &instance.parent_scope {
            add_edge(&mut adjacency, &instance.id, &scope.instance, false);
        }
    }
    adjacency
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    InProgress,
    Done,
}

/// A cycle closed by one back-edge
struct Cycle<'a> {
    /// Nodes along the cycle, first node repeated at the end
    nodes: Vec<&'a str>,
    has_data: bool,
}

impl Cycle<'_> {
    fn render(&self) -> String {
        self.nodes.join(" → ")
    }
}

struct CycleSearch<'a, 'g> {
    adjacency: &'g Adjacency<'a>,
    colors: BTreeMap<&'a str, Color>,
    path: Vec<(&'a str, bool)>,
    cycles: Vec<Cycle<'a>>,
}

impl<'a, 'g> CycleSearch<'a, 'g> {
    /// Report one cycle per back-edge, visiting roots in the given order
    fn run(roots: &[&'a str], adjacency: &'g Adjacency<'a>) -> Vec<Cycle<'a>> {
        let mut search = Self {
            adjacency,
            colors: BTreeMap::new(),
            path: Vec::new(),
            cycles: Vec::new(),
        };
        for root in roots {
            if !search.colors.contains_key(root) {
                search.visit(root, false);
            }
        }
        search.cycles
    }

    fn visit(&mut self, node: &'a str, via_data: bool) {
        self.colors.insert(node, Color::InProgress);
        self.path.push((node, via_data));

        let adjacency = self.adjacency;
        for &(next, data) in adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            match self.colors.get(next) {
                None => self.visit(next, data),
                Some(Color::InProgress) => {
                    if let Some(start) = self.path.iter().position(|(n, _)| *n == next) {
                        let segment = &self.path[start..];
                        let mut nodes: Vec<&str> = segment.iter().map(|(n, _)| *n).collect();
                        nodes.push(next);
                        let has_data = data || segment[1..].iter().any(|(_, d)| *d);
                        self.cycles.push(Cycle { nodes, has_data });
                    }
                }
                Some(Color::Done) => {}
            }
        }

        self.path.pop();
        self.colors.insert(node, Color::Done);
    }
}
