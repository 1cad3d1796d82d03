//! Connection integrity: endpoints resolve, kinds match, no data fan-in

use std::collections::BTreeMap;

use flow_model::{Connection, Direction, PortRef, EXIT, START};

use super::suggest::closest;
use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Checks every connection endpoint and the single-producer rule
pub struct ConnectionIntegrityRule;

impl ValidationRule for ConnectionIntegrityRule {
    fn id(&self) -> &'static str {
        "connection-integrity"
    }

    fn description(&self) -> &'static str {
        "Connections reference existing nodes and ports of matching kind"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for (idx, connection) in ctx.workflow.connections.iter().enumerate() {
            check_endpoints(ctx, idx, connection, &mut diagnostics);
        }
        check_fan_in(ctx, &mut diagnostics);
        diagnostics
    }
}

fn check_endpoints(
    ctx: &ValidationContext<'_>,
    idx: usize,
    connection: &Connection,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let location = Location::connection(idx, connection);
    let source_known = check_node(ctx, &connection.from, true, &location, diagnostics);
    let target_known = check_node(ctx, &connection.to, false, &location, diagnostics);

    let source = if source_known {
        check_port(ctx, &connection.from, Direction::Output, &location, diagnostics)
    } else {
        None
    };
    let target = if target_known {
        check_port(ctx, &connection.to, Direction::Input, &location, diagnostics)
    } else {
        None
    };

    if let (Some(source_step), Some(target_step)) = (source, target) {
        if source_step != target_step {
            let kind = |step: bool| if step { "step" } else { "data" };
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::StepPortTypeMismatch,
                format!(
                    "Connection {} joins a {} port to a {} port",
                    connection,
                    kind(source_step),
                    kind(target_step)
                ),
                location,
            ));
        }
    }
}

fn check_node(
    ctx: &ValidationContext<'_>,
    port_ref: &PortRef,
    is_source: bool,
    location: &Location,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    if ctx.index.has_node(&port_ref.node) {
        return true;
    }
    let (code, side) = if is_source {
        (DiagnosticCode::UnknownSourceNode, "source")
    } else {
        (DiagnosticCode::UnknownTargetNode, "target")
    };
    let candidates = ctx
        .workflow
        .instances
        .iter()
        .map(|i| i.id.as_str())
        .chain([START, EXIT]);
    diagnostics.push(
        Diagnostic::error(
            code,
            format!("Connection {} node '{}' does not exist", side, port_ref.node),
            location.clone(),
        )
        .with_suggestion(closest(&port_ref.node, candidates)),
    );
    false
}

/// Resolve one endpoint's port, returning whether it is a step port
fn check_port(
    ctx: &ValidationContext<'_>,
    port_ref: &PortRef,
    direction: Direction,
    location: &Location,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<bool> {
    // Instances of unknown types are reported by the structural rule
    let ports = ctx.index.node_ports(&port_ref.node)?;

    if let Some(port) = ctx.index.resolve(port_ref, direction) {
        return Some(port.is_step());
    }

    let code = match direction {
        Direction::Output => DiagnosticCode::UnknownSourcePort,
        Direction::Input => DiagnosticCode::UnknownTargetPort,
    };
    let candidates = ports
        .iter()
        .filter(|p| p.direction == direction)
        .map(|p| p.name.as_str());
    diagnostics.push(
        Diagnostic::error(
            code,
            format!(
                "Node '{}' has no {} port '{}'",
                port_ref.node, direction, port_ref.port
            ),
            location.clone(),
        )
        .with_suggestion(closest(&port_ref.port, candidates)),
    );
    None
}

fn check_fan_in(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    let mut producers: BTreeMap<&PortRef, usize> = BTreeMap::new();
    for (idx, connection) in ctx.workflow.connections.iter().enumerate() {
        // Exit inputs are covered by the data-flow warnings
        if connection.to.node == EXIT {
            continue;
        }
        let is_data_input = ctx.index.target_port(connection).is_some_and(|p| p.is_data());
        if !is_data_input {
            continue;
        }
        let count = producers.entry(&connection.to).or_default();
        *count += 1;
        if *count == 2 {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::MultipleConnectionsToInput,
                format!(
                    "Data input {} has more than one incoming connection",
                    connection.to
                ),
                Location::connection(idx, connection),
            ));
        }
    }
}
