//! Structural rules: node types, instance ids and boundary ports

use std::collections::BTreeSet;

use flow_model::{is_boundary, ports, Direction, NodeType, NodeVariant};

use super::suggest::closest;
use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Checks that the catalog and instance table are well formed
pub struct StructuralRule;

impl ValidationRule for StructuralRule {
    fn id(&self) -> &'static str {
        "structural"
    }

    fn description(&self) -> &'static str {
        "Node types are unique and well formed, instance ids are unique and resolve to a type"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        check_node_types(ctx, &mut diagnostics);
        check_boundary_ports(ctx, &mut diagnostics);
        check_instances(ctx, &mut diagnostics);
        diagnostics
    }
}

fn check_node_types(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen = BTreeSet::new();
    for node_type in &ctx.workflow.node_types {
        if is_boundary(&node_type.id) {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::ReservedNodeName,
                format!("Node type name '{}' is reserved", node_type.id),
                Location::node(&node_type.id),
            ));
        }
        if !seen.insert(node_type.id.as_str()) {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::DuplicateNodeName,
                format!("Node type '{}' is declared more than once", node_type.id),
                Location::node(&node_type.id),
            ));
        }

        let mut names = BTreeSet::new();
        for port in &node_type.ports {
            if !names.insert((port.direction, port.name.as_str(), port.scope.as_deref())) {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::DuplicatePortName,
                    format!(
                        "Node type '{}' declares {} port '{}' more than once",
                        node_type.id, port.direction, port.name
                    ),
                    Location::port(&node_type.id, &port.name),
                ));
            }
        }

        if let Some(problem) = step_port_problem(node_type) {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::InvalidStepPorts,
                format!("Node type '{}' {}", node_type.id, problem),
                Location::node(&node_type.id),
            ));
        }
    }
}

fn step_port_problem(node_type: &NodeType) -> Option<&'static str> {
    let has_input = node_type.has_step_port(Direction::Input);
    let has_output = node_type.has_step_port(Direction::Output);
    match node_type.variant {
        NodeVariant::Expression if has_input || has_output => {
            Some("is an expression but declares step ports")
        }
        NodeVariant::Function | NodeVariant::Stub if !has_input => {
            Some("needs at least one step input")
        }
        NodeVariant::Function | NodeVariant::Stub if !has_output => {
            Some("needs at least one step output")
        }
        _ => None,
    }
}

fn check_boundary_ports(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    for port in &ctx.workflow.returns {
        let reserved = port.name == ports::ON_SUCCESS || port.name == ports::ON_FAILURE;
        if reserved && !port.is_step() {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::ExitPortNotStep,
                format!("Exit port '{}' must be a step port", port.name),
                Location::port(flow_model::EXIT, &port.name),
            ));
        }
    }
    for port in &ctx.workflow.parameters {
        if port.name == ports::EXECUTE {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::StartPortConflict,
                format!(
                    "Parameter '{}' conflicts with the Start step output",
                    port.name
                ),
                Location::port(flow_model::START, &port.name),
            ));
        }
    }
}

fn check_instances(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    let known_types: Vec<&str> = ctx
        .workflow
        .node_types
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    let mut seen = BTreeSet::new();

    for instance in &ctx.workflow.instances {
        if is_boundary(&instance.id) {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::ReservedInstanceId,
                format!("Instance id '{}' is reserved", instance.id),
                Location::node(&instance.id),
            ));
        } else if !seen.insert(instance.id.as_str()) {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::DuplicateInstanceId,
                format!("Instance id '{}' is used more than once", instance.id),
                Location::node(&instance.id),
            ));
        }

        if !ctx.index.registry().has_node_type(&instance.node_type) {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownNodeType,
                    format!(
                        "Instance '{}' uses unknown node type '{}'",
                        instance.id, instance.node_type
                    ),
                    Location::node(&instance.id),
                )
                .with_suggestion(closest(&instance.node_type, known_types.iter().copied())),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::test_support::*;
    use flow_model::{DataType, Port, WorkflowBuilder};

    fn run(workflow: &flow_model::Workflow) -> Vec<Diagnostic> {
        StructuralRule.validate(&ValidationContext::new(workflow))
    }

    #[test]
    fn test_clean_workflow() {
        let workflow = catalog("clean")
            .add_instance("fetch", "Fetch")
            .add_instance("parse", "Parse")
            .build();
        assert!(run(&workflow).is_empty());
    }

    #[test]
    fn test_unknown_node_type_suggests() {
        let workflow = catalog("typo").add_instance("a", "Fetc").build();
        let diagnostics = run(&workflow);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::UnknownNodeType);
        assert_eq!(diagnostics[0].suggestion.as_deref(), Some("Fetch"));
    }

    #[test]
    fn test_duplicates_and_reserved_ids() {
        let workflow = catalog("dupes")
            .node_type(NodeType::function("Fetch"))
            .node_type(NodeType::function("Exit"))
            .add_instance("a", "Fetch")
            .add_instance("a", "Parse")
            .add_instance("Start", "Log")
            .build();
        let diagnostics = run(&workflow);

        assert!(has_code(&diagnostics, DiagnosticCode::DuplicateNodeName));
        assert!(has_code(&diagnostics, DiagnosticCode::ReservedNodeName));
        assert!(has_code(&diagnostics, DiagnosticCode::DuplicateInstanceId));
        assert!(has_code(&diagnostics, DiagnosticCode::ReservedInstanceId));
        assert!(diagnostics.iter().all(|d| d.is_error()));
    }

    #[test]
    fn test_step_port_shape() {
        let workflow = WorkflowBuilder::new("shapes")
            .node_type(NodeType::expression("Bad").with_port(Port::step_input("execute")))
            .node_type(
                NodeType::new("NoSteps", NodeVariant::Function)
                    .with_input("x", DataType::Number),
            )
            .node_type(
                NodeType::new("Dup", NodeVariant::Stub)
                    .with_port(Port::step_input("execute"))
                    .with_port(Port::step_output("done"))
                    .with_input("x", DataType::Number)
                    .with_input("x", DataType::String),
            )
            .build();
        let diagnostics = run(&workflow);

        assert_eq!(count_code(&diagnostics, DiagnosticCode::InvalidStepPorts), 2);
        assert_eq!(count_code(&diagnostics, DiagnosticCode::DuplicatePortName), 1);
    }

    #[test]
    fn test_boundary_port_conflicts() {
        let workflow = WorkflowBuilder::new("boundary")
            .parameter("execute", DataType::String)
            .returns("onFailure", DataType::String)
            .build();
        let diagnostics = run(&workflow);

        assert!(has_code(&diagnostics, DiagnosticCode::StartPortConflict));
        assert!(has_code(&diagnostics, DiagnosticCode::ExitPortNotStep));
    }
}
