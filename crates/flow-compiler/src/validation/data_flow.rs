//! Data-flow completeness warnings

use flow_model::{Direction, EXIT, START};

use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Flags dead or ambiguous wiring; never fatal
pub struct DataFlowRule;

impl ValidationRule for DataFlowRule {
    fn id(&self) -> &'static str {
        "data-flow"
    }

    fn description(&self) -> &'static str {
        "Instances, outputs and exit ports take part in the data flow"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if ctx.index.outgoing(START).is_empty() {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::NoStartConnections,
                "No connection originates at Start",
                Location::node(START),
            ));
        }
        if ctx.index.incoming(EXIT).is_empty() {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::NoExitConnections,
                "No connection terminates at Exit",
                Location::node(EXIT),
            ));
        }

        check_instances(ctx, &mut diagnostics);
        check_exit_ports(ctx, &mut diagnostics);
        diagnostics
    }
}

fn check_instances(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    for instance in &ctx.workflow.instances {
        let outgoing = ctx.index.outgoing(&instance.id);
        if outgoing.is_empty() && ctx.index.incoming(&instance.id).is_empty() {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnusedNode,
                format!("Instance '{}' has no connections", instance.id),
                Location::node(&instance.id).in_scope(instance.parent_scope.clone()),
            ));
            continue;
        }

        let Some(node_type) = ctx.index.node_type_of(&instance.id) else {
            continue;
        };
        for port in node_type.ports_in(Direction::Output) {
            if !port.is_data() {
                continue;
            }
            let consumed = outgoing.iter().any(|(_, c)| c.from.port == port.name);
            if !consumed {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::UnusedOutputPort,
                    format!("Output '{}' of '{}' is never used", port.name, instance.id),
                    Location::port(&instance.id, &port.name)
                        .in_scope(instance.parent_scope.clone()),
                ));
            }
        }
    }
}

fn check_exit_ports(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    for port in ctx.workflow.returns.iter().filter(|p| p.is_data()) {
        let producers = ctx.index.connections_into(EXIT, &port.name);
        match producers.len() {
            0 => diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnreachableExitPort,
                format!("Return value '{}' is never produced", port.name),
                Location::port(EXIT, &port.name),
            )),
            1 => {}
            count => diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MultipleExitConnections,
                format!(
                    "Return value '{}' has {} producers; which one wins is ambiguous",
                    port.name, count
                ),
                Location::port(EXIT, &port.name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::test_support::*;
    use flow_model::{DataType, Workflow};

    fn run(workflow: &Workflow) -> Vec<Diagnostic> {
        DataFlowRule.validate(&ValidationContext::new(workflow))
    }

    #[test]
    fn test_complete_flow_has_no_warnings() {
        let workflow = catalog("complete")
            .parameter("url", DataType::String)
            .returns("body", DataType::String)
            .returns("status", DataType::Number)
            .add_instance("fetch", "Fetch")
            .connect("Start", "execute", "fetch", "execute")
            .connect("Start", "url", "fetch", "url")
            .connect("fetch", "body", "Exit", "body")
            .connect("fetch", "status", "Exit", "status")
            .connect("fetch", "onSuccess", "Exit", "onSuccess")
            .build();
        assert!(run(&workflow).is_empty(), "{:?}", run(&workflow));
    }

    #[test]
    fn test_unused_nodes_and_outputs() {
        let workflow = catalog("unused")
            .add_instance("fetch", "Fetch")
            .add_instance("idle", "Log")
            .connect("Start", "execute", "fetch", "execute")
            .connect("fetch", "body", "Exit", "onSuccess")
            .build();
        let diagnostics = run(&workflow);

        assert!(has_code(&diagnostics, DiagnosticCode::UnusedNode));
        let unused_outputs: Vec<&str> = diagnostics
            .iter()
            .filter(|d| d.code == DiagnosticCode::UnusedOutputPort)
            .filter_map(|d| d.location.port.as_deref())
            .collect();
        assert_eq!(unused_outputs, vec!["status"]);
        assert!(diagnostics.iter().all(|d| !d.is_error()));
    }

    #[test]
    fn test_empty_workflow_warnings() {
        let workflow = catalog("empty").build();
        let diagnostics = run(&workflow);
        assert!(has_code(&diagnostics, DiagnosticCode::NoStartConnections));
        assert!(has_code(&diagnostics, DiagnosticCode::NoExitConnections));
    }

    #[test]
    fn test_exit_port_producers() {
        let workflow = catalog("exits")
            .returns("body", DataType::String)
            .returns("missing", DataType::String)
            .add_instance("a", "Fetch")
            .add_instance("b", "Fetch")
            .connect("Start", "execute", "a", "execute")
            .connect("a", "onFailure", "b", "execute")
            .connect("a", "body", "Exit", "body")
            .connect("b", "body", "Exit", "body")
            .build();
        let diagnostics = run(&workflow);

        assert_eq!(count_code(&diagnostics, DiagnosticCode::MultipleExitConnections), 1);
        assert_eq!(count_code(&diagnostics, DiagnosticCode::UnreachableExitPort), 1);
    }
}
