//! Required data inputs receive a value

use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Every non-optional data input needs a connection, binding or fallback
pub struct RequiredInputsRule;

impl ValidationRule for RequiredInputsRule {
    fn id(&self) -> &'static str {
        "required-inputs"
    }

    fn description(&self) -> &'static str {
        "Required data inputs are connected, bound or have a default"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for instance in &ctx.workflow.instances {
            let Some(node_type) = ctx.index.node_type_of(&instance.id) else {
                continue;
            };
            for port in node_type.ports.iter().filter(|p| p.is_input() && p.is_data()) {
                if port.optional || port.has_fallback() {
                    continue;
                }
                if instance.bindings.contains_key(&port.name) {
                    continue;
                }
                if !ctx.index.connections_into(&instance.id, &port.name).is_empty() {
                    continue;
                }
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::MissingRequiredInput,
                    format!(
                        "Required input '{}' on '{}' is not connected and has no default",
                        port.name, instance.id
                    ),
                    Location::port(&instance.id, &port.name)
                        .in_scope(instance.parent_scope.clone()),
                ));
            }
        }

        diagnostics
    }
}
