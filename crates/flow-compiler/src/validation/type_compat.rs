//! Type compatibility of data connections

use flow_model::{is_compatible, Coercion, TypeCompatibility};

use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Applies the port type rules to every data connection
pub struct TypeCompatibilityRule;

impl ValidationRule for TypeCompatibilityRule {
    fn id(&self) -> &'static str {
        "type-compatibility"
    }

    fn description(&self) -> &'static str {
        "Data connections join compatible types, honoring strict mode"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let strict = ctx.workflow.strict_types;
        let mut diagnostics = Vec::new();

        for (idx, connection) in ctx.workflow.connections.iter().enumerate() {
            let (Some(source), Some(target)) = (
                ctx.index.source_port(connection).and_then(|p| p.data_type()),
                ctx.index.target_port(connection).and_then(|p| p.data_type()),
            ) else {
                continue;
            };

            let location = Location::connection(idx, connection);
            let diagnostic = match is_compatible(source, target, strict) {
                TypeCompatibility::Ok => continue,
                TypeCompatibility::Warn(coercion) => Diagnostic::warning(
                    warning_code(coercion),
                    format!(
                        "Connection {} converts {} to {}: {}",
                        connection,
                        source,
                        target,
                        coercion.describe()
                    ),
                    location,
                ),
                TypeCompatibility::Error(coercion) => Diagnostic::error(
                    DiagnosticCode::TypeIncompatible,
                    format!(
                        "Connection {} joins {} to {} in strict mode: {}",
                        connection,
                        source,
                        target,
                        coercion.describe()
                    ),
                    location,
                ),
            };
            diagnostics.push(diagnostic);
        }

        diagnostics
    }
}

fn warning_code(coercion: Coercion) -> DiagnosticCode {
    match coercion {
        Coercion::Widening | Coercion::Unusual => DiagnosticCode::UnusualTypeCoercion,
        Coercion::Lossy => DiagnosticCode::LossyTypeCoercion,
        Coercion::ShapeMismatch | Coercion::Mismatch => DiagnosticCode::TypeMismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_model::{DataType, NodeType, Workflow, WorkflowBuilder};

    fn typed(strict: bool, from: DataType, to: DataType) -> Workflow {
        WorkflowBuilder::new("types")
            .strict_types(strict)
            .node_type(NodeType::function("Source").with_output("out", from))
            .node_type(NodeType::function("Sink").with_input("in", to))
            .add_instance("a", "Source")
            .add_instance("b", "Sink")
            .connect("a", "out", "b", "in")
            .connect("a", "onSuccess", "b", "execute")
            .build()
    }

    fn run(workflow: &Workflow) -> Vec<Diagnostic> {
        TypeCompatibilityRule.validate(&ValidationContext::new(workflow))
    }

    #[test]
    fn test_matching_types() {
        assert!(run(&typed(true, DataType::Number, DataType::Number)).is_empty());
        assert!(run(&typed(true, DataType::Number, DataType::Any)).is_empty());
    }

    #[test]
    fn test_coercions_are_warnings() {
        let lossy = run(&typed(false, DataType::String, DataType::Number));
        assert_eq!(lossy.len(), 1);
        assert_eq!(lossy[0].code, DiagnosticCode::LossyTypeCoercion);
        assert!(!lossy[0].is_error());

        let unusual = run(&typed(false, DataType::Number, DataType::String));
        assert_eq!(unusual[0].code, DiagnosticCode::UnusualTypeCoercion);

        let mismatch = run(&typed(false, DataType::Array, DataType::Boolean));
        assert_eq!(mismatch[0].code, DiagnosticCode::TypeMismatch);
    }

    #[test]
    fn test_strict_mode_promotes_to_error() {
        let diagnostics = run(&typed(true, DataType::Number, DataType::String));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::TypeIncompatible);
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn test_object_shapes_warn_in_strict_mode() {
        let diagnostics = run(&typed(
            true,
            DataType::shaped("User"),
            DataType::shaped("Order"),
        ));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::TypeMismatch);
        assert!(!diagnostics[0].is_error());
    }
}
