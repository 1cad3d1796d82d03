//! Scope integrity: parent references, the scope table and boundary crossings

use flow_model::{Direction, ScopeRef};

use super::suggest::closest;
use super::{ValidationContext, ValidationRule};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Location};

/// Checks nested sub-graphs against their parents
pub struct ScopeIntegrityRule;

impl ValidationRule for ScopeIntegrityRule {
    fn id(&self) -> &'static str {
        "scope-integrity"
    }

    fn description(&self) -> &'static str {
        "Scopes name a declared scope, agree with the scope table and are only crossed through scoped ports"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        check_parent_refs(ctx, &mut diagnostics);
        check_scope_table(ctx, &mut diagnostics);
        check_crossings(ctx, &mut diagnostics);
        diagnostics
    }
}

/// Describe why a scope reference is invalid, with a suggestion
fn scope_problem(ctx: &ValidationContext<'_>, scope: &ScopeRef) -> Option<(String, Option<String>)> {
    if ctx.index.instance(&scope.instance).is_none() {
        let candidates = ctx.workflow.instances.iter().map(|i| i.id.as_str());
        return Some((
            format!("parent instance '{}' does not exist", scope.instance),
            closest(&scope.instance, candidates),
        ));
    }
    // Unknown parent types are reported by the structural rule
    let node_type = ctx.index.node_type_of(&scope.instance)?;
    if node_type.declares_scope(&scope.scope) {
        return None;
    }
    Some((
        format!(
            "node type '{}' declares no scope '{}'",
            node_type.id, scope.scope
        ),
        closest(&scope.scope, node_type.scopes()),
    ))
}

fn check_parent_refs(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    for instance in &ctx.workflow.instances {
        let Some(scope) = &instance.parent_scope else {
            continue;
        };
        if let Some((problem, suggestion)) = scope_problem(ctx, scope) {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownScope,
                    format!("Instance '{}' is placed in scope {}: {}", instance.id, scope, problem),
                    Location::node(&instance.id).in_scope(Some(scope.clone())),
                )
                .with_suggestion(suggestion),
            );
            continue;
        }
        if ctx.index.depth(&instance.parent_scope).is_none() {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::ScopeMembershipMismatch,
                format!("Scope nesting of instance '{}' loops back on itself", instance.id),
                Location::node(&instance.id).in_scope(Some(scope.clone())),
            ));
        }
    }
}

fn check_scope_table(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    for entry in &ctx.workflow.scopes {
        let scope = entry.scope_ref();
        if let Some((problem, suggestion)) = scope_problem(ctx, &scope) {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::UnknownScope,
                    format!("Scope table entry {}: {}", scope, problem),
                    Location::node(&entry.parent).in_scope(Some(scope.clone())),
                )
                .with_suggestion(suggestion),
            );
        }
        for child in &entry.children {
            let agrees = ctx
                .index
                .instance(child)
                .is_some_and(|i| i.parent_scope.as_ref() == Some(&scope));
            if !agrees {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::ScopeMembershipMismatch,
                    format!(
                        "Scope {} lists '{}' but that instance is not placed in it",
                        scope, child
                    ),
                    Location::node(child).in_scope(Some(scope.clone())),
                ));
            }
        }
    }

    for instance in &ctx.workflow.instances {
        let Some(scope) = &instance.parent_scope else {
            continue;
        };
        let listed = ctx
            .workflow
            .find_scope(&scope.instance, &scope.scope)
            .is_some_and(|s| s.contains(&instance.id));
        if !listed {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::ScopeMembershipMismatch,
                format!(
                    "Instance '{}' is placed in scope {} but the scope table does not list it",
                    instance.id, scope
                ),
                Location::node(&instance.id).in_scope(Some(scope.clone())),
            ));
        }
    }
}

fn check_crossings(ctx: &ValidationContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
    for (idx, connection) in ctx.workflow.connections.iter().enumerate() {
        let (Some(source), Some(target)) = (
            ctx.index.source_port(connection),
            ctx.index.target_port(connection),
        ) else {
            continue;
        };
        let (Some(from_region), Some(to_region)) = (
            ctx.index.endpoint_region(&connection.from, Direction::Output),
            ctx.index.endpoint_region(&connection.to, Direction::Input),
        ) else {
            continue;
        };

        let problem = if source.is_step() || target.is_step() {
            (from_region != to_region).then_some("step connections cannot cross a scope boundary")
        } else if target.scope.is_some() {
            (from_region != to_region)
                .then_some("a scoped input can only be wired from inside its scope")
        } else {
            (!ctx.index.is_within(&to_region, &from_region))
                .then_some("data can only leave a scope through the parent's scoped inputs")
        };

        if let Some(problem) = problem {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::InvalidScopeConnection,
                format!("Connection {}: {}", connection, problem),
                Location::connection(idx, connection).in_scope(to_region),
            ));
        }
    }
}
