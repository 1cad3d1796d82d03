//! Workflow validation
//!
//! Validation runs a fixed set of independent rule groups over an
//! immutable workflow and collects every diagnostic they produce. A
//! workflow may be lowered only when no diagnostic is an error.
//!
//! # Usage
//!
//! ```ignore
//! use flow_compiler::validation::Validator;
//!
//! let report = Validator::new().validate(&workflow);
//! if report.has_errors() {
//!     // Report and stop
//! }
//! ```
//!
//! # Architecture
//!
//! 1. **ValidationRule trait** - each rule group implements it
//! 2. **Validator** - runs the selected rules in a fixed order
//! 3. **Diagnostic** - the output of every rule
//!
//! Rules never consult each other's results, so running any subset
//! yields exactly the diagnostics those rules produce in a full run.

mod connections;
mod data_flow;
mod graph_shape;
mod required_inputs;
mod scopes;
mod structural;
mod suggest;
mod type_compat;

use flow_model::{GraphIndex, Workflow};

use crate::config::CompilerConfig;
use crate::diagnostics::{Diagnostic, DiagnosticReport};

pub use connections::ConnectionIntegrityRule;
pub use data_flow::DataFlowRule;
pub use graph_shape::GraphShapeRule;
pub use required_inputs::RequiredInputsRule;
pub use scopes::ScopeIntegrityRule;
pub use structural::StructuralRule;
pub use type_compat::TypeCompatibilityRule;

/// Read-only view handed to every rule
pub struct ValidationContext<'a> {
    pub workflow: &'a Workflow,
    pub index: GraphIndex<'a>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(workflow: &'a Workflow) -> Self {
        Self {
            workflow,
            index: GraphIndex::new(workflow),
        }
    }
}

/// Trait that all validation rule groups implement.
///
/// Rules must be pure: the same workflow always yields the same
/// diagnostics, in the same order.
pub trait ValidationRule {
    /// Stable identifier, used to disable the rule from configuration
    fn id(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Check the workflow and return all findings
    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Diagnostic>;
}

/// Every rule group, in reporting order
pub fn default_rules() -> Vec<Box<dyn ValidationRule>> {
    vec![
        Box::new(StructuralRule),
        Box::new(ConnectionIntegrityRule),
        Box::new(ScopeIntegrityRule),
        Box::new(TypeCompatibilityRule),
        Box::new(RequiredInputsRule),
        Box::new(GraphShapeRule),
        Box::new(DataFlowRule),
    ]
}

/// Runs a set of validation rules
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Create a validator with every rule group
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Create a validator with a chosen set of rules
    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Create a validator honoring the configured disabled rules
    pub fn from_config(config: &CompilerConfig) -> Self {
        let rules = default_rules()
            .into_iter()
            .filter(|rule| {
                let enabled = config.rule_enabled(rule.id());
                if !enabled {
                    log::debug!("Validation rule '{}' disabled by configuration", rule.id());
                }
                enabled
            })
            .collect();
        Self { rules }
    }

    /// Ids of the rules this validator runs
    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Validate a workflow, returning every diagnostic found
    pub fn validate(&self, workflow: &Workflow) -> DiagnosticReport {
        let ctx = ValidationContext::new(workflow);
        let diagnostics: Vec<Diagnostic> = self
            .rules
            .iter()
            .flat_map(|rule| {
                let found = rule.validate(&ctx);
                log::debug!(
                    "Rule '{}' reported {} diagnostic(s) for '{}'",
                    rule.id(),
                    found.len(),
                    workflow.name
                );
                found
            })
            .collect();
        DiagnosticReport::new(diagnostics)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rule_ids())
            .finish()
    }
}

/// Validate a workflow with every rule group
pub fn validate_workflow(workflow: &Workflow) -> DiagnosticReport {
    Validator::new().validate(workflow)
}
