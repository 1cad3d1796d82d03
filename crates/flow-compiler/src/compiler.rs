//! Compile pipeline: validate, then lower
//!
//! `Compiler` ties the validator and the scheduler together. Warnings
//! never stop a compilation; they travel with the plan so callers can
//! surface them.

use std::path::Path;

use flow_model::Workflow;

use crate::config::CompilerConfig;
use crate::diagnostics::{Diagnostic, DiagnosticReport};
use crate::error::{CompileError, Result};
use crate::plan::ExecutionPlan;
use crate::scheduler::Scheduler;
use crate::validation::Validator;

/// A lowered workflow together with the warnings validation raised
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledWorkflow {
    pub plan: ExecutionPlan,
    pub warnings: Vec<Diagnostic>,
}

/// Validates and lowers workflows
#[derive(Debug)]
pub struct Compiler {
    config: CompilerConfig,
    validator: Validator,
    scheduler: Scheduler,
}

impl Compiler {
    /// Compiler with the default configuration
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    /// Compiler honoring a configuration
    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            validator: Validator::from_config(&config),
            scheduler: Scheduler::from_config(&config),
            config,
        }
    }

    /// Compiler configured from a JSON file
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_config(CompilerConfig::from_file(path)?))
    }

    /// Replace the scheduler, e.g. to register readiness predicates
    ///
    /// The configured scope depth limit is applied to the new scheduler.
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler.with_max_scope_depth(self.config.max_scope_depth);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Run validation only
    pub fn validate(&self, workflow: &Workflow) -> DiagnosticReport {
        self.validator.validate(workflow)
    }

    /// Validate and lower a workflow
    ///
    /// Fails with [`CompileError::Invalid`] carrying every diagnostic
    /// when any of them is an error.
    pub fn compile(&self, workflow: &Workflow) -> Result<CompiledWorkflow> {
        log::info!(
            "Compiling workflow '{}' ({} instance(s), {} connection(s))",
            workflow.name,
            workflow.instances.len(),
            workflow.connections.len()
        );

        let report = self.validate(workflow);
        if report.has_errors() {
            let errors = report.errors().count();
            log::warn!(
                "Workflow '{}' rejected with {} error(s)",
                workflow.name,
                errors
            );
            for diagnostic in report.errors() {
                log::debug!("{}", diagnostic);
            }
            return Err(CompileError::Invalid {
                workflow: workflow.name.clone(),
                diagnostics: report.into_diagnostics(),
            });
        }

        let warnings = report.into_diagnostics();
        if !warnings.is_empty() {
            log::debug!(
                "Workflow '{}' passed validation with {} warning(s)",
                workflow.name,
                warnings.len()
            );
        }

        let plan = self.scheduler.schedule(workflow)?;
        log::debug!("Plan for '{}':\n{}", workflow.name, plan);
        Ok(CompiledWorkflow { plan, warnings })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a workflow with the default configuration
pub fn compile(workflow: &Workflow) -> Result<CompiledWorkflow> {
    Compiler::new().compile(workflow)
}
