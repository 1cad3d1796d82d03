//! Flow Compiler - validation and lowering for workflow graphs
//!
//! This crate turns a [`flow_model::Workflow`] into a target-independent
//! execution plan that code generators walk to emit source:
//!
//! - Validation in independent rule groups, reporting every problem at
//!   once as diagnostics
//! - A scheduler that lowers the graph into sequences, parallel
//!   batches, branches with hoisted merge bindings, inlined expressions
//!   and repeated scope bodies
//! - A compile pipeline that only lowers workflows free of fatal
//!   diagnostics
//!
//! # Architecture
//!
//! - `Validator`: runs `ValidationRule`s over an immutable workflow
//! - `Scheduler`: round-based lowering with pluggable readiness predicates
//! - `ExecutionPlan`: the plan tree, serializable and printable
//! - `Compiler`: validation followed by scheduling
//!
//! # Example
//!
//! ```ignore
//! use flow_compiler::Compiler;
//!
//! let compiled = Compiler::new().compile(&workflow)?;
//! for warning in &compiled.warnings {
//!     log::warn!("{}", warning);
//! }
//! println!("{}", compiled.plan);
//! ```

pub mod compiler;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod plan;
pub mod scheduler;
pub mod validation;

// Re-export key types
pub use compiler::{compile, CompiledWorkflow, Compiler};
pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport, Location, Severity};
pub use error::{CompileError, Result, SchedulerError};
pub use plan::{
    dry_run, BranchNode, DryRun, DryRunContext, ExecutionPlan, Export, HoistedBinding, InputBinding, PlanNode,
    RepeatNode, ReturnBinding, ScopeBody, StepNode, ValueSource,
};
pub use scheduler::{schedule, ReadinessPredicate, ReadinessQuery, Scheduler};
pub use validation::{validate_workflow, ValidationContext, ValidationRule, Validator};

// Re-export the graph model so callers need a single dependency
pub use flow_model;
