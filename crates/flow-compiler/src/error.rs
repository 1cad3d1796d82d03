//! Error types for the workflow compiler

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Result type alias using CompileError
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that stop a compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// Validation reported at least one fatal diagnostic
    #[error("Workflow '{workflow}' failed validation with {} error(s)", .diagnostics.iter().filter(|d| d.is_error()).count())]
    Invalid {
        workflow: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// The scheduler hit a state validation should have ruled out
    #[error("Scheduler defect: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Invalid compiler configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Diagnostics attached to a validation failure
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Invalid { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

/// Internal invariant violations raised while lowering a workflow
///
/// These indicate that validation accepted a graph it should have
/// rejected; they are defects, not user errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No pending instance could become ready
    #[error("Scheduling stuck in {region} at '{instance}' (pending: {})", .pending.join(", "))]
    Stuck {
        region: String,
        instance: String,
        pending: Vec<String>,
    },

    /// A connection or scope referenced a missing instance
    #[error("Unknown instance '{0}'")]
    UnknownInstance(String),

    /// An instance referenced a missing node type
    #[error("Instance '{instance}' has unknown node type '{node_type}'")]
    UnknownNodeType { instance: String, node_type: String },

    /// A custom readiness rule has no registered predicate
    #[error("No readiness predicate registered as '{name}' (needed by '{instance}')")]
    UnknownPredicate { name: String, instance: String },

    /// Scopes nest deeper than the configured limit
    #[error("Scope '{scope}' exceeds the maximum nesting depth of {max_depth}")]
    ScopeDepthExceeded { scope: String, max_depth: u32 },
}
