//! Diagnostics produced by workflow validation
//!
//! A diagnostic pairs a stable code with a severity, a message and the
//! place in the graph it refers to. Diagnostics are plain data: rules
//! return them and the caller decides whether to stop.

use std::fmt;

use serde::{Deserialize, Serialize};

use flow_model::{Connection, NodeId, ScopeRef};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks lowering
    Error,
    /// Reported but never blocks lowering
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Stable diagnostic codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    // Structural
    UnknownNodeType,
    DuplicateNodeName,
    DuplicateInstanceId,
    DuplicatePortName,
    ReservedInstanceId,
    ReservedNodeName,
    InvalidStepPorts,
    ExitPortNotStep,
    StartPortConflict,
    // Connection integrity
    UnknownSourceNode,
    UnknownTargetNode,
    UnknownSourcePort,
    UnknownTargetPort,
    StepPortTypeMismatch,
    MultipleConnectionsToInput,
    // Type compatibility
    TypeIncompatible,
    TypeMismatch,
    LossyTypeCoercion,
    UnusualTypeCoercion,
    // Required inputs
    MissingRequiredInput,
    // Graph shape
    CycleDetected,
    DataCycleDetected,
    // Scope integrity
    UnknownScope,
    ScopeMembershipMismatch,
    InvalidScopeConnection,
    // Data-flow completeness
    UnusedNode,
    NoStartConnections,
    NoExitConnections,
    UnusedOutputPort,
    UnreachableExitPort,
    MultipleExitConnections,
}

impl DiagnosticCode {
    /// Code name as shown to users
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownNodeType => "UnknownNodeType",
            Self::DuplicateNodeName => "DuplicateNodeName",
            Self::DuplicateInstanceId => "DuplicateInstanceId",
            Self::DuplicatePortName => "DuplicatePortName",
            Self::ReservedInstanceId => "ReservedInstanceId",
            Self::ReservedNodeName => "ReservedNodeName",
            Self::InvalidStepPorts => "InvalidStepPorts",
            Self::ExitPortNotStep => "ExitPortNotStep",
            Self::StartPortConflict => "StartPortConflict",
            Self::UnknownSourceNode => "UnknownSourceNode",
            Self::UnknownTargetNode => "UnknownTargetNode",
            Self::UnknownSourcePort => "UnknownSourcePort",
            Self::UnknownTargetPort => "UnknownTargetPort",
            Self::StepPortTypeMismatch => "StepPortTypeMismatch",
            Self::MultipleConnectionsToInput => "MultipleConnectionsToInput",
            Self::TypeIncompatible => "TypeIncompatible",
            Self::TypeMismatch => "TypeMismatch",
            Self::LossyTypeCoercion => "LossyTypeCoercion",
            Self::UnusualTypeCoercion => "UnusualTypeCoercion",
            Self::MissingRequiredInput => "MissingRequiredInput",
            Self::CycleDetected => "CycleDetected",
            Self::DataCycleDetected => "DataCycleDetected",
            Self::UnknownScope => "UnknownScope",
            Self::ScopeMembershipMismatch => "ScopeMembershipMismatch",
            Self::InvalidScopeConnection => "InvalidScopeConnection",
            Self::UnusedNode => "UnusedNode",
            Self::NoStartConnections => "NoStartConnections",
            Self::NoExitConnections => "NoExitConnections",
            Self::UnusedOutputPort => "UnusedOutputPort",
            Self::UnreachableExitPort => "UnreachableExitPort",
            Self::MultipleExitConnections => "MultipleExitConnections",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the workflow a diagnostic points
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Instance, node type or boundary node id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Port name on that node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Position of the offending connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<usize>,
    /// Scope the issue sits in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeRef>,
}

impl Location {
    /// The workflow as a whole
    pub fn workflow() -> Self {
        Self::default()
    }

    pub fn node(id: impl Into<String>) -> Self {
        Self {
            node: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn port(id: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: Some(id.into()),
            port: Some(port.into()),
            ..Self::default()
        }
    }

    /// A connection, located at its target port
    pub fn connection(idx: usize, connection: &Connection) -> Self {
        Self {
            node: Some(connection.to.node.clone()),
            port: Some(connection.to.port.clone()),
            connection: Some(idx),
            scope: None,
        }
    }

    pub fn in_scope(mut self, scope: Option<ScopeRef>) -> Self {
        self.scope = scope;
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.node, &self.port) {
            (Some(node), Some(port)) => write!(f, "{}.{}", node, port)?,
            (Some(node), None) => write!(f, "{}", node)?,
            _ => write!(f, "workflow")?,
        }
        if let Some(idx) = self.connection {
            write!(f, " (connection #{})", idx)?;
        }
        if let Some(scope) = &self.scope {
            write!(f, " in scope {}", scope)?;
        }
        Ok(())
    }
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    /// Closest known name when something was misspelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create a fatal diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            location,
            suggestion: None,
        }
    }

    /// Create a warning
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            message: message.into(),
            location,
            suggestion: None,
        }
    }

    /// Attach a "did you mean" suggestion
    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] at {}: {}",
            self.severity, self.code, self.location, self.message
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", suggestion)?;
        }
        Ok(())
    }
}

/// Ordered diagnostics from one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    /// Whether any fatal diagnostic was reported
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    /// Diagnostics with a given code
    pub fn for_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.code == code).collect()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::error(
            DiagnosticCode::UnknownNodeType,
            "Instance 'a' uses unknown node type 'Fetc'",
            Location::node("a"),
        )
        .with_suggestion(Some("Fetch".to_string()));

        assert_eq!(
            diagnostic.to_string(),
            "error[UnknownNodeType] at a: Instance 'a' uses unknown node type 'Fetc' (did you mean 'Fetch'?)"
        );
    }

    #[test]
    fn test_location_display() {
        let location = Location::port("b", "in").in_scope(Some(ScopeRef::new("loop", "body")));
        assert_eq!(location.to_string(), "b.in in scope loop.body");
        assert_eq!(Location::workflow().to_string(), "workflow");
    }

    #[test]
    fn test_report_partitions() {
        let report = DiagnosticReport::new(vec![
            Diagnostic::warning(DiagnosticCode::UnusedNode, "unused", Location::node("a")),
            Diagnostic::error(DiagnosticCode::CycleDetected, "cycle", Location::node("b")),
        ]);

        assert!(report.has_errors());
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.for_code(DiagnosticCode::UnusedNode).len(), 1);
        assert_eq!(report.to_string().lines().count(), 2);
    }

    #[test]
    fn test_code_serializes_snake_case() {
        let json = serde_json::to_string(&DiagnosticCode::MultipleConnectionsToInput).unwrap();
        assert_eq!(json, "\"multiple_connections_to_input\"");
    }
}
