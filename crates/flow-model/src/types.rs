//! Port and data types for workflow graphs
//!
//! Data types describe what a data port carries and drive connection
//! compatibility checks. Control flow travels over step ports, which
//! never carry a data type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node instance (or the `Start`/`Exit` pseudo-nodes)
pub type NodeId = String;

/// Name of a port on a node
pub type PortName = String;

/// Well-known port names
pub mod ports {
    /// Step input that triggers a function node
    pub const EXECUTE: &str = "execute";
    /// Step output fired when a node completes successfully
    pub const ON_SUCCESS: &str = "onSuccess";
    /// Step output fired when a node fails
    pub const ON_FAILURE: &str = "onFailure";
}

/// The semantic type of a data port
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Accepts any type
    Any,
    /// Text string
    String,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// Structured object, optionally naming its shape
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape: Option<String>,
    },
    /// Ordered collection
    Array,
    /// Callable value
    Function,
    /// Named type outside the built-in vocabulary
    Custom(String),
}

impl DataType {
    /// An object with no declared shape
    pub fn object() -> Self {
        DataType::Object { shape: None }
    }

    /// An object with a named shape
    pub fn shaped(shape: impl Into<String>) -> Self {
        DataType::Object {
            shape: Some(shape.into()),
        }
    }

    /// Check how a value of this type flows into a port of `target` type
    pub fn compatibility_with(&self, target: &DataType, strict: bool) -> TypeCompatibility {
        is_compatible(self, target, strict)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Any => write!(f, "any"),
            DataType::String => write!(f, "string"),
            DataType::Number => write!(f, "number"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Object { shape: None } => write!(f, "object"),
            DataType::Object { shape: Some(shape) } => write!(f, "object<{}>", shape),
            DataType::Array => write!(f, "array"),
            DataType::Function => write!(f, "function"),
            DataType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Why two data types are not an exact match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// Primitive value rendered as text
    Widening,
    /// Text parsed into a primitive, which may fail
    Lossy,
    /// Legal but surprising conversion
    Unusual,
    /// Two objects with different declared shapes
    ShapeMismatch,
    /// No sensible conversion exists
    Mismatch,
}

impl Coercion {
    /// Short human-readable explanation
    pub fn describe(&self) -> &'static str {
        match self {
            Coercion::Widening => "value is converted to text",
            Coercion::Lossy => "text must be parsed and may not convert",
            Coercion::Unusual => "conversion is unusual and probably unintended",
            Coercion::ShapeMismatch => "object shapes differ",
            Coercion::Mismatch => "types are unrelated",
        }
    }
}

/// Outcome of a type compatibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCompatibility {
    /// Types match
    Ok,
    /// Connection is allowed with a coercion
    Warn(Coercion),
    /// Connection is rejected
    Error(Coercion),
}

/// Check whether data of `source` type can flow into a `target` port.
///
/// Identical types and `Any` on either side are always compatible. Object
/// shape differences only warn, even in strict mode. Every other mismatch
/// warns unless `strict` is set, in which case it is an error.
pub fn is_compatible(source: &DataType, target: &DataType, strict: bool) -> TypeCompatibility {
    use DataType::*;

    if source == target || matches!(source, Any) || matches!(target, Any) {
        return TypeCompatibility::Ok;
    }

    if let (Object { shape: from }, Object { shape: to }) = (source, target) {
        return match (from, to) {
            (Some(_), Some(_)) => TypeCompatibility::Warn(Coercion::ShapeMismatch),
            _ => TypeCompatibility::Ok,
        };
    }

    let coercion = match (source, target) {
        (Number | Boolean, String) => Coercion::Widening,
        (Object { .. } | Array, String) => Coercion::Unusual,
        (String, Number | Boolean) => Coercion::Lossy,
        (Number, Boolean) | (Boolean, Number) => Coercion::Unusual,
        _ => Coercion::Mismatch,
    };

    if strict {
        TypeCompatibility::Error(coercion)
    } else {
        TypeCompatibility::Warn(coercion)
    }
}

/// Direction of a port relative to its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// What a port carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PortKind {
    /// Control-flow signal with no payload
    Step,
    /// Typed value
    #[serde(rename_all = "camelCase")]
    Data {
        data_type: DataType,
        /// Literal used when nothing is connected
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Value>,
        /// Source expression used when nothing is connected
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
    },
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Port name, unique per direction on a node
    pub name: PortName,
    /// Input or output
    pub direction: Direction,
    /// Step or data
    pub kind: PortKind,
    /// Whether an input may be left unbound
    #[serde(default)]
    pub optional: bool,
    /// Position among ports of the same direction
    #[serde(default)]
    pub order: u32,
    /// Scope this port bridges into, for iterating node types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Port {
    fn new(name: impl Into<String>, direction: Direction, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            optional: false,
            order: 0,
            scope: None,
        }
    }

    /// Create a step input
    pub fn step_input(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Input, PortKind::Step)
    }

    /// Create a step output
    pub fn step_output(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Output, PortKind::Step)
    }

    /// Create a required data input
    pub fn data_input(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, Direction::Input, Self::data_kind(data_type))
    }

    /// Create a data output
    pub fn data_output(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, Direction::Output, Self::data_kind(data_type))
    }

    fn data_kind(data_type: DataType) -> PortKind {
        PortKind::Data {
            data_type,
            default: None,
            expression: None,
        }
    }

    /// Mark this port as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the ordering position
    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Attach this port to a named scope
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set a default literal (data ports only)
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        if let PortKind::Data { default, .. } = &mut self.kind {
            *default = Some(value);
        }
        self
    }

    /// Set a fallback expression (data ports only)
    pub fn with_expression(mut self, code: impl Into<String>) -> Self {
        if let PortKind::Data { expression, .. } = &mut self.kind {
            *expression = Some(code.into());
        }
        self
    }

    /// Re-orient this port, used for the workflow boundary pseudo-nodes
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn is_step(&self) -> bool {
        matches!(self.kind, PortKind::Step)
    }

    pub fn is_data(&self) -> bool {
        !self.is_step()
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// The data type, or `None` for step ports
    pub fn data_type(&self) -> Option<&DataType> {
        match &self.kind {
            PortKind::Data { data_type, .. } => Some(data_type),
            PortKind::Step => None,
        }
    }

    /// Default literal declared on the port
    pub fn default_value(&self) -> Option<&serde_json::Value> {
        match &self.kind {
            PortKind::Data { default, .. } => default.as_ref(),
            PortKind::Step => None,
        }
    }

    /// Fallback expression declared on the port
    pub fn expression(&self) -> Option<&str> {
        match &self.kind {
            PortKind::Data { expression, .. } => expression.as_deref(),
            PortKind::Step => None,
        }
    }

    /// Whether an unconnected input still receives a value
    pub fn has_fallback(&self) -> bool {
        self.default_value().is_some() || self.expression().is_some()
    }
}
