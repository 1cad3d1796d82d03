//! Flow Model - typed graph model for the workflow compiler
//!
//! This crate describes workflows as the compiler sees them after
//! parsing:
//!
//! - Data types, step/data ports and the compatibility rules between them
//! - Node types (stub, function, expression) and their registry
//! - Workflows: node instances, connections, scopes and the implicit
//!   `Start`/`Exit` boundary nodes
//! - A read-only index used by validation and scheduling
//!
//! Nothing here mutates a workflow once built; validation and lowering
//! live in the `flow-compiler` crate.
//!
//! # Example
//!
//! ```ignore
//! use flow_model::{DataType, NodeType, WorkflowBuilder};
//!
//! let workflow = WorkflowBuilder::new("wf")
//!     .node_type(NodeType::function("Fetch").with_output("body", DataType::String))
//!     .add_instance("fetch", "Fetch")
//!     .connect("Start", "execute", "fetch", "execute")
//!     .build();
//! ```

pub mod builder;
pub mod error;
pub mod index;
pub mod node;
pub mod registry;
pub mod types;
pub mod workflow;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use error::{ModelError, Result};
pub use index::{GraphIndex, Region};
pub use node::{ExecuteWhen, NodeType, NodeVariant};
pub use registry::NodeTypeRegistry;
pub use types::{
    is_compatible, ports, Coercion, DataType, Direction, NodeId, Port, PortKind, PortName,
    TypeCompatibility,
};
pub use workflow::{
    is_boundary, Connection, NodeInstance, PortBinding, PortRef, Scope, ScopeRef, Workflow, EXIT,
    START,
};
