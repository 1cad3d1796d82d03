//! Error types for the workflow model

use thiserror::Error;

/// Result type alias using ModelError
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while constructing or loading a workflow model
#[derive(Debug, Error)]
pub enum ModelError {
    /// A port reference did not have the `node.port` form
    #[error("Invalid port reference '{0}': expected 'node.port'")]
    InvalidPortRef(String),

    /// A node type id was registered twice
    #[error("Node type '{0}' is already registered")]
    DuplicateNodeType(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
