//! Errors raised while building, scanning and serializing the arena

use thiserror::Error;

use crate::types::NodeId;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid node type: expected {expected}, got {actual}")]
    InvalidNodeType { expected: String, actual: String },

    /// A CDP capture is missing a field the arena needs
    #[error("Malformed capture: {0}")]
    MalformedCapture(String),

    #[error("Document has no <body> element; no structure can be produced")]
    SerializationGap,

    #[error("Document has no root node")]
    MissingRoot,

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}
