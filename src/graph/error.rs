//! Structural errors detected while parsing a graph, before any evaluation.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Malformed graph definition: {0}")]
    Malformed(String),
    #[error("Duplicate node id '{id}'")]
    DuplicateNode { id: String },
    #[error("Edge '{from}' -> '{to}' references unknown node '{missing}'")]
    DanglingEdge { from: String, to: String, missing: String },
    #[error("Output node '{id}' does not exist")]
    MissingOutput { id: String },
    #[error("Invalid config for node '{node_id}': {reason}")]
    InvalidConfig { node_id: String, reason: String },
    #[error("Cycle detected involving nodes {nodes:?}")]
    CyclicGraph { nodes: Vec<String> },
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Malformed(e.to_string())
    }
}
