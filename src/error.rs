//! The umbrella error for entry points that parse and execute in one call.
use crate::compute::ExecutionError;
use crate::graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PamError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Invalid evaluation context: {0}")]
    Json(#[from] serde_json::Error),
}
