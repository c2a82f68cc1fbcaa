//! Per-execution memo of node values, and the evaluation error types.

use crate::store::NodeId;
use rust_decimal::Decimal;

pub use self::error::{ExecutionError, NodeError};
mod error {
    use crate::compute::convert::ConversionError;
    use crate::compute::decimal::ArithmeticError;
    use thiserror::Error;

    /// Failure of a single node's evaluation.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum NodeError {
        #[error("Unresolved reference '{key}'")]
        UnresolvedReference { key: String },
        #[error("Unknown operation '{operation}'")]
        UnknownOperation { operation: String },
        #[error("Weighted average has {weights} weights for {inputs} inputs")]
        WeightMismatch { weights: usize, inputs: usize },
        #[error("Cannot convert '{from}' to '{to}': {reason}")]
        IncompatibleUnits { from: String, to: String, reason: String },
        #[error("Invalid controls config: {reason}")]
        InvalidControlsConfig { reason: String },
        #[error("Invalid node config: {reason}")]
        InvalidConfig { reason: String },
        #[error("{node_type} node expects {expected} input(s), got {actual}")]
        Arity { node_type: &'static str, expected: &'static str, actual: usize },
        #[error("Input '{node_id}' has not been evaluated")]
        MissingInput { node_id: String },
        #[error("Conversion failed: {0}")]
        Conversion(ConversionError),
        #[error(transparent)]
        Arithmetic(#[from] ArithmeticError),
    }

    impl From<ConversionError> for NodeError {
        fn from(e: ConversionError) -> Self {
            match e {
                ConversionError::Incompatible { from, to, reason } => NodeError::IncompatibleUnits { from, to, reason },
                ConversionError::Arithmetic(a) => NodeError::Arithmetic(a),
                other => NodeError::Conversion(other),
            }
        }
    }

    /// A node failure with its position in the evaluation order.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("Node '{node_id}' failed at step {position} of {total}: {kind}")]
    pub struct ExecutionError {
        pub node_id: String,
        /// 1-based position in the topological order.
        pub position: usize,
        pub total: usize,
        #[source]
        pub kind: NodeError,
    }
}

/// Dense storage of computed values, indexed by [`NodeId`].
///
/// Lives for one execution only; nothing carries over between calls.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: Vec<Option<Decimal>>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(size: usize) -> Self {
        Self { values: vec![None; size] }
    }

    #[inline(always)]
    pub fn get(&self, node_id: NodeId) -> Option<Decimal> {
        self.values.get(node_id.index()).copied().flatten()
    }

    #[inline(always)]
    pub fn insert(&mut self, node_id: NodeId, value: Decimal) {
        let idx = node_id.index();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, None);
        }
        self.values[idx] = Some(value);
    }

    pub fn is_computed(&self, node_id: NodeId) -> bool {
        self.get(node_id).is_some()
    }
}
