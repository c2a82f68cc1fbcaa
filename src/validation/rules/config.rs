//! Validation rule for leaf and transform configuration.

use crate::compute::evaluator::check_factor_sources;
use crate::compute::transform::TransformOp;
use crate::compute::NodeError;
use crate::graph::PricingGraph;
use crate::store::{NodeId, NodeKind};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// Factors need exactly one value source; transforms need a known operation
/// and the parameters that operation reads.
pub(crate) fn validate_config(graph: &PricingGraph, node: NodeId) -> Option<ValidationError> {
    let result = match graph.kind(node) {
        NodeKind::Factor(cfg) => check_factor_sources(cfg),
        NodeKind::Transform(cfg) => TransformOp::from_config(cfg).map(|_| ()),
        _ => Ok(()),
    };

    let err = result.err()?;
    let error_type = match err {
        NodeError::UnknownOperation { .. } => ValidationErrorType::UnknownOperation,
        _ => ValidationErrorType::InvalidConfig,
    };
    Some(ValidationError { node_id: graph.id(node).to_string(), error_type, message: format!("Config Error: {}.", err) })
}
