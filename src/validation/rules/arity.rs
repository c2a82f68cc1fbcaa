//! Validation rule for input counts.

use crate::graph::PricingGraph;
use crate::store::{CombineOperator, NodeId, NodeKind};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// Every kind accepts a fixed shape of inputs: factors are leaves, Controls
/// takes a calculated and a base price, Combine folds one or more.
///
/// A weighted average must also carry exactly one weight per incoming edge;
/// the engine refuses to guess a missing weight.
pub(crate) fn validate_arity(graph: &PricingGraph, node: NodeId) -> Option<ValidationError> {
    let actual = graph.predecessors(node).len();
    let kind = graph.kind(node);
    let (expected, ok) = match kind {
        NodeKind::Factor(_) => ("no", actual == 0),
        NodeKind::Transform(_) | NodeKind::Convert(_) | NodeKind::Output => ("exactly 1", actual == 1),
        NodeKind::Combine(_) => ("at least 1", actual >= 1),
        NodeKind::Controls(_) => ("exactly 2", actual == 2),
    };

    if !ok {
        return Some(ValidationError {
            node_id: graph.id(node).to_string(),
            error_type: ValidationErrorType::Arity,
            message: format!(
                "Arity Error: {} node expects {} input(s) but has {} incoming edge(s).",
                kind.node_type().as_str(),
                expected,
                actual
            ),
        });
    }

    if let NodeKind::Combine(cfg) = kind {
        if cfg.operator == CombineOperator::WeightedAverage {
            let weights = cfg.weights.as_ref().map_or(0, Vec::len);
            if weights != actual {
                return Some(ValidationError {
                    node_id: graph.id(node).to_string(),
                    error_type: ValidationErrorType::WeightMismatch,
                    message: format!(
                        "Weight Mismatch: {} weight(s) declared for {} input(s). Every input needs exactly one weight.",
                        weights, actual
                    ),
                });
            }
        }
    }
    None
}
