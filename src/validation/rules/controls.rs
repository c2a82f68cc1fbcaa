//! Validation rule for Controls nodes.

use crate::compute::controls;
use crate::graph::PricingGraph;
use crate::store::{NodeId, NodeKind};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// Floor must not exceed cap, the trigger band must be ordered, the sharing
/// percentage must lie in 0..=100, and two inputs may not claim the same role.
pub(crate) fn validate_controls(graph: &PricingGraph, node: NodeId) -> Option<ValidationError> {
    let NodeKind::Controls(cfg) = graph.kind(node) else {
        return None;
    };

    let message = match controls::validate(cfg) {
        Err(e) => format!("Controls Error: {}.", e),
        Ok(()) => match graph.predecessor_roles(node) {
            [Some(a), Some(b)] if a == b => {
                format!("Controls Error: both inputs are declared as the '{:?}' price.", a).to_lowercase()
            }
            _ => return None,
        },
    };
    Some(ValidationError { node_id: graph.id(node).to_string(), error_type: ValidationErrorType::ControlsConfig, message })
}
