//! Validation rule for dimensional analysis (Units).

use crate::compute::convert::{self, UnitConverter};
use crate::graph::PricingGraph;
use crate::store::{NodeId, NodeKind};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// "The Apples and Oranges Rule": a Convert node may only bridge expressions
/// with matching dimensions.
///
/// Mass and volume are interchangeable only when the node configures a
/// density; currencies always are, since rates are resolved at run time.
pub(crate) fn validate_units(
    graph: &PricingGraph,
    node: NodeId,
    units: &dyn UnitConverter,
) -> Option<ValidationError> {
    let NodeKind::Convert(cfg) = graph.kind(node) else {
        return None;
    };

    let with_density = cfg.density.is_some() || cfg.density_reference.is_some();
    let err = convert::check_compatible(&cfg.from, &cfg.to, units, with_density).err()?;
    Some(ValidationError {
        node_id: graph.id(node).to_string(),
        error_type: ValidationErrorType::UnitMismatch,
        message: format!("Unit Mismatch: {}.", err),
    })
}
