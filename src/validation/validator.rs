//! The central validator that orchestrates the execution of all validation rules.
use super::error::ValidationError;
use super::rules::{arity, config, controls, units};
use crate::compute::convert::{StandardUnits, UnitConverter};
use crate::graph::PricingGraph;
use crate::store::NodeId;
use tracing::debug;

/// The orchestrator for the static analysis pass.
///
/// Walks every declared node and applies each rule to it, collecting all
/// problems instead of stopping at the first one, like a linter.
pub struct Validator<'a> {
    graph: &'a PricingGraph,
    units: &'a dyn UnitConverter,
}

impl<'a> Validator<'a> {
    pub fn new(graph: &'a PricingGraph) -> Self {
        Self { graph, units: &StandardUnits }
    }

    /// Validates Convert nodes against a caller-supplied unit table.
    pub fn with_converter(mut self, units: &'a dyn UnitConverter) -> Self {
        self.units = units;
        self
    }

    /// Executes all registered validation rules against the graph.
    ///
    /// # Returns
    /// - `Ok(())` if no validation errors are found.
    /// - `Err(Vec<ValidationError>)` with every error found, in declaration order.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        // Rules only look at a node and its direct inputs, so no ordering is needed.
        for i in 0..self.graph.node_count() {
            let node = NodeId::new(i);
            errors.extend(arity::validate_arity(self.graph, node));
            errors.extend(config::validate_config(self.graph, node));
            errors.extend(controls::validate_controls(self.graph, node));
            errors.extend(units::validate_units(self.graph, node, self.units));
        }

        debug!(errors = errors.len(), "validation finished");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationErrorType;

    fn validate(json: &str) -> Result<(), Vec<ValidationError>> {
        let graph = PricingGraph::from_json(json).unwrap();
        Validator::new(&graph).validate()
    }

    fn kinds(errors: &[ValidationError]) -> Vec<(&str, ValidationErrorType)> {
        errors.iter().map(|e| (e.node_id.as_str(), e.error_type)).collect()
    }

    #[test]
    fn test_valid_graph_passes() {
        let result = validate(
            r#"{
                "nodes": [
                    { "id": "base", "type": "factor", "config": { "basePrice": true } },
                    { "id": "gas", "type": "factor", "config": { "reference": "TTF" } },
                    { "id": "gas_usd", "type": "convert", "config": { "from": "EUR/MWh", "to": "USD/MWh" } },
                    { "id": "growth", "type": "transform", "config": { "operation": "ratio", "reference": "TTF@prior" } },
                    { "id": "price", "type": "combine", "config": { "operator": "multiply" } },
                    { "id": "collar", "type": "controls", "config": { "cap": 10, "floor": -10 } },
                    { "id": "out", "type": "output" }
                ],
                "edges": [
                    { "from": "gas", "to": "gas_usd" },
                    { "from": "gas_usd", "to": "growth" },
                    { "from": "base", "to": "price" },
                    { "from": "growth", "to": "price" },
                    { "from": "price", "to": "collar", "role": "calculated" },
                    { "from": "base", "to": "collar", "role": "base" },
                    { "from": "collar", "to": "out" }
                ],
                "output": "out"
            }"#,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let errors = validate(
            r#"{
                "nodes": [
                    { "id": "a", "type": "factor", "config": { "value": 1 } },
                    { "id": "b", "type": "factor", "config": {} },
                    { "id": "t", "type": "transform", "config": { "operation": "moving_median" } },
                    { "id": "w", "type": "combine", "config": { "operator": "weighted_average", "weights": [1] } },
                    { "id": "c", "type": "controls", "config": { "cap": -5, "floor": 5 } },
                    { "id": "u", "type": "convert", "config": { "from": "USD/t", "to": "USD/MWh" } },
                    { "id": "out", "type": "output" }
                ],
                "edges": [
                    { "from": "a", "to": "t" },
                    { "from": "a", "to": "w" },
                    { "from": "b", "to": "w" },
                    { "from": "w", "to": "c" },
                    { "from": "t", "to": "u" },
                    { "from": "u", "to": "out" },
                    { "from": "c", "to": "out" }
                ],
                "output": "out"
            }"#,
        )
        .unwrap_err();

        assert_eq!(
            kinds(&errors),
            vec![
                ("b", ValidationErrorType::InvalidConfig),
                ("t", ValidationErrorType::UnknownOperation),
                ("w", ValidationErrorType::WeightMismatch),
                ("c", ValidationErrorType::Arity),
                ("c", ValidationErrorType::ControlsConfig),
                ("u", ValidationErrorType::UnitMismatch),
                ("out", ValidationErrorType::Arity),
            ]
        );
    }

    #[test]
    fn test_overflowing_unit_exponent_is_reported() {
        let errors = validate(
            r#"{
                "nodes": [
                    { "id": "a", "type": "factor", "config": { "value": 1 } },
                    { "id": "u", "type": "convert", "config": { "from": "1/kg^-2147483648", "to": "kg" } }
                ],
                "edges": [ { "from": "a", "to": "u" } ],
                "output": "u"
            }"#,
        )
        .unwrap_err();
        assert_eq!(kinds(&errors), vec![("u", ValidationErrorType::UnitMismatch)]);
    }
}
