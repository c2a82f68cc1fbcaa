//! A synchronous, single-threaded execution engine.
//!
//! One execution walks the graph's topological order once, memoizing each
//! node's value in a fresh [`Ledger`]. Nothing is shared between executions
//! except the immutable graph and collaborators, which is what makes
//! [`Engine::execute_many`] safe to run in parallel.

use super::context::EvaluationContext;
use super::convert::{FxRates, StandardUnits, UnitConverter};
use super::decimal::DecimalPolicy;
use super::evaluator::{self, Breakdown, Environment, NodeInput, NodeOutput};
use super::ledger::{ExecutionError, Ledger, NodeError};
use crate::error::PamError;
use crate::graph::PricingGraph;
use crate::store::NodeId;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, debug_span, trace, warn};

/// Caller-facing engine settings. Deserializable so it can travel with the
/// stored formula or the batch request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub decimal: DecimalPolicy,
}

/// The outcome of one execution. Built fresh per call and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// The output node's value, rounded by the output policy.
    pub value: Decimal,
    /// Value of every evaluated node, keyed by node id.
    pub contributions: BTreeMap<String, Decimal>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdowns: BTreeMap<String, Breakdown>,
}

pub struct Engine<'a> {
    graph: &'a PricingGraph,
    policy: DecimalPolicy,
    units: &'a dyn UnitConverter,
    fx: Option<&'a dyn FxRates>,
}

impl<'a> Engine<'a> {
    pub fn new(graph: &'a PricingGraph) -> Self {
        Self { graph, policy: DecimalPolicy::default(), units: &StandardUnits, fx: None }
    }

    pub fn with_policy(mut self, policy: DecimalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_policy(config.decimal)
    }

    pub fn with_converter(mut self, units: &'a dyn UnitConverter) -> Self {
        self.units = units;
        self
    }

    /// Injects an FX provider. Without one, rates are read from the context.
    pub fn with_fx(mut self, fx: &'a dyn FxRates) -> Self {
        self.fx = Some(fx);
        self
    }

    /// Evaluates the graph for one item. Fails fast on the first node error,
    /// returning no partial result.
    pub fn execute(&self, context: &EvaluationContext) -> Result<ExecutionResult, ExecutionError> {
        let _span = debug_span!("pam_execute", output = self.graph.output_id()).entered();

        let order = self.graph.topological_order();
        let total = order.len();
        let needed = self.needed(context);
        let env = Environment { context, policy: &self.policy, units: self.units, fx: self.fx };

        let mut ledger = Ledger::with_capacity(self.graph.node_count());
        let mut contributions = BTreeMap::new();
        let mut breakdowns = BTreeMap::new();

        for (step, &node) in order.iter().enumerate() {
            if !needed[node.index()] {
                continue;
            }
            let id = self.graph.id(node);
            let fail = |kind: NodeError| {
                debug!(node = id, step = step + 1, error = %kind, "node evaluation failed");
                ExecutionError { node_id: id.to_string(), position: step + 1, total, kind }
            };

            let output = match context.node_override(id) {
                Some(value) => {
                    warn!(node = id, %value, "node value overridden");
                    NodeOutput::from(value)
                }
                None => {
                    let inputs = self.gather_inputs(node, &ledger).map_err(fail)?;
                    evaluator::evaluate(self.graph.kind(node), &inputs, &env).map_err(fail)?
                }
            };

            trace!(node = id, kind = self.graph.kind(node).node_type().as_str(), value = %output.value, "evaluated");
            ledger.insert(node, output.value);
            contributions.insert(id.to_string(), output.value);
            if let Some(breakdown) = output.breakdown {
                breakdowns.insert(id.to_string(), breakdown);
            }
        }

        let output = self.graph.output();
        let raw = ledger.get(output).ok_or_else(|| ExecutionError {
            node_id: self.graph.output_id().to_string(),
            position: total,
            total,
            kind: NodeError::MissingInput { node_id: self.graph.output_id().to_string() },
        })?;

        let value = self.policy.round(raw);
        debug!(%value, nodes = contributions.len(), "execution complete");
        Ok(ExecutionResult { value, contributions, breakdowns })
    }

    /// Evaluates independent item contexts in parallel over the shared graph.
    /// Results keep the order of `contexts`.
    pub fn execute_many(&self, contexts: &[EvaluationContext]) -> Vec<Result<ExecutionResult, ExecutionError>> {
        contexts.par_iter().map(|ctx| self.execute(ctx)).collect()
    }

    fn gather_inputs(&self, node: NodeId, ledger: &Ledger) -> Result<SmallVec<[NodeInput; 4]>, NodeError> {
        self.graph
            .predecessors(node)
            .iter()
            .zip(self.graph.predecessor_roles(node))
            .map(|(&parent, &role)| {
                let value = ledger
                    .get(parent)
                    .ok_or_else(|| NodeError::MissingInput { node_id: self.graph.id(parent).to_string() })?;
                Ok(NodeInput { value, role })
            })
            .collect()
    }

    /// Nodes the output still depends on once overridden nodes are treated
    /// as leaves. Without overrides this is every ordered node.
    fn needed(&self, context: &EvaluationContext) -> Vec<bool> {
        let count = self.graph.node_count();
        if context.overrides.nodes.is_empty() {
            return (0..count).map(|i| self.graph.is_live(NodeId::new(i))).collect();
        }

        let mut needed = vec![false; count];
        let mut queue = VecDeque::from([self.graph.output()]);
        while let Some(node) = queue.pop_front() {
            if needed[node.index()] {
                continue;
            }
            needed[node.index()] = true;
            if context.node_override(self.graph.id(node)).is_none() {
                queue.extend(self.graph.predecessors(node).iter().copied());
            }
        }
        needed
    }
}

/// Evaluates `graph` for one item with default settings.
pub fn execute(graph: &PricingGraph, context: &EvaluationContext) -> Result<ExecutionResult, ExecutionError> {
    Engine::new(graph).execute(context)
}

/// One-shot helper for callers holding both documents as JSON text.
pub fn evaluate_json(graph_json: &str, context_json: &str) -> Result<ExecutionResult, PamError> {
    let graph = PricingGraph::from_json(graph_json)?;
    let context = EvaluationContext::from_json(context_json)?;
    Ok(execute(&graph, &context)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::convert::ConversionError;
    use crate::compute::decimal::RoundingMode;
    use crate::graph::GraphError;
    use rust_decimal_macros::dec;

    /// base price and an index-escalated price feeding a collar.
    const ESCALATION: &str = r#"{
        "nodes": [
            { "id": "base", "type": "factor", "config": { "basePrice": true } },
            { "id": "index_now", "type": "factor", "config": { "reference": "BRENT@2024-06" } },
            { "id": "index_ratio", "type": "transform", "config": { "operation": "ratio", "reference": "BRENT@2024-01" } },
            { "id": "escalated", "type": "combine", "config": { "operator": "multiply" } },
            { "id": "collar", "type": "controls", "config": { "cap": 10, "floor": -5, "triggerBand": { "lower": -3, "upper": 3 } } },
            { "id": "out", "type": "output" }
        ],
        "edges": [
            { "from": "index_now", "to": "index_ratio" },
            { "from": "base", "to": "escalated" },
            { "from": "index_ratio", "to": "escalated" },
            { "from": "escalated", "to": "collar" },
            { "from": "base", "to": "collar" },
            { "from": "collar", "to": "out" }
        ],
        "output": "out"
    }"#;

    fn graph() -> PricingGraph {
        PricingGraph::from_json(ESCALATION).unwrap()
    }

    fn ctx(now: Decimal) -> EvaluationContext {
        EvaluationContext::new()
            .with_base_price(dec!(100))
            .with_value("BRENT@2024-01", dec!(80))
            .with_value("BRENT@2024-06", now)
    }

    #[test]
    fn test_escalation_within_collar() {
        // Index up 5%: outside the band, inside the collar.
        let result = execute(&graph(), &ctx(dec!(84))).unwrap();
        assert_eq!(result.value, dec!(105));
        assert_eq!(result.contributions["index_ratio"], dec!(1.05));
        assert_eq!(result.contributions["escalated"], dec!(105));
        assert_eq!(result.contributions.len(), 6);
        assert!(matches!(result.breakdowns.get("collar"), Some(Breakdown::Controls(_))));
    }

    #[test]
    fn test_escalation_capped_and_suppressed() {
        assert_eq!(execute(&graph(), &ctx(dec!(100))).unwrap().value, dec!(110));
        assert_eq!(execute(&graph(), &ctx(dec!(82))).unwrap().value, dec!(100));
        assert_eq!(execute(&graph(), &ctx(dec!(60))).unwrap().value, dec!(95));
    }

    #[test]
    fn test_execution_is_deterministic() {
        let g = graph();
        let c = ctx(dec!(83.3));
        let first = execute(&g, &c).unwrap();
        let second = execute(&g, &c).unwrap();
        assert_eq!(first, second);
        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
    }

    #[test]
    fn test_failure_names_node_and_position() {
        let c = EvaluationContext::new().with_base_price(dec!(100)).with_value("BRENT@2024-01", dec!(80));
        let err = execute(&graph(), &c).unwrap_err();
        assert_eq!(err.node_id, "index_now");
        assert_eq!(err.position, 2);
        assert_eq!(err.total, 6);
        assert_eq!(err.kind, NodeError::UnresolvedReference { key: "BRENT@2024-06".into() });
    }

    #[test]
    fn test_node_override_skips_its_inputs() {
        // No index data at all; the scenario pins the escalated price.
        let c = EvaluationContext::new().with_base_price(dec!(100)).with_node_override("escalated", dec!(102));
        let result = execute(&graph(), &c).unwrap();
        assert_eq!(result.value, dec!(100)); // 2% is inside the trigger band
        assert!(!result.contributions.contains_key("index_now"));
    }

    #[test]
    fn test_reference_override() {
        let c = ctx(dec!(84)).with_reference_override("BRENT@2024-06", dec!(96));
        assert_eq!(execute(&graph(), &c).unwrap().value, dec!(110));
    }

    #[test]
    fn test_policy_rounds_final_value() {
        let g = PricingGraph::from_json(
            r#"{
                "nodes": [
                    { "id": "a", "type": "factor", "config": { "value": 10 } },
                    { "id": "b", "type": "factor", "config": { "value": 3 } },
                    { "id": "div", "type": "combine", "config": { "operator": "divide" } }
                ],
                "edges": [ { "from": "a", "to": "div" }, { "from": "b", "to": "div" } ],
                "output": "div"
            }"#,
        )
        .unwrap();
        let c = EvaluationContext::new();
        assert_eq!(execute(&g, &c).unwrap().value, dec!(3.3333));

        let config: EngineConfig = serde_json::from_str(r#"{ "decimal": { "scale": 2, "rounding": "up" } }"#).unwrap();
        assert_eq!(config.decimal.rounding, RoundingMode::Up);
        let result = Engine::new(&g).with_config(&config).execute(&c).unwrap();
        assert_eq!(result.value, dec!(3.34));
        // Intermediate values keep full precision.
        assert!(result.contributions["div"].scale() > 2);
    }

    #[test]
    fn test_execute_many_keeps_order() {
        let g = graph();
        let contexts = vec![ctx(dec!(84)), ctx(dec!(100)), EvaluationContext::new()];
        let results = Engine::new(&g).execute_many(&contexts);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().value, dec!(105));
        assert_eq!(results[1].as_ref().unwrap().value, dec!(110));
        assert!(results[2].is_err());
    }

    #[test]
    fn test_injected_fx_provider() {
        struct Flat;
        impl FxRates for Flat {
            fn rate(&self, _from: &str, _to: &str, _policy: Option<&str>) -> Result<Decimal, ConversionError> {
                Ok(dec!(2))
            }
        }

        let g = PricingGraph::from_json(
            r#"{
                "nodes": [
                    { "id": "eur", "type": "factor", "config": { "value": 50 } },
                    { "id": "usd", "type": "convert", "config": { "from": "EUR/t", "to": "USD/t", "fxPolicy": "spot" } }
                ],
                "edges": [ { "from": "eur", "to": "usd" } ],
                "output": "usd"
            }"#,
        )
        .unwrap();
        let c = EvaluationContext::new();
        assert!(execute(&g, &c).is_err());
        assert_eq!(Engine::new(&g).with_fx(&Flat).execute(&c).unwrap().value, dec!(100));
    }

    #[test]
    fn test_evaluate_json() {
        let context = r#"{ "values": { "BRENT@2024-01": 80, "BRENT@2024-06": 84 }, "basePrice": 100 }"#;
        let result = evaluate_json(ESCALATION, context).unwrap();
        assert_eq!(result.value, dec!(105));

        assert!(matches!(evaluate_json("{", context), Err(PamError::Graph(GraphError::Malformed(_)))));
        assert!(matches!(evaluate_json(ESCALATION, "42"), Err(PamError::Json(_))));
        assert!(matches!(evaluate_json(ESCALATION, "{}"), Err(PamError::Execution(_))));
    }

    #[test]
    fn test_cyclic_graph_never_executes() {
        let err = PricingGraph::from_json(
            r#"{
                "nodes": [
                    { "id": "a", "type": "output" },
                    { "id": "b", "type": "output" }
                ],
                "edges": [ { "from": "a", "to": "b" }, { "from": "b", "to": "a" } ],
                "output": "b"
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::CyclicGraph { .. }));
    }
}
