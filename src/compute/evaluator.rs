//! Per-kind evaluation of a single node from its already-computed inputs.
//!
//! Every function here is pure: the result depends only on the node config,
//! the input values and the environment. Memoization belongs to the engine.

use super::context::EvaluationContext;
use super::controls::{self, ControlsOutcome};
use super::convert::{self, Bridges, ContextRates, FxRates, UnitConverter};
use super::decimal::{self, DecimalPolicy};
use super::ledger::NodeError;
use super::transform::TransformOp;
use crate::store::{CombineConfig, CombineOperator, ConvertConfig, EdgeRole, FactorConfig, NodeKind};
use rust_decimal::Decimal;
use serde::Serialize;

/// Read-only services available to every node of one execution.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub context: &'a EvaluationContext,
    pub policy: &'a DecimalPolicy,
    pub units: &'a dyn UnitConverter,
    /// Falls back to rates carried in the context when `None`.
    pub fx: Option<&'a dyn FxRates>,
}

/// A predecessor's value together with the role its edge declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInput {
    pub value: Decimal,
    pub role: Option<EdgeRole>,
}

impl NodeInput {
    pub fn new(value: Decimal) -> Self { Self { value, role: None } }
}

/// Optional detail explaining how a node reached its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Breakdown {
    Controls(ControlsOutcome),
    /// `weight * input` per input, and the weight total they are divided by.
    #[serde(rename_all = "camelCase")]
    WeightedTerms { terms: Vec<Decimal>, total_weight: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub value: Decimal,
    pub breakdown: Option<Breakdown>,
}

impl From<Decimal> for NodeOutput {
    fn from(value: Decimal) -> Self { Self { value, breakdown: None } }
}

/// Evaluates one node. `inputs` are in edge declaration order.
pub fn evaluate(kind: &NodeKind, inputs: &[NodeInput], env: &Environment<'_>) -> Result<NodeOutput, NodeError> {
    match kind {
        NodeKind::Factor(cfg) => {
            expect_arity("factor", "no", inputs, 0)?;
            factor(cfg, env.context).map(NodeOutput::from)
        }
        NodeKind::Transform(cfg) => {
            let input = single("transform", inputs)?;
            TransformOp::from_config(cfg)?.apply(input, env.context, env.policy).map(NodeOutput::from)
        }
        NodeKind::Convert(cfg) => {
            let input = single("convert", inputs)?;
            convert_value(cfg, input, env).map(NodeOutput::from)
        }
        NodeKind::Combine(cfg) => combine(cfg, inputs),
        NodeKind::Controls(cfg) => {
            let (calculated, base) = controls_inputs(inputs)?;
            let outcome = controls::apply(cfg, calculated, base, env.policy)?;
            Ok(NodeOutput { value: outcome.value, breakdown: Some(Breakdown::Controls(outcome)) })
        }
        NodeKind::Output => single("output", inputs).map(NodeOutput::from),
    }
}

fn expect_arity(node_type: &'static str, expected: &'static str, inputs: &[NodeInput], n: usize) -> Result<(), NodeError> {
    if inputs.len() != n {
        return Err(NodeError::Arity { node_type, expected, actual: inputs.len() });
    }
    Ok(())
}

fn single(node_type: &'static str, inputs: &[NodeInput]) -> Result<Decimal, NodeError> {
    expect_arity(node_type, "exactly 1", inputs, 1)?;
    Ok(inputs[0].value)
}

/// A constant, a context reference (with optional default), or the base price.
/// A missing reference never silently becomes zero.
fn factor(cfg: &FactorConfig, context: &EvaluationContext) -> Result<Decimal, NodeError> {
    check_factor_sources(cfg)?;

    if let Some(value) = cfg.value {
        return Ok(value);
    }
    if let Some(key) = &cfg.reference {
        return context
            .lookup(key)
            .or(cfg.default)
            .ok_or_else(|| NodeError::UnresolvedReference { key: key.clone() });
    }
    context.base_price.ok_or_else(|| NodeError::UnresolvedReference { key: "basePrice".into() })
}

pub(crate) fn check_factor_sources(cfg: &FactorConfig) -> Result<(), NodeError> {
    let sources = [cfg.value.is_some(), cfg.reference.is_some(), cfg.base_price];
    if sources.iter().filter(|&&s| s).count() != 1 {
        return Err(NodeError::InvalidConfig {
            reason: "factor needs exactly one of 'value', 'reference' or 'basePrice'".into(),
        });
    }
    Ok(())
}

fn convert_value(cfg: &ConvertConfig, value: Decimal, env: &Environment<'_>) -> Result<Decimal, NodeError> {
    let density = match (&cfg.density, &cfg.density_reference) {
        (Some(d), _) => Some(*d),
        (None, Some(key)) => Some(
            env.context.lookup(key).ok_or_else(|| NodeError::UnresolvedReference { key: key.clone() })?,
        ),
        (None, None) => None,
    };

    let context_rates = ContextRates(env.context);
    let fx: &dyn FxRates = match env.fx {
        Some(fx) => fx,
        None => &context_rates,
    };

    let bridges = Bridges { units: env.units, fx: Some(fx), fx_policy: cfg.fx_policy.as_deref(), density };
    Ok(convert::convert_expression(value, &cfg.from, &cfg.to, &bridges)?)
}

/// Folds the inputs left to right with the configured operator.
fn combine(cfg: &CombineConfig, inputs: &[NodeInput]) -> Result<NodeOutput, NodeError> {
    let (first, rest) = inputs
        .split_first()
        .ok_or(NodeError::Arity { node_type: "combine", expected: "at least 1", actual: 0 })?;

    let fold = |f: fn(Decimal, Decimal) -> Result<Decimal, decimal::ArithmeticError>| {
        rest.iter().try_fold(first.value, |acc, input| f(acc, input.value))
    };

    let value = match cfg.operator {
        CombineOperator::Add => fold(decimal::add)?,
        CombineOperator::Subtract => fold(decimal::subtract)?,
        CombineOperator::Multiply => fold(decimal::multiply)?,
        CombineOperator::Divide => fold(decimal::divide)?,
        CombineOperator::Average => {
            decimal::divide(fold(decimal::add)?, Decimal::from(inputs.len()))?
        }
        CombineOperator::WeightedAverage => {
            let weights = cfg.weights.as_deref().unwrap_or_default();
            if weights.len() != inputs.len() {
                return Err(NodeError::WeightMismatch { weights: weights.len(), inputs: inputs.len() });
            }
            let terms = inputs
                .iter()
                .zip(weights)
                .map(|(input, &w)| decimal::multiply(input.value, w))
                .collect::<Result<Vec<_>, _>>()?;
            let total_weight = decimal::sum(weights.iter().copied())?;
            let value = decimal::divide(decimal::sum(terms.iter().copied())?, total_weight)?;
            return Ok(NodeOutput { value, breakdown: Some(Breakdown::WeightedTerms { terms, total_weight }) });
        }
    };
    Ok(value.into())
}

/// Picks (calculated, base) from exactly two inputs.
///
/// Declared edge roles win; a single declared role implies the other. With no
/// roles, the first edge is the calculated value and the second the base.
fn controls_inputs(inputs: &[NodeInput]) -> Result<(Decimal, Decimal), NodeError> {
    expect_arity("controls", "exactly 2", inputs, 2)?;
    let (a, b) = (inputs[0], inputs[1]);

    use EdgeRole::*;
    match (a.role, b.role) {
        (None, None) | (Some(Calculated), Some(Base)) | (Some(Calculated), None) | (None, Some(Base)) => {
            Ok((a.value, b.value))
        }
        (Some(Base), Some(Calculated)) | (Some(Base), None) | (None, Some(Calculated)) => Ok((b.value, a.value)),
        (Some(role), Some(_)) => Err(NodeError::InvalidConfig {
            reason: format!("both controls inputs declare the '{:?}' role", role).to_lowercase(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::convert::StandardUnits;
    use crate::compute::decimal::ArithmeticError;
    use crate::store::{ControlsConfig, TransformConfig};
    use rust_decimal_macros::dec;

    fn with_env<T>(context: &EvaluationContext, f: impl FnOnce(&Environment<'_>) -> T) -> T {
        let policy = DecimalPolicy::default();
        let env = Environment { context, policy: &policy, units: &StandardUnits, fx: None };
        f(&env)
    }

    fn inputs(values: &[Decimal]) -> Vec<NodeInput> {
        values.iter().map(|&v| NodeInput::new(v)).collect()
    }

    fn eval(kind: &NodeKind, values: &[Decimal], context: &EvaluationContext) -> Result<NodeOutput, NodeError> {
        with_env(context, |env| evaluate(kind, &inputs(values), env))
    }

    fn combine_kind(operator: CombineOperator, weights: Option<Vec<Decimal>>) -> NodeKind {
        NodeKind::Combine(CombineConfig { operator, weights })
    }

    #[test]
    fn test_factor_sources() {
        let ctx = EvaluationContext::new().with_value("BRENT", dec!(82)).with_base_price(dec!(100));

        let constant = NodeKind::Factor(FactorConfig { value: Some(dec!(7)), ..Default::default() });
        assert_eq!(eval(&constant, &[], &ctx).unwrap().value, dec!(7));

        let reference = NodeKind::Factor(FactorConfig { reference: Some("BRENT".into()), ..Default::default() });
        assert_eq!(eval(&reference, &[], &ctx).unwrap().value, dec!(82));

        let base = NodeKind::Factor(FactorConfig { base_price: true, ..Default::default() });
        assert_eq!(eval(&base, &[], &ctx).unwrap().value, dec!(100));
    }

    #[test]
    fn test_factor_missing_reference_uses_default_or_fails() {
        let ctx = EvaluationContext::new();
        let with_default = NodeKind::Factor(FactorConfig {
            reference: Some("WTI".into()),
            default: Some(dec!(60)),
            ..Default::default()
        });
        assert_eq!(eval(&with_default, &[], &ctx).unwrap().value, dec!(60));

        let without = NodeKind::Factor(FactorConfig { reference: Some("WTI".into()), ..Default::default() });
        assert_eq!(eval(&without, &[], &ctx).unwrap_err(), NodeError::UnresolvedReference { key: "WTI".into() });

        let base = NodeKind::Factor(FactorConfig { base_price: true, ..Default::default() });
        assert!(matches!(eval(&base, &[], &ctx), Err(NodeError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_factor_needs_exactly_one_source() {
        let ctx = EvaluationContext::new();
        let none = NodeKind::Factor(FactorConfig::default());
        assert!(matches!(eval(&none, &[], &ctx), Err(NodeError::InvalidConfig { .. })));

        let both = NodeKind::Factor(FactorConfig { value: Some(dec!(1)), base_price: true, ..Default::default() });
        assert!(matches!(eval(&both, &[], &ctx), Err(NodeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_combine_folds_left_to_right() {
        let ctx = EvaluationContext::new();
        let vals = [dec!(100), dec!(20), dec!(5)];
        assert_eq!(eval(&combine_kind(CombineOperator::Add, None), &vals, &ctx).unwrap().value, dec!(125));
        assert_eq!(eval(&combine_kind(CombineOperator::Subtract, None), &vals, &ctx).unwrap().value, dec!(75));
        assert_eq!(eval(&combine_kind(CombineOperator::Multiply, None), &vals, &ctx).unwrap().value, dec!(10000));
        assert_eq!(eval(&combine_kind(CombineOperator::Divide, None), &vals, &ctx).unwrap().value, dec!(1));
        assert_eq!(
            eval(&combine_kind(CombineOperator::Average, None), &[dec!(1), dec!(2)], &ctx).unwrap().value,
            dec!(1.5)
        );
    }

    #[test]
    fn test_combine_divide_by_zero_operand() {
        let err = eval(&combine_kind(CombineOperator::Divide, None), &[dec!(1), dec!(0)], &EvaluationContext::new())
            .unwrap_err();
        assert_eq!(err, NodeError::Arithmetic(ArithmeticError::DivisionByZero));
    }

    #[test]
    fn test_weighted_average() {
        let kind = combine_kind(CombineOperator::WeightedAverage, Some(vec![dec!(0.6), dec!(0.4)]));
        let out = eval(&kind, &[dec!(100), dec!(50)], &EvaluationContext::new()).unwrap();
        assert_eq!(out.value, dec!(80));
        assert_eq!(
            out.breakdown,
            Some(Breakdown::WeightedTerms { terms: vec![dec!(60), dec!(20)], total_weight: dec!(1) })
        );
    }

    #[test]
    fn test_weighted_average_mismatch_never_averages() {
        let ctx = EvaluationContext::new();
        let kind = combine_kind(CombineOperator::WeightedAverage, Some(vec![dec!(1), dec!(2), dec!(3)]));
        assert_eq!(
            eval(&kind, &[dec!(1), dec!(2)], &ctx).unwrap_err(),
            NodeError::WeightMismatch { weights: 3, inputs: 2 }
        );
        let unweighted = combine_kind(CombineOperator::WeightedAverage, None);
        assert_eq!(
            eval(&unweighted, &[dec!(1)], &ctx).unwrap_err(),
            NodeError::WeightMismatch { weights: 0, inputs: 1 }
        );
    }

    #[test]
    fn test_combine_without_inputs() {
        let err = eval(&combine_kind(CombineOperator::Add, None), &[], &EvaluationContext::new()).unwrap_err();
        assert!(matches!(err, NodeError::Arity { actual: 0, .. }));
    }

    #[test]
    fn test_controls_roles() {
        let kind = NodeKind::Controls(ControlsConfig { cap: Some(dec!(5)), ..Default::default() });
        let ctx = EvaluationContext::new();

        // Declaration order: first calculated, second base.
        assert_eq!(eval(&kind, &[dec!(110), dec!(100)], &ctx).unwrap().value, dec!(105));

        // Named roles override declaration order.
        let swapped = [
            NodeInput { value: dec!(100), role: Some(EdgeRole::Base) },
            NodeInput { value: dec!(110), role: None },
        ];
        let out = with_env(&ctx, |env| evaluate(&kind, &swapped, env)).unwrap();
        assert_eq!(out.value, dec!(105));
        assert!(matches!(out.breakdown, Some(Breakdown::Controls(_))));

        let clash = [
            NodeInput { value: dec!(100), role: Some(EdgeRole::Base) },
            NodeInput { value: dec!(110), role: Some(EdgeRole::Base) },
        ];
        assert!(matches!(with_env(&ctx, |env| evaluate(&kind, &clash, env)), Err(NodeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_controls_requires_two_inputs() {
        let kind = NodeKind::Controls(ControlsConfig::default());
        let err = eval(&kind, &[dec!(1)], &EvaluationContext::new()).unwrap_err();
        assert_eq!(err, NodeError::Arity { node_type: "controls", expected: "exactly 2", actual: 1 });
    }

    #[test]
    fn test_convert_uses_context_fx_and_density() {
        let ctx = EvaluationContext::new().with_value("fx:EUR/USD", dec!(1.1)).with_value("DENSITY:diesel", dec!(0.84));
        let eur_to_usd = NodeKind::Convert(ConvertConfig { from: "EUR/t".into(), to: "USD/t".into(), ..Default::default() });
        assert_eq!(eval(&eur_to_usd, &[dec!(500)], &ctx).unwrap().value, dec!(550));

        let per_litre = NodeKind::Convert(ConvertConfig {
            from: "USD/l".into(),
            to: "USD/kg".into(),
            density_reference: Some("DENSITY:diesel".into()),
            ..Default::default()
        });
        assert_eq!(eval(&per_litre, &[dec!(0.84)], &ctx).unwrap().value, dec!(1));
    }

    #[test]
    fn test_convert_incompatible_units() {
        let kind = NodeKind::Convert(ConvertConfig { from: "USD/t".into(), to: "USD/bbl".into(), ..Default::default() });
        let err = eval(&kind, &[dec!(1)], &EvaluationContext::new()).unwrap_err();
        assert!(matches!(err, NodeError::IncompatibleUnits { .. }));
    }

    #[test]
    fn test_transform_and_output_are_single_input() {
        let ctx = EvaluationContext::new();
        let kind = NodeKind::Transform(TransformConfig { operation: "scale".into(), factor: Some(dec!(2)), ..Default::default() });
        assert_eq!(eval(&kind, &[dec!(4)], &ctx).unwrap().value, dec!(8));
        assert!(matches!(eval(&kind, &[dec!(4), dec!(5)], &ctx), Err(NodeError::Arity { .. })));
        assert_eq!(eval(&NodeKind::Output, &[dec!(3)], &ctx).unwrap().value, dec!(3));
    }
}
