//! Single-input transforms over an index value.

use super::context::EvaluationContext;
use super::decimal::{self, DecimalPolicy};
use super::ledger::NodeError;
use crate::store::TransformConfig;
use rust_decimal::Decimal;

/// A transform with its parameters checked.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp<'a> {
    /// `(input - prior) / prior * 100`
    PercentChange { reference: &'a str },
    /// `input / prior`, the usual index-ratio escalation term.
    Ratio { reference: &'a str },
    /// The value observed one or more periods earlier. The caller resolves the
    /// lagged observation into the context under `reference`.
    Lag { reference: &'a str },
    /// Mean of the input and each listed prior-period observation.
    PeriodAverage { references: &'a [String] },
    Scale { factor: Decimal },
    Offset { amount: Decimal },
    Round { places: u32 },
}

impl<'a> TransformOp<'a> {
    /// Names accepted in the `operation` field, in canonical spelling.
    pub const NAMES: [&'static str; 7] =
        ["percent_change", "ratio", "lag", "period_average", "scale", "offset", "round"];

    pub fn from_config(config: &'a TransformConfig) -> Result<Self, NodeError> {
        let missing = |param: &str| NodeError::InvalidConfig {
            reason: format!("transform '{}' requires '{}'", config.operation, param),
        };
        let reference = move || config.reference.as_deref().ok_or_else(|| missing("reference"));

        Ok(match canonical(&config.operation).as_str() {
            "percent_change" => TransformOp::PercentChange { reference: reference()? },
            "ratio" => TransformOp::Ratio { reference: reference()? },
            "lag" => TransformOp::Lag { reference: reference()? },
            "period_average" => {
                if config.references.is_empty() {
                    return Err(missing("references"));
                }
                TransformOp::PeriodAverage { references: &config.references }
            }
            "scale" => TransformOp::Scale { factor: config.factor.ok_or_else(|| missing("factor"))? },
            "offset" => TransformOp::Offset { amount: config.amount.ok_or_else(|| missing("amount"))? },
            "round" => TransformOp::Round { places: config.places.ok_or_else(|| missing("places"))? },
            _ => return Err(NodeError::UnknownOperation { operation: config.operation.clone() }),
        })
    }

    pub fn apply(
        &self,
        input: Decimal,
        context: &EvaluationContext,
        policy: &DecimalPolicy,
    ) -> Result<Decimal, NodeError> {
        let resolve = |key: &str| {
            context.lookup(key).ok_or_else(|| NodeError::UnresolvedReference { key: key.to_string() })
        };

        Ok(match self {
            TransformOp::PercentChange { reference } => decimal::delta_percent(resolve(*reference)?, input)?,
            TransformOp::Ratio { reference } => decimal::divide(input, resolve(*reference)?)?,
            TransformOp::Lag { reference } => resolve(*reference)?,
            TransformOp::PeriodAverage { references } => {
                let mut total = input;
                for key in references.iter() {
                    total = decimal::add(total, resolve(key.as_str())?)?;
                }
                decimal::divide(total, Decimal::from(references.len() + 1))?
            }
            TransformOp::Scale { factor } => decimal::multiply(input, *factor)?,
            TransformOp::Offset { amount } => decimal::add(input, *amount)?,
            TransformOp::Round { places } => policy.round_to(input, *places),
        })
    }
}

/// `percent-change` and `percentChange` both read as `percent_change`.
fn canonical(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.trim().chars() {
        match c {
            '-' | ' ' => out.push('_'),
            c if c.is_ascii_uppercase() => {
                out.push('_');
                out.push(c.to_ascii_lowercase());
            }
            c => out.push(c),
        }
    }
    out
}

pub fn is_known_operation(name: &str) -> bool {
    TransformOp::NAMES.contains(&canonical(name).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn config(operation: &str) -> TransformConfig {
        TransformConfig { operation: operation.into(), ..Default::default() }
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new()
            .with_value("BRENT@2024-01", dec!(80))
            .with_value("BRENT@2024-02", dec!(84))
            .with_value("BRENT@2024-03", dec!(88))
    }

    fn run(config: &TransformConfig, input: Decimal) -> Result<Decimal, NodeError> {
        TransformOp::from_config(config)?.apply(input, &ctx(), &DecimalPolicy::default())
    }

    #[rstest]
    #[case("percent_change")]
    #[case("percent-change")]
    #[case("percentChange")]
    fn test_operation_spellings(#[case] name: &str) {
        let cfg = TransformConfig { reference: Some("BRENT@2024-01".into()), ..config(name) };
        assert_eq!(run(&cfg, dec!(88)).unwrap(), dec!(10));
    }

    #[test]
    fn test_ratio_and_lag() {
        let ratio = TransformConfig { reference: Some("BRENT@2024-01".into()), ..config("ratio") };
        assert_eq!(run(&ratio, dec!(88)).unwrap(), dec!(1.1));

        let lag = TransformConfig { reference: Some("BRENT@2024-02".into()), ..config("lag") };
        assert_eq!(run(&lag, dec!(88)).unwrap(), dec!(84));
    }

    #[test]
    fn test_period_average_includes_input() {
        let cfg = TransformConfig {
            references: vec!["BRENT@2024-01".into(), "BRENT@2024-02".into()],
            ..config("period_average")
        };
        assert_eq!(run(&cfg, dec!(88)).unwrap(), dec!(84));
    }

    #[test]
    fn test_scale_offset_round() {
        let scale = TransformConfig { factor: Some(dec!(0.5)), ..config("scale") };
        assert_eq!(run(&scale, dec!(88)).unwrap(), dec!(44));
        let offset = TransformConfig { amount: Some(dec!(-2.25)), ..config("offset") };
        assert_eq!(run(&offset, dec!(88)).unwrap(), dec!(85.75));
        let round = TransformConfig { places: Some(1), ..config("round") };
        assert_eq!(run(&round, dec!(85.75)).unwrap(), dec!(85.8));
    }

    #[test]
    fn test_unknown_operation() {
        let err = run(&config("moving_median"), dec!(1)).unwrap_err();
        assert_eq!(err, NodeError::UnknownOperation { operation: "moving_median".into() });
        assert!(!is_known_operation("moving_median"));
        assert!(is_known_operation("period-average"));
    }

    #[test]
    fn test_missing_parameter_and_reference() {
        assert!(matches!(run(&config("ratio"), dec!(1)), Err(NodeError::InvalidConfig { .. })));

        let cfg = TransformConfig { reference: Some("BRENT@1999-01".into()), ..config("percent_change") };
        assert_eq!(run(&cfg, dec!(1)).unwrap_err(), NodeError::UnresolvedReference { key: "BRENT@1999-01".into() });
    }

    #[test]
    fn test_percent_change_against_zero_prior() {
        let ctx = EvaluationContext::new().with_value("ZERO", Decimal::ZERO);
        let cfg = TransformConfig { reference: Some("ZERO".into()), ..config("percent_change") };
        let op = TransformOp::from_config(&cfg).unwrap();
        assert!(matches!(op.apply(dec!(1), &ctx, &DecimalPolicy::default()), Err(NodeError::Arithmetic(_))));
    }
}
