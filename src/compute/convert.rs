//! Unit and currency conversion used by Convert nodes.
//!
//! The engine only depends on the [`UnitConverter`] and [`FxRates`]
//! contracts. Callers inject their own providers; [`StandardUnits`] and
//! [`ContextRates`] are the defaults.
//!
//! Expressions may be compound (`USD/t`, `EUR/MWh`). Each side is reduced to
//! its terms; terms are matched by dimension, currencies are bridged with an FX
//! rate, and mass and volume are bridged with a density when one is supplied.

use super::context::EvaluationContext;
use super::decimal::{self, ArithmeticError};
use crate::analysis::ParsedUnit;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Invalid unit expression '{0}'")]
    InvalidExpression(String),
    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("Cannot convert '{from}' to '{to}': {reason}")]
    Incompatible { from: String, to: String, reason: String },
    #[error("No FX rate for {from}/{to}{}", policy.as_deref().map(|p| format!(" under policy '{}'", p)).unwrap_or_default())]
    MissingRate { from: String, to: String, policy: Option<String> },
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Mass,
    Volume,
    Energy,
}

/// A physical unit: its dimension and its size in that dimension's base unit
/// (kg, l, MJ).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitDef {
    pub dimension: Dimension,
    pub factor: Decimal,
}

/// Unit lookup collaborator.
pub trait UnitConverter: Send + Sync {
    fn lookup(&self, symbol: &str) -> Option<UnitDef>;

    /// Converts a value between two unit expressions of the same dimensions.
    fn convert(&self, value: Decimal, from: &str, to: &str) -> Result<Decimal, ConversionError> {
        convert_expression(value, from, to, &Bridges::units_only(self))
    }

    /// Same as [`UnitConverter::convert`], bridging mass and volume with a
    /// density in kg/l.
    fn convert_with_density(
        &self,
        value: Decimal,
        from: &str,
        to: &str,
        density: Decimal,
    ) -> Result<Decimal, ConversionError> {
        convert_expression(value, from, to, &Bridges { units: self, fx: None, fx_policy: None, density: Some(density) })
    }
}

/// FX rate collaborator. A rate converts one unit of `from` into `to`.
pub trait FxRates: Send + Sync {
    fn rate(&self, from: &str, to: &str, policy: Option<&str>) -> Result<Decimal, ConversionError>;
}

/// Built-in table of common commodity units.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

impl UnitConverter for StandardUnits {
    fn lookup(&self, symbol: &str) -> Option<UnitDef> {
        use Dimension::*;
        let (dimension, factor) = match symbol {
            "g" => (Mass, dec!(0.001)),
            "kg" => (Mass, Decimal::ONE),
            "t" | "mt" | "tonne" => (Mass, dec!(1000)),
            "lb" => (Mass, dec!(0.45359237)),
            "oz" => (Mass, dec!(0.028349523125)),
            "ml" => (Volume, dec!(0.001)),
            "l" | "L" => (Volume, Decimal::ONE),
            "m3" => (Volume, dec!(1000)),
            "gal" => (Volume, dec!(3.785411784)),
            "bbl" => (Volume, dec!(158.987294928)),
            "MJ" => (Energy, Decimal::ONE),
            "GJ" => (Energy, dec!(1000)),
            "kWh" => (Energy, dec!(3.6)),
            "MWh" => (Energy, dec!(3600)),
            "therm" => (Energy, dec!(105.505585262)),
            "MMBtu" => (Energy, dec!(1055.05585262)),
            _ => return None,
        };
        Some(UnitDef { dimension, factor })
    }
}

/// Reads pre-resolved rates from the evaluation context.
///
/// A rate for `EUR` -> `USD` is stored under `fx:EUR/USD`, or
/// `fx:EUR/USD@<policy>` when a policy is requested. The inverse pair is used
/// when only that one is present.
pub struct ContextRates<'a>(pub &'a EvaluationContext);

impl ContextRates<'_> {
    fn key(from: &str, to: &str, policy: Option<&str>) -> String {
        match policy {
            Some(p) => format!("fx:{}/{}@{}", from, to, p),
            None => format!("fx:{}/{}", from, to),
        }
    }
}

impl FxRates for ContextRates<'_> {
    fn rate(&self, from: &str, to: &str, policy: Option<&str>) -> Result<Decimal, ConversionError> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        if let Some(rate) = self.0.lookup(&Self::key(from, to, policy)) {
            return Ok(rate);
        }
        if let Some(inverse) = self.0.lookup(&Self::key(to, from, policy)) {
            return Ok(decimal::divide(Decimal::ONE, inverse)?);
        }
        Err(ConversionError::MissingRate { from: from.into(), to: to.into(), policy: policy.map(str::to_string) })
    }
}

/// Everything a conversion may need beyond the unit table.
pub struct Bridges<'a, U: UnitConverter + ?Sized> {
    pub units: &'a U,
    pub fx: Option<&'a dyn FxRates>,
    pub fx_policy: Option<&'a str>,
    /// kg per litre.
    pub density: Option<Decimal>,
}

impl<'a, U: UnitConverter + ?Sized> Bridges<'a, U> {
    pub fn units_only(units: &'a U) -> Self {
        Self { units, fx: None, fx_policy: None, density: None }
    }
}

fn is_currency(symbol: &str) -> bool {
    symbol.len() == 3 && symbol.bytes().all(|b| b.is_ascii_uppercase())
}

/// One side of a conversion, split into physical terms and currency terms.
struct Side {
    units: Vec<(UnitDef, i32)>,
    currencies: Vec<(String, i32)>,
}

impl Side {
    fn parse<U: UnitConverter + ?Sized>(expr: &str, units: &U) -> Result<Self, ConversionError> {
        let parsed = ParsedUnit::parse(expr).map_err(|_| ConversionError::InvalidExpression(expr.to_string()))?;
        let mut side = Side { units: Vec::new(), currencies: Vec::new() };
        for (symbol, exp) in parsed.terms() {
            match units.lookup(symbol) {
                Some(def) => side.units.push((def, exp)),
                None if is_currency(symbol) => side.currencies.push((symbol.to_string(), exp)),
                None => return Err(ConversionError::UnknownUnit(symbol.to_string())),
            }
        }
        Ok(side)
    }

    fn exponents(&self) -> BTreeMap<Dimension, i32> {
        let mut dims = BTreeMap::new();
        for (def, exp) in &self.units {
            *dims.entry(def.dimension).or_insert(0) += exp;
        }
        dims.retain(|_, e| *e != 0);
        dims
    }

    /// Re-expresses volume terms as mass using a density in kg/l.
    fn fold_volume_into_mass(&mut self, density: Decimal) -> Result<(), ArithmeticError> {
        for (def, _) in self.units.iter_mut() {
            if def.dimension == Dimension::Volume {
                *def = UnitDef { dimension: Dimension::Mass, factor: decimal::multiply(def.factor, density)? };
            }
        }
        Ok(())
    }

    /// Term factors raised to their exponents, split into (numerator,
    /// denominator) so the caller divides only once.
    fn scale(&self) -> Result<(Decimal, Decimal), ArithmeticError> {
        let mut num = Decimal::ONE;
        let mut den = Decimal::ONE;
        for (def, exp) in &self.units {
            let power = decimal::powi(def.factor, exp.abs())?;
            if *exp > 0 {
                num = decimal::multiply(num, power)?;
            } else {
                den = decimal::multiply(den, power)?;
            }
        }
        Ok((num, den))
    }

    fn currency(&self, expr: &str) -> Result<Option<(&str, i32)>, ConversionError> {
        match self.currencies.as_slice() {
            [] => Ok(None),
            [(code, exp)] => Ok(Some((code.as_str(), *exp))),
            _ => Err(ConversionError::InvalidExpression(expr.to_string())),
        }
    }
}

/// Converts `value` from one unit expression to another.
pub fn convert_expression<U: UnitConverter + ?Sized>(
    value: Decimal,
    from: &str,
    to: &str,
    bridges: &Bridges<'_, U>,
) -> Result<Decimal, ConversionError> {
    let incompatible = |reason: &str| ConversionError::Incompatible {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.to_string(),
    };

    let mut source = Side::parse(from, bridges.units)?;
    let mut target = Side::parse(to, bridges.units)?;

    if source.exponents() != target.exponents() {
        let density = bridges
            .density
            .ok_or_else(|| incompatible("dimensions differ and no density is configured"))?;
        source.fold_volume_into_mass(density)?;
        target.fold_volume_into_mass(density)?;
        if source.exponents() != target.exponents() {
            return Err(incompatible("dimensions differ"));
        }
    }

    // value * (source num / source den) / (target num / target den)
    let (source_num, source_den) = source.scale()?;
    let (target_num, target_den) = target.scale()?;
    let numerator = decimal::multiply(decimal::multiply(value, source_num)?, target_den)?;
    let mut result = decimal::divide(numerator, decimal::multiply(source_den, target_num)?)?;

    match (source.currency(from)?, target.currency(to)?) {
        (None, None) => {}
        (Some((a, ea)), Some((b, eb))) if ea == eb => {
            if a != b {
                let fx = bridges.fx.ok_or_else(|| incompatible("currencies differ and no FX source is available"))?;
                let rate = fx.rate(a, b, bridges.fx_policy)?;
                result = decimal::multiply(result, decimal::powi(rate, ea)?)?;
            }
        }
        _ => return Err(incompatible("currency and non-currency quantities")),
    }

    Ok(result)
}

/// Checks that `from` converts to `to` without any data at hand. Rates and
/// densities stand in as 1; only dimensions and currencies are compared.
pub fn check_compatible<U: UnitConverter + ?Sized>(
    from: &str,
    to: &str,
    units: &U,
    with_density: bool,
) -> Result<(), ConversionError> {
    struct AnyRate;
    impl FxRates for AnyRate {
        fn rate(&self, _from: &str, _to: &str, _policy: Option<&str>) -> Result<Decimal, ConversionError> {
            Ok(Decimal::ONE)
        }
    }

    let bridges = Bridges { units, fx: Some(&AnyRate), fx_policy: None, density: with_density.then_some(Decimal::ONE) };
    convert_expression(Decimal::ONE, from, to, &bridges).map(|_| ())
}
