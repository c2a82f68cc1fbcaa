//! Exact arithmetic for every money-bearing value in the engine.
//!
//! All node evaluations route through these helpers instead of using `f64`.
//! Rounding is never applied implicitly: intermediate results keep full
//! precision and only [`DecimalPolicy::round`] touches the scale, at the
//! output boundaries chosen by the engine.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Decimal overflow in {op}")]
    Overflow { op: &'static str },
}

/// How values are rounded at output boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    #[default]
    HalfUp,
    HalfEven,
    HalfDown,
    Up,
    Down,
    Floor,
    Ceiling,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
        }
    }
}

/// Precision and rounding applied at designated output boundaries.
///
/// Passed explicitly through the engine, so two concurrent executions may use
/// different policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecimalPolicy {
    /// Number of fractional digits kept at a boundary.
    pub scale: u32,
    pub rounding: RoundingMode,
}

impl Default for DecimalPolicy {
    fn default() -> Self {
        Self { scale: 4, rounding: RoundingMode::HalfUp }
    }
}

impl DecimalPolicy {
    pub fn new(scale: u32, rounding: RoundingMode) -> Self {
        Self { scale, rounding }
    }

    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.scale, self.rounding.strategy())
    }

    /// Rounds to an explicit scale with this policy's rounding mode.
    pub fn round_to(&self, value: Decimal, scale: u32) -> Decimal {
        value.round_dp_with_strategy(scale, self.rounding.strategy())
    }
}

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[inline]
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow { op: "add" })
}

#[inline]
pub fn subtract(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    a.checked_sub(b).ok_or(ArithmeticError::Overflow { op: "subtract" })
}

#[inline]
pub fn multiply(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow { op: "multiply" })
}

#[inline]
pub fn divide(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    a.checked_div(b).ok_or(ArithmeticError::Overflow { op: "divide" })
}

/// `value * percent / 100`
pub fn percent_of(value: Decimal, percent: Decimal) -> Result<Decimal, ArithmeticError> {
    divide(multiply(value, percent)?, HUNDRED)
}

/// `base * (1 + percent / 100)`
pub fn apply_percent_delta(base: Decimal, percent: Decimal) -> Result<Decimal, ArithmeticError> {
    add(base, percent_of(base, percent)?)
}

/// `(value - base) / base * 100`, computed as `(value - base) * 100 / base` to
/// keep the division last.
pub fn delta_percent(base: Decimal, value: Decimal) -> Result<Decimal, ArithmeticError> {
    divide(multiply(subtract(value, base)?, HUNDRED)?, base)
}

/// Integer power by squaring. Negative exponents divide.
pub fn powi(value: Decimal, exp: i32) -> Result<Decimal, ArithmeticError> {
    let mut acc = Decimal::ONE;
    let mut base = value;
    let mut n = exp.unsigned_abs();
    while n > 0 {
        if n & 1 == 1 {
            acc = multiply(acc, base)?;
        }
        n >>= 1;
        if n > 0 {
            base = multiply(base, base)?;
        }
    }
    if exp < 0 {
        divide(Decimal::ONE, acc)
    } else {
        Ok(acc)
    }
}

/// Sums a sequence, failing on overflow.
pub fn sum<I: IntoIterator<Item = Decimal>>(values: I) -> Result<Decimal, ArithmeticError> {
    values.into_iter().try_fold(Decimal::ZERO, add)
}
