//! Parser for compound unit expressions such as `USD/t`, `EUR/MWh` or `kg*m/s^2`.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid unit expression '{0}'")]
pub struct ParseUnitError(pub String);

/// Largest exponent magnitude accepted for a single symbol.
pub const MAX_EXPONENT: i32 = 12;

fn in_range(exp: &i32) -> bool {
    (-MAX_EXPONENT..=MAX_EXPONENT).contains(exp)
}

/// A unit expression reduced to symbol -> exponent, with cancelled terms removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    terms: BTreeMap<String, i32>,
}

impl ParsedUnit {
    pub fn parse(s: &str) -> Result<Self, ParseUnitError> {
        // Reject empty or whitespace-only strings explicitly
        if s.trim().is_empty() {
            return Err(ParseUnitError(s.to_string()));
        }

        let mut terms = BTreeMap::new();
        let mut parts = s.split('/');

        if let Some(num) = parts.next() { Self::parse_product(s, num, 1, &mut terms)?; }
        if let Some(den) = parts.next() { Self::parse_product(s, den, -1, &mut terms)?; }
        if parts.next().is_some() { return Err(ParseUnitError(s.to_string())); } // Multiple slashes

        terms.retain(|_, exp| *exp != 0);
        Ok(Self { terms })
    }

    fn parse_product(
        full: &str,
        s: &str,
        sign: i32,
        terms: &mut BTreeMap<String, i32>,
    ) -> Result<(), ParseUnitError> {
        let err = || ParseUnitError(full.to_string());
        if s.trim() == "1" { return Ok(()); }
        if s.trim().is_empty() { return Err(err()); }
        for factor in s.split('*') {
            let mut parts = factor.split('^');
            let base = parts.next().ok_or_else(err)?.trim();
            if base.is_empty() { return Err(err()); }
            let exp = parts.next().unwrap_or("1").trim().parse::<i32>().map_err(|_| err())?;
            if parts.next().is_some() { return Err(err()); }
            let exp = exp.checked_mul(sign).filter(in_range).ok_or_else(err)?;
            let total = terms.entry(base.to_string()).or_insert(0);
            *total = total.checked_add(exp).filter(in_range).ok_or_else(err)?;
        }
        Ok(())
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, i32)> {
        self.terms.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (num, den): (Vec<_>, Vec<_>) = self.terms.iter().partition(|&(_, &v)| v > 0);

        let render = |terms: Vec<(&String, &i32)>| -> String {
            if terms.is_empty() { return "1".to_string(); }
            terms
                .into_iter()
                .map(|(k, v)| if v.abs() == 1 { k.clone() } else { format!("{}^{}", k, v.abs()) })
                .collect::<Vec<_>>()
                .join("*")
        };

        let n_str = render(num);
        if den.is_empty() {
            write!(f, "{}", n_str)
        } else {
            write!(f, "{}/{}", n_str, render(den))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("USD", "USD")]
    #[case("USD/t", "USD/t")]
    #[case("EUR/MWh", "EUR/MWh")]
    #[case("t*USD", "USD*t")] // Canonical reordering
    #[case("m*m", "m^2")]
    #[case("m^2/m", "m")] // Cancellation
    #[case("USD/USD", "1")] // Full cancellation to dimensionless
    #[case("1/bbl", "1/bbl")]
    fn test_parse_valid(#[case] input: &str, #[case] expected: &str) {
        let u = ParsedUnit::parse(input).expect("Failed to parse");
        assert_eq!(u.to_string(), expected, "Input: {}", input);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("USD//MWh")]
    #[case("USD/t/d")]
    #[case("USD^bar")]
    #[case("USD*/t")]
    #[case("1/kg^-2147483648")]
    #[case("kg^2147483647*kg")]
    #[case("kg^13")]
    #[case("kg^12*kg")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(ParsedUnit::parse(input).is_err(), "Should fail: '{}'", input);
    }

    #[test]
    fn test_terms_carry_signed_exponents() {
        let u = ParsedUnit::parse("USD/m^3").unwrap();
        let terms: Vec<_> = u.terms().collect();
        assert_eq!(terms, vec![("USD", 1), ("m", -3)]);
        assert!(ParsedUnit::parse("t/t").unwrap().is_dimensionless());
    }
}
