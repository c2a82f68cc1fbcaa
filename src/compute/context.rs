//! The caller-supplied inputs of one execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What-if values supplied by the scenario layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    /// Replaces a node's evaluated value, keyed by node id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<String, Decimal>,
    /// Shadows a reference key in `values` (index-level override).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Decimal>,
}

/// Pre-resolved external data for one item: index series values, FX rates,
/// item attributes and the contract base price.
///
/// The engine never fetches anything itself; every lookup is an in-memory read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationContext {
    pub values: BTreeMap<String, Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_price: Option<Decimal>,
    pub overrides: Overrides,
}

impl EvaluationContext {
    pub fn new() -> Self { Self::default() }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Decimal) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_base_price(mut self, value: Decimal) -> Self {
        self.base_price = Some(value);
        self
    }

    pub fn with_reference_override(mut self, key: impl Into<String>, value: Decimal) -> Self {
        self.overrides.references.insert(key.into(), value);
        self
    }

    pub fn with_node_override(mut self, node_id: impl Into<String>, value: Decimal) -> Self {
        self.overrides.nodes.insert(node_id.into(), value);
        self
    }

    /// Resolves a reference key, preferring an index-level override.
    pub fn lookup(&self, key: &str) -> Option<Decimal> {
        self.overrides.references.get(key).or_else(|| self.values.get(key)).copied()
    }

    pub fn node_override(&self, node_id: &str) -> Option<Decimal> {
        self.overrides.nodes.get(node_id).copied()
    }
}
