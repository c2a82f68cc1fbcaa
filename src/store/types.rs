use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dense arena handle. Assigned in node declaration order, so comparing two
/// ids compares their declaration positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// The type tag of a node as written in a graph definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Factor,
    Transform,
    Convert,
    Combine,
    Controls,
    Output,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Factor => "factor",
            NodeType::Transform => "transform",
            NodeType::Convert => "convert",
            NodeType::Combine => "combine",
            NodeType::Controls => "controls",
            NodeType::Output => "output",
        }
    }
}

/// Which Controls input an edge feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeRole {
    Calculated,
    Base,
}

/// A leaf value: a constant, a context reference, or the item's base price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Used only when `reference` is absent from the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Decimal>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub base_price: bool,
}

/// The operation tag is kept as written and resolved at evaluation time, so an
/// unknown tag surfaces as a node error rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransformConfig {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub places: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConvertConfig {
    pub from: String,
    pub to: String,
    /// Mass per volume in kg/l, for mass <-> volume conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_policy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    #[serde(alias = "weighted-average", alias = "weightedAverage")]
    WeightedAverage,
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CombineConfig {
    pub operator: CombineOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<Decimal>>,
}

/// Percent range, inclusive on both ends, inside which a delta is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerBand {
    pub lower: Decimal,
    pub upper: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareDirection {
    Above,
    Below,
    Both,
}

impl ShareDirection {
    pub fn shares_above(&self) -> bool { matches!(self, ShareDirection::Above | ShareDirection::Both) }
    pub fn shares_below(&self) -> bool { matches!(self, ShareDirection::Below | ShareDirection::Both) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpikeSharing {
    pub share_percent: Decimal,
    pub direction: ShareDirection,
}

/// Signed percent limits applied to the delta between a calculated and a base price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_band: Option<TriggerBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike_sharing: Option<SpikeSharing>,
}

/// A node's behaviour together with its configuration.
///
/// Closed set: adding a kind forces every `match` in the evaluator, the
/// validator and the trace renderer to be updated.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Factor(FactorConfig),
    Transform(TransformConfig),
    Convert(ConvertConfig),
    Combine(CombineConfig),
    Controls(ControlsConfig),
    /// Pass-through of a single input, used to mark the graph's result.
    Output,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Factor(_) => NodeType::Factor,
            NodeKind::Transform(_) => NodeType::Transform,
            NodeKind::Convert(_) => NodeType::Convert,
            NodeKind::Combine(_) => NodeType::Combine,
            NodeKind::Controls(_) => NodeType::Controls,
            NodeKind::Output => NodeType::Output,
        }
    }

    /// Builds a typed node from its tag and raw JSON config. A missing or
    /// `null` config is read as an empty object.
    pub fn from_config(node_type: NodeType, config: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let config = match config {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        Ok(match node_type {
            NodeType::Factor => NodeKind::Factor(serde_json::from_value(config)?),
            NodeType::Transform => NodeKind::Transform(serde_json::from_value(config)?),
            NodeType::Convert => NodeKind::Convert(serde_json::from_value(config)?),
            NodeType::Combine => NodeKind::Combine(serde_json::from_value(config)?),
            NodeType::Controls => NodeKind::Controls(serde_json::from_value(config)?),
            NodeType::Output => NodeKind::Output,
        })
    }

    /// Inverse of [`NodeKind::from_config`].
    pub fn to_config(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            NodeKind::Factor(c) => serde_json::to_value(c),
            NodeKind::Transform(c) => serde_json::to_value(c),
            NodeKind::Convert(c) => serde_json::to_value(c),
            NodeKind::Combine(c) => serde_json::to_value(c),
            NodeKind::Controls(c) => serde_json::to_value(c),
            NodeKind::Output => Ok(serde_json::Value::Object(Default::default())),
        }
    }
}
