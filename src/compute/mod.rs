//! Evaluation of a parsed pricing graph: decimal policy, per-kind node
//! semantics, the Controls pipeline and the execution engine.
pub mod context;
pub mod controls;
pub mod convert;
pub mod decimal;
pub mod engine;
pub mod evaluator;
pub mod ledger;
pub mod transform;

pub use context::{EvaluationContext, Overrides};
pub use convert::{ContextRates, ConversionError, FxRates, StandardUnits, UnitConverter};
pub use decimal::{ArithmeticError, DecimalPolicy, RoundingMode};
pub use engine::{evaluate_json, execute, Engine, EngineConfig, ExecutionResult};
pub use evaluator::Breakdown;
pub use ledger::{ExecutionError, NodeError};
