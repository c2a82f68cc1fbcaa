//! Graph-based pricing engine for Price Adjustment Mechanisms.
//!
//! A formula is a DAG of typed nodes (factors, transforms, unit conversions,
//! combinations and Controls collars) parsed once into a [`PricingGraph`] and
//! evaluated per item against a pre-resolved [`EvaluationContext`].

pub mod analysis;
pub mod compute;
pub mod display;
pub mod error;
pub mod graph;
pub mod store;
pub mod validation;

#[cfg(feature = "python")]
mod bindings {
    pub mod python;
}

pub use compute::{
    evaluate_json, execute, Breakdown, DecimalPolicy, Engine, EngineConfig, EvaluationContext, ExecutionError,
    ExecutionResult, FxRates, NodeError, RoundingMode, UnitConverter,
};
pub use error::PamError;
pub use graph::{GraphDefinition, GraphError, PricingGraph};
pub use validation::{ValidationError, Validator};

// --- Module Definition ---
/// Defines the `pam._core` Python module. The leading underscore marks it as
/// the compiled internal layer under the pure-Python package.
#[cfg(feature = "python")]
#[pyo3::pymodule]
fn _core(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    use pyo3::prelude::*;
    m.add_function(wrap_pyfunction!(bindings::python::evaluate_json, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::python::validate_json, m)?)?;
    m.add_class::<bindings::python::PyPamGraph>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
