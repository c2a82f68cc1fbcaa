use crate::compute::{Engine, EvaluationContext, ExecutionError, ExecutionResult};
use crate::display::trace;
use crate::error::PamError;
use crate::graph::{GraphError, PricingGraph};
use crate::validation::{ValidationError, Validator};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn graph_err(e: GraphError) -> PyErr { PyValueError::new_err(e.to_string()) }
fn json_err(e: serde_json::Error) -> PyErr { PyValueError::new_err(e.to_string()) }
fn exec_err(e: ExecutionError) -> PyErr { PyRuntimeError::new_err(e.to_string()) }

fn pam_err(e: PamError) -> PyErr {
    match e {
        PamError::Execution(e) => exec_err(e),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn result_json(result: &ExecutionResult) -> PyResult<String> {
    serde_json::to_string(result).map_err(json_err)
}

fn validation_json(graph: &PricingGraph) -> PyResult<String> {
    let errors: Vec<ValidationError> = Validator::new(graph).validate().err().unwrap_or_default();
    serde_json::to_string(&errors).map_err(json_err)
}

/// Parses both documents, executes once and returns the result as JSON.
#[pyfunction]
pub fn evaluate_json(graph_json: &str, context_json: &str) -> PyResult<String> {
    let result = crate::compute::evaluate_json(graph_json, context_json).map_err(pam_err)?;
    result_json(&result)
}

/// Returns the static validation report as a JSON array; empty when clean.
/// Structural problems (cycles, dangling edges) raise `ValueError`.
#[pyfunction]
pub fn validate_json(graph_json: &str) -> PyResult<String> {
    let graph = PricingGraph::from_json(graph_json).map_err(graph_err)?;
    validation_json(&graph)
}

/// A parsed graph kept on the Rust side, so Python can evaluate many items
/// without re-parsing the formula.
#[pyclass(name = "_PamGraph", frozen)]
pub struct PyPamGraph {
    inner: PricingGraph,
}

impl PyPamGraph {
    fn context(json: &str) -> PyResult<EvaluationContext> {
        EvaluationContext::from_json(json).map_err(json_err)
    }
}

#[pymethods]
impl PyPamGraph {
    #[new]
    pub fn new(graph_json: &str) -> PyResult<Self> {
        Ok(Self { inner: PricingGraph::from_json(graph_json).map_err(graph_err)? })
    }

    pub fn evaluate(&self, context_json: &str) -> PyResult<String> {
        let result = Engine::new(&self.inner).execute(&Self::context(context_json)?).map_err(exec_err)?;
        result_json(&result)
    }

    /// Evaluates a batch of item contexts in parallel. The first failing item
    /// raises; results keep the input order otherwise.
    pub fn evaluate_many(&self, context_jsons: Vec<String>) -> PyResult<Vec<String>> {
        let contexts = context_jsons.iter().map(|c| Self::context(c)).collect::<PyResult<Vec<_>>>()?;
        Engine::new(&self.inner)
            .execute_many(&contexts)
            .into_iter()
            .map(|r| r.map_err(exec_err).and_then(|result| result_json(&result)))
            .collect()
    }

    pub fn validate(&self) -> PyResult<String> {
        validation_json(&self.inner)
    }

    pub fn trace(&self, context_json: &str) -> PyResult<String> {
        let result = Engine::new(&self.inner).execute(&Self::context(context_json)?).map_err(exec_err)?;
        Ok(trace::format_trace(&self.inner, &result))
    }

    pub fn topological_order(&self) -> Vec<String> {
        self.inner.topological_ids().into_iter().map(str::to_string).collect()
    }

    pub fn unreachable(&self) -> Vec<String> {
        self.inner.unreachable().into_iter().map(str::to_string).collect()
    }

    pub fn dependents_of(&self, node_id: &str) -> PyResult<Vec<String>> {
        self.inner
            .dependents_of(node_id)
            .map(|ids| ids.into_iter().map(str::to_string).collect())
            .ok_or_else(|| PyValueError::new_err(format!("Unknown node '{}'", node_id)))
    }

    pub fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(graph_err)
    }

    pub fn node_count(&self) -> usize { self.inner.node_count() }
}
