//! Defines the error types for the validation module.

/// The specific category of a validation error. Lets callers branch on the
/// problem without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    /// A node has the wrong number of incoming edges for its kind.
    Arity,
    /// A weighted average declares a different number of weights than inputs.
    WeightMismatch,
    /// Cap/floor, trigger band, spike sharing or input roles are inconsistent.
    ControlsConfig,
    /// A Convert node's units cannot be bridged (e.g. `USD/t` to `USD/MWh`).
    UnitMismatch,
    /// A Transform names an operation the engine does not know.
    UnknownOperation,
    /// Any other config problem, such as a factor with no value source.
    InvalidConfig,
}

/// A structured error report from the static analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// The id of the node where the error was detected.
    pub node_id: String,
    /// The category of the error.
    pub error_type: ValidationErrorType,
    /// A human-readable message explaining the error.
    pub message: String,
}
