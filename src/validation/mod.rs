//! Static analysis of a parsed graph, run before any data is resolved.
//!
//! Parsing already guarantees structure (unique ids, resolved edges,
//! acyclicity). The validator checks the things that would otherwise only
//! surface as a failed execution: arity, config sanity and unit compatibility.
pub mod error;
mod rules;
pub mod validator;

pub use error::{ValidationError, ValidationErrorType};
pub use validator::Validator;
