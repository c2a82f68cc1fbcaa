//! Human-readable rendering of execution results.
pub mod trace;

pub use trace::format_trace;
