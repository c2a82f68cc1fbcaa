//! Graph algorithms and unit analysis shared by the parser, validator and engine.
pub mod topology;
pub mod units;

pub use units::{ParseUnitError, ParsedUnit};
