//! Defines the pricing graph: its stored definition, parsing and ordering.
pub mod dag;
pub mod definition;
pub mod error;

// Re-export key types for convenient access
pub use dag::PricingGraph;
pub use definition::{EdgeDefinition, GraphDefinition, NodeDefinition};
pub use error::GraphError;
