//! Low-level node storage: the arena and the typed node configurations.
pub mod registry;
pub mod types;

pub use registry::{Link, Registry};
pub use types::*;
