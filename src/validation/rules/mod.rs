pub(crate) mod arity;
pub(crate) mod config;
pub(crate) mod controls;
pub(crate) mod units;
