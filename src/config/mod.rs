//! Operator configuration.

pub mod options;

pub use options::{FunctionConfig, OpNorm};
