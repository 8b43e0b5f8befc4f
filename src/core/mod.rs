//! Core traits and dense kernels shared by every operator.

pub mod traits;
pub mod wrappers;

pub use traits::{LinearOperator, MatVec, OpFlags, OperatorTraits, Parameter, Scalar};
