//! linop: composable linear and affine operators over Faer
//!
//! This crate provides matrix-backed, factorization-backed, affine, matrix-free
//! and Kronecker-product operators behind one capability-query and evaluation
//! protocol, for solvers that apply, invert and update operators depending on a
//! parameter and time without re-allocating on every call.

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod operator;

// Re-exports for convenience
pub use config::*;
pub use core::*;
pub use error::*;
pub use matrix::{CsrMatrix, DenseMatrix, SparseMatrix};
pub use operator::*;
