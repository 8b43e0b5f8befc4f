//! Matrix module: dense helpers and the CSR type operators convert into.

pub mod dense;
pub use dense::DenseMatrix;
pub mod sparse;
pub use sparse::{CsrMatrix, SparseMatrix};
