//! Dense‐matrix helpers on top of Faer.
//!
//! This module provides the `DenseMatrix` trait (construction from raw column-major
//! storage) and the two dense reductions the operator layer needs: the literal
//! Kronecker product used for materialisation, and the induced 1-norm.

use crate::core::traits::Scalar;
use faer::{Mat, MatRef};

/// Blanket impl so any Faer Mat<T> is a DenseMatrix.
pub trait DenseMatrix<T> {
    /// Construct from raw column-major storage.
    fn from_raw(nrows: usize, ncols: usize, data: Vec<T>) -> Self;
    /// Construct from row-major nested rows, as matrices are usually written down.
    fn from_rows(rows: &[&[T]]) -> Self;
}

impl<T: Scalar> DenseMatrix<T> for Mat<T> {
    fn from_raw(nrows: usize, ncols: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), nrows * ncols, "Raw storage has incorrect length");
        Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i])
    }

    fn from_rows(rows: &[&[T]]) -> Self {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |r| r.len());
        assert!(rows.iter().all(|r| r.len() == ncols), "Rows must have equal length");
        Mat::from_fn(nrows, ncols, |i, j| rows[i][j])
    }
}

/// Literal Kronecker product `A ⊗ B`: block `(i, j)` is `A[i, j] · B`.
pub fn kron<T: Scalar>(a: MatRef<'_, T>, b: MatRef<'_, T>) -> Mat<T> {
    let mut dst = Mat::zeros(a.nrows() * b.nrows(), a.ncols() * b.ncols());
    faer::linalg::kron::kron(dst.as_mut(), a, b);
    dst
}

/// Induced 1-norm: largest absolute column sum.
pub fn opnorm_one<T: Scalar>(a: MatRef<'_, T>) -> T {
    let mut best = T::zero();
    for j in 0..a.ncols() {
        let mut sum = T::zero();
        for i in 0..a.nrows() {
            sum = sum + a[(i, j)].abs();
        }
        if sum > best {
            best = sum;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kron_matches_block_layout() {
        let a = Mat::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = Mat::from_rows(&[&[0.0, 1.0], &[1.0, 0.0]]);
        let k = kron(a.as_ref(), b.as_ref());
        let expected = Mat::from_rows(&[
            &[0.0, 1.0, 0.0, 2.0],
            &[1.0, 0.0, 2.0, 0.0],
            &[0.0, 3.0, 0.0, 4.0],
            &[3.0, 0.0, 4.0, 0.0],
        ]);
        assert_eq!(k, expected);
    }

    #[test]
    fn opnorm_one_is_max_column_sum() {
        let a = Mat::from_rows(&[&[1.0, -7.0], &[-2.0, 3.0]]);
        assert_eq!(opnorm_one(a.as_ref()), 10.0);
    }

    #[test]
    fn from_raw_is_column_major() {
        let a = Mat::from_raw(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a[(1, 0)], 2.0);
        assert_eq!(a[(0, 1)], 3.0);
    }
}
