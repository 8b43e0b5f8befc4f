//! Dense kernels on faer views.
//!
//! Thin entry points over faer's `matmul` and `zip!` that fix the
//! accumulation convention the operators share (`dst ← α · x + β · dst`).
//! Shape violations here are programming errors and panic; the operator
//! layer checks user-supplied shapes before calling in.

use crate::core::traits::{MatVec, Scalar};
use crate::error::OpError;
use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, MatMut, MatRef, Par, Scale, unzip, zip};

/// `dst ← α A B + β dst`. With `β = 0` the previous contents of `dst` are not read.
pub fn gemm<T: Scalar>(mut dst: MatMut<'_, T>, a: MatRef<'_, T>, b: MatRef<'_, T>, alpha: T, beta: T) {
    let accum = if beta == T::zero() {
        Accum::Replace
    } else {
        if beta != T::one() {
            dst *= Scale(beta);
        }
        Accum::Add
    };
    matmul(dst, accum, a, b, alpha, Par::Seq);
}

/// `dst ← α src + β dst`. With `β = 0` the previous contents of `dst` are not read.
pub fn axpby<T: Scalar>(dst: MatMut<'_, T>, src: MatRef<'_, T>, alpha: T, beta: T) {
    if beta == T::zero() {
        zip!(dst, src).for_each(|unzip!(d, s)| *d = alpha * *s);
    } else {
        zip!(dst, src).for_each(|unzip!(d, s)| *d = alpha * *s + beta * *d);
    }
}

/// `dst[:, j] ← dst[:, j] + α b` for every column `j`; `b` is a single column.
pub fn add_column<T: Scalar>(mut dst: MatMut<'_, T>, b: MatRef<'_, T>, alpha: T) {
    assert_eq!(b.ncols(), 1, "Offset must be a single column");
    assert_eq!(dst.nrows(), b.nrows(), "Offset has incorrect length");
    for j in 0..dst.ncols() {
        for i in 0..dst.nrows() {
            dst[(i, j)] = dst[(i, j)] + alpha * b[(i, 0)];
        }
    }
}

/// Checks that `u` has `rows` rows; returns the operand width `k`.
pub fn check_rows<T>(op: &'static str, rows: usize, u: MatRef<'_, T>) -> Result<usize, OpError> {
    if u.nrows() != rows {
        return Err(OpError::mismatch(op, (rows, u.ncols()), (u.nrows(), u.ncols())));
    }
    Ok(u.ncols())
}

/// Checks the output shape of an in-place call.
pub fn check_shape(op: &'static str, expected: (usize, usize), found: (usize, usize)) -> Result<(), OpError> {
    if expected != found {
        return Err(OpError::mismatch(op, expected, found));
    }
    Ok(())
}

/// Implements matrix-vector multiplication for `faer::Mat`.
///
/// Computes `y = A * x` where `A` is a dense matrix, `x` and `y` are vectors.
impl<T: Scalar> MatVec<Vec<T>> for Mat<T> {
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        assert_eq!(self.nrows(), y.len(), "Output vector y has incorrect length");
        assert_eq!(self.ncols(), x.len(), "Input vector x has incorrect length");
        for i in 0..self.nrows() {
            y[i] = T::zero();
            for j in 0..self.ncols() {
                y[i] = y[i] + self[(i, j)] * x[j];
            }
        }
    }
}
