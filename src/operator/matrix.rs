//! Matrix-backed operator.
//!
//! Wraps a dense Faer matrix plus an optional update rule that mutates the
//! matrix from the current state, parameter and time. Element access,
//! iteration and `MatVec` are forwarded to the wrapped matrix, so the operator
//! can stand in for a bare matrix in code that only needs entries or `y = A x`.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use faer::linalg::solvers::{PartialPivLu, SolveCore};
use faer::prelude::Reborrow;
use faer::{Conj, Mat, MatMut, MatRef};

use crate::core::traits::{LinearOperator, MatVec, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{check_rows, check_shape, gemm};
use crate::error::OpError;
use crate::matrix::dense::opnorm_one;
use crate::operator::Operator;

/// Update rule `(A, u, p, t)` that refreshes `A` in place.
pub type UpdateFn<T, P> = Arc<dyn Fn(&mut Mat<T>, MatRef<'_, T>, &P, T) + Send + Sync>;

/// Box a closure as an [`UpdateFn`].
pub fn update_fn<T, P, F>(f: F) -> UpdateFn<T, P>
where
    F: Fn(&mut Mat<T>, MatRef<'_, T>, &P, T) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub struct MatrixOperator<T, P = ()> {
    a: Mat<T>,
    update_func: Option<UpdateFn<T, P>>,
}

impl<T: Scalar, P: Parameter> MatrixOperator<T, P> {
    /// A constant operator.
    pub fn new(a: Mat<T>) -> Self {
        MatrixOperator { a, update_func: None }
    }

    /// An operator whose matrix is refreshed by `f` on every `update_coefficients`.
    pub fn with_update<F>(a: Mat<T>, f: F) -> Self
    where
        F: Fn(&mut Mat<T>, MatRef<'_, T>, &P, T) + Send + Sync + 'static,
    {
        MatrixOperator { a, update_func: Some(update_fn(f)) }
    }

    pub fn matrix(&self) -> &Mat<T> {
        &self.a
    }

    pub fn into_matrix(self) -> Mat<T> {
        self.a
    }

    pub fn nrows(&self) -> usize {
        self.a.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.a.ncols()
    }

    /// Entries in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.a.ncols()).flat_map(move |j| (0..self.a.nrows()).map(move |i| self.a[(i, j)]))
    }

    /// `u ← A \ u` through a fresh partial-pivot LU.
    fn lu_solve_in_place(&self, u: MatMut<'_, T>) -> Result<(), OpError> {
        if !self.is_square() {
            return Err(OpError::Unsupported("left division by a non-square MatrixOperator"));
        }
        check_rows("MatrixOperator::solve", self.a.nrows(), u.rb())?;
        let lu = PartialPivLu::new(self.a.as_ref());
        lu.solve_in_place_with_conj(Conj::No, u);
        Ok(())
    }
}

impl<T: Scalar, P: Parameter> From<Mat<T>> for MatrixOperator<T, P> {
    fn from(a: Mat<T>) -> Self {
        MatrixOperator::new(a)
    }
}

impl<T, P> Index<(usize, usize)> for MatrixOperator<T, P> {
    type Output = T;
    fn index(&self, idx: (usize, usize)) -> &T {
        &self.a[idx]
    }
}

impl<T, P> IndexMut<(usize, usize)> for MatrixOperator<T, P> {
    fn index_mut(&mut self, idx: (usize, usize)) -> &mut T {
        &mut self.a[idx]
    }
}

impl<T: Scalar, P: Parameter> MatVec<Vec<T>> for MatrixOperator<T, P> {
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        self.a.matvec(x, y)
    }
}

impl<T: Scalar, P> fmt::Debug for MatrixOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixOperator")
            .field("a", &self.a)
            .field("has_update", &self.update_func.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for MatrixOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        (self.a.nrows(), self.a.ncols())
    }

    fn flags(&self) -> OpFlags {
        let mut flags = OpFlags::LINEAR | OpFlags::ADJOINT | OpFlags::APPLY;
        if self.update_func.is_none() {
            flags |= OpFlags::CONSTANT;
        }
        if self.is_square() {
            flags |= OpFlags::SOLVE;
        }
        flags
    }

    // Multiplication needs no scratch space.
    fn is_cache_set(&self) -> bool {
        true
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for MatrixOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let k = check_rows("MatrixOperator::apply", self.a.ncols(), u)?;
        let mut v = Mat::zeros(self.a.nrows(), k);
        gemm(v.as_mut(), self.a.as_ref(), u, T::one(), T::zero());
        Ok(v)
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.mul_scaled(v, u, T::one(), T::zero())
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let k = check_rows("MatrixOperator::mul", self.a.ncols(), u)?;
        check_shape("MatrixOperator::mul", (self.a.nrows(), k), (v.nrows(), v.ncols()))?;
        gemm(v, self.a.as_ref(), u, alpha, beta);
        Ok(())
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let mut x = u.to_owned();
        self.lu_solve_in_place(x.as_mut())?;
        Ok(x)
    }

    fn solve_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let k = check_rows("MatrixOperator::solve", self.a.nrows(), u)?;
        check_shape("MatrixOperator::solve", (self.a.ncols(), k), (v.nrows(), v.ncols()))?;
        v.copy_from(u);
        self.lu_solve_in_place(v)
    }

    fn solve_in_place(&mut self, u: MatMut<'_, T>) -> Result<(), OpError> {
        self.lu_solve_in_place(u)
    }

    /// Wraps `Aᵀ`; an update rule runs on `A` and stores the transpose of the result.
    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        let update_func = self.update_func.as_ref().map(|f| {
            let f = Arc::clone(f);
            update_fn(move |at: &mut Mat<T>, u: MatRef<'_, T>, p: &P, t: T| {
                let mut a = at.transpose().to_owned();
                f(&mut a, u, p, t);
                *at = a.transpose().to_owned();
            })
        });
        Ok(Operator::Matrix(MatrixOperator { a: self.a.transpose().to_owned(), update_func }))
    }

    fn update_coefficients(mut self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        if let Some(f) = &self.update_func {
            log::trace!("MatrixOperator: running update rule at t = {:?}", t);
            f(&mut self.a, u, p, t);
        }
        self
    }

    fn cache_self(self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        check_rows("MatrixOperator::cache", self.a.ncols(), u)?;
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        Ok(self.a.clone())
    }

    fn opnorm(&self) -> Result<T, OpError> {
        Ok(opnorm_one(self.a.as_ref()))
    }
}
