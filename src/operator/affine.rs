//! Affine operator `u ↦ A u + b`.
//!
//! `b` is a single column added to every operand column. The operator is not
//! linear, but every other capability is inherited from `A`.

use std::fmt;

use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Mat, MatMut, MatRef};

use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{add_column, check_rows, check_shape};
use crate::error::OpError;
use crate::operator::Operator;
use crate::operator::matrix::{UpdateFn, update_fn};

pub struct AffineOperator<T, P = ()> {
    a: Box<Operator<T, P>>,
    b: Mat<T>,
    update_func: Option<UpdateFn<T, P>>,
    /// `(rows(A), k)` staging buffer for `u − b`; its width gates scaled products.
    cache: Option<Mat<T>>,
}

impl<T: Scalar, P: Parameter> AffineOperator<T, P> {
    /// `b` must be an `(rows(A), 1)` column.
    pub fn new(a: Operator<T, P>, b: Mat<T>) -> Result<Self, OpError> {
        let (m, _) = a.size();
        check_shape("AffineOperator::new", (m, 1), (b.nrows(), b.ncols()))?;
        Ok(AffineOperator { a: Box::new(a), b, update_func: None, cache: None })
    }

    /// Attach a rule `(b, u, p, t)` refreshing the offset on `update_coefficients`.
    pub fn with_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Mat<T>, MatRef<'_, T>, &P, T) + Send + Sync + 'static,
    {
        self.update_func = Some(update_fn(f));
        self
    }

    pub fn linear_part(&self) -> &Operator<T, P> {
        &self.a
    }

    pub fn offset(&self) -> MatRef<'_, T> {
        self.b.as_ref()
    }
}

impl<T: Scalar, P: Parameter> Clone for AffineOperator<T, P> {
    fn clone(&self) -> Self {
        AffineOperator {
            a: self.a.clone(),
            b: self.b.clone(),
            update_func: self.update_func.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Scalar, P> fmt::Debug for AffineOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffineOperator")
            .field("a", &self.a)
            .field("b", &self.b)
            .field("has_update", &self.update_func.is_some())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for AffineOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        self.a.size()
    }

    fn flags(&self) -> OpFlags {
        let mut flags = self.a.flags() - OpFlags::LINEAR;
        if self.update_func.is_some() {
            flags -= OpFlags::CONSTANT;
        }
        if !self.a.is_square() {
            flags -= OpFlags::ADJOINT;
        }
        flags
    }

    fn is_cache_set(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for AffineOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let mut v = self.a.apply(u)?;
        add_column(v.as_mut(), self.b.as_ref(), T::one());
        Ok(v)
    }

    fn mul_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.a.mul_into(v.rb_mut(), u)?;
        add_column(v, self.b.as_ref(), T::one());
        Ok(())
    }

    /// `v ← α (A u + b) + β v`.
    fn mul_scaled(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let (m, n) = self.size();
        let k = check_rows("AffineOperator::mul", n, u)?;
        let stage = self.cache.as_ref().ok_or(OpError::CacheNotReady("AffineOperator"))?;
        check_shape("AffineOperator cache", (stage.nrows(), stage.ncols()), (m, k))?;
        self.a.mul_scaled(v.rb_mut(), u, alpha, beta)?;
        add_column(v, self.b.as_ref(), alpha);
        Ok(())
    }

    /// Solves `A x = u − b`.
    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (m, _) = self.size();
        check_rows("AffineOperator::solve", m, u)?;
        let mut shifted = u.to_owned();
        add_column(shifted.as_mut(), self.b.as_ref(), -T::one());
        self.a.solve(shifted.as_ref())
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (m, _) = self.size();
        let k = check_rows("AffineOperator::solve", m, u)?;
        let stage = self.cache.as_mut().ok_or(OpError::CacheNotReady("AffineOperator"))?;
        check_shape("AffineOperator cache", (stage.nrows(), stage.ncols()), (m, k))?;
        stage.as_mut().copy_from(u);
        add_column(stage.as_mut(), self.b.as_ref(), -T::one());
        self.a.solve_into(v, stage.as_ref())
    }

    /// Subtracts `b` from `u`, then solves through `A` in place. `u` is left
    /// untouched when `A` cannot solve, and restored if its solve fails.
    fn solve_in_place(&mut self, mut u: MatMut<'_, T>) -> Result<(), OpError> {
        let (m, _) = self.size();
        check_rows("AffineOperator::solve", m, u.rb())?;
        if !self.a.flags().can_solve() {
            return Err(OpError::Unsupported("in-place solve of an AffineOperator whose linear part cannot solve"));
        }
        add_column(u.rb_mut(), self.b.as_ref(), -T::one());
        if let Err(err) = self.a.solve_in_place(u.rb_mut()) {
            add_column(u, self.b.as_ref(), T::one());
            return Err(err);
        }
        Ok(())
    }

    /// `u ↦ Aᵀ u + b`; only defined for square `A`.
    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        if !self.a.is_square() {
            return Err(OpError::Unsupported("adjoint of an AffineOperator with non-square A"));
        }
        Ok(Operator::Affine(AffineOperator {
            a: Box::new(self.a.adjoint()?),
            b: self.b.clone(),
            update_func: self.update_func.clone(),
            cache: self.cache.clone(),
        }))
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        let AffineOperator { a, mut b, update_func, cache } = self;
        let a = Box::new((*a).update_coefficients(u, p, t));
        if let Some(f) = &update_func {
            log::trace!("AffineOperator: running offset update at t = {:?}", t);
            f(&mut b, u, p, t);
        }
        AffineOperator { a, b, update_func, cache }
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let (m, n) = self.size();
        let k = check_rows("AffineOperator::cache", n, u)?;
        log::debug!("AffineOperator: caching {}x{} staging buffer", m, k);
        self.cache = Some(Mat::zeros(m, k));
        Ok(self)
    }

    fn cache_internals(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        self.a = Box::new((*self.a).cache_operator(u)?);
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        Err(OpError::Unsupported("dense form of an affine map"))
    }

    fn opnorm(&self) -> Result<T, OpError> {
        Err(OpError::UnsupportedNorm("AffineOperator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::DenseMatrix;
    use crate::operator::{FunctionOperator, MatrixOperator, OperatorFn};
    use approx::assert_relative_eq;

    fn col(values: &[f64]) -> Mat<f64> {
        Mat::from_fn(values.len(), 1, |i, _| values[i])
    }

    fn diag_affine() -> AffineOperator<f64, f64> {
        let a = Mat::from_rows(&[&[2.0, 0.0], &[0.0, 3.0]]);
        AffineOperator::new(Operator::Matrix(MatrixOperator::new(a)), col(&[1.0, 1.0])).unwrap()
    }

    #[test]
    fn apply_adds_offset_and_solve_removes_it() {
        let op = diag_affine();
        assert!(!op.is_linear());
        assert!(op.is_constant());
        let v = op.apply(col(&[1.0, 1.0]).as_ref()).unwrap();
        assert_eq!(v, col(&[3.0, 4.0]));
        let x = op.solve(col(&[3.0, 4.0]).as_ref()).unwrap();
        assert_relative_eq!(x[(0, 0)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(x[(1, 0)], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn offset_must_match_rows() {
        let a = Operator::Matrix(MatrixOperator::<f64>::new(Mat::zeros(3, 2)));
        let err = AffineOperator::new(a, col(&[1.0, 1.0])).unwrap_err();
        assert!(matches!(err, OpError::DimensionMismatch { op: "AffineOperator::new", .. }));
    }

    #[test]
    fn scaled_mul_scales_offset_with_alpha() {
        let u = col(&[1.0, 1.0]);
        let mut op = diag_affine();
        let mut v = col(&[10.0, 10.0]);
        assert_eq!(
            op.mul_scaled(v.as_mut(), u.as_ref(), 2.0, 0.5).unwrap_err(),
            OpError::CacheNotReady("AffineOperator")
        );
        let mut op = op.cache_operator(u.as_ref()).unwrap();
        op.mul_scaled(v.as_mut(), u.as_ref(), 2.0, 0.5).unwrap();
        // 2 * ([2, 3] + [1, 1]) + 0.5 * [10, 10]
        assert_eq!(v, col(&[11.0, 13.0]));
    }

    #[test]
    fn buffered_and_in_place_solves_agree() {
        let u = col(&[3.0, 4.0]);
        let mut op = diag_affine().cache_operator(u.as_ref()).unwrap();
        let mut v = Mat::zeros(2, 1);
        op.solve_into(v.as_mut(), u.as_ref()).unwrap();
        let mut w = u.clone();
        op.solve_in_place(w.as_mut()).unwrap();
        for i in 0..2 {
            assert_relative_eq!(v[(i, 0)], 1.0, epsilon = 1e-14);
            assert_relative_eq!(w[(i, 0)], 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn offset_update_rule_runs() {
        let op = diag_affine().with_update(|b, _, p, t| {
            b[(0, 0)] = *p;
            b[(1, 0)] = t;
        });
        assert!(!op.is_constant());
        let u = col(&[0.0, 0.0]);
        let op = op.update_coefficients(u.as_ref(), &5.0, 6.0);
        assert_eq!(op.apply(u.as_ref()).unwrap(), col(&[5.0, 6.0]));
    }

    #[test]
    fn dense_form_is_unsupported() {
        assert!(matches!(diag_affine().to_dense(), Err(OpError::Unsupported(_))));
        assert!(matches!(diag_affine().opnorm(), Err(OpError::UnsupportedNorm(_))));
    }

    #[test]
    fn failed_in_place_solve_leaves_operand_untouched() {
        // matrix-free A without an inverse callable
        let f = OperatorFn::<f64, f64>::out_of_place(|u: MatRef<'_, f64>, _: &f64, _: f64| u.to_owned());
        let a = FunctionOperator::builder(f).in_place(false).size(2, 2).build().unwrap();
        let mut op = AffineOperator::new(Operator::Function(a), col(&[1.0, 1.0])).unwrap();
        assert!(!op.has_ldiv_in_place());
        let mut u = col(&[3.0, 4.0]);
        assert!(op.solve_in_place(u.as_mut()).is_err());
        assert_eq!(u, col(&[3.0, 4.0]));
    }

    #[test]
    fn scaled_mul_checks_cache_width() {
        let mut op = diag_affine().cache_operator(col(&[1.0, 1.0]).as_ref()).unwrap();
        let u = Mat::<f64>::zeros(2, 3);
        let mut v = Mat::<f64>::zeros(2, 3);
        let err = op.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 0.0).unwrap_err();
        assert!(matches!(err, OpError::DimensionMismatch { op: "AffineOperator cache", .. }));
    }
}
