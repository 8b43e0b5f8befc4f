//! Identity, scaling, sums and compositions of operators.
//!
//! These are the results of the arithmetic in [`ops`](crate::operator::ops)
//! and are rarely built by hand. Each derives its capability flags from its
//! children; sums and compositions own one intermediate buffer.

use std::fmt;
use std::marker::PhantomData;

use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Mat, MatMut, MatRef, Scale};

use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{axpby, check_rows, check_shape, gemm};
use crate::error::OpError;
use crate::operator::Operator;

/// Flags shared by every child: the intersection of `CONSTANT`, `ADJOINT`
/// and `LINEAR`, plus the evaluation forms all children support.
fn common_flags<'a, T: Scalar, P: Parameter>(ops: impl IntoIterator<Item = &'a Operator<T, P>>) -> OpFlags {
    let mut flags = OpFlags::CONSTANT | OpFlags::ADJOINT | OpFlags::LINEAR | OpFlags::APPLY | OpFlags::SOLVE;
    let mut apply = true;
    let mut solve = true;
    for op in ops {
        let f = op.flags();
        flags &= f | OpFlags::APPLY | OpFlags::SOLVE;
        apply &= f.can_apply();
        solve &= f.can_solve();
    }
    if !apply {
        flags -= OpFlags::APPLY;
    }
    if !solve {
        flags -= OpFlags::SOLVE;
    }
    flags
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// `I_n`.
pub struct IdentityOperator<T, P = ()> {
    n: usize,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T: Scalar, P: Parameter> IdentityOperator<T, P> {
    pub fn new(n: usize) -> Self {
        IdentityOperator { n, _marker: PhantomData }
    }

    fn identity_into(&self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let k = check_rows("IdentityOperator", self.n, u)?;
        check_shape("IdentityOperator", (self.n, k), (v.nrows(), v.ncols()))?;
        axpby(v, u, alpha, beta);
        Ok(())
    }
}

impl<T, P> Clone for IdentityOperator<T, P> {
    fn clone(&self) -> Self {
        IdentityOperator { n: self.n, _marker: PhantomData }
    }
}

impl<T, P> fmt::Debug for IdentityOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityOperator").field("n", &self.n).finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for IdentityOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn flags(&self) -> OpFlags {
        OpFlags::all()
    }

    fn is_cache_set(&self) -> bool {
        true
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for IdentityOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        check_rows("IdentityOperator::apply", self.n, u)?;
        Ok(u.to_owned())
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.identity_into(v, u, T::one(), T::zero())
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        self.identity_into(v, u, alpha, beta)
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.apply(u)
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.identity_into(v, u, T::one(), T::zero())
    }

    fn solve_in_place(&mut self, u: MatMut<'_, T>) -> Result<(), OpError> {
        check_rows("IdentityOperator::solve", self.n, u.rb())?;
        Ok(())
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        Ok(Operator::Identity(self.clone()))
    }

    fn update_coefficients(self, _u: MatRef<'_, T>, _p: &P, _t: T) -> Self {
        self
    }

    fn cache_self(self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        check_rows("IdentityOperator::cache", self.n, u)?;
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        Ok(Mat::identity(self.n, self.n))
    }

    fn opnorm(&self) -> Result<T, OpError> {
        Ok(if self.n == 0 { T::zero() } else { T::one() })
    }
}

// ---------------------------------------------------------------------------
// Scaled
// ---------------------------------------------------------------------------

/// `c · L`.
pub struct ScaledOperator<T, P = ()> {
    c: T,
    op: Box<Operator<T, P>>,
}

impl<T: Scalar, P: Parameter> ScaledOperator<T, P> {
    pub fn new(c: T, op: Operator<T, P>) -> Self {
        ScaledOperator { c, op: Box::new(op) }
    }

    pub fn coefficient(&self) -> T {
        self.c
    }

    pub fn operator(&self) -> &Operator<T, P> {
        &self.op
    }

    pub fn into_operator(self) -> Operator<T, P> {
        *self.op
    }

    fn nonzero(&self) -> Result<(), OpError> {
        if self.c == T::zero() {
            Err(OpError::NotInvertible("operator scaled by zero".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<T: Scalar, P: Parameter> Clone for ScaledOperator<T, P> {
    fn clone(&self) -> Self {
        ScaledOperator { c: self.c, op: self.op.clone() }
    }
}

impl<T: Scalar, P> fmt::Debug for ScaledOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaledOperator").field("c", &self.c).field("op", &self.op).finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for ScaledOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        self.op.size()
    }

    fn flags(&self) -> OpFlags {
        self.op.flags()
    }

    // Scaling needs no buffer of its own; readiness is the child's.
    fn is_cache_set(&self) -> bool {
        self.op.is_cache_set()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for ScaledOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let mut v = self.op.apply(u)?;
        v *= Scale(self.c);
        Ok(v)
    }

    fn mul_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.op.mul_into(v.rb_mut(), u)?;
        v *= Scale(self.c);
        Ok(())
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        self.op.mul_scaled(v, u, alpha * self.c, beta)
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.nonzero()?;
        let mut x = self.op.solve(u)?;
        x *= Scale(T::one() / self.c);
        Ok(x)
    }

    fn solve_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.nonzero()?;
        self.op.solve_into(v.rb_mut(), u)?;
        v *= Scale(T::one() / self.c);
        Ok(())
    }

    fn solve_in_place(&mut self, mut u: MatMut<'_, T>) -> Result<(), OpError> {
        self.nonzero()?;
        self.op.solve_in_place(u.rb_mut())?;
        u *= Scale(T::one() / self.c);
        Ok(())
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        Ok(Operator::Scaled(ScaledOperator::new(self.c, self.op.adjoint()?)))
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        ScaledOperator { c: self.c, op: Box::new((*self.op).update_coefficients(u, p, t)) }
    }

    fn cache_self(self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        check_rows("ScaledOperator::cache", self.size().1, u)?;
        Ok(self)
    }

    fn cache_internals(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        self.op = Box::new((*self.op).cache_operator(u)?);
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let mut a = self.op.to_dense()?;
        a *= Scale(self.c);
        Ok(a)
    }

    fn opnorm(&self) -> Result<T, OpError> {
        Ok(self.c.abs() * self.op.opnorm()?)
    }
}

// ---------------------------------------------------------------------------
// Sum
// ---------------------------------------------------------------------------

/// `L₁ + L₂ + …`, all of one size.
pub struct SumOperator<T, P = ()> {
    ops: Vec<Operator<T, P>>,
    /// Output-shaped accumulator for one term.
    cache: Option<Mat<T>>,
}

impl<T: Scalar, P: Parameter> SumOperator<T, P> {
    pub fn new(ops: Vec<Operator<T, P>>) -> Result<Self, OpError> {
        let Some(first) = ops.first() else {
            return Err(OpError::Configuration("SumOperator needs at least one term".to_string()));
        };
        let size = first.size();
        for op in &ops[1..] {
            if op.size() != size {
                return Err(OpError::mismatch("SumOperator::new", size, op.size()));
            }
        }
        Ok(SumOperator { ops, cache: None })
    }

    pub fn terms(&self) -> &[Operator<T, P>] {
        &self.ops
    }

    pub fn into_terms(self) -> Vec<Operator<T, P>> {
        self.ops
    }
}

impl<T: Scalar, P: Parameter> Clone for SumOperator<T, P> {
    fn clone(&self) -> Self {
        SumOperator { ops: self.ops.clone(), cache: self.cache.clone() }
    }
}

impl<T: Scalar, P> fmt::Debug for SumOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumOperator")
            .field("ops", &self.ops)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for SumOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        self.ops.first().map_or((0, 0), |op| op.size())
    }

    fn flags(&self) -> OpFlags {
        common_flags(&self.ops) - OpFlags::SOLVE
    }

    fn is_cache_set(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for SumOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (m, n) = self.size();
        let k = check_rows("SumOperator::apply", n, u)?;
        let mut v = Mat::zeros(m, k);
        for op in &self.ops {
            let term = op.apply(u)?;
            axpby(v.as_mut(), term.as_ref(), T::one(), T::one());
        }
        Ok(v)
    }

    fn mul_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        if self.cache.is_some() {
            return self.mul_scaled(v, u, T::one(), T::zero());
        }
        let (m, _) = self.size();
        let w = self.apply(u)?;
        check_shape("SumOperator::mul", (m, w.ncols()), (v.nrows(), v.ncols()))?;
        v.copy_from(&w);
        Ok(())
    }

    /// Each term lands in the cache and is accumulated into `v`.
    fn mul_scaled(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let (m, n) = self.size();
        let k = check_rows("SumOperator::mul", n, u)?;
        check_shape("SumOperator::mul", (m, k), (v.nrows(), v.ncols()))?;
        let term = self.cache.as_mut().ok_or(OpError::CacheNotReady("SumOperator"))?;
        check_shape("SumOperator cache", (term.nrows(), term.ncols()), (m, k))?;
        for (i, op) in self.ops.iter_mut().enumerate() {
            op.mul_into(term.as_mut(), u)?;
            axpby(v.rb_mut(), term.as_ref(), alpha, if i == 0 { beta } else { T::one() });
        }
        Ok(())
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        let ops = self.ops.iter().map(|op| op.adjoint()).collect::<Result<Vec<_>, _>>()?;
        let cache = if self.is_square() { self.cache.clone() } else { None };
        Ok(Operator::Sum(SumOperator { ops, cache }))
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        let ops = self.ops.into_iter().map(|op| op.update_coefficients(u, p, t)).collect();
        SumOperator { ops, cache: self.cache }
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let (m, n) = self.size();
        let k = check_rows("SumOperator::cache", n, u)?;
        log::debug!("SumOperator: caching {}x{} term buffer", m, k);
        self.cache = Some(Mat::zeros(m, k));
        Ok(self)
    }

    fn cache_internals(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        self.ops = self.ops.into_iter().map(|op| op.cache_operator(u)).collect::<Result<_, _>>()?;
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let (m, n) = self.size();
        let mut a = Mat::zeros(m, n);
        for op in &self.ops {
            let term = op.to_dense()?;
            axpby(a.as_mut(), term.as_ref(), T::one(), T::one());
        }
        Ok(a)
    }
}

// ---------------------------------------------------------------------------
// Composed
// ---------------------------------------------------------------------------

/// `outer ∘ inner`, i.e. `u ↦ outer (inner u)`.
pub struct ComposedOperator<T, P = ()> {
    outer: Box<Operator<T, P>>,
    inner: Box<Operator<T, P>>,
    /// Intermediate `inner u`, `(rows(inner), k)`.
    cache: Option<Mat<T>>,
}

impl<T: Scalar, P: Parameter> ComposedOperator<T, P> {
    pub fn new(outer: Operator<T, P>, inner: Operator<T, P>) -> Result<Self, OpError> {
        let (_, n) = outer.size();
        let (p, q) = inner.size();
        if n != p {
            return Err(OpError::mismatch("ComposedOperator::new", (n, q), (p, q)));
        }
        Ok(ComposedOperator { outer: Box::new(outer), inner: Box::new(inner), cache: None })
    }

    pub fn outer(&self) -> &Operator<T, P> {
        &self.outer
    }

    pub fn inner(&self) -> &Operator<T, P> {
        &self.inner
    }
}

/// The cached intermediate, checked against `(rows, k)`.
fn intermediate<T>(cache: &mut Option<Mat<T>>, rows: usize, k: usize) -> Result<&mut Mat<T>, OpError> {
    let mid = cache.as_mut().ok_or(OpError::CacheNotReady("ComposedOperator"))?;
    check_shape("ComposedOperator cache", (mid.nrows(), mid.ncols()), (rows, k))?;
    Ok(mid)
}

impl<T: Scalar, P: Parameter> Clone for ComposedOperator<T, P> {
    fn clone(&self) -> Self {
        ComposedOperator { outer: self.outer.clone(), inner: self.inner.clone(), cache: self.cache.clone() }
    }
}

impl<T: Scalar, P> fmt::Debug for ComposedOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedOperator")
            .field("outer", &self.outer)
            .field("inner", &self.inner)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for ComposedOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        (self.outer.size().0, self.inner.size().1)
    }

    fn flags(&self) -> OpFlags {
        common_flags([self.outer.as_ref(), self.inner.as_ref()])
    }

    fn is_cache_set(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for ComposedOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let w = self.inner.apply(u)?;
        self.outer.apply(w.as_ref())
    }

    fn mul_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        if self.cache.is_some() {
            return self.mul_scaled(v, u, T::one(), T::zero());
        }
        let w = self.apply(u)?;
        check_shape("ComposedOperator::mul", (w.nrows(), w.ncols()), (v.nrows(), v.ncols()))?;
        v.copy_from(&w);
        Ok(())
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let k = check_rows("ComposedOperator::mul", self.size().1, u)?;
        let (rows, _) = self.size();
        check_shape("ComposedOperator::mul", (rows, k), (v.nrows(), v.ncols()))?;
        let mid_rows = self.inner.size().0;
        let ComposedOperator { outer, inner, cache } = self;
        let mid = intermediate(cache, mid_rows, k)?;
        inner.mul_into(mid.as_mut(), u)?;
        outer.mul_scaled(v, mid.as_ref(), alpha, beta)
    }

    /// `(A B)⁻¹ u = B⁻¹ (A⁻¹ u)`.
    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let w = self.outer.solve(u)?;
        self.inner.solve(w.as_ref())
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let k = check_rows("ComposedOperator::solve", self.size().0, u)?;
        let mid_rows = self.inner.size().0;
        let ComposedOperator { outer, inner, cache } = self;
        let mid = intermediate(cache, mid_rows, k)?;
        outer.solve_into(mid.as_mut(), u)?;
        inner.solve_into(v, mid.as_ref())
    }

    fn solve_in_place(&mut self, mut u: MatMut<'_, T>) -> Result<(), OpError> {
        if !(self.outer.is_square() && self.inner.is_square()) {
            return Err(OpError::Unsupported("in-place solve through a non-square composition"));
        }
        self.outer.solve_in_place(u.rb_mut())?;
        self.inner.solve_in_place(u)
    }

    /// `(A B)ᵀ = Bᵀ Aᵀ`. The intermediate `Aᵀ u` has `cols(A) = rows(B)`
    /// rows, the shape of `B u`, so the cache carries over unchanged.
    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        let outer = self.inner.adjoint()?;
        let inner = self.outer.adjoint()?;
        Ok(Operator::Composed(ComposedOperator {
            outer: Box::new(outer),
            inner: Box::new(inner),
            cache: self.cache.clone(),
        }))
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        let ComposedOperator { outer, inner, cache } = self;
        ComposedOperator {
            outer: Box::new((*outer).update_coefficients(u, p, t)),
            inner: Box::new((*inner).update_coefficients(u, p, t)),
            cache,
        }
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let k = check_rows("ComposedOperator::cache", self.size().1, u)?;
        let rows = self.inner.size().0;
        log::debug!("ComposedOperator: caching {}x{} intermediate", rows, k);
        self.cache = Some(Mat::zeros(rows, k));
        Ok(self)
    }

    /// `outer` is cached against the intermediate it will receive.
    fn cache_internals(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let mid = Mat::<T>::zeros(self.inner.size().0, u.ncols());
        self.inner = Box::new((*self.inner).cache_operator(u)?);
        self.outer = Box::new((*self.outer).cache_operator(mid.as_ref())?);
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let a = self.outer.to_dense()?;
        let b = self.inner.to_dense()?;
        let mut c = Mat::zeros(a.nrows(), b.ncols());
        gemm(c.as_mut(), a.as_ref(), b.as_ref(), T::one(), T::zero());
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::DenseMatrix;
    use crate::operator::{FunctionOperator, MatrixOperator, OperatorFn};
    use approx::assert_relative_eq;

    fn mat_op(rows: &[&[f64]]) -> Operator<f64> {
        Operator::Matrix(MatrixOperator::new(Mat::from_rows(rows)))
    }

    fn col(values: &[f64]) -> Mat<f64> {
        Mat::from_fn(values.len(), 1, |i, _| values[i])
    }

    #[test]
    fn identity_is_fully_capable() {
        let mut id = IdentityOperator::<f64>::new(3);
        assert!(id.is_constant() && id.is_linear() && id.has_ldiv_in_place());
        let u = col(&[1.0, 2.0, 3.0]);
        let mut v = col(&[1.0, 1.0, 1.0]);
        id.mul_scaled(v.as_mut(), u.as_ref(), 2.0, 1.0).unwrap();
        assert_eq!(v, col(&[3.0, 5.0, 7.0]));
        assert_eq!(id.opnorm().unwrap(), 1.0);
    }

    #[test]
    fn scaled_solve_divides_by_coefficient() {
        let s = ScaledOperator::new(2.0, mat_op(&[&[1.0, 0.0], &[0.0, 4.0]]));
        let b = s.apply(col(&[1.0, 1.0]).as_ref()).unwrap();
        assert_eq!(b, col(&[2.0, 8.0]));
        let x = s.solve(b.as_ref()).unwrap();
        assert_relative_eq!(x[(1, 0)], 1.0, epsilon = 1e-14);
        let zero = ScaledOperator::new(0.0, mat_op(&[&[1.0]]));
        assert!(matches!(zero.solve(col(&[1.0]).as_ref()), Err(OpError::NotInvertible(_))));
    }

    #[test]
    fn sum_rejects_mismatched_terms() {
        let err = SumOperator::new(vec![mat_op(&[&[1.0, 2.0]]), mat_op(&[&[1.0], &[2.0]])]).unwrap_err();
        assert!(matches!(err, OpError::DimensionMismatch { .. }));
    }

    #[test]
    fn sum_accumulates_terms_through_cache() {
        let sum = SumOperator::new(vec![mat_op(&[&[1.0, 0.0], &[0.0, 1.0]]), mat_op(&[&[0.0, 2.0], &[3.0, 0.0]])])
            .unwrap();
        assert!(!sum.has_ldiv());
        let u = col(&[1.0, 2.0]);
        let expected = sum.apply(u.as_ref()).unwrap();
        assert_eq!(expected, col(&[5.0, 5.0]));
        let mut sum = sum.cache_operator(u.as_ref()).unwrap();
        let mut v = col(&[1.0, -1.0]);
        sum.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 2.0).unwrap();
        assert_eq!(v, col(&[7.0, 3.0]));
    }

    #[test]
    fn composition_applies_inner_first() {
        let c = ComposedOperator::new(mat_op(&[&[1.0, 1.0]]), mat_op(&[&[1.0, 0.0, 0.0], &[0.0, 2.0, 0.0]])).unwrap();
        assert_eq!(c.size(), (1, 3));
        let u = col(&[1.0, 1.0, 5.0]);
        assert_eq!(c.apply(u.as_ref()).unwrap(), col(&[3.0]));
        let mut c = c.cache_operator(u.as_ref()).unwrap();
        let mut v = col(&[1.0]);
        c.mul_scaled(v.as_mut(), u.as_ref(), 2.0, 1.0).unwrap();
        assert_eq!(v, col(&[7.0]));
        assert_eq!(c.to_dense().unwrap(), Mat::from_rows(&[&[1.0, 2.0, 0.0]]));
    }

    #[test]
    fn composition_mismatch_is_reported() {
        let err = ComposedOperator::new(mat_op(&[&[1.0, 1.0]]), mat_op(&[&[1.0]])).unwrap_err();
        assert!(matches!(err, OpError::DimensionMismatch { op: "ComposedOperator::new", .. }));
    }

    #[test]
    fn composed_solve_reverses_order() {
        let a = mat_op(&[&[2.0, 0.0], &[1.0, 1.0]]);
        let b = mat_op(&[&[1.0, 3.0], &[0.0, 1.0]]);
        let c = ComposedOperator::new(a, b).unwrap();
        let x = col(&[1.0, -2.0]);
        let rhs = c.apply(x.as_ref()).unwrap();
        let mut c = c.cache_operator(x.as_ref()).unwrap();
        let mut y = Mat::zeros(2, 1);
        c.solve_into(y.as_mut(), rhs.as_ref()).unwrap();
        for i in 0..2 {
            assert_relative_eq!(y[(i, 0)], x[(i, 0)], epsilon = 1e-12);
        }
    }

    #[test]
    fn scaled_readiness_follows_child() {
        let double = OperatorFn::<f64, ()>::in_place(|mut v: MatMut<'_, f64>, u: MatRef<'_, f64>, _: &(), _: f64| {
            for j in 0..u.ncols() {
                for i in 0..u.nrows() {
                    v[(i, j)] = 2.0 * u[(i, j)];
                }
            }
        });
        let f = FunctionOperator::builder(double).in_place(true).size(2, 2).build().unwrap();
        let mut s = ScaledOperator::new(3.0, Operator::Function(f));
        assert!(!s.is_cache_set());
        let u = col(&[1.0, 2.0]);
        let mut v = col(&[1.0, 1.0]);
        let err = s.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 1.0).unwrap_err();
        assert_eq!(err, OpError::CacheNotReady("FunctionOperator"));

        let mut s = s.cache_operator(u.as_ref()).unwrap();
        assert!(s.is_cache_set());
        s.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 1.0).unwrap();
        assert_eq!(v, col(&[7.0, 13.0]));
    }

    #[test]
    fn composed_adjoint_keeps_cache_for_rectangular_factors() {
        // (1×2) ∘ (2×3): intermediate is 2×k both ways round
        let c = ComposedOperator::new(mat_op(&[&[1.0, 1.0]]), mat_op(&[&[1.0, 0.0, 0.0], &[0.0, 2.0, 0.0]])).unwrap();
        let c = c.cache_operator(col(&[1.0, 1.0, 1.0]).as_ref()).unwrap();
        let mut adj = c.adjoint().unwrap();
        assert_eq!(adj.size(), (3, 1));
        assert!(adj.is_cache_set());
        let u = col(&[2.0]);
        let mut v = col(&[1.0, 1.0, 1.0]);
        adj.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 1.0).unwrap();
        assert_eq!(v, col(&[3.0, 5.0, 1.0]));
    }
}
