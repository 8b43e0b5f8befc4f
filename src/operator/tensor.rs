//! Kronecker (tensor) product of two operators, evaluated without forming it.
//!
//! For `outer` of size `(m, n)` and `inner` of size `(p, q)`, `outer ⊗ inner`
//! has size `(m·p, n·q)`. Each operand column `u` is read as a `q × n`
//! matrix `U` (column-major blocks of length `q`) and
//!
//! ```text
//! (outer ⊗ inner) u  =  vec( outer · (inner · U)ᵀ )ᵀ
//! ```
//!
//! The `k` operand columns are staged side by side so each child is evaluated
//! once per product, on `n·k` and `p·k` columns respectively.

use std::fmt;

use faer::prelude::Reborrow;
use faer::{Mat, MatMut, MatRef};

use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{check_rows, check_shape};
use crate::error::OpError;
use crate::matrix::dense::kron;
use crate::matrix::sparse::CsrMatrix;
use crate::operator::Operator;

/// Scratch buffers for one operand width `k`.
#[derive(Clone, Debug)]
pub struct TensorCache<T> {
    /// `q × n·k`: operand columns reshaped for `inner`.
    stage: Mat<T>,
    /// `p × n·k`: `inner` applied to `stage`.
    inner_out: Mat<T>,
    /// `n × p·k`: per-column transposes of `inner_out`, the operand of `outer`.
    outer_in: Mat<T>,
    /// `m × p·k`: `outer` applied to `outer_in`.
    outer_out: Mat<T>,
    width: usize,
}

impl<T: Scalar> TensorCache<T> {
    fn new(outer: (usize, usize), inner: (usize, usize), k: usize) -> Self {
        let ((m, n), (p, q)) = (outer, inner);
        TensorCache {
            stage: Mat::zeros(q, n * k),
            inner_out: Mat::zeros(p, n * k),
            outer_in: Mat::zeros(n, p * k),
            outer_out: Mat::zeros(m, p * k),
            width: k,
        }
    }

    fn fits(&self, outer: (usize, usize), inner: (usize, usize), k: usize) -> bool {
        let ((m, n), (p, q)) = (outer, inner);
        let shape = |a: &Mat<T>| (a.nrows(), a.ncols());
        self.width == k
            && shape(&self.stage) == (q, n * k)
            && shape(&self.inner_out) == (p, n * k)
            && shape(&self.outer_in) == (n, p * k)
            && shape(&self.outer_out) == (m, p * k)
    }
}

/// `stage[b, c·n + j] ← u[j·q + b, c]`.
fn stage_columns<T: Scalar>(mut stage: MatMut<'_, T>, u: MatRef<'_, T>, n: usize, q: usize) {
    for c in 0..u.ncols() {
        for j in 0..n {
            for b in 0..q {
                stage[(b, c * n + j)] = u[(j * q + b, c)];
            }
        }
    }
}

/// `dst[j, c·p + a] ← src[a, c·n + j]`.
fn transpose_blocks<T: Scalar>(mut dst: MatMut<'_, T>, src: MatRef<'_, T>, n: usize, p: usize, k: usize) {
    for c in 0..k {
        for j in 0..n {
            for a in 0..p {
                dst[(j, c * p + a)] = src[(a, c * n + j)];
            }
        }
    }
}

/// `v[i·p + a, c] ← α w[i, c·p + a] + β v[i·p + a, c]`.
fn scatter_columns<T: Scalar>(mut v: MatMut<'_, T>, w: MatRef<'_, T>, p: usize, alpha: T, beta: T) {
    for c in 0..v.ncols() {
        for i in 0..w.nrows() {
            for a in 0..p {
                let r = i * p + a;
                let x = alpha * w[(i, c * p + a)];
                v[(r, c)] = if beta == T::zero() { x } else { x + beta * v[(r, c)] };
            }
        }
    }
}

pub struct TensorProductOperator<T, P = ()> {
    outer: Box<Operator<T, P>>,
    inner: Box<Operator<T, P>>,
    cache: Option<TensorCache<T>>,
}

impl<T: Scalar, P: Parameter> TensorProductOperator<T, P> {
    pub fn new(outer: Operator<T, P>, inner: Operator<T, P>) -> Self {
        TensorProductOperator { outer: Box::new(outer), inner: Box::new(inner), cache: None }
    }

    pub fn outer(&self) -> &Operator<T, P> {
        &self.outer
    }

    pub fn inner(&self) -> &Operator<T, P> {
        &self.inner
    }

    /// Width `k` the cache was built for, if any.
    pub fn cached_width(&self) -> Option<usize> {
        self.cache.as_ref().map(|c| c.width)
    }

    fn both_square(&self) -> bool {
        self.outer.is_square() && self.inner.is_square()
    }

    /// Out-of-place pipeline; `forward` picks apply or solve on the children.
    fn evaluate(&self, u: MatRef<'_, T>, forward: bool) -> Result<Mat<T>, OpError> {
        let (m, n) = self.outer.size();
        let (p, q) = self.inner.size();
        let k = u.ncols();
        let mut stage = Mat::zeros(q, n * k);
        stage_columns(stage.as_mut(), u, n, q);
        let inner_out = if forward { self.inner.apply(stage.as_ref())? } else { self.inner.solve(stage.as_ref())? };
        let mut outer_in = Mat::zeros(n, p * k);
        transpose_blocks(outer_in.as_mut(), inner_out.as_ref(), n, p, k);
        let outer_out = if forward { self.outer.apply(outer_in.as_ref())? } else { self.outer.solve(outer_in.as_ref())? };
        let mut v = Mat::zeros(m * p, k);
        scatter_columns(v.as_mut(), outer_out.as_ref(), p, T::one(), T::zero());
        Ok(v)
    }

    /// In-place pipeline through the cached buffers.
    fn evaluate_cached(
        &mut self,
        v: MatMut<'_, T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
        forward: bool,
    ) -> Result<(), OpError> {
        let outer_size = self.outer.size();
        let inner_size = self.inner.size();
        let ((_, n), (p, q)) = (outer_size, inner_size);
        let k = u.ncols();
        let cache = self.cache.as_mut().ok_or(OpError::CacheNotReady("TensorProductOperator"))?;
        if !cache.fits(outer_size, inner_size, k) {
            return Err(OpError::mismatch(
                "TensorProductOperator cache",
                (q, n * k),
                (cache.stage.nrows(), cache.stage.ncols()),
            ));
        }
        stage_columns(cache.stage.as_mut(), u, n, q);
        if forward {
            self.inner.mul_into(cache.inner_out.as_mut(), cache.stage.as_ref())?;
        } else {
            self.inner.solve_into(cache.inner_out.as_mut(), cache.stage.as_ref())?;
        }
        transpose_blocks(cache.outer_in.as_mut(), cache.inner_out.as_ref(), n, p, k);
        if forward {
            self.outer.mul_into(cache.outer_out.as_mut(), cache.outer_in.as_ref())?;
        } else {
            self.outer.solve_into(cache.outer_out.as_mut(), cache.outer_in.as_ref())?;
        }
        scatter_columns(v, cache.outer_out.as_ref(), p, alpha, beta);
        Ok(())
    }

    fn require_square(&self) -> Result<(), OpError> {
        if self.both_square() {
            Ok(())
        } else {
            Err(OpError::Unsupported("solve with a tensor product of non-square factors"))
        }
    }
}

impl<T: Scalar, P: Parameter> Clone for TensorProductOperator<T, P> {
    fn clone(&self) -> Self {
        TensorProductOperator { outer: self.outer.clone(), inner: self.inner.clone(), cache: self.cache.clone() }
    }
}

impl<T: Scalar, P> fmt::Debug for TensorProductOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorProductOperator")
            .field("outer", &self.outer)
            .field("inner", &self.inner)
            .field("cached_width", &self.cache.as_ref().map(|c| c.width))
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for TensorProductOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        let (m, n) = self.outer.size();
        let (p, q) = self.inner.size();
        (m * p, n * q)
    }

    fn flags(&self) -> OpFlags {
        let (outer, inner) = (self.outer.flags(), self.inner.flags());
        let mut flags = OpFlags::LINEAR;
        if outer.contains(OpFlags::CONSTANT) && inner.contains(OpFlags::CONSTANT) {
            flags |= OpFlags::CONSTANT;
        }
        if outer.contains(OpFlags::ADJOINT) && inner.contains(OpFlags::ADJOINT) {
            flags |= OpFlags::ADJOINT;
        }
        if outer.can_apply() && inner.can_apply() {
            flags |= OpFlags::APPLY;
        }
        if outer.can_solve() && inner.can_solve() && self.both_square() {
            flags |= OpFlags::SOLVE;
        }
        flags
    }

    fn is_cache_set(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for TensorProductOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        check_rows("TensorProductOperator::apply", self.size().1, u)?;
        self.evaluate(u, true)
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.mul_scaled(v, u, T::one(), T::zero())
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let (rows, cols) = self.size();
        let k = check_rows("TensorProductOperator::mul", cols, u)?;
        check_shape("TensorProductOperator::mul", (rows, k), (v.nrows(), v.ncols()))?;
        self.evaluate_cached(v, u, alpha, beta, true)
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.require_square()?;
        check_rows("TensorProductOperator::solve", self.size().0, u)?;
        self.evaluate(u, false)
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.require_square()?;
        let (rows, cols) = self.size();
        let k = check_rows("TensorProductOperator::solve", rows, u)?;
        check_shape("TensorProductOperator::solve", (cols, k), (v.nrows(), v.ncols()))?;
        self.evaluate_cached(v, u, T::one(), T::zero(), false)
    }

    /// The result lands in the cache before it is scattered back over `u`.
    fn solve_in_place(&mut self, mut u: MatMut<'_, T>) -> Result<(), OpError> {
        self.require_square()?;
        let (rows, _) = self.size();
        let k = check_rows("TensorProductOperator::solve", rows, u.rb())?;
        let mut x = Mat::zeros(rows, k);
        self.evaluate_cached(x.as_mut(), u.rb(), T::one(), T::zero(), false)?;
        u.copy_from(&x);
        Ok(())
    }

    /// `(A ⊗ B)ᵀ = Aᵀ ⊗ Bᵀ`; the cache is kept when its buffers keep their shapes.
    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        let outer = self.outer.adjoint()?;
        let inner = self.inner.adjoint()?;
        let cache = match &self.cache {
            Some(c) if self.both_square() => Some(c.clone()),
            Some(_) => {
                log::debug!("TensorProductOperator: dropping cache on adjoint of non-square factors");
                None
            }
            None => None,
        };
        Ok(Operator::Tensor(TensorProductOperator { outer: Box::new(outer), inner: Box::new(inner), cache }))
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        let TensorProductOperator { outer, inner, cache } = self;
        TensorProductOperator {
            outer: Box::new((*outer).update_coefficients(u, p, t)),
            inner: Box::new((*inner).update_coefficients(u, p, t)),
            cache,
        }
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let k = check_rows("TensorProductOperator::cache", self.size().1, u)?;
        let cache = TensorCache::new(self.outer.size(), self.inner.size(), k);
        log::debug!(
            "TensorProductOperator: caching buffers for {:?} ⊗ {:?}, width {}",
            self.outer.size(),
            self.inner.size(),
            k
        );
        self.cache = Some(cache);
        Ok(self)
    }

    /// Children are cached against the staged operands they actually receive:
    /// `inner` sees `u` reshaped to `q × n·k`, `outer` the block transpose of
    /// `inner`'s output.
    fn cache_internals(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let (_, n) = self.outer.size();
        let (p, q) = self.inner.size();
        let k = check_rows("TensorProductOperator::cache", n * q, u)?;
        let mut stage = Mat::<T>::zeros(q, n * k);
        stage_columns(stage.as_mut(), u, n, q);
        self.inner = Box::new((*self.inner).cache_operator(stage.as_ref())?);
        let inner_out = if self.inner.flags().can_apply() {
            self.inner.apply(stage.as_ref())?
        } else {
            Mat::zeros(p, n * k)
        };
        let mut outer_u = Mat::<T>::zeros(n, p * k);
        transpose_blocks(outer_u.as_mut(), inner_out.as_ref(), n, p, k);
        self.outer = Box::new((*self.outer).cache_operator(outer_u.as_ref())?);
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let outer = self.outer.to_dense()?;
        let inner = self.inner.to_dense()?;
        Ok(kron(outer.as_ref(), inner.as_ref()))
    }

    fn to_sparse(&self) -> Result<CsrMatrix<T>, OpError> {
        Ok(self.outer.to_sparse()?.kron(&self.inner.to_sparse()?))
    }

    /// The induced 1-norm is multiplicative over Kronecker products.
    fn opnorm(&self) -> Result<T, OpError> {
        Ok(self.outer.opnorm()? * self.inner.opnorm()?)
    }
}
