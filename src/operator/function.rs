//! Matrix-free operators defined by callables.
//!
//! A [`FunctionOperator`] stores up to four callables (action, adjoint action,
//! inverse, adjoint inverse), the external state `(p, t)` they are evaluated
//! at, and an output-shaped scratch buffer for scaled in-place products.
//!
//! All callables of one operator share a form, fixed at construction by the
//! in-place flag: out-of-place callables return a new matrix, in-place
//! callables write into the output they are handed.
//!
//! # Example
//! ```rust
//! use faer::Mat;
//! use linop::{FunctionOperator, LinearOperator, OperatorFn};
//!
//! // v = 2 u, evaluated in place.
//! let double = OperatorFn::<f64, ()>::in_place(|mut v, u, _p, _t| {
//!     for j in 0..u.ncols() {
//!         for i in 0..u.nrows() {
//!             v[(i, j)] = 2.0 * u[(i, j)];
//!         }
//!     }
//! });
//! let op = FunctionOperator::builder(double).in_place(true).size(3, 3).build().unwrap();
//! let v = op.apply(Mat::from_fn(3, 1, |i, _| i as f64).as_ref()).unwrap();
//! assert_eq!(v[(2, 0)], 4.0);
//! ```

use std::fmt;
use std::sync::Arc;

use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Mat, MatMut, MatRef};

use crate::config::options::{FunctionConfig, OpNorm};
use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{axpby, check_rows, check_shape};
use crate::error::OpError;
use crate::operator::Operator;
use crate::operator::adjoint::AdjointOperator;

pub type OutOfPlaceFn<T, P> = Arc<dyn Fn(MatRef<'_, T>, &P, T) -> Mat<T> + Send + Sync>;
pub type InPlaceFn<T, P> = Arc<dyn Fn(MatMut<'_, T>, MatRef<'_, T>, &P, T) + Send + Sync>;

/// One callable of a matrix-free operator.
pub enum OperatorFn<T, P> {
    /// `(u, p, t) -> v`
    OutOfPlace(OutOfPlaceFn<T, P>),
    /// `(v, u, p, t)`, writing into `v`
    InPlace(InPlaceFn<T, P>),
}

impl<T: Scalar, P: Parameter> OperatorFn<T, P> {
    pub fn out_of_place<F>(f: F) -> Self
    where
        F: Fn(MatRef<'_, T>, &P, T) -> Mat<T> + Send + Sync + 'static,
    {
        OperatorFn::OutOfPlace(Arc::new(f))
    }

    pub fn in_place<F>(f: F) -> Self
    where
        F: Fn(MatMut<'_, T>, MatRef<'_, T>, &P, T) + Send + Sync + 'static,
    {
        OperatorFn::InPlace(Arc::new(f))
    }

    pub fn is_in_place(&self) -> bool {
        matches!(self, OperatorFn::InPlace(_))
    }

    /// Evaluate into a new `(rows, k)` matrix.
    fn eval(&self, u: MatRef<'_, T>, p: &P, t: T, rows: usize) -> Result<Mat<T>, OpError> {
        match self {
            OperatorFn::OutOfPlace(f) => {
                let v = f(u, p, t);
                check_shape("FunctionOperator callable", (rows, u.ncols()), (v.nrows(), v.ncols()))?;
                Ok(v)
            }
            OperatorFn::InPlace(f) => {
                let mut v = Mat::zeros(rows, u.ncols());
                f(v.as_mut(), u, p, t);
                Ok(v)
            }
        }
    }

    /// Evaluate into `v`.
    fn eval_into(&self, mut v: MatMut<'_, T>, u: MatRef<'_, T>, p: &P, t: T) -> Result<(), OpError> {
        match self {
            OperatorFn::OutOfPlace(f) => {
                let out = f(u, p, t);
                check_shape("FunctionOperator callable", (v.nrows(), v.ncols()), (out.nrows(), out.ncols()))?;
                v.copy_from(&out);
            }
            OperatorFn::InPlace(f) => f(v, u, p, t),
        }
        Ok(())
    }
}

impl<T, P> Clone for OperatorFn<T, P> {
    fn clone(&self) -> Self {
        match self {
            OperatorFn::OutOfPlace(f) => OperatorFn::OutOfPlace(Arc::clone(f)),
            OperatorFn::InPlace(f) => OperatorFn::InPlace(Arc::clone(f)),
        }
    }
}

struct FunctionOps<T, P> {
    op: OperatorFn<T, P>,
    adjoint: Option<OperatorFn<T, P>>,
    inverse: Option<OperatorFn<T, P>>,
    adjoint_inverse: Option<OperatorFn<T, P>>,
}

impl<T, P> Clone for FunctionOps<T, P> {
    fn clone(&self) -> Self {
        FunctionOps {
            op: self.op.clone(),
            adjoint: self.adjoint.clone(),
            inverse: self.inverse.clone(),
            adjoint_inverse: self.adjoint_inverse.clone(),
        }
    }
}

/// Matrix-free operator evaluated at the stored `(p, t)`.
pub struct FunctionOperator<T, P = ()> {
    ops: FunctionOps<T, P>,
    config: FunctionConfig<T, P>,
    in_place: bool,
    size: (usize, usize),
    p: P,
    t: T,
    cache: Option<Mat<T>>,
}

/// Collects callables and configuration for a [`FunctionOperator`].
pub struct FunctionOperatorBuilder<T, P> {
    ops: FunctionOps<T, P>,
    config: FunctionConfig<T, P>,
    p: P,
    t: T,
}

impl<T: Scalar, P: Parameter> FunctionOperator<T, P> {
    pub fn builder(op: OperatorFn<T, P>) -> FunctionOperatorBuilder<T, P> {
        FunctionOperatorBuilder {
            ops: FunctionOps { op, adjoint: None, inverse: None, adjoint_inverse: None },
            config: FunctionConfig::default(),
            p: P::default(),
            t: T::zero(),
        }
    }

    /// Shorthand for a primary callable plus a prepared configuration.
    pub fn new(op: OperatorFn<T, P>, config: FunctionConfig<T, P>) -> Result<Self, OpError> {
        Self::builder(op).config(config).build()
    }

    pub fn parameters(&self) -> &P {
        &self.p
    }

    pub fn time(&self) -> T {
        self.t
    }

    pub fn config(&self) -> &FunctionConfig<T, P> {
        &self.config
    }

    pub fn is_in_place(&self) -> bool {
        self.in_place
    }

    fn inverse_fn(&self) -> Result<&OperatorFn<T, P>, OpError> {
        self.ops.inverse.as_ref().ok_or(OpError::Unsupported("FunctionOperator has no inverse callable"))
    }
}

impl<T: Scalar, P: Parameter> FunctionOperatorBuilder<T, P> {
    pub fn adjoint(mut self, f: OperatorFn<T, P>) -> Self {
        self.ops.adjoint = Some(f);
        self
    }

    pub fn inverse(mut self, f: OperatorFn<T, P>) -> Self {
        self.ops.inverse = Some(f);
        self
    }

    pub fn adjoint_inverse(mut self, f: OperatorFn<T, P>) -> Self {
        self.ops.adjoint_inverse = Some(f);
        self
    }

    /// Replace the whole configuration record.
    pub fn config(mut self, config: FunctionConfig<T, P>) -> Self {
        self.config = config;
        self
    }

    pub fn in_place(mut self, in_place: bool) -> Self {
        self.config.in_place = Some(in_place);
        self
    }

    pub fn size(mut self, rows: usize, cols: usize) -> Self {
        self.config.size = Some((rows, cols));
        self
    }

    pub fn symmetric(mut self, yes: bool) -> Self {
        self.config.is_symmetric = yes;
        self
    }

    pub fn hermitian(mut self, yes: bool) -> Self {
        self.config.is_hermitian = yes;
        self
    }

    pub fn posdef(mut self, yes: bool) -> Self {
        self.config.is_posdef = yes;
        self
    }

    pub fn opnorm(mut self, norm: OpNorm<T, P>) -> Self {
        self.config.opnorm = Some(norm);
        self
    }

    /// Initial parameter; defaults to `P::default()`.
    pub fn parameters(mut self, p: P) -> Self {
        self.p = p;
        self
    }

    /// Initial time; defaults to zero.
    pub fn time(mut self, t: T) -> Self {
        self.t = t;
        self
    }

    pub fn build(self) -> Result<FunctionOperator<T, P>, OpError> {
        let FunctionOperatorBuilder { mut ops, config, p, t } = self;
        let in_place = config
            .in_place
            .ok_or_else(|| OpError::Configuration("FunctionOperator needs the in-place flag".to_string()))?;
        let size = config
            .size
            .ok_or_else(|| OpError::Configuration("FunctionOperator needs a size".to_string()))?;
        if config.is_self_adjoint() && size.0 != size.1 {
            return Err(OpError::Configuration(format!(
                "symmetric or hermitian FunctionOperator must be square, got {}x{}",
                size.0, size.1
            )));
        }

        if ops.adjoint.is_none() && config.is_self_adjoint() {
            ops.adjoint = Some(ops.op.clone());
        }
        if ops.inverse.is_some() && ops.adjoint_inverse.is_none() {
            ops.adjoint_inverse = ops.inverse.clone();
        }

        let callables = [
            ("op", Some(&ops.op)),
            ("adjoint", ops.adjoint.as_ref()),
            ("inverse", ops.inverse.as_ref()),
            ("adjoint_inverse", ops.adjoint_inverse.as_ref()),
        ];
        for (name, f) in callables {
            if let Some(f) = f {
                if f.is_in_place() != in_place {
                    return Err(OpError::Configuration(format!(
                        "`{name}` callable form does not match in_place = {in_place}"
                    )));
                }
            }
        }

        Ok(FunctionOperator { ops, config, in_place, size, p, t, cache: None })
    }
}

impl<T: Scalar, P: Parameter> Clone for FunctionOperator<T, P> {
    fn clone(&self) -> Self {
        FunctionOperator {
            ops: self.ops.clone(),
            config: self.config.clone(),
            in_place: self.in_place,
            size: self.size,
            p: self.p.clone(),
            t: self.t,
            cache: self.cache.clone(),
        }
    }
}

impl<T: Scalar, P> fmt::Debug for FunctionOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionOperator")
            .field("size", &self.size)
            .field("in_place", &self.in_place)
            .field("t", &self.t)
            .field("config", &self.config)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for FunctionOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn flags(&self) -> OpFlags {
        let mut flags = OpFlags::LINEAR;
        flags |= if self.in_place { OpFlags::MUL_IN_PLACE } else { OpFlags::MUL };
        if self.ops.inverse.is_some() {
            flags |= if self.in_place { OpFlags::LDIV_IN_PLACE } else { OpFlags::LDIV };
        }
        if self.ops.adjoint.is_some() {
            flags |= OpFlags::ADJOINT;
        }
        flags
    }

    fn is_cache_set(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for FunctionOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (m, n) = self.size;
        check_rows("FunctionOperator::apply", n, u)?;
        self.ops.op.eval(u, &self.p, self.t, m)
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (m, n) = self.size;
        let k = check_rows("FunctionOperator::mul", n, u)?;
        check_shape("FunctionOperator::mul", (m, k), (v.nrows(), v.ncols()))?;
        self.ops.op.eval_into(v, u, &self.p, self.t)
    }

    /// Saves `v` in the cache, recomputes `L u` into `v`, then combines.
    fn mul_scaled(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let (m, n) = self.size;
        let k = check_rows("FunctionOperator::mul", n, u)?;
        check_shape("FunctionOperator::mul", (m, k), (v.nrows(), v.ncols()))?;
        let cache = self.cache.as_mut().ok_or(OpError::CacheNotReady("FunctionOperator"))?;
        check_shape("FunctionOperator cache", (cache.nrows(), cache.ncols()), (m, k))?;
        cache.as_mut().copy_from(v.rb());
        self.ops.op.eval_into(v.rb_mut(), u, &self.p, self.t)?;
        axpby(v, cache.as_ref(), beta, alpha);
        Ok(())
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (m, n) = self.size;
        check_rows("FunctionOperator::solve", m, u)?;
        self.inverse_fn()?.eval(u, &self.p, self.t, n)
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (m, n) = self.size;
        let k = check_rows("FunctionOperator::solve", m, u)?;
        check_shape("FunctionOperator::solve", (n, k), (v.nrows(), v.ncols()))?;
        self.inverse_fn()?.eval_into(v, u, &self.p, self.t)
    }

    /// Stages `u` in the cache and evaluates the inverse back into `u`.
    fn solve_in_place(&mut self, u: MatMut<'_, T>) -> Result<(), OpError> {
        let (m, n) = self.size;
        if m != n {
            return Err(OpError::Unsupported("in-place solve with a non-square FunctionOperator"));
        }
        let k = check_rows("FunctionOperator::solve", m, u.rb())?;
        let inverse = self
            .ops
            .inverse
            .as_ref()
            .ok_or(OpError::Unsupported("FunctionOperator has no inverse callable"))?;
        let cache = self.cache.as_mut().ok_or(OpError::CacheNotReady("FunctionOperator"))?;
        check_shape("FunctionOperator cache", (cache.nrows(), cache.ncols()), (m, k))?;
        cache.as_mut().copy_from(u.rb());
        inverse.eval_into(u, cache.as_ref(), &self.p, self.t)
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        if self.config.is_self_adjoint() {
            return Ok(Operator::Function(self.clone()));
        }
        let Some(op_adjoint) = self.ops.adjoint.clone() else {
            log::trace!("FunctionOperator: no adjoint callable, wrapping in an adjoint view");
            return Ok(Operator::Adjoint(AdjointOperator::new(Operator::Function(self.clone()))));
        };
        let (m, n) = self.size;
        // The adjoint writes n-row outputs; an m-row buffer is only reusable when square.
        let cache = self.cache.as_ref().filter(|c| c.nrows() == n).cloned();
        if self.cache.is_some() && cache.is_none() {
            log::debug!("FunctionOperator: dropping {}x{} cache on adjoint", m, n);
        }
        let ops = FunctionOps {
            op: op_adjoint,
            adjoint: Some(self.ops.op.clone()),
            inverse: self.ops.adjoint_inverse.clone(),
            adjoint_inverse: self.ops.inverse.clone(),
        };
        let mut config = self.config.clone();
        config.size = Some((n, m));
        Ok(Operator::Function(FunctionOperator {
            ops,
            config,
            in_place: self.in_place,
            size: (n, m),
            p: self.p.clone(),
            t: self.t,
            cache,
        }))
    }

    fn update_coefficients(self, _u: MatRef<'_, T>, p: &P, t: T) -> Self {
        log::trace!("FunctionOperator: state refreshed to t = {:?}", t);
        FunctionOperator { p: p.clone(), t, ..self }
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let (m, n) = self.size;
        let k = check_rows("FunctionOperator::cache", n, u)?;
        log::debug!("FunctionOperator: caching {}x{} output buffer", m, k);
        self.cache = Some(Mat::zeros(m, k));
        Ok(self)
    }

    /// Materialised by applying the operator to the identity.
    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        self.apply(Mat::<T>::identity(self.size.1, self.size.1).as_ref())
    }

    fn opnorm(&self) -> Result<T, OpError> {
        self.config
            .opnorm
            .as_ref()
            .map(|norm| norm.evaluate(&self.p, self.t))
            .ok_or(OpError::UnsupportedNorm("FunctionOperator"))
    }
}
