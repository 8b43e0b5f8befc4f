//! Configuration record for matrix-free operators.
//!
//! This module provides the `FunctionConfig` struct, which carries everything a
//! [`FunctionOperator`](crate::operator::FunctionOperator) cannot infer from its
//! callables: whether they write into a supplied output, the operator size, the
//! declared symmetry properties, and an optional norm estimator.

use std::fmt;
use std::sync::Arc;

/// Norm estimator for matrix-free operators.
pub enum OpNorm<T, P> {
    /// A known bound, independent of `(p, t)`.
    Fixed(T),
    /// Evaluated against the operator's current `(p, t)`.
    Estimator(Arc<dyn Fn(&P, T) -> T + Send + Sync>),
}

impl<T: Copy, P> OpNorm<T, P> {
    pub fn estimator(f: impl Fn(&P, T) -> T + Send + Sync + 'static) -> Self {
        OpNorm::Estimator(Arc::new(f))
    }

    pub fn evaluate(&self, p: &P, t: T) -> T {
        match self {
            OpNorm::Fixed(value) => *value,
            OpNorm::Estimator(f) => f(p, t),
        }
    }
}

impl<T: Copy, P> Clone for OpNorm<T, P> {
    fn clone(&self) -> Self {
        match self {
            OpNorm::Fixed(value) => OpNorm::Fixed(*value),
            OpNorm::Estimator(f) => OpNorm::Estimator(Arc::clone(f)),
        }
    }
}

/// Matrix-free operator traits.
pub struct FunctionConfig<T, P> {
    /// Callables write into a supplied output (`true`) or return a new one (`false`).
    pub in_place: Option<bool>,

    /// `(rows, cols)` of the operator.
    pub size: Option<(usize, usize)>,

    pub is_symmetric: bool,
    pub is_hermitian: bool,
    pub is_posdef: bool,

    pub opnorm: Option<OpNorm<T, P>>,
}

impl<T, P> FunctionConfig<T, P> {
    /// Declared self-adjoint: the adjoint callable may default to the primary one.
    pub fn is_self_adjoint(&self) -> bool {
        self.is_symmetric || self.is_hermitian
    }
}

impl<T, P> Default for FunctionConfig<T, P> {
    fn default() -> Self {
        FunctionConfig {
            in_place: None,
            size: None,
            is_symmetric: false,
            is_hermitian: false,
            is_posdef: false,
            opnorm: None,
        }
    }
}

impl<T: Copy, P> Clone for FunctionConfig<T, P> {
    fn clone(&self) -> Self {
        FunctionConfig {
            in_place: self.in_place,
            size: self.size,
            is_symmetric: self.is_symmetric,
            is_hermitian: self.is_hermitian,
            is_posdef: self.is_posdef,
            opnorm: self.opnorm.clone(),
        }
    }
}

impl<T, P> fmt::Debug for FunctionConfig<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionConfig")
            .field("in_place", &self.in_place)
            .field("size", &self.size)
            .field("is_symmetric", &self.is_symmetric)
            .field("is_hermitian", &self.is_hermitian)
            .field("is_posdef", &self.is_posdef)
            .field("has_opnorm", &self.opnorm.is_some())
            .finish()
    }
}
