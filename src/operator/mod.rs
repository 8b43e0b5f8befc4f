//! Operator variants and the unified [`Operator`] enum.
//!
//! Every variant implements [`OperatorTraits`] and [`LinearOperator`]; the
//! enum forwards each call to the active variant so that operator trees can
//! be built from any mix of leaves and composites.
//!
//! # Example
//! ```rust
//! use faer::Mat;
//! use linop::{DenseMatrix, LinearOperator, Operator, OperatorTraits};
//!
//! let a = Operator::<f64>::matrix(Mat::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]));
//! let b = Operator::<f64>::matrix(Mat::from_rows(&[&[0.0, 1.0], &[1.0, 0.0]]));
//! let k = linop::kron(a, b);
//! assert_eq!(k.size(), (4, 4));
//! let dense = k.to_dense().unwrap();
//! assert_eq!(dense[(1, 0)], 1.0);
//! assert_eq!(dense[(3, 2)], 4.0);
//! ```

use std::fmt;
use std::sync::Arc;

use faer::{Mat, MatMut, MatRef};

use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::error::OpError;
use crate::matrix::sparse::CsrMatrix;

pub mod adjoint;
pub mod affine;
pub mod composite;
pub mod function;
pub mod invertible;
pub mod matrix;
pub mod ops;
pub mod tensor;

pub use adjoint::AdjointOperator;
pub use affine::AffineOperator;
pub use composite::{ComposedOperator, IdentityOperator, ScaledOperator, SumOperator};
pub use function::{FunctionOperator, FunctionOperatorBuilder, OperatorFn};
pub use invertible::{DenseFactorization, Factorization, InvertibleOperator};
pub use matrix::{MatrixOperator, UpdateFn, update_fn};
pub use tensor::{TensorCache, TensorProductOperator};

/// Unified operator type.
///
/// Composites own their children as `Operator`s, so any variant may appear
/// anywhere in a tree.
pub enum Operator<T, P = ()> {
    /// Dense matrix with an optional update rule.
    Matrix(MatrixOperator<T, P>),
    /// Factorization; solving is the primary capability.
    Invertible(InvertibleOperator<T, P>),
    /// `u ↦ A u + b`.
    Affine(AffineOperator<T, P>),
    /// Matrix-free operator defined by callables.
    Function(FunctionOperator<T, P>),
    /// Lazy Kronecker product `outer ⊗ inner`.
    Tensor(TensorProductOperator<T, P>),
    /// Adjoint of an operator that has no adjoint action, evaluated by probing.
    Adjoint(AdjointOperator<T, P>),
    /// `I_n`.
    Identity(IdentityOperator<T, P>),
    /// `c · L`.
    Scaled(ScaledOperator<T, P>),
    /// `L₁ + L₂ + …`.
    Sum(SumOperator<T, P>),
    /// `A ∘ B`.
    Composed(ComposedOperator<T, P>),
}

/// Forward a call to the active variant.
macro_rules! dispatch {
    ($self:expr, $op:ident => $body:expr) => {
        match $self {
            Operator::Matrix($op) => $body,
            Operator::Invertible($op) => $body,
            Operator::Affine($op) => $body,
            Operator::Function($op) => $body,
            Operator::Tensor($op) => $body,
            Operator::Adjoint($op) => $body,
            Operator::Identity($op) => $body,
            Operator::Scaled($op) => $body,
            Operator::Sum($op) => $body,
            Operator::Composed($op) => $body,
        }
    };
}

/// Forward a consuming call and wrap the result back into the same variant.
macro_rules! dispatch_rewrap {
    ($self:expr, $op:ident => $body:expr) => {
        match $self {
            Operator::Matrix($op) => Operator::Matrix($body),
            Operator::Invertible($op) => Operator::Invertible($body),
            Operator::Affine($op) => Operator::Affine($body),
            Operator::Function($op) => Operator::Function($body),
            Operator::Tensor($op) => Operator::Tensor($body),
            Operator::Adjoint($op) => Operator::Adjoint($body),
            Operator::Identity($op) => Operator::Identity($body),
            Operator::Scaled($op) => Operator::Scaled($body),
            Operator::Sum($op) => Operator::Sum($body),
            Operator::Composed($op) => Operator::Composed($body),
        }
    };
}

impl<T: Scalar, P: Parameter> Operator<T, P> {
    /// Wrap a constant dense matrix.
    pub fn matrix(a: Mat<T>) -> Self {
        Operator::Matrix(MatrixOperator::new(a))
    }

    /// Wrap a factorization; fails when it cannot solve.
    pub fn invertible<F: Factorization<T> + 'static>(fact: F) -> Result<Self, OpError> {
        Ok(Operator::Invertible(InvertibleOperator::new(fact)?))
    }

    /// Wrap a shared factorization.
    pub fn from_factorization(fact: Arc<dyn Factorization<T>>) -> Result<Self, OpError> {
        Ok(Operator::Invertible(InvertibleOperator::from_arc(fact)?))
    }

    /// `u ↦ self u + b`.
    pub fn affine(self, b: Mat<T>) -> Result<Self, OpError> {
        Ok(Operator::Affine(AffineOperator::new(self, b)?))
    }

    pub fn identity(n: usize) -> Self {
        Operator::Identity(IdentityOperator::new(n))
    }

    /// `self ⊗ inner`.
    pub fn tensor(self, inner: Operator<T, P>) -> Self {
        Operator::Tensor(TensorProductOperator::new(self, inner))
    }

    /// `c · self`; nested scalings collapse into one coefficient.
    pub fn scale(self, c: T) -> Self {
        match self {
            Operator::Scaled(s) => {
                let coefficient = s.coefficient() * c;
                Operator::Scaled(ScaledOperator::new(coefficient, s.into_operator()))
            }
            op => Operator::Scaled(ScaledOperator::new(c, op)),
        }
    }

    /// `self + rhs`; sums are flattened.
    pub fn try_add(self, rhs: Operator<T, P>) -> Result<Self, OpError> {
        if self.size() != rhs.size() {
            return Err(OpError::mismatch("add", self.size(), rhs.size()));
        }
        let mut terms = match self {
            Operator::Sum(s) => s.into_terms(),
            op => vec![op],
        };
        match rhs {
            Operator::Sum(s) => terms.extend(s.into_terms()),
            op => terms.push(op),
        }
        Ok(Operator::Sum(SumOperator::new(terms)?))
    }

    /// `self − rhs`.
    pub fn try_sub(self, rhs: Operator<T, P>) -> Result<Self, OpError> {
        self.try_add(rhs.scale(-T::one()))
    }

    /// `self ∘ inner`.
    pub fn try_compose(self, inner: Operator<T, P>) -> Result<Self, OpError> {
        Ok(Operator::Composed(ComposedOperator::new(self, inner)?))
    }

    /// `L x` for a single vector.
    pub fn apply_vec(&self, x: &[T]) -> Result<Vec<T>, OpError> {
        let v = self.apply(MatRef::from_column_major_slice(x, x.len(), 1))?;
        Ok((0..v.nrows()).map(|i| v[(i, 0)]).collect())
    }

    /// `L \ x` for a single vector.
    pub fn solve_vec(&self, x: &[T]) -> Result<Vec<T>, OpError> {
        let v = self.solve(MatRef::from_column_major_slice(x, x.len(), 1))?;
        Ok((0..v.nrows()).map(|i| v[(i, 0)]).collect())
    }

    /// Short variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Matrix(_) => "matrix",
            Operator::Invertible(_) => "invertible",
            Operator::Affine(_) => "affine",
            Operator::Function(_) => "function",
            Operator::Tensor(_) => "tensor",
            Operator::Adjoint(_) => "adjoint",
            Operator::Identity(_) => "identity",
            Operator::Scaled(_) => "scaled",
            Operator::Sum(_) => "sum",
            Operator::Composed(_) => "composed",
        }
    }
}

/// Kronecker product `outer ⊗ inner`, evaluated lazily.
pub fn kron<T: Scalar, P: Parameter>(outer: Operator<T, P>, inner: Operator<T, P>) -> Operator<T, P> {
    outer.tensor(inner)
}

impl<T: Scalar, P: Parameter> Clone for Operator<T, P> {
    fn clone(&self) -> Self {
        dispatch_rewrap!(self, op => op.clone())
    }
}

impl<T: Scalar, P> fmt::Debug for Operator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, op => fmt::Debug::fmt(op, f))
    }
}

impl<T: Scalar, P: Parameter> From<Mat<T>> for Operator<T, P> {
    fn from(a: Mat<T>) -> Self {
        Operator::matrix(a)
    }
}

impl<T: Scalar, P: Parameter> From<MatrixOperator<T, P>> for Operator<T, P> {
    fn from(op: MatrixOperator<T, P>) -> Self {
        Operator::Matrix(op)
    }
}

impl<T: Scalar, P: Parameter> From<FunctionOperator<T, P>> for Operator<T, P> {
    fn from(op: FunctionOperator<T, P>) -> Self {
        Operator::Function(op)
    }
}

impl<T: Scalar, P: Parameter> From<InvertibleOperator<T, P>> for Operator<T, P> {
    fn from(op: InvertibleOperator<T, P>) -> Self {
        Operator::Invertible(op)
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for Operator<T, P> {
    fn size(&self) -> (usize, usize) {
        dispatch!(self, op => op.size())
    }

    fn flags(&self) -> OpFlags {
        dispatch!(self, op => op.flags())
    }

    fn is_cache_set(&self) -> bool {
        dispatch!(self, op => op.is_cache_set())
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for Operator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        dispatch!(self, op => op.apply(u))
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        dispatch!(self, op => op.mul_into(v, u))
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        dispatch!(self, op => op.mul_scaled(v, u, alpha, beta))
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        dispatch!(self, op => op.solve(u))
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        dispatch!(self, op => op.solve_into(v, u))
    }

    fn solve_in_place(&mut self, u: MatMut<'_, T>) -> Result<(), OpError> {
        dispatch!(self, op => op.solve_in_place(u))
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        dispatch!(self, op => op.adjoint())
    }

    fn transpose(&self) -> Result<Operator<T, P>, OpError> {
        dispatch!(self, op => op.transpose())
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        dispatch_rewrap!(self, op => op.update_coefficients(u, p, t))
    }

    fn cache_self(self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        Ok(dispatch_rewrap!(self, op => op.cache_self(u)?))
    }

    fn cache_internals(self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        Ok(dispatch_rewrap!(self, op => op.cache_internals(u)?))
    }

    fn cache_operator(self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let kind = self.kind();
        let op = dispatch_rewrap!(self, op => op.cache_operator(u)?);
        log::trace!("cached {} operator of size {:?} for width {}", kind, op.size(), u.ncols());
        Ok(op)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        dispatch!(self, op => op.to_dense())
    }

    fn to_sparse(&self) -> Result<CsrMatrix<T>, OpError> {
        dispatch!(self, op => op.to_sparse())
    }

    fn opnorm(&self) -> Result<T, OpError> {
        dispatch!(self, op => op.opnorm())
    }
}
