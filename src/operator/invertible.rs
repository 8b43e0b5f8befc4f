//! Factorization-backed operators.
//!
//! An [`InvertibleOperator`] wraps an already computed factorization and
//! exposes left division as its primary capability. The factorizations
//! themselves come from Faer (LU with partial or full pivoting, QR) through
//! [`DenseFactorization`]; any other decomposition can take part by
//! implementing [`Factorization`].
//!
//! # References
//! - Faer documentation: https://github.com/sarah-ek/faer-rs
//! - Golub & Van Loan, Matrix Computations

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use faer::linalg::solvers::{DenseSolveCore, FullPivLu, PartialPivLu, Qr};
use faer::prelude::Reborrow;
use faer::{Conj, Mat, MatMut, MatRef};

use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{axpby, check_rows, check_shape};
use crate::error::OpError;
use crate::matrix::dense::opnorm_one;
use crate::operator::Operator;

/// A decomposition that can be wrapped by [`InvertibleOperator`].
///
/// Implementors advertise what they can do; the defaults advertise nothing.
pub trait Factorization<T: Scalar>: Send + Sync {
    /// Size of the factorized matrix.
    fn size(&self) -> (usize, usize);

    fn supports_ldiv(&self) -> bool {
        false
    }
    fn supports_ldiv_in_place(&self) -> bool {
        false
    }
    fn supports_mul(&self) -> bool {
        false
    }

    /// `rhs ← F⁻¹ rhs`, or `F⁻ᵀ rhs` when `transpose` is set.
    fn ldiv_in_place(&self, _rhs: MatMut<'_, T>, _transpose: bool) -> Result<(), OpError> {
        Err(OpError::Unsupported("in-place left division"))
    }

    /// Out-of-place `F⁻¹ u` (or `F⁻ᵀ u`).
    fn ldiv(&self, u: MatRef<'_, T>, transpose: bool) -> Result<Mat<T>, OpError> {
        let mut x = u.to_owned();
        self.ldiv_in_place(x.as_mut(), transpose)?;
        Ok(x)
    }

    /// `v ← F u` (or `Fᵀ u`).
    fn mul_into(&self, _v: MatMut<'_, T>, _u: MatRef<'_, T>, _transpose: bool) -> Result<(), OpError> {
        Err(OpError::Unsupported("factorization multiply"))
    }

    /// The factorized matrix.
    fn reconstruct(&self) -> Result<Mat<T>, OpError>;

    /// Induced 1-norm of the factorized matrix.
    fn opnorm(&self) -> Result<T, OpError> {
        Ok(opnorm_one(self.reconstruct()?.as_ref()))
    }
}

/// A Faer dense decomposition together with the size of its matrix.
pub struct DenseFactorization<F> {
    fact: F,
    size: (usize, usize),
}

fn require_square<T>(a: MatRef<'_, T>) -> Result<(), OpError> {
    if a.nrows() != a.ncols() {
        return Err(OpError::FactorError(format!(
            "expected a square matrix, found {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    Ok(())
}

impl<T: Scalar> DenseFactorization<PartialPivLu<T>> {
    /// LU with partial pivoting.
    pub fn lu(a: MatRef<'_, T>) -> Result<Self, OpError> {
        require_square(a)?;
        Ok(DenseFactorization { fact: PartialPivLu::new(a), size: (a.nrows(), a.ncols()) })
    }
}

impl<T: Scalar> DenseFactorization<FullPivLu<T>> {
    /// LU with full pivoting.
    pub fn full_piv_lu(a: MatRef<'_, T>) -> Result<Self, OpError> {
        require_square(a)?;
        Ok(DenseFactorization { fact: FullPivLu::new(a), size: (a.nrows(), a.ncols()) })
    }
}

impl<T: Scalar> DenseFactorization<Qr<T>> {
    /// Householder QR (square systems).
    pub fn qr(a: MatRef<'_, T>) -> Result<Self, OpError> {
        require_square(a)?;
        Ok(DenseFactorization { fact: Qr::new(a), size: (a.nrows(), a.ncols()) })
    }
}

impl<T, F> Factorization<T> for DenseFactorization<F>
where
    T: Scalar,
    F: DenseSolveCore<T> + Send + Sync,
{
    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn supports_ldiv(&self) -> bool {
        true
    }

    fn supports_ldiv_in_place(&self) -> bool {
        true
    }

    fn ldiv_in_place(&self, rhs: MatMut<'_, T>, transpose: bool) -> Result<(), OpError> {
        check_rows("Factorization::ldiv", self.size.0, rhs.rb())?;
        if transpose {
            self.fact.solve_transpose_in_place_with_conj(Conj::No, rhs);
        } else {
            self.fact.solve_in_place_with_conj(Conj::No, rhs);
        }
        Ok(())
    }

    fn reconstruct(&self) -> Result<Mat<T>, OpError> {
        Ok(self.fact.reconstruct())
    }
}

/// Operator defined by a factorization; `L \ u` is its primary capability.
pub struct InvertibleOperator<T, P = ()> {
    fact: Arc<dyn Factorization<T>>,
    // Stored in adjoint form: every solve and multiply uses the transpose.
    adjoint: bool,
    cache: Option<Mat<T>>,
    _marker: PhantomData<fn() -> P>,
}

impl<T: Scalar, P: Parameter> InvertibleOperator<T, P> {
    /// Fails with [`OpError::NotInvertible`] when the factorization advertises
    /// neither in-place nor out-of-place left division.
    pub fn new<F: Factorization<T> + 'static>(fact: F) -> Result<Self, OpError> {
        Self::from_arc(Arc::new(fact))
    }

    pub fn from_arc(fact: Arc<dyn Factorization<T>>) -> Result<Self, OpError> {
        if !(fact.supports_ldiv() || fact.supports_ldiv_in_place()) {
            return Err(OpError::NotInvertible(
                "factorization supports neither `ldiv` nor in-place `ldiv`".to_string(),
            ));
        }
        Ok(InvertibleOperator { fact, adjoint: false, cache: None, _marker: PhantomData })
    }

    /// Whether this operator represents the adjoint of the stored factorization.
    pub fn is_adjoint_form(&self) -> bool {
        self.adjoint
    }

    pub fn factorization(&self) -> &Arc<dyn Factorization<T>> {
        &self.fact
    }
}

impl<T: Clone, P> Clone for InvertibleOperator<T, P> {
    fn clone(&self) -> Self {
        InvertibleOperator {
            fact: Arc::clone(&self.fact),
            adjoint: self.adjoint,
            cache: self.cache.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, P> fmt::Debug for InvertibleOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvertibleOperator")
            .field("adjoint", &self.adjoint)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for InvertibleOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        let (m, n) = self.fact.size();
        if self.adjoint { (n, m) } else { (m, n) }
    }

    fn flags(&self) -> OpFlags {
        let mut flags = OpFlags::CONSTANT | OpFlags::ADJOINT | OpFlags::LINEAR;
        if self.fact.supports_ldiv() {
            flags |= OpFlags::LDIV;
        }
        if self.fact.supports_ldiv_in_place() {
            flags |= OpFlags::LDIV_IN_PLACE;
        }
        if self.fact.supports_mul() {
            flags |= OpFlags::APPLY;
        }
        flags
    }

    // Only the scaled multiply needs a buffer.
    fn is_cache_set(&self) -> bool {
        !self.fact.supports_mul() || self.cache.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for InvertibleOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (m, n) = self.size();
        let k = check_rows("InvertibleOperator::apply", n, u)?;
        let mut v = Mat::zeros(m, k);
        self.fact.mul_into(v.as_mut(), u, self.adjoint)?;
        Ok(v)
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (m, n) = self.size();
        let k = check_rows("InvertibleOperator::mul", n, u)?;
        check_shape("InvertibleOperator::mul", (m, k), (v.nrows(), v.ncols()))?;
        self.fact.mul_into(v, u, self.adjoint)
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let (m, n) = self.size();
        let k = check_rows("InvertibleOperator::mul", n, u)?;
        check_shape("InvertibleOperator::mul", (m, k), (v.nrows(), v.ncols()))?;
        let cache = self.cache.as_mut().ok_or(OpError::CacheNotReady("InvertibleOperator"))?;
        check_shape("InvertibleOperator cache", (cache.nrows(), cache.ncols()), (m, k))?;
        self.fact.mul_into(cache.as_mut(), u, self.adjoint)?;
        axpby(v, cache.as_ref(), alpha, beta);
        Ok(())
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        check_rows("InvertibleOperator::solve", self.size().0, u)?;
        self.fact.ldiv(u, self.adjoint)
    }

    fn solve_into(&mut self, mut v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (m, n) = self.size();
        let k = check_rows("InvertibleOperator::solve", m, u)?;
        check_shape("InvertibleOperator::solve", (n, k), (v.nrows(), v.ncols()))?;
        if self.fact.supports_ldiv_in_place() {
            v.copy_from(u);
            self.fact.ldiv_in_place(v, self.adjoint)
        } else {
            let x = self.fact.ldiv(u, self.adjoint)?;
            v.copy_from(&x);
            Ok(())
        }
    }

    fn solve_in_place(&mut self, mut u: MatMut<'_, T>) -> Result<(), OpError> {
        check_rows("InvertibleOperator::solve", self.size().0, u.rb())?;
        if self.fact.supports_ldiv_in_place() {
            self.fact.ldiv_in_place(u, self.adjoint)
        } else {
            let x = self.fact.ldiv(u.rb(), self.adjoint)?;
            u.copy_from(&x);
            Ok(())
        }
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        let mut adj = self.clone();
        adj.adjoint = !self.adjoint;
        if !self.is_square() && adj.cache.take().is_some() {
            log::debug!("InvertibleOperator: dropping cache on adjoint of a non-square factorization");
        }
        Ok(Operator::Invertible(adj))
    }

    fn update_coefficients(self, _u: MatRef<'_, T>, _p: &P, _t: T) -> Self {
        self
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let (m, n) = self.size();
        let k = check_rows("InvertibleOperator::cache", n, u)?;
        if self.fact.supports_mul() {
            log::debug!("InvertibleOperator: caching {}x{} product buffer", m, k);
            self.cache = Some(Mat::zeros(m, k));
        }
        Ok(self)
    }

    /// The adjoint form is materialised from the plain form, then transposed.
    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let a = self.fact.reconstruct()?;
        if self.adjoint {
            Ok(a.transpose().to_owned())
        } else {
            Ok(a)
        }
    }

    /// `1 / opnorm(F)`. Only an approximation of the norm of the inverse,
    /// adequate for the step-size heuristics that consume it.
    fn opnorm(&self) -> Result<T, OpError> {
        Ok(T::one() / self.fact.opnorm()?)
    }
}
