//! Core operator traits for linop.
//!
//! Every operator variant answers the same capability queries through
//! [`OperatorTraits`] and exposes the same evaluation protocol through
//! [`LinearOperator`]. Composite operators derive both from their children.

use std::fmt::Debug;

use bitflags::bitflags;
use faer::traits::RealField;
use faer::{Mat, MatMut, MatRef};
use num_traits::Float;

use crate::error::OpError;
use crate::matrix::dense::opnorm_one;
use crate::matrix::sparse::CsrMatrix;
use crate::operator::Operator;

/// Real scalar field accepted by all operators (`f32`, `f64`).
pub trait Scalar: RealField + Float + Copy + Debug + Send + Sync + 'static {}

impl<T> Scalar for T where T: RealField + Float + Copy + Debug + Send + Sync + 'static {}

/// The opaque external parameter `p` handed to update rules and callables.
pub trait Parameter: Clone + Default + Send + Sync + 'static {}

impl<P> Parameter for P where P: Clone + Default + Send + Sync + 'static {}

bitflags! {
    /// Capability set of an operator.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct OpFlags: u32 {
        const CONSTANT      = 0b0000_0001;
        const ADJOINT       = 0b0000_0010;
        const MUL           = 0b0000_0100;
        const MUL_IN_PLACE  = 0b0000_1000;
        const LDIV          = 0b0001_0000;
        const LDIV_IN_PLACE = 0b0010_0000;
        const LINEAR        = 0b0100_0000;
        const APPLY         = Self::MUL.bits() | Self::MUL_IN_PLACE.bits();
        const SOLVE         = Self::LDIV.bits() | Self::LDIV_IN_PLACE.bits();
    }
}

impl OpFlags {
    /// `APPLY` if the set can evaluate `L u` in any form.
    pub fn can_apply(self) -> bool {
        self.intersects(OpFlags::APPLY)
    }

    /// `SOLVE` if the set can evaluate `L \ u` in any form.
    pub fn can_solve(self) -> bool {
        self.intersects(OpFlags::SOLVE)
    }
}

/// Capability queries shared by every operator.
pub trait OperatorTraits {
    /// `(rows, cols)`.
    fn size(&self) -> (usize, usize);
    fn flags(&self) -> OpFlags;
    /// True iff every scratch buffer this operator needs for its own
    /// in-place evaluation has been allocated.
    fn is_cache_set(&self) -> bool;

    fn is_constant(&self) -> bool {
        self.flags().contains(OpFlags::CONSTANT)
    }
    fn has_adjoint(&self) -> bool {
        self.flags().contains(OpFlags::ADJOINT)
    }
    fn has_mul(&self) -> bool {
        self.flags().contains(OpFlags::MUL)
    }
    fn has_mul_in_place(&self) -> bool {
        self.flags().contains(OpFlags::MUL_IN_PLACE)
    }
    fn has_ldiv(&self) -> bool {
        self.flags().contains(OpFlags::LDIV)
    }
    fn has_ldiv_in_place(&self) -> bool {
        self.flags().contains(OpFlags::LDIV_IN_PLACE)
    }
    fn is_linear(&self) -> bool {
        self.flags().contains(OpFlags::LINEAR)
    }
    fn is_square(&self) -> bool {
        let (m, n) = self.size();
        m == n
    }
}

/// Evaluation, update and cache protocol.
///
/// Operands are column-major: an operator of size `(m, n)` maps `u` of
/// shape `(n, k)` to `(m, k)`, one column at a time.
pub trait LinearOperator<T: Scalar, P: Parameter>: OperatorTraits {
    /// Out-of-place `L u`.
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError>;

    /// `v ← L u`.
    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError>;

    /// `v ← α L u + β v`. Requires a ready cache.
    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError>;

    /// Out-of-place `L \ u`.
    fn solve(&self, _u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        Err(OpError::Unsupported("solve"))
    }

    /// `v ← L \ u`.
    fn solve_into(&mut self, _v: MatMut<'_, T>, _u: MatRef<'_, T>) -> Result<(), OpError> {
        Err(OpError::Unsupported("solve_into"))
    }

    /// `u ← L \ u`.
    fn solve_in_place(&mut self, _u: MatMut<'_, T>) -> Result<(), OpError> {
        Err(OpError::Unsupported("solve_in_place"))
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError>;

    /// Scalars are real, so the transpose is the adjoint.
    fn transpose(&self) -> Result<Operator<T, P>, OpError> {
        self.adjoint()
    }

    /// Refresh the dependence on `(p, t)` given the current state `u`.
    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self
    where
        Self: Sized;

    /// Allocate this operator's own scratch buffers for operands shaped like `u`.
    fn cache_self(self, u: MatRef<'_, T>) -> Result<Self, OpError>
    where
        Self: Sized;

    /// Cache every child operator; leaves have nothing to do.
    fn cache_internals(self, _u: MatRef<'_, T>) -> Result<Self, OpError>
    where
        Self: Sized,
    {
        Ok(self)
    }

    fn cache_operator(self, u: MatRef<'_, T>) -> Result<Self, OpError>
    where
        Self: Sized,
    {
        self.cache_self(u)?.cache_internals(u)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError>;

    fn to_sparse(&self) -> Result<CsrMatrix<T>, OpError> {
        Ok(CsrMatrix::from_dense(self.to_dense()?.as_ref()))
    }

    /// Induced 1-norm.
    fn opnorm(&self) -> Result<T, OpError> {
        Ok(opnorm_one(self.to_dense()?.as_ref()))
    }
}

/// Matrix–vector product: y ← A x.
pub trait MatVec<V> {
    /// Compute y = A · x.
    fn matvec(&self, x: &V, y: &mut V);
}
