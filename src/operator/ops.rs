//! `+`, `-`, `*` and unary `-` on operators.
//!
//! Plain `Mat<T>` operands are wrapped into a constant [`MatrixOperator`]
//! on either side. Like faer's own matrix arithmetic, the operator forms
//! panic on a size mismatch; use [`Operator::try_add`],
//! [`Operator::try_sub`] and [`Operator::try_compose`] for a `Result`.
//!
//! `A * B` composes (`u ↦ A (B u)`); `c * A` and `A * c` scale.

use std::ops::{Add, Mul, Neg, Sub};

use faer::Mat;

use crate::core::traits::{Parameter, Scalar};
use crate::error::OpError;
use crate::operator::{MatrixOperator, Operator};

fn unwrap_op<T: Scalar, P: Parameter>(result: Result<Operator<T, P>, OpError>) -> Operator<T, P> {
    match result {
        Ok(op) => op,
        Err(err) => panic!("{err}"),
    }
}

impl<T: Scalar, P: Parameter> Add for Operator<T, P> {
    type Output = Operator<T, P>;
    fn add(self, rhs: Operator<T, P>) -> Self::Output {
        unwrap_op(self.try_add(rhs))
    }
}

impl<T: Scalar, P: Parameter> Sub for Operator<T, P> {
    type Output = Operator<T, P>;
    fn sub(self, rhs: Operator<T, P>) -> Self::Output {
        unwrap_op(self.try_sub(rhs))
    }
}

impl<T: Scalar, P: Parameter> Mul for Operator<T, P> {
    type Output = Operator<T, P>;
    fn mul(self, rhs: Operator<T, P>) -> Self::Output {
        unwrap_op(self.try_compose(rhs))
    }
}

impl<T: Scalar, P: Parameter> Neg for Operator<T, P> {
    type Output = Operator<T, P>;
    fn neg(self) -> Self::Output {
        self.scale(-T::one())
    }
}

impl<T: Scalar, P: Parameter> Add<Mat<T>> for Operator<T, P> {
    type Output = Operator<T, P>;
    fn add(self, rhs: Mat<T>) -> Self::Output {
        self + Operator::Matrix(MatrixOperator::new(rhs))
    }
}

impl<T: Scalar, P: Parameter> Add<Operator<T, P>> for Mat<T> {
    type Output = Operator<T, P>;
    fn add(self, rhs: Operator<T, P>) -> Self::Output {
        Operator::Matrix(MatrixOperator::new(self)) + rhs
    }
}

impl<T: Scalar, P: Parameter> Sub<Mat<T>> for Operator<T, P> {
    type Output = Operator<T, P>;
    fn sub(self, rhs: Mat<T>) -> Self::Output {
        self - Operator::Matrix(MatrixOperator::new(rhs))
    }
}

impl<T: Scalar, P: Parameter> Sub<Operator<T, P>> for Mat<T> {
    type Output = Operator<T, P>;
    fn sub(self, rhs: Operator<T, P>) -> Self::Output {
        Operator::Matrix(MatrixOperator::new(self)) - rhs
    }
}

impl<T: Scalar, P: Parameter> Mul<Mat<T>> for Operator<T, P> {
    type Output = Operator<T, P>;
    fn mul(self, rhs: Mat<T>) -> Self::Output {
        self * Operator::Matrix(MatrixOperator::new(rhs))
    }
}

impl<T: Scalar, P: Parameter> Mul<Operator<T, P>> for Mat<T> {
    type Output = Operator<T, P>;
    fn mul(self, rhs: Operator<T, P>) -> Self::Output {
        Operator::Matrix(MatrixOperator::new(self)) * rhs
    }
}

// Spelled out per float type: a generic `Mul<T>` would overlap with `Mul<Operator>`.
macro_rules! impl_scalar_mul {
    ($($t:ty),*) => {$(
        impl<P: Parameter> Mul<$t> for Operator<$t, P> {
            type Output = Operator<$t, P>;
            fn mul(self, c: $t) -> Self::Output {
                self.scale(c)
            }
        }

        impl<P: Parameter> Mul<Operator<$t, P>> for $t {
            type Output = Operator<$t, P>;
            fn mul(self, op: Operator<$t, P>) -> Self::Output {
                op.scale(self)
            }
        }
    )*};
}

impl_scalar_mul!(f32, f64);
