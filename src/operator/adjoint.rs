//! Lazy adjoint of an operator that has no adjoint action of its own.
//!
//! The parent is probed with unit vectors: `(Lᵀ u)[j] = Σ_i (L e_j)[i] · u[i]`.
//! Caching stores the probed matrix so repeated products skip the probe.

use std::fmt;

use faer::prelude::Reborrow;
use faer::{Mat, MatMut, MatRef};

use crate::core::traits::{LinearOperator, OpFlags, OperatorTraits, Parameter, Scalar};
use crate::core::wrappers::{check_rows, check_shape, gemm};
use crate::error::OpError;
use crate::operator::Operator;

pub struct AdjointOperator<T, P = ()> {
    parent: Box<Operator<T, P>>,
    /// `L` as probed from the parent, `(m, n)` for a parent of that size.
    probe: Option<Mat<T>>,
}

impl<T: Scalar, P: Parameter> AdjointOperator<T, P> {
    pub fn new(parent: Operator<T, P>) -> Self {
        AdjointOperator { parent: Box::new(parent), probe: None }
    }

    pub fn parent(&self) -> &Operator<T, P> {
        &self.parent
    }

    pub fn into_parent(self) -> Operator<T, P> {
        *self.parent
    }

    /// `L` as a dense matrix, column `j` being `L e_j`.
    fn probe_parent(&self) -> Result<Mat<T>, OpError> {
        let (_, n) = self.parent.size();
        self.parent.apply(Mat::<T>::identity(n, n).as_ref())
    }

    /// `L⁻¹` as a dense matrix, column `i` being `L \ e_i`.
    fn probe_inverse(&self) -> Result<Mat<T>, OpError> {
        let (m, _) = self.parent.size();
        self.parent.solve(Mat::<T>::identity(m, m).as_ref())
    }
}

impl<T: Scalar, P: Parameter> Clone for AdjointOperator<T, P> {
    fn clone(&self) -> Self {
        AdjointOperator { parent: self.parent.clone(), probe: self.probe.clone() }
    }
}

impl<T: Scalar, P> fmt::Debug for AdjointOperator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjointOperator")
            .field("parent", &self.parent)
            .field("probed", &self.probe.is_some())
            .finish()
    }
}

impl<T: Scalar, P: Parameter> OperatorTraits for AdjointOperator<T, P> {
    fn size(&self) -> (usize, usize) {
        let (m, n) = self.parent.size();
        (n, m)
    }

    fn flags(&self) -> OpFlags {
        let parent = self.parent.flags();
        let mut flags = OpFlags::LINEAR | OpFlags::ADJOINT;
        if parent.contains(OpFlags::CONSTANT) {
            flags |= OpFlags::CONSTANT;
        }
        if parent.can_apply() {
            flags |= OpFlags::APPLY;
        }
        if parent.can_solve() && self.parent.is_square() {
            flags |= OpFlags::SOLVE;
        }
        flags
    }

    fn is_cache_set(&self) -> bool {
        self.probe.is_some()
    }
}

impl<T: Scalar, P: Parameter> LinearOperator<T, P> for AdjointOperator<T, P> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (rows, cols) = self.size();
        let k = check_rows("AdjointOperator::apply", cols, u)?;
        let mut v = Mat::zeros(rows, k);
        match &self.probe {
            Some(l) => gemm(v.as_mut(), l.transpose(), u, T::one(), T::zero()),
            None => {
                let l = self.probe_parent()?;
                gemm(v.as_mut(), l.transpose(), u, T::one(), T::zero());
            }
        }
        Ok(v)
    }

    fn mul_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (rows, cols) = self.size();
        let k = check_rows("AdjointOperator::mul", cols, u)?;
        check_shape("AdjointOperator::mul", (rows, k), (v.nrows(), v.ncols()))?;
        match &self.probe {
            Some(l) => gemm(v, l.transpose(), u, T::one(), T::zero()),
            None => {
                let l = self.probe_parent()?;
                gemm(v, l.transpose(), u, T::one(), T::zero());
            }
        }
        Ok(())
    }

    fn mul_scaled(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) -> Result<(), OpError> {
        let (rows, cols) = self.size();
        let k = check_rows("AdjointOperator::mul", cols, u)?;
        check_shape("AdjointOperator::mul", (rows, k), (v.nrows(), v.ncols()))?;
        let l = self.probe.as_ref().ok_or(OpError::CacheNotReady("AdjointOperator"))?;
        gemm(v, l.transpose(), u, alpha, beta);
        Ok(())
    }

    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let (rows, cols) = self.size();
        let k = check_rows("AdjointOperator::solve", rows, u)?;
        let inv = self.probe_inverse()?;
        let mut v = Mat::zeros(cols, k);
        gemm(v.as_mut(), inv.transpose(), u, T::one(), T::zero());
        Ok(v)
    }

    fn solve_into(&mut self, v: MatMut<'_, T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        let (rows, cols) = self.size();
        let k = check_rows("AdjointOperator::solve", rows, u)?;
        check_shape("AdjointOperator::solve", (cols, k), (v.nrows(), v.ncols()))?;
        let inv = self.probe_inverse()?;
        gemm(v, inv.transpose(), u, T::one(), T::zero());
        Ok(())
    }

    fn solve_in_place(&mut self, mut u: MatMut<'_, T>) -> Result<(), OpError> {
        let x = self.solve(u.rb())?;
        u.copy_from(&x);
        Ok(())
    }

    fn adjoint(&self) -> Result<Operator<T, P>, OpError> {
        Ok((*self.parent).clone())
    }

    fn update_coefficients(self, u: MatRef<'_, T>, p: &P, t: T) -> Self {
        let constant = self.parent.is_constant();
        let parent = Box::new((*self.parent).update_coefficients(u, p, t));
        let mut op = AdjointOperator { parent, probe: self.probe };
        if op.probe.is_some() && !constant {
            op.probe = match op.probe_parent() {
                Ok(l) => Some(l),
                Err(err) => {
                    log::warn!("AdjointOperator: re-probing parent failed after update: {}", err);
                    None
                }
            };
        }
        op
    }

    fn cache_self(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        let (_, cols) = self.size();
        check_rows("AdjointOperator::cache", cols, u)?;
        let l = self.probe_parent()?;
        log::debug!("AdjointOperator: probed {}x{} parent", l.nrows(), l.ncols());
        self.probe = Some(l);
        Ok(self)
    }

    fn cache_internals(mut self, u: MatRef<'_, T>) -> Result<Self, OpError> {
        // The parent sees operands shaped like our outputs.
        let (_, n) = self.parent.size();
        let parent_u = Mat::<T>::zeros(n, u.ncols());
        self.parent = Box::new((*self.parent).cache_operator(parent_u.as_ref())?);
        Ok(self)
    }

    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let l = match &self.probe {
            Some(l) => l.clone(),
            None => self.probe_parent()?,
        };
        Ok(l.transpose().to_owned())
    }
}
