// SparseMatrix trait and the CSR type operators materialise into

/// A read‐only sparse matrix supporting y = A * x.
pub trait SparseMatrix<T> {
    /// Number of rows.
    fn nrows(&self) -> usize;
    /// Number of columns.
    fn ncols(&self) -> usize;
    /// Compute y = A * x.  `x.len() == ncols()`, `y.len() == nrows()`.
    fn spmv(&self, x: &[T], y: &mut [T]);
}

use faer::sparse::{
    SparseRowMat,         // owning numeric CSR
    SymbolicSparseRowMat, // owning symbolic CSR
};
use faer::{Mat, MatRef};

use crate::core::traits::Scalar;

/// Compressed sparse row matrix with sorted column indices per row.
#[derive(Clone, Debug)]
pub struct CsrMatrix<T> {
    inner: SparseRowMat<usize, T>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Build a CSR from raw row‐ptr, col‐idx, and values.
    ///
    /// Panics unless `row_ptr` is non-decreasing with `nrows + 1` entries and
    /// each row's column indices are strictly increasing and below `ncols`.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        // `None`: rows are contiguous, no separate row_nnz
        let symbolic = SymbolicSparseRowMat::new_checked(nrows, ncols, row_ptr, None, col_idx);
        let inner = SparseRowMat::new(symbolic, values);
        Self { inner }
    }

    /// Drop the exact zeros of a dense matrix.
    pub fn from_dense(a: MatRef<'_, T>) -> Self {
        let (nrows, ncols) = (a.nrows(), a.ncols());
        let mut row_ptr = vec![0; nrows + 1];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for i in 0..nrows {
            for j in 0..ncols {
                let v = a[(i, j)];
                if v != T::zero() {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr[i + 1] = col_idx.len();
        }
        Self::from_csr(nrows, ncols, row_ptr, col_idx, values)
    }

    pub fn nnz(&self) -> usize {
        self.inner.val().len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        self.inner.symbolic().row_ptr()
    }

    pub fn col_idx(&self) -> &[usize] {
        self.inner.symbolic().col_idx()
    }

    pub fn values(&self) -> &[T] {
        self.inner.val()
    }

    pub fn as_faer(&self) -> &SparseRowMat<usize, T> {
        &self.inner
    }

    pub fn to_dense(&self) -> Mat<T> {
        self.inner.to_dense()
    }

    /// Sparse Kronecker product `self ⊗ rhs`, built row by row so column
    /// indices stay sorted.
    pub fn kron(&self, rhs: &Self) -> Self {
        let (p, q) = (rhs.nrows(), rhs.ncols());
        let nrows = self.nrows() * p;
        let (lhs_sym, rhs_sym) = (self.inner.symbolic(), rhs.inner.symbolic());
        let (lhs_val, rhs_val) = (self.values(), rhs.values());
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_idx = Vec::with_capacity(self.nnz() * rhs.nnz());
        let mut values = Vec::with_capacity(self.nnz() * rhs.nnz());
        row_ptr.push(0);
        for io in 0..self.nrows() {
            for ii in 0..p {
                for ko in lhs_sym.row_range(io) {
                    let (jo, a) = (lhs_sym.col_idx()[ko], lhs_val[ko]);
                    for ki in rhs_sym.row_range(ii) {
                        col_idx.push(jo * q + rhs_sym.col_idx()[ki]);
                        values.push(a * rhs_val[ki]);
                    }
                }
                row_ptr.push(col_idx.len());
            }
        }
        Self::from_csr(nrows, self.ncols() * q, row_ptr, col_idx, values)
    }
}

impl<T: Scalar> SparseMatrix<T> for CsrMatrix<T> {
    fn nrows(&self) -> usize {
        self.inner.nrows()
    }
    fn ncols(&self) -> usize {
        self.inner.ncols()
    }
    fn spmv(&self, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), self.ncols());
        assert_eq!(y.len(), self.nrows());
        let symbolic = self.inner.symbolic();
        let (col_idx, values) = (symbolic.col_idx(), self.inner.val());
        for (i, yi) in y.iter_mut().enumerate() {
            *yi = symbolic
                .row_range(i)
                .fold(T::zero(), |sum, k| sum + values[k] * x[col_idx[k]]);
        }
    }
}
