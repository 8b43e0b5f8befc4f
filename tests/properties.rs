//! Algebraic properties of the operator protocol, checked on random shapes and data.

use faer::linalg::solvers::PartialPivLu;
use faer::{Mat, MatMut, MatRef};
use linop::core::wrappers::gemm;
use linop::{
    DenseFactorization, Factorization, FunctionOperator, LinearOperator, OpError, OpFlags, Operator, OperatorFn,
    OperatorTraits, kron,
};
use proptest::prelude::*;

const POOL: usize = 64;

/// An `rows × cols` matrix read cyclically from `pool`, starting at `offset`.
fn from_pool(pool: &[f64], offset: usize, rows: usize, cols: usize) -> Mat<f64> {
    Mat::from_fn(rows, cols, |i, j| pool[(offset + j * rows + i) % pool.len()])
}

fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()));
    let mut worst = 0.0_f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            worst = worst.max((a[(i, j)] - b[(i, j)]).abs());
        }
    }
    worst
}

fn dense_apply(a: &Mat<f64>, u: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), u.ncols(), |i, j| (0..a.ncols()).map(|l| a[(i, l)] * u[(l, j)]).sum())
}

/// Solves through an LU and multiplies through the stored matrix.
struct MatLu {
    a: Mat<f64>,
    lu: DenseFactorization<PartialPivLu<f64>>,
}

impl MatLu {
    fn new(a: Mat<f64>) -> Self {
        let lu = DenseFactorization::lu(a.as_ref()).unwrap();
        MatLu { a, lu }
    }
}

impl Factorization<f64> for MatLu {
    fn size(&self) -> (usize, usize) {
        (self.a.nrows(), self.a.ncols())
    }
    fn supports_ldiv(&self) -> bool {
        true
    }
    fn supports_ldiv_in_place(&self) -> bool {
        true
    }
    fn supports_mul(&self) -> bool {
        true
    }
    fn ldiv_in_place(&self, rhs: MatMut<'_, f64>, transpose: bool) -> Result<(), OpError> {
        self.lu.ldiv_in_place(rhs, transpose)
    }
    fn mul_into(&self, v: MatMut<'_, f64>, u: MatRef<'_, f64>, transpose: bool) -> Result<(), OpError> {
        let a = if transpose { self.a.transpose() } else { self.a.as_ref() };
        gemm(v, a, u, 1.0, 0.0);
        Ok(())
    }
    fn reconstruct(&self) -> Result<Mat<f64>, OpError> {
        Ok(self.a.clone())
    }
}

/// `u ↦ a u` as a callable.
fn matrix_fn(a: Mat<f64>, in_place: bool) -> OperatorFn<f64, ()> {
    if in_place {
        OperatorFn::in_place(move |v: MatMut<'_, f64>, u: MatRef<'_, f64>, _: &(), _: f64| {
            gemm(v, a.as_ref(), u, 1.0, 0.0)
        })
    } else {
        OperatorFn::out_of_place(move |u: MatRef<'_, f64>, _: &(), _: f64| {
            let mut v = Mat::zeros(a.nrows(), u.ncols());
            gemm(v.as_mut(), a.as_ref(), u, 1.0, 0.0);
            v
        })
    }
}

fn function_op(a: &Mat<f64>, in_place: bool, with_adjoint: bool) -> Operator<f64> {
    let mut builder = FunctionOperator::builder(matrix_fn(a.clone(), in_place))
        .in_place(in_place)
        .size(a.nrows(), a.ncols());
    if with_adjoint {
        builder = builder.adjoint(matrix_fn(a.transpose().to_owned(), in_place));
    }
    Operator::Function(builder.build().unwrap())
}

/// One operator of every kind, all built from the same `m × n` matrix where
/// the kind allows a rectangular one.
fn every_variant(pool: &[f64], m: usize, n: usize) -> Vec<(&'static str, Operator<f64>)> {
    let a = from_pool(pool, 0, m, n);
    let mut s = from_pool(pool, 7, n, n);
    for i in 0..n {
        s[(i, i)] += 10.0;
    }
    let b = from_pool(pool, 13, n, 1);
    let c = from_pool(pool, 19, n, 2);
    let small = from_pool(pool, 37, 2, 1);
    vec![
        ("matrix", Operator::matrix(a.clone())),
        ("function", function_op(&a, false, true)),
        ("in-place function", function_op(&a, true, true)),
        ("function without adjoint", function_op(&a, true, false)),
        ("adjoint view", function_op(&a.transpose().to_owned(), true, false).adjoint().unwrap()),
        ("invertible", Operator::invertible(MatLu::new(s.clone())).unwrap()),
        ("affine", Operator::matrix(s).affine(b).unwrap()),
        ("tensor", kron(Operator::matrix(a.clone()), Operator::matrix(small))),
        ("sum", Operator::matrix(a.clone()).try_add(function_op(&a, true, true)).unwrap()),
        ("composed", Operator::matrix(a.clone()).try_compose(Operator::matrix(c)).unwrap()),
        ("scaled", function_op(&a, true, true).scale(-1.5)),
    ]
}

fn frobenius_dot(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()));
    let mut sum = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            sum += a[(i, j)] * b[(i, j)];
        }
    }
    sum
}

proptest! {
    #[test]
    fn adjoint_is_an_involution(
        m in 1usize..5,
        n in 1usize..5,
        pool in prop::collection::vec(-2.0f64..2.0, POOL),
    ) {
        let a = from_pool(&pool, 0, m, n);
        let l = Operator::<f64>::matrix(a.clone());
        let back = l.adjoint().unwrap().adjoint().unwrap();
        prop_assert_eq!(back.size(), (m, n));
        prop_assert_eq!(back.to_dense().unwrap(), a);
    }

    #[test]
    fn adjoint_is_an_involution_for_every_variant(
        m in 1usize..4,
        n in 1usize..4,
        k in 1usize..3,
        pool in prop::collection::vec(-2.0f64..2.0, POOL),
    ) {
        for (name, l) in every_variant(&pool, m, n) {
            let (rows, cols) = l.size();
            let adj = l.adjoint().unwrap();
            prop_assert_eq!(adj.size(), (cols, rows), "{}", name);
            let back = adj.adjoint().unwrap();
            prop_assert_eq!(back.size(), (rows, cols), "{}", name);

            let u = from_pool(&pool, 29, cols, k);
            let lu = l.apply(u.as_ref()).unwrap();
            let diff = max_abs_diff(&back.apply(u.as_ref()).unwrap(), &lu);
            prop_assert!(diff < 1e-10, "{}: adjoint of adjoint differs by {}", name, diff);

            if l.flags().contains(OpFlags::LINEAR) {
                // <w, L u> = <Lᵀ w, u>
                let w = from_pool(&pool, 43, rows, k);
                let ltw = adj.apply(w.as_ref()).unwrap();
                let gap = (frobenius_dot(&w, &lu) - frobenius_dot(&ltw, &u)).abs();
                prop_assert!(gap < 1e-9, "{}: adjoint identity off by {}", name, gap);
            }
        }
    }

    #[test]
    fn cached_mul_matches_apply_for_every_variant(
        m in 1usize..4,
        n in 1usize..4,
        k in 1usize..3,
        alpha in -2.0f64..2.0,
        beta in prop_oneof![-2.0f64..-0.1, 0.1f64..2.0],
        pool in prop::collection::vec(-2.0f64..2.0, POOL),
    ) {
        for (name, l) in every_variant(&pool, m, n) {
            let (rows, cols) = l.size();
            let u = from_pool(&pool, 23, cols, k);
            let v0 = from_pool(&pool, 41, rows, k);
            let lu = l.apply(u.as_ref()).unwrap();

            let mut l = l.cache_operator(u.as_ref()).unwrap();
            prop_assert!(l.is_cache_set(), "{}", name);
            let mut v = v0.clone();
            l.mul_scaled(v.as_mut(), u.as_ref(), alpha, beta).unwrap();
            let expected = Mat::from_fn(rows, k, |i, j| alpha * lu[(i, j)] + beta * v0[(i, j)]);
            let diff = max_abs_diff(&v, &expected);
            prop_assert!(diff < 1e-10, "{}: cached product differs by {}", name, diff);
        }
    }

    #[test]
    fn tensor_apply_matches_literal_kron(
        (m, n, p, q) in (1usize..4, 1usize..4, 1usize..4, 1usize..4),
        k in 1usize..3,
        pool in prop::collection::vec(-2.0f64..2.0, POOL),
    ) {
        let a = from_pool(&pool, 0, m, n);
        let b = from_pool(&pool, 17, p, q);
        let u = from_pool(&pool, 31, n * q, k);
        let l = kron(Operator::<f64>::matrix(a.clone()), Operator::matrix(b.clone()));
        let lazy = l.apply(u.as_ref()).unwrap();
        let dense = linop::matrix::dense::kron(a.as_ref(), b.as_ref());
        prop_assert!(max_abs_diff(&lazy, &dense_apply(&dense, &u)) < 1e-12);
    }

    #[test]
    fn cached_mul_matches_apply(
        (m, n, p, q) in (1usize..4, 1usize..4, 1usize..4, 1usize..4),
        k in 1usize..3,
        alpha in -2.0f64..2.0,
        beta in -2.0f64..2.0,
        pool in prop::collection::vec(-2.0f64..2.0, POOL),
    ) {
        let l = kron(
            Operator::<f64>::matrix(from_pool(&pool, 3, m, n)),
            Operator::matrix(from_pool(&pool, 11, p, q)),
        );
        let u = from_pool(&pool, 23, n * q, k);
        let v0 = from_pool(&pool, 41, m * p, k);
        let lu = l.apply(u.as_ref()).unwrap();

        let mut l = l.cache_operator(u.as_ref()).unwrap();
        let mut v = v0.clone();
        l.mul_scaled(v.as_mut(), u.as_ref(), alpha, beta).unwrap();
        let expected = Mat::from_fn(m * p, k, |i, j| alpha * lu[(i, j)] + beta * v0[(i, j)]);
        prop_assert!(max_abs_diff(&v, &expected) < 1e-12);
    }

    #[test]
    fn affine_solve_inverts_apply(
        n in 1usize..5,
        k in 1usize..3,
        pool in prop::collection::vec(-2.0f64..2.0, POOL),
    ) {
        // Strict diagonal dominance keeps A well conditioned.
        let mut a = from_pool(&pool, 5, n, n);
        for i in 0..n {
            a[(i, i)] += 10.0;
        }
        let b = from_pool(&pool, 13, n, 1);
        let u = from_pool(&pool, 29, n, k);
        let l = Operator::<f64>::matrix(a).affine(b).unwrap();
        let x = l.solve(l.apply(u.as_ref()).unwrap().as_ref()).unwrap();
        prop_assert!(max_abs_diff(&x, &u) < 1e-10);
    }

    #[test]
    fn update_never_changes_shape_or_flags(
        n in 1usize..4,
        p in -3.0f64..3.0,
        t in 0.0f64..10.0,
    ) {
        let leaf = linop::MatrixOperator::<f64, f64>::with_update(Mat::zeros(n, n), |a, _, p, t| {
            for i in 0..a.nrows() {
                a[(i, i)] = *p + t;
            }
        });
        let l = kron(Operator::Matrix(leaf), Operator::identity(2));
        let (size, flags) = (l.size(), l.flags());
        let u = Mat::<f64>::zeros(2 * n, 1);
        let l = l.update_coefficients(u.as_ref(), &p, t);
        prop_assert_eq!(l.size(), size);
        prop_assert_eq!(l.flags(), flags);
    }
}
