//! End-to-end scenarios: operator trees built from every variant, driven the
//! way a time-stepping solver drives them (cache once, then update and apply
//! inside the loop).

use approx::assert_abs_diff_eq;
use faer::{Mat, MatMut, MatRef};
use linop::{
    AffineOperator, DenseFactorization, DenseMatrix, FunctionOperator, LinearOperator, OpError, Operator,
    OperatorFn, OperatorTraits, kron,
};

fn col(values: &[f64]) -> Mat<f64> {
    Mat::from_fn(values.len(), 1, |i, _| values[i])
}

/// `A = diag(2, 3)`, `b = [1, 1]`: apply and solve of the affine map.
#[test]
fn affine_scenario() {
    let a = Operator::<f64>::matrix(Mat::from_rows(&[&[2.0, 0.0], &[0.0, 3.0]]));
    let l = a.affine(col(&[1.0, 1.0])).unwrap();
    assert!(!l.is_linear());
    assert_eq!(l.apply(col(&[1.0, 1.0]).as_ref()).unwrap(), col(&[3.0, 4.0]));
    let x = l.solve(col(&[3.0, 4.0]).as_ref()).unwrap();
    assert_abs_diff_eq!(x[(0, 0)], 1.0, epsilon = 1e-14);
    assert_abs_diff_eq!(x[(1, 0)], 1.0, epsilon = 1e-14);
}

/// The dense form of a lazy tensor product is the literal Kronecker product.
#[test]
fn kron_scenario() {
    let a = Operator::<f64>::matrix(Mat::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]));
    let b = Operator::<f64>::matrix(Mat::from_rows(&[&[0.0, 1.0], &[1.0, 0.0]]));
    let k = kron(a, b);
    let expected = Mat::from_rows(&[
        &[0.0, 1.0, 0.0, 2.0],
        &[1.0, 0.0, 2.0, 0.0],
        &[0.0, 3.0, 0.0, 4.0],
        &[3.0, 0.0, 4.0, 0.0],
    ]);
    assert_eq!(k.to_dense().unwrap(), expected);
    assert_eq!(k.to_sparse().unwrap().to_dense(), expected);
}

/// A tensor product whose inner factor is matrix-free, applied through the cache.
#[test]
fn tensor_with_function_factor() {
    // v = 2 u, in place
    let double = OperatorFn::<f64, ()>::in_place(|mut v: MatMut<'_, f64>, u: MatRef<'_, f64>, _: &(), _: f64| {
        for j in 0..u.ncols() {
            for i in 0..u.nrows() {
                v[(i, j)] = 2.0 * u[(i, j)];
            }
        }
    });
    let inner = FunctionOperator::builder(double).in_place(true).size(2, 2).symmetric(true).build().unwrap();
    let outer = Operator::matrix(Mat::from_rows(&[&[1.0, 1.0], &[0.0, 1.0]]));
    let k = kron(outer, Operator::Function(inner));
    let u = Mat::from_fn(4, 2, |i, j| (i + 2 * j) as f64);
    let expected = k.apply(u.as_ref()).unwrap();

    let mut k = k.cache_operator(u.as_ref()).unwrap();
    assert!(k.is_cache_set());
    let mut v = Mat::zeros(4, 2);
    k.mul_into(v.as_mut(), u.as_ref()).unwrap();
    assert_eq!(v, expected);
    // [1 1; 0 1] ⊗ 2I applied to [0, 1, 2, 3]
    assert_eq!(expected[(0, 0)], 4.0);
    assert_eq!(expected[(1, 0)], 8.0);
    assert_eq!(expected[(2, 0)], 4.0);
    assert_eq!(expected[(3, 0)], 6.0);
}

/// Update propagation: a time-dependent diagonal inside an affine map inside
/// a tensor product sees every `(p, t)` refresh.
#[test]
fn update_propagates_through_the_tree() {
    let a = linop::MatrixOperator::<f64, f64>::with_update(Mat::zeros(2, 2), |a, _, p, t| {
        a[(0, 0)] = *p;
        a[(1, 1)] = t;
    });
    let tree = kron(Operator::identity(1), Operator::Matrix(a));
    assert!(!tree.is_constant());
    let u = col(&[1.0, 1.0]);
    let mut tree = tree.cache_operator(u.as_ref()).unwrap();
    for step in 1..4 {
        let t = step as f64;
        tree = tree.update_coefficients(u.as_ref(), &(2.0 * t), t);
        let mut v = Mat::zeros(2, 1);
        tree.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 0.0).unwrap();
        assert_eq!(v, col(&[2.0 * t, t]));
    }
}

/// A factorization-backed operator solves and, through its adjoint, solves the
/// transposed system.
#[test]
fn invertible_operator_solves() {
    let a = Mat::from_rows(&[&[4.0, 1.0, 0.0], &[1.0, 3.0, 1.0], &[0.0, 2.0, 5.0]]);
    let l = Operator::<f64>::invertible(DenseFactorization::lu(a.as_ref()).unwrap()).unwrap();
    assert!(l.has_ldiv() && l.is_constant());
    let x = col(&[1.0, -1.0, 2.0]);
    let b = Operator::<f64>::matrix(a.clone()).apply(x.as_ref()).unwrap();
    let y = l.solve(b.as_ref()).unwrap();
    for i in 0..3 {
        assert_abs_diff_eq!(y[(i, 0)], x[(i, 0)], epsilon = 1e-12);
    }
    let lt = l.adjoint().unwrap();
    let at = Operator::<f64>::matrix(a).adjoint().unwrap();
    let bt = at.apply(x.as_ref()).unwrap();
    let yt = lt.solve(bt.as_ref()).unwrap();
    for i in 0..3 {
        assert_abs_diff_eq!(yt[(i, 0)], x[(i, 0)], epsilon = 1e-12);
    }
}

/// Error kinds are reported where they arise.
#[test]
fn errors_surface_at_the_right_place() {
    // configuration
    let f = OperatorFn::<f64, ()>::out_of_place(|u: MatRef<'_, f64>, _: &(), _: f64| {
        Mat::from_fn(u.nrows(), u.ncols(), |i, j| u[(i, j)])
    });
    assert!(matches!(FunctionOperator::builder(f).size(2, 2).build(), Err(OpError::Configuration(_))));

    // dimension mismatch
    let a = Operator::<f64>::matrix(Mat::zeros(2, 3));
    let b = Operator::<f64>::matrix(Mat::zeros(3, 2));
    assert!(matches!(a.clone().try_add(b.clone()), Err(OpError::DimensionMismatch { .. })));
    assert!(matches!(
        AffineOperator::new(a.clone(), col(&[1.0, 2.0, 3.0])),
        Err(OpError::DimensionMismatch { .. })
    ));
    assert!(matches!(a.apply(col(&[1.0, 2.0]).as_ref()), Err(OpError::DimensionMismatch { .. })));

    // cache not ready
    let mut k = kron(b.clone(), b);
    let mut v = Mat::zeros(9, 1);
    let u = Mat::zeros(4, 1);
    assert_eq!(
        k.mul_scaled(v.as_mut(), u.as_ref(), 1.0, 1.0).unwrap_err(),
        OpError::CacheNotReady("TensorProductOperator")
    );
}
