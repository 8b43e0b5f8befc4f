use criterion::{black_box, Criterion, criterion_group, criterion_main};
use faer::Mat;
use linop::core::wrappers::gemm;
use linop::matrix::dense::kron as dense_kron;
use linop::{LinearOperator, Operator, kron};

fn bench_tensor_vs_kron(c: &mut Criterion) {
    let n = 24;
    let a = Mat::from_fn(n, n, |i, j| ((i * n + j) as f64).sin());
    let b = Mat::from_fn(n, n, |i, j| ((i + 2 * j) as f64).cos());
    let u = Mat::from_fn(n * n, 1, |i, _| (i as f64).sqrt());

    let lazy = kron(Operator::<f64>::matrix(a.clone()), Operator::matrix(b.clone()));
    let mut cached = lazy.clone().cache_operator(u.as_ref()).unwrap();
    let explicit = dense_kron(a.as_ref(), b.as_ref());

    c.bench_function("lazy kron apply", |ben| {
        ben.iter(|| {
            let _v = lazy.apply(black_box(u.as_ref())).unwrap();
        })
    });

    c.bench_function("lazy kron cached mul", |ben| {
        let mut v = Mat::<f64>::zeros(n * n, 1);
        ben.iter(|| {
            cached.mul_into(black_box(v.as_mut()), black_box(u.as_ref())).unwrap();
        })
    });

    c.bench_function("explicit kron matvec", |ben| {
        let mut v = Mat::<f64>::zeros(n * n, 1);
        ben.iter(|| {
            gemm(v.as_mut(), black_box(explicit.as_ref()), black_box(u.as_ref()), 1.0, 0.0);
        })
    });
}

criterion_group!(benches, bench_tensor_vs_kron);
criterion_main!(benches);
