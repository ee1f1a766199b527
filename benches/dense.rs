//! Benchmarks the two dense-output interpolants (§4.10) in isolation from
//! the rest of the engine: building one step's worth of history and then
//! repeatedly sampling it, which is the access pattern `GetDky` and
//! root-finding's `Check3` both drive at runtime.

#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use ivp_engine::interp::{HermiteInterp, Interpolant, LagrangeInterp};
use ndarray::Array1;

fn hermite_evaluate(c: &mut Criterion) {
    let n = 50;
    let y0 = Array1::from_elem(n, 1.0_f64);
    let yd0 = Array1::from_elem(n, -1.0_f64);
    let mut interp: HermiteInterp<f64, Array1<f64>> = HermiteInterp::new(0.0, y0, yd0);
    let y1 = Array1::from_elem(n, 0.367_879_4_f64);
    let yd1 = Array1::from_elem(n, -0.367_879_4_f64);
    interp.update(1.0, &y1, Some(&yd1));

    c.bench_function("hermite_evaluate_50", |b| {
        b.iter(|| {
            let t = black_box(0.37);
            interp.evaluate(t, 0, 3)
        })
    });
}

fn lagrange_evaluate(c: &mut Criterion) {
    let n = 50;
    let mut interp: LagrangeInterp<f64, Array1<f64>> = LagrangeInterp::new(4);
    for i in 0..4 {
        let t = i as f64 * 0.1;
        let y = Array1::from_elem(n, (-t).exp());
        interp.update(t, &y, None);
    }

    c.bench_function("lagrange_evaluate_50", |b| {
        b.iter(|| {
            let t = black_box(0.25);
            interp.evaluate(t, 0, 3)
        })
    });
}

criterion_group!(benches, hermite_evaluate, lagrange_evaluate);
criterion_main!(benches);
