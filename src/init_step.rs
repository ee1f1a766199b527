//! C2 — Initial step estimator (§4.6). Picks `h0` when the caller hasn't
//! set one, from a coarse finite-difference estimate of `||y''||_WRMS`
//! bounded above by a forward-Euler growth heuristic and below by a tiny
//! multiple of roundoff.

use crate::callback::CallbackOutcome;
use crate::traits::Constants;
use crate::vector::VectorOps;
use num_traits::Float;

/// Bounded outer-loop iteration cap (§4.6 "H0_ITERS").
const H0_ITERS: usize = 4;
/// Bias applied to the accepted step so the first step undershoots rather
/// than overshoots the local curvature estimate.
const H0_BIAS: f64 = 0.5;
/// Forward-Euler growth-bound safety factor: y is allowed to grow by at
/// most this factor over `hub`.
const GROWTH_FACTOR: f64 = 1000.0;
/// Shrink applied to `hg` on each recoverable RHS failure in the inner loop.
const HG_SHRINK: f64 = 0.2;

/// §6.2 evaluate `f(t, y)`; `None` signals the RHS failed unrecoverably.
pub trait RhsEval<T, V> {
    fn eval(&mut self, t: T, y: &V) -> CallbackOutcome<V>;
}

impl<T, V, F> RhsEval<T, V> for F
where
    F: FnMut(T, &V) -> CallbackOutcome<V>,
{
    fn eval(&mut self, t: T, y: &V) -> CallbackOutcome<V> {
        self(t, y)
    }
}

/// Estimate the initial step `h0`, signed in the direction of integration
/// (`tout - t0`).
///
/// Returns `Error::TooClose` when `|tout - t0|` is already below the
/// roundoff floor (§8's initial-step invariant), and propagates a fatal
/// RHS failure as `Error::FirstRhsFuncFail`.
pub fn estimate_initial_step<T, V>(
    t0: T,
    tout: T,
    y0: &V,
    ewt: &V,
    hmax_inv: T,
    rhs: &mut dyn RhsEval<T, V>,
) -> Result<T, crate::error::Error>
where
    T: Float + Constants,
    V: VectorOps<T>,
{
    let uround = T::epsilon();
    let tdist = (tout - t0).abs();
    let tround = uround * t0.abs().max(tout.abs());

    if tdist < T::two() * tround {
        return Err(crate::error::Error::TooClose);
    }

    let sign = if tout >= t0 { T::one() } else { -T::one() };

    // Upper bound: forward-Euler growth heuristic. f0 evaluated once at t0.
    let f0 = match rhs.eval(t0, y0) {
        CallbackOutcome::Success(f) => f,
        CallbackOutcome::Recoverable => {
            return Err(crate::error::Error::FirstRhsFuncFail)
        }
        CallbackOutcome::Fatal(e) => return Err(e),
    };

    let ypnorm = f0.wrms_norm(ewt);
    let growth = T::from(GROWTH_FACTOR).unwrap();

    let mut hub = if ypnorm > T::zero() {
        growth / ypnorm
    } else {
        tdist
    };
    hub = hub.min(tdist);
    if hmax_inv > T::zero() {
        hub = hub.min(T::one() / hmax_inv);
    }

    let hlb = T::from(100.0).unwrap() * tround;

    if hub < hlb {
        let hg = (hlb * hub).sqrt();
        return Ok(sign * hg);
    }

    let mut hg = (hlb * hub).sqrt();
    let mut hnew = hg;
    let mut hs = hg;

    'outer: for _ in 0..H0_ITERS {
        // Inner loop: finite-difference second derivative estimate,
        // tolerating recoverable RHS failures by shrinking hg.
        let mut hg_try = hg;
        let ydd_norm = loop {
            let t1 = t0 + sign * hg_try;
            let y1 = VectorOps::linear_sum(T::one(), y0, sign * hg_try, &f0);
            match rhs.eval(t1, &y1) {
                CallbackOutcome::Success(f1) => {
                    let ydd = VectorOps::linear_sum(
                        T::one() / hg_try,
                        &f1,
                        -T::one() / hg_try,
                        &f0,
                    );
                    break ydd.wrms_norm(ewt);
                }
                CallbackOutcome::Recoverable => {
                    hg_try = hg_try * T::from(HG_SHRINK).unwrap();
                    if hg_try < hlb {
                        // Give up refining and fall back to the current guess.
                        break T::zero();
                    }
                    continue;
                }
                CallbackOutcome::Fatal(e) => return Err(e),
            }
        };

        hs = hg;

        if ydd_norm > T::zero() {
            hnew = (T::two() / ydd_norm).sqrt();
            let cap = (hg * hub).sqrt();
            if hnew > cap {
                hnew = cap;
            }
        } else {
            hnew = hg * T::two();
        }

        let ratio = hnew / hg;
        if ratio > T::half() && ratio < T::two() {
            break 'outer;
        }
        hg = hnew;
    }

    let bias = T::from(H0_BIAS).unwrap();
    Ok(sign * (hnew * bias).max(hlb).min(hub).max(hs.min(hub) * bias))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn estimates_positive_step_for_decay() {
        let y0 = array![1.0];
        let ewt = array![1e6];
        let mut calls = 0usize;
        let mut rhs = |_t: f64, y: &ndarray::Array1<f64>| {
            calls += 1;
            CallbackOutcome::Success(-y.clone())
        };
        let h0 = estimate_initial_step(0.0, 1.0, &y0, &ewt, 0.0, &mut rhs).unwrap();
        assert!(h0 > 0.0);
        assert!(h0 < 1.0);
        assert!(calls > 0);
    }

    #[test]
    fn too_close_is_reported_not_panicked() {
        let y0 = array![1.0];
        let ewt = array![1.0];
        let mut rhs = |_t: f64, y: &ndarray::Array1<f64>| CallbackOutcome::Success(y.clone());
        let err = estimate_initial_step(1.0, 1.0 + 1e-300, &y0, &ewt, 0.0, &mut rhs).unwrap_err();
        matches!(err, crate::error::Error::TooClose);
    }

    #[test]
    fn recoverable_rhs_failure_is_tolerated() {
        let y0 = array![1.0];
        let ewt = array![1e6];
        let mut first = true;
        let mut rhs = move |_t: f64, y: &ndarray::Array1<f64>| {
            if first {
                first = false;
                CallbackOutcome::Recoverable
            } else {
                CallbackOutcome::Success(-y.clone())
            }
        };
        // first call (at t0) always succeeds in this harness; failure is
        // injected on the probe call inside the outer loop via shrinking.
        let h0 = estimate_initial_step(0.0, 1.0, &y0, &ewt, 0.0, &mut rhs);
        assert!(h0.is_ok());
    }
}
