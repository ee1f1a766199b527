//! Optional relaxation (§4.11, §9): for a stepper that reports
//! `StepperFeatures::relaxable` and a caller-supplied invariant functional
//! `h(y)`, find a scalar factor `r` so that committing `y_n + r*(y_new -
//! y_n)` (and reaching `t_n + r*h_step`) leaves `h(y)` unchanged across the
//! step, the way ARKODE's relaxation method corrects a step that would
//! otherwise drift an energy/entropy invariant. Engaged only when both the
//! stepper and the caller opt in; otherwise the step commits unrelaxed.

use crate::callback::CallbackOutcome;
use crate::vector::VectorOps;
use num_traits::Float;

/// The invariant functional a relaxed stepper is asked to preserve, and its
/// gradient (needed by the scalar Newton solve for `r`).
pub trait RelaxFunction<T, V> {
    /// Evaluate `h(y)`.
    fn eval(&mut self, y: &V) -> CallbackOutcome<T>;
    /// Evaluate `dh/dy` at `y`.
    fn gradient(&mut self, y: &V) -> CallbackOutcome<V>;
}

#[derive(Debug, Clone, Copy)]
pub struct RelaxConfig<T> {
    pub max_iters: usize,
    /// Absolute residual tolerance on `h(y_n + r*delta) - h(y_n)`.
    pub res_tol: T,
    /// Relative tolerance on successive Newton updates to `r`.
    pub rel_tol: T,
    /// `r` outside `[lower_bound, upper_bound]` is rejected as inadmissible
    /// (a relaxation factor far from 1 signals the linearization broke
    /// down, not a usable correction).
    pub lower_bound: T,
    pub upper_bound: T,
}

impl<T: Float> Default for RelaxConfig<T> {
    fn default() -> Self {
        RelaxConfig {
            max_iters: 10,
            res_tol: T::from(1e-14).unwrap(),
            rel_tol: T::from(1e-10).unwrap(),
            lower_bound: T::from(0.8).unwrap(),
            upper_bound: T::from(1.2).unwrap(),
        }
    }
}

pub enum RelaxOutcome<T> {
    Relaxed { r: T },
    /// No admissible `r` was found within `max_iters`/the bound window;
    /// the caller should commit the step unrelaxed rather than fail it.
    Failed,
    Fatal(crate::error::Error),
}

/// Solve `phi(r) := h(y0 + r*delta) - h(y0) = 0` for `r` near `1` by
/// Newton's method, `phi'(r) = grad(y0 + r*delta) . delta`.
pub fn relax<T, V, F>(rf: &mut F, y0: &V, delta: &V, cfg: &RelaxConfig<T>) -> RelaxOutcome<T>
where
    T: Float,
    V: VectorOps<T>,
    F: RelaxFunction<T, V> + ?Sized,
{
    let h0 = match rf.eval(y0) {
        CallbackOutcome::Success(h) => h,
        CallbackOutcome::Recoverable => return RelaxOutcome::Failed,
        CallbackOutcome::Fatal(e) => return RelaxOutcome::Fatal(e),
    };

    let mut r = T::one();
    for _ in 0..cfg.max_iters {
        let ytrial = VectorOps::linear_sum(T::one(), y0, r, delta);
        let h_r = match rf.eval(&ytrial) {
            CallbackOutcome::Success(h) => h,
            CallbackOutcome::Recoverable => return RelaxOutcome::Failed,
            CallbackOutcome::Fatal(e) => return RelaxOutcome::Fatal(e),
        };
        let residual = h_r - h0;
        if residual.abs() <= cfg.res_tol {
            return finish(r, cfg);
        }

        let grad = match rf.gradient(&ytrial) {
            CallbackOutcome::Success(g) => g,
            CallbackOutcome::Recoverable => return RelaxOutcome::Failed,
            CallbackOutcome::Fatal(e) => return RelaxOutcome::Fatal(e),
        };
        let deriv = grad.dot(delta);
        if deriv == T::zero() {
            return RelaxOutcome::Failed;
        }

        let r_next = r - residual / deriv;
        let converged = (r_next - r).abs() <= cfg.rel_tol * r.abs();
        r = r_next;
        if converged {
            return finish(r, cfg);
        }
    }
    RelaxOutcome::Failed
}

fn finish<T: Float>(r: T, cfg: &RelaxConfig<T>) -> RelaxOutcome<T> {
    if r >= cfg.lower_bound && r <= cfg.upper_bound {
        RelaxOutcome::Relaxed { r }
    } else {
        RelaxOutcome::Failed
    }
}
