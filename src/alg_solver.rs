//! C4 — Algebraic-solver coupling (§4.8): decides when to ask for a fresh
//! Jacobian/preconditioner, assembles the system matrix `A := M - gamma*J`
//! from a mass matrix and a Jacobian (analytic or finite-difference), and
//! exposes a matrix-free `ATimes` action for iterative linear solves.

use crate::callback::CallbackOutcome;
use crate::matrix::MatrixOps;
use crate::traits::Constants;
use crate::vector::VectorOps;
use num_traits::Float;

/// Matrix-free `A*v` action, used by iterative linear solvers that never
/// materialize `A` explicitly (§4.2's `Iterative` `LinearSolverKind`).
pub trait ATimes<T: Float, V: VectorOps<T>> {
    fn atimes(&mut self, v: &V) -> CallbackOutcome<V>;
}

/// Decision knobs for when the coupling layer asks for a Jacobian refresh
/// (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct CouplingConfig<T> {
    /// Max internal steps between Jacobian/preconditioner refreshes.
    pub msbj: usize,
    /// Max relative `|gamma/gamma_at_last_setup - 1|` before a refresh is
    /// forced regardless of the step counter.
    pub dgmax: T,
    /// Finite-difference Jacobian increment scale factor.
    pub dqincfac: T,
}

impl<T: Float + Constants> Default for CouplingConfig<T> {
    fn default() -> Self {
        CouplingConfig {
            msbj: 50,
            dgmax: T::pt2(),
            dqincfac: T::one(),
        }
    }
}

/// Coupling state carried across steps (§4.8, §9: `jcur` as a value the
/// caller consults rather than a flag the coupling layer mutates behind
/// the caller's back — `needs_setup` is a pure query, `record_setup` the
/// only place that advances the tracked state).
pub struct AlgCoupling<T> {
    cfg: CouplingConfig<T>,
    steps_since_jac: usize,
    gamma_at_jac: Option<T>,
}

impl<T: Float + Constants> AlgCoupling<T> {
    pub fn new(cfg: CouplingConfig<T>) -> Self {
        AlgCoupling {
            cfg,
            steps_since_jac: 0,
            gamma_at_jac: None,
        }
    }

    /// Should the coupling layer ask for a fresh Jacobian/setup before this
    /// step's nonlinear solve? `jcur` is the solver's own belief about
    /// whether its last Jacobian is still current (e.g. after a stale-
    /// Jacobian Newton retry already forced a refresh).
    pub fn needs_setup(&self, gamma: T, jcur: bool) -> bool {
        if jcur {
            return false;
        }
        match self.gamma_at_jac {
            None => true,
            Some(g0) => {
                self.steps_since_jac >= self.cfg.msbj
                    || ((gamma / g0) - T::one()).abs() > self.cfg.dgmax
            }
        }
    }

    pub fn record_setup(&mut self, gamma: T) {
        self.steps_since_jac = 0;
        self.gamma_at_jac = Some(gamma);
    }

    pub fn record_step(&mut self) {
        self.steps_since_jac += 1;
    }

    /// Force the next `needs_setup` to report `true`, e.g. after a
    /// convergence failure with a Jacobian the solver already believes is
    /// current (§4.8: "a convergence failure forces a refresh regardless of
    /// the step counter").
    pub fn invalidate(&mut self) {
        self.gamma_at_jac = None;
    }
}

/// `A := M - gamma*J`, built in place on `jac` (so `jac` must already hold
/// `J`). `mass = None` means `M = I`.
pub fn compose_system_matrix<T, M>(jac: &mut M, gamma: T, mass: Option<&M>)
where
    T: Float,
    M: MatrixOps<T>,
{
    match mass {
        Some(m) => jac.scaled_add(-gamma, m),
        None => jac.scaled_add_identity(-gamma),
    }
}

/// Bounded shrink-and-retry count for a single finite-difference column
/// probe that hits a recoverable RHS failure (§4.8).
const MAX_DQITERS: usize = 3;

/// Matrix-free `ATimes` backed by a one-sided finite-difference
/// directional derivative, for a stepper that has no analytic `Jv` and no
/// assembled Jacobian to multiply against (§4.8): `Jv ~= (f(t, y + sigma*v)
/// - f(t, y)) / sigma`, `sigma = 1 / ||v||_WRMS` shrunk by a factor of 4
/// (to 0.25x) up to `MAX_DQITERS` times if the perturbed RHS evaluation
/// recoverably fails.
pub struct DqATimes<'a, T, V> {
    pub t: T,
    pub y: V,
    pub f0: V,
    pub ewt: V,
    pub rhs: &'a mut dyn FnMut(T, &V) -> CallbackOutcome<V>,
}

impl<'a, T, V> ATimes<T, V> for DqATimes<'a, T, V>
where
    T: Float,
    V: VectorOps<T>,
{
    fn atimes(&mut self, v: &V) -> CallbackOutcome<V> {
        let vnrm = v.wrms_norm(&self.ewt);
        if vnrm == T::zero() {
            return CallbackOutcome::Success(v.clone());
        }
        let mut sigma = T::one() / vnrm;

        let mut attempt = 0;
        loop {
            let yperturb = VectorOps::linear_sum(T::one(), &self.y, sigma, v);
            match (self.rhs)(self.t, &yperturb) {
                CallbackOutcome::Success(fperturb) => {
                    let jv = VectorOps::linear_sum(
                        T::one() / sigma,
                        &fperturb,
                        -T::one() / sigma,
                        &self.f0,
                    );
                    return CallbackOutcome::Success(jv);
                }
                CallbackOutcome::Recoverable => {
                    attempt += 1;
                    if attempt >= MAX_DQITERS {
                        return CallbackOutcome::Recoverable;
                    }
                    sigma = sigma * T::from(0.25).unwrap();
                }
                CallbackOutcome::Fatal(e) => return CallbackOutcome::Fatal(e),
            }
        }
    }
}

/// Build a dense finite-difference Jacobian `J ~= dF/dy` one column at a
/// time: `J_{:,j} ~= (F(y + sigma_j e_j) - f0) / sigma_j`, with `sigma_j`
/// scaled by `sqrt(uround)` and the error weight so differencing noise and
/// truncation error are balanced per component. A recoverable RHS failure
/// at the perturbed point shrinks `sigma_j` by half, up to `MAX_DQITERS`
/// times, before giving up on that column.
pub fn finite_difference_jacobian<T, V, M>(
    t: T,
    y: &V,
    f0: &V,
    ewt: &V,
    uround: T,
    cfg: &CouplingConfig<T>,
    rhs: &mut dyn FnMut(T, &V) -> CallbackOutcome<V>,
) -> Result<M, crate::error::Error>
where
    T: Float + Constants,
    V: VectorOps<T>,
    M: MatrixOps<T>,
{
    let n = y.len();
    let mut jac = M::zeros(n);
    let srur = uround.sqrt();

    for j in 0..n {
        let yj = y.get(j);
        let ewtj = ewt.get(j);
        let base = srur * yj.abs().max(T::one() / ewtj);
        let mut sigma = if base > T::zero() {
            base * cfg.dqincfac
        } else {
            srur * cfg.dqincfac
        };

        let mut attempt = 0;
        let col = loop {
            let mut yperturb = y.clone();
            yperturb.set(j, yj + sigma);
            match rhs(t, &yperturb) {
                CallbackOutcome::Success(fj) => {
                    let diff = VectorOps::linear_sum(T::one() / sigma, &fj, -T::one() / sigma, f0);
                    break diff;
                }
                CallbackOutcome::Recoverable => {
                    attempt += 1;
                    if attempt >= MAX_DQITERS {
                        return Err(crate::error::Error::RepeatedRhsFuncFail);
                    }
                    sigma = sigma * T::half();
                    continue;
                }
                CallbackOutcome::Fatal(e) => return Err(e),
            }
        };

        jac.set_column(j, &col);
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::DenseMatrix;
    use ndarray::array;

    #[test]
    fn compose_with_identity_mass_matches_formula() {
        let mut jac = DenseMatrix::zeros(2);
        jac.set_column(0, &array![1.0, 0.5]);
        jac.set_column(1, &array![0.0, 2.0]);
        compose_system_matrix(&mut jac, 0.1, None);
        // A = I - 0.1*J
        assert!((jac.data[0] - (1.0 - 0.1)).abs() < 1e-12);
        assert!((jac.data[1] - (-0.1 * 0.0)).abs() < 1e-12);
        assert!((jac.data[2] - (-0.1 * 0.5)).abs() < 1e-12);
        assert!((jac.data[3] - (1.0 - 0.1 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn finite_difference_jacobian_matches_linear_system() {
        // F(y) = A y for a fixed 2x2 A; the FD Jacobian should recover A.
        let a = [[3.0, -1.0], [0.5, 2.0]];
        let y = array![1.0, 1.0];
        let f0 = array![a[0][0] * y[0] + a[0][1] * y[1], a[1][0] * y[0] + a[1][1] * y[1]];
        let ewt = array![1e4, 1e4];

        let mut rhs = move |_t: f64, yv: &ndarray::Array1<f64>| {
            CallbackOutcome::Success(array![
                a[0][0] * yv[0] + a[0][1] * yv[1],
                a[1][0] * yv[0] + a[1][1] * yv[1]
            ])
        };

        let cfg: CouplingConfig<f64> = CouplingConfig::default();
        let jac: DenseMatrix =
            finite_difference_jacobian(0.0, &y, &f0, &ewt, 1e-16, &cfg, &mut rhs).unwrap();

        for i in 0..2 {
            for j in 0..2 {
                assert!(
                    (jac.data[i * 2 + j] - a[i][j]).abs() < 1e-4,
                    "entry ({},{}) off: got {} want {}",
                    i,
                    j,
                    jac.data[i * 2 + j],
                    a[i][j]
                );
            }
        }
    }

    #[test]
    fn needs_setup_on_first_call_and_after_gamma_drift() {
        let mut c: AlgCoupling<f64> = AlgCoupling::new(CouplingConfig::default());
        assert!(c.needs_setup(1.0, false));
        c.record_setup(1.0);
        assert!(!c.needs_setup(1.0, false));
        assert!(c.needs_setup(2.0, false));
    }

    #[test]
    fn jcur_true_short_circuits_setup() {
        let c: AlgCoupling<f64> = AlgCoupling::new(CouplingConfig::default());
        assert!(!c.needs_setup(1.0, true));
    }

    #[test]
    fn dq_atimes_matches_linear_system() {
        // F(y) = A y; Jv should recover A*v exactly for a linear system.
        let a = [[3.0, -1.0], [0.5, 2.0]];
        let y = array![1.0, 1.0];
        let f0 = array![a[0][0] * y[0] + a[0][1] * y[1], a[1][0] * y[0] + a[1][1] * y[1]];
        let ewt = array![1.0, 1.0];
        let mut rhs = move |_t: f64, yv: &ndarray::Array1<f64>| {
            CallbackOutcome::Success(array![
                a[0][0] * yv[0] + a[0][1] * yv[1],
                a[1][0] * yv[0] + a[1][1] * yv[1]
            ])
        };
        let mut at = DqATimes {
            t: 0.0,
            y: y.clone(),
            f0,
            ewt,
            rhs: &mut rhs,
        };
        let v = array![1.0, 0.0];
        let jv = match at.atimes(&v) {
            CallbackOutcome::Success(jv) => jv,
            _ => panic!("expected a successful Jv"),
        };
        assert!((jv[0] - a[0][0]).abs() < 1e-6);
        assert!((jv[1] - a[1][0]).abs() < 1e-6);
    }

    #[test]
    fn dq_atimes_shrinks_sigma_on_recoverable_failure() {
        // The first probe (v's full scale) recoverably fails; a shrunk
        // sigma should succeed and still recover the linear map.
        let a = [[2.0, 0.0], [0.0, 2.0]];
        let y = array![1.0, 1.0];
        let f0 = array![2.0, 2.0];
        let ewt = array![1.0, 1.0];
        let mut calls = 0;
        let mut rhs = move |_t: f64, yv: &ndarray::Array1<f64>| {
            calls += 1;
            if calls == 1 {
                CallbackOutcome::Recoverable
            } else {
                CallbackOutcome::Success(array![a[0][0] * yv[0], a[1][1] * yv[1]])
            }
        };
        let mut at = DqATimes {
            t: 0.0,
            y,
            f0,
            ewt,
            rhs: &mut rhs,
        };
        let v = array![1.0, 0.0];
        match at.atimes(&v) {
            CallbackOutcome::Success(jv) => assert!((jv[0] - 2.0).abs() < 1e-3),
            _ => panic!("expected the shrunk retry to succeed"),
        }
    }
}
