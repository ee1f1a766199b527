//! L4 — `Stepper`: one attempt at advancing the state by `h` (§4.4). A
//! concrete tableau (BDF, an explicit or implicit Runge–Kutta method, a
//! multirate or IMEX split) implements this trait; the engine (C7) never
//! knows which. On success the stepper must leave the committed state in
//! `ycur` (accessible through `StepAttempt::y`); it never mutates the
//! engine's `yn` directly — only `evolve::complete_step` does that, after
//! every other gate has passed.

use crate::vector::VectorOps;
use num_traits::Float;

/// Result of one call to `Stepper::attempt`.
pub enum AttemptOutcome<V> {
    /// The attempt produced a candidate state and a weighted local-error
    /// norm `dsm` (target `<= 1`); the caller still has to run relaxation,
    /// constraint checks and the temporal error test before committing.
    Accepted { y: V, dsm: f64 },
    /// The nonlinear solve failed to converge; shrink `h` per the
    /// convergence-failure path (§4.11) and retry.
    RecoverableConv,
    /// Some other recoverable numerical failure (e.g. a recoverable RHS
    /// evaluation failure during the stage computation); shrink `h` and
    /// retry under the error-test failure budget.
    RecoverableError,
    /// Retry immediately with the same `h`, without charging the attempt
    /// against `ncf`/`netf` (e.g. a stepper-internal stage restart).
    RetryWithoutPenalty,
    /// Unrecoverable: integration cannot continue.
    Fatal(crate::error::Error),
}

/// Feature bits a stepper publishes so the engine knows which optional
/// subsystems to engage (§4.4, §9: "optional components ... map to
/// Option-like fields and are consulted only when present").
#[derive(Debug, Clone, Copy, Default)]
pub struct StepperFeatures {
    /// Whether the stepper adapts its own order/coefficients in a way that
    /// makes step-size control meaningful (vs. a fixed-coefficient method
    /// that only the engine's `fixedstep` flag governs).
    pub adaptive: bool,
    /// Whether the stepper solves an implicit (algebraic) system per step,
    /// i.e. whether `alg_solver` coupling applies at all.
    pub implicit: bool,
    /// Whether the problem carries a nontrivial mass matrix `M(t)`.
    pub mass_matrix: bool,
    /// Whether the stepper supports relaxation (energy/invariant
    /// preservation) after a successful attempt.
    pub relaxable: bool,
    /// Whether `full_rhs` (§6.2) is implemented; gates Hermite
    /// interpolation, the initial-step estimator, and root-finding
    /// `Check1`.
    pub full_rhs_available: bool,
}

/// The stepper-facing capability contract (§4.4, §6.2).
pub trait Stepper<T: Float, V: VectorOps<T>> {
    fn features(&self) -> StepperFeatures;

    /// One attempt at advancing from `t` to `t + h`.
    fn attempt(&mut self, t: T, h: T, y: &V) -> AttemptOutcome<V>;

    /// §6.2 `full_rhs`: evaluate `f(t,y)` (or `F(t,y,y')` for a DAE
    /// stepper) without taking a step. `mode` distinguishes a call at the
    /// start of a step (`Start`), the end (`End`, which may be able to
    /// reuse a cached stage value) or any other time (`Other`, e.g. for
    /// dense output or root-finding). Required for the initial-step
    /// estimator, Hermite interpolation and root-finding `Check1`; a
    /// stepper that doesn't implement it reports
    /// `features().full_rhs_available == false` and this is never called.
    fn full_rhs(&mut self, _t: T, _y: &V, _mode: FullRhsMode) -> Option<V> {
        None
    }

    /// §6.2: current `(gamma, gamma_ratio, jcur, dgamma_fail)` for implicit
    /// steppers coupling through C4. `None` for explicit steppers.
    fn gammas(&self) -> Option<(T, T, bool, bool)> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullRhsMode {
    Start,
    End,
    Other,
}
