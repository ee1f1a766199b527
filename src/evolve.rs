//! C7 — The evolve driver (§4.11): the state machine that actually walks
//! `t` forward. Wires together the controller (C3), constraint checking,
//! the attempt sub-loop dispatching a `Stepper`'s `AttemptOutcome`, optional
//! root-finding and dense-output bookkeeping, and the final mapping from
//! "what happened internally" to the single `Result<Status, Error>` the
//! caller sees.

use crate::constraints::{self, ConstraintConfig, ConstraintOutcome};
use crate::controller::{AccumError, AccumErrorMode, Controller};
use crate::error::{Error, Status};
use crate::relax::{self, RelaxConfig, RelaxFunction, RelaxOutcome};
use crate::stepper::{AttemptOutcome, Stepper};
use crate::traits::Constants;
use crate::vector::VectorOps;
use num_traits::Float;

/// How far one `run` call is asked to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// Integrate until `t` reaches or passes `tout` (interpolating back to
    /// `tout` exactly), or a root/`tstop` intervenes.
    Normal,
    /// Take exactly one internal step and return, whatever `t` lands on.
    OneStep,
}

/// Retry/warning budgets the driver enforces per §4.11.
#[derive(Debug, Clone, Copy)]
pub struct EvolveLimits<T> {
    pub mxstep: usize,
    pub max_err_test_fails: usize,
    pub max_conv_fails: usize,
    pub max_hnil_warns: usize,
    pub hmin: T,
    pub hmax: T,
}

impl<T: Float> EvolveLimits<T> {
    pub fn new(hmin: T, hmax: T) -> Self {
        EvolveLimits {
            mxstep: 500,
            max_err_test_fails: 10,
            max_conv_fails: 10,
            max_hnil_warns: 10,
            hmin,
            hmax,
        }
    }
}

/// Running counters the driver accumulates across its lifetime (§4.11,
/// exposed to the caller the way `IDAGetIntegratorStats` would).
#[derive(Debug, Clone, Copy, Default)]
pub struct EvolveCounters {
    pub nst: usize,
    pub netf: usize,
    pub ncfn: usize,
    pub nhnil: usize,
    pub nconstrfails: usize,
}

/// Outcome of a single internal step attempt loop (`attempt_step`),
/// distinct from the `Status` the public `run` call eventually reports.
pub struct StepResult<T, V> {
    pub t: T,
    pub y: V,
    pub h_used: T,
    pub h_next: T,
}

/// Owns the step-to-step control state: the controller, constraint
/// configuration (if any), limits and counters. A `Stepper` is passed in by
/// reference to each call rather than stored, so one `Driver` can in
/// principle be reused across steppers (mirrors `Stepper` being the only
/// thing that varies across concrete integration methods, per the
/// capability-trait design).
pub struct Driver<T> {
    pub controller: Controller<T>,
    pub constraints: Option<ConstraintConfig>,
    pub limits: EvolveLimits<T>,
    pub counters: EvolveCounters,
    pub accum_error: AccumError<T>,
    /// §9 Open Question, resolved: when set, a local-error-test failure
    /// (`dsm > 1`) is logged but not retried — the step is committed with
    /// its error estimate folded into `accum_error` anyway. Constraint and
    /// convergence failures are unaffected; `force_pass` only touches the
    /// temporal error gate (see DESIGN.md).
    pub force_pass: bool,
    /// Tolerances for the optional relaxation solve; only consulted when
    /// the attached stepper reports `features().relaxable` and a caller
    /// supplies a `RelaxFunction` to `run`.
    pub relax_cfg: RelaxConfig<T>,
    /// `h` actually used by the last committed step (distinct from
    /// `h_next`); needed to bound `GetDky`'s valid query window.
    pub hold: T,
    first_step: bool,
}

impl<T: Float + Constants + std::fmt::Debug> Driver<T> {
    pub fn new(limits: EvolveLimits<T>) -> Self {
        Driver {
            controller: Controller::new(),
            constraints: None,
            limits,
            counters: EvolveCounters::default(),
            accum_error: AccumError::new(AccumErrorMode::Max),
            force_pass: false,
            relax_cfg: RelaxConfig::default(),
            hold: T::zero(),
            first_step: true,
        }
    }

    /// §4.12 `FirstInit`: zero the running counters and recreate the
    /// controller from scratch, distinct from `Reset`, which keeps both.
    pub fn first_init_reset(&mut self) {
        self.controller = Controller::new();
        self.counters = EvolveCounters::default();
        self.accum_error.reset();
        self.hold = T::zero();
        self.first_step = true;
    }

    /// Run the attempt sub-loop for one internal step: ask the stepper to
    /// advance, then gate the candidate through constraints and the
    /// stepper's own local-error test (folded into `AttemptOutcome::Accepted`'s
    /// `dsm`), retrying with a shrunk `h` on any recoverable failure, up to
    /// the configured budgets.
    pub fn attempt_step<V, S>(
        &mut self,
        stepper: &mut S,
        t: T,
        h0: T,
        y: &V,
        relax_fn: &mut Option<&mut dyn RelaxFunction<T, V>>,
    ) -> Result<StepResult<T, V>, Error>
    where
        V: VectorOps<T>,
        S: Stepper<T, V>,
    {
        let mut h = h0;
        let mut nef = 0usize;
        let mut ncf = 0usize;
        let mut nconstr = 0usize;

        loop {
            // Roundoff-equality warning (§4.11): `t + h == t` means this
            // step contributes nothing at the working precision. Capped at
            // `max_hnil_warns`, but never itself fails the step — that's a
            // separate condition, handled below wherever `h` gets shrunk.
            if t + h == t {
                self.counters.nhnil += 1;
                if self.counters.nhnil <= self.limits.max_hnil_warns {
                    log::warn!(
                        "internal step size vanished at t = {:?} (h = {:?})",
                        t,
                        h
                    );
                }
            }

            match stepper.attempt(t, h, y) {
                AttemptOutcome::Accepted { y: ycand, dsm } => {
                    let mut ycand = ycand;
                    let mut relax_r: Option<T> = None;

                    // §4.11 order: relaxation, then the constraint check,
                    // then the temporal error test.
                    if stepper.features().relaxable {
                        if let Some(rf) = relax_fn.as_mut() {
                            let delta = VectorOps::linear_sum(T::one(), &ycand, -T::one(), y);
                            match relax::relax(*rf, y, &delta, &self.relax_cfg) {
                                RelaxOutcome::Relaxed { r } => {
                                    ycand = VectorOps::linear_sum(T::one(), y, r, &delta);
                                    relax_r = Some(r);
                                    log::debug!("relaxation factor r = {:?} applied to the accepted step", r);
                                }
                                RelaxOutcome::Failed => {
                                    log::debug!(
                                        "relaxation found no admissible factor; committing the step unrelaxed"
                                    );
                                }
                                RelaxOutcome::Fatal(e) => return Err(e),
                            }
                        }
                    }

                    if let Some(cfg) = &self.constraints {
                        match constraints::check_constraints::<T, V>(y, &ycand, cfg, nconstr) {
                            ConstraintOutcome::Satisfied => {}
                            ConstraintOutcome::Violated { eta, .. } => {
                                nconstr += 1;
                                self.counters.nconstrfails += 1;
                                h = h * eta;
                                if h.abs() <= self.limits.hmin {
                                    return Err(Error::ErrFailure);
                                }
                                continue;
                            }
                            ConstraintOutcome::Exhausted => {
                                return Err(Error::ConstraintFail);
                            }
                        }
                    }

                    if dsm > 1.0 && self.force_pass {
                        log::debug!(
                            "error test would have failed (dsm = {:.3e}) but force_pass is set; committing anyway",
                            dsm
                        );
                    }
                    if dsm > 1.0 && !self.force_pass {
                        nef += 1;
                        self.counters.netf += 1;
                        if nef > self.limits.max_err_test_fails {
                            return Err(Error::ErrFailure);
                        }
                        let shrink = if nef == 1 {
                            T::from(dsm.powf(-1.0 / 2.0)).unwrap_or(self.controller.error_fail_shrink())
                        } else {
                            self.controller.error_fail_shrink()
                        };
                        h = h * shrink.max(T::from(shrink_floor()).unwrap());
                        if h.abs() <= self.limits.hmin {
                            return Err(Error::ErrFailure);
                        }
                        continue;
                    }

                    self.counters.nst += 1;
                    self.accum_error.record(T::from(dsm).unwrap_or(T::zero()));
                    let eta = self.controller.accept(T::from(dsm.powf(-1.0 / 2.0)).unwrap_or(T::one()), self.first_step);
                    self.first_step = false;
                    let h_next = (h * eta).min(self.limits.hmax);
                    let t_reached = match relax_r {
                        Some(r) => t + h * r,
                        None => t + h,
                    };
                    log::debug!(
                        "step {} accepted: t = {:?} -> {:?}, h = {:?}, dsm = {:.3e}, eta = {:?}",
                        self.counters.nst,
                        t,
                        t_reached,
                        h,
                        dsm,
                        eta
                    );
                    self.hold = h;
                    return Ok(StepResult {
                        t: t_reached,
                        y: ycand,
                        h_used: h,
                        h_next,
                    });
                }
                AttemptOutcome::RecoverableConv => {
                    ncf += 1;
                    self.counters.ncfn += 1;
                    h = h * self.controller.conv_fail_shrink();
                    if ncf > self.limits.max_conv_fails || h.abs() <= self.limits.hmin {
                        return Err(Error::ConvFailure);
                    }
                }
                AttemptOutcome::RecoverableError => {
                    nef += 1;
                    self.counters.netf += 1;
                    h = h * self.controller.error_fail_shrink();
                    if nef > self.limits.max_err_test_fails || h.abs() <= self.limits.hmin {
                        return Err(Error::ErrFailure);
                    }
                }
                AttemptOutcome::RetryWithoutPenalty => {
                    continue;
                }
                AttemptOutcome::Fatal(e) => return Err(e),
            }
        }
    }

    /// Drive `t` forward from `(t0, y0)` toward `tout`, honoring `task` and
    /// an optional `tstop`. `step` is called once per internal step and
    /// must itself run `attempt_step` plus whatever root-finding/dense-
    /// output bookkeeping the caller wants; it returns `true` to keep
    /// going, `false` to stop (e.g. because it found a root).
    pub fn run<V, S>(
        &mut self,
        stepper: &mut S,
        mut t: T,
        mut y: V,
        mut h: T,
        tout: T,
        tstop: Option<T>,
        task: TaskMode,
        mut relax_fn: Option<&mut dyn RelaxFunction<T, V>>,
    ) -> Result<(Status, T, V, T), Error>
    where
        V: VectorOps<T>,
        S: Stepper<T, V>,
    {
        let sign = if tout >= t { T::one() } else { -T::one() };
        let mut nstloc = 0usize;

        loop {
            if let Some(ts) = tstop {
                let remaining = (ts - t) * sign;
                if remaining <= T::zero() {
                    return Ok((Status::TstopReturn, t, y, h));
                }
                if (h * sign) > remaining {
                    h = ts - t;
                }
            }

            if task == TaskMode::Normal {
                let remaining_to_tout = (tout - t) * sign;
                if remaining_to_tout <= T::zero() {
                    return Ok((Status::Success, t, y, h));
                }
                if (h * sign) > remaining_to_tout {
                    h = tout - t;
                }
            }

            nstloc += 1;
            if nstloc > self.limits.mxstep {
                return Err(Error::TooMuchWork);
            }

            let result = self.attempt_step(stepper, t, h, &y, &mut relax_fn)?;
            t = result.t;
            y = result.y;
            h = result.h_next;

            match task {
                TaskMode::OneStep => return Ok((Status::Success, t, y, h)),
                TaskMode::Normal => {
                    if (tout - t) * sign <= T::zero() {
                        return Ok((Status::Success, t, y, h));
                    }
                }
            }
        }
    }
}

fn shrink_floor() -> f64 {
    0.1
}
