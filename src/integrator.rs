//! Top-level public API (§6.1): `Integrator<T, V, S>` combines the
//! tolerance/weight engine (C1), initial-step estimator (C2), controller
//! (C3), root-finding (C5), dense-output interpolation (C6), the evolve
//! driver (C7) and the lifecycle state machine (C8) behind one handle
//! generic over a caller-supplied `Stepper`. Concrete nonlinear/linear
//! solvers are attached to the `Stepper` itself before it reaches the
//! integrator (see DESIGN.md) — from here they're opaque, the way `evolve`
//! never looks inside `AttemptOutcome::Accepted`.

use crate::callback::CallbackOutcome;
use crate::controller::clamp_step;
use crate::error::{Error, Status};
use crate::evolve::{Driver, EvolveCounters, EvolveLimits, TaskMode};
use crate::init_step::{estimate_initial_step, RhsEval};
use crate::interp::{HermiteInterp, Interpolant, LagrangeInterp};
use crate::lifecycle::{InitKind, LifecycleCounters, Phase};
use crate::relax::{RelaxConfig, RelaxFunction};
use crate::roots::{root_ttol, RootDirection, RootFunction, RootOutcome, RootState};
use crate::stepper::{FullRhsMode, Stepper};
use crate::tolerance::TolerancePolicy;
use crate::traits::Constants;
use crate::vector::VectorOps;
use num_traits::Float;

enum DenseOutput<T, V> {
    Hermite(HermiteInterp<T, V>),
    Lagrange(LagrangeInterp<T, V>),
    None,
}

/// The engine handle. `S` is the attached stepper; `RF` an optional root
/// function (unit `()` when root-finding isn't used).
pub struct Integrator<T, V, S> {
    phase: Phase,
    stepper: Option<S>,
    driver: Driver<T>,
    tolerance: Option<TolerancePolicy<T, V>>,
    ewt: Option<V>,
    dense: DenseOutput<T, V>,
    roots: Option<RootState>,
    /// Whether `roots`' `glo`/`tlo` have been seeded from an actual
    /// `g(t0, y0)` evaluation yet (lazily, the first time a root function
    /// is supplied to `evolve` after `root_init`).
    roots_seeded: bool,
    t: T,
    y: Option<V>,
    h: T,
    tstop: Option<T>,
    lifecycle: LifecycleCounters,
    relax_fn: Option<Box<dyn RelaxFunction<T, V>>>,
}

impl<T, V, S> Integrator<T, V, S>
where
    T: Float + Constants + Into<f64> + From<f64> + std::fmt::Debug,
    V: VectorOps<T>,
    S: Stepper<T, V>,
{
    pub fn new() -> Self {
        Integrator {
            phase: Phase::Created,
            stepper: None,
            driver: Driver::new(EvolveLimits::new(T::epsilon(), T::from(1e300).unwrap())),
            tolerance: None,
            ewt: None,
            dense: DenseOutput::None,
            roots: None,
            roots_seeded: false,
            t: T::zero(),
            y: None,
            h: T::zero(),
            tstop: None,
            lifecycle: LifecycleCounters::default(),
            relax_fn: None,
        }
    }

    /// §6.1 `AttachStepper`. Subsumes `AttachNonlinearSolver`/
    /// `AttachLinearSolver`/`AttachMassSolver`: those capabilities are
    /// configured on `stepper` by its own constructor before it gets here
    /// (DESIGN.md records this as the Open Question resolution).
    pub fn attach_stepper(&mut self, stepper: S) -> Result<(), Error> {
        if !self.phase.can_attach() {
            return Err(Error::IllegalInput {
                detail: "cannot attach a stepper outside Created/Attached phase",
            });
        }
        self.stepper = Some(stepper);
        self.phase = Phase::Attached;
        Ok(())
    }

    pub fn set_tolerance(&mut self, policy: TolerancePolicy<T, V>) {
        self.tolerance = Some(policy);
    }

    pub fn set_stop_time(&mut self, tstop: T) {
        self.tstop = Some(tstop);
    }

    pub fn set_min_step(&mut self, hmin: T) {
        self.driver.limits.hmin = hmin;
    }

    pub fn set_max_step(&mut self, hmax: T) {
        self.driver.limits.hmax = hmax;
    }

    pub fn set_max_steps(&mut self, mxstep: usize) {
        self.driver.limits.mxstep = mxstep;
    }

    pub fn set_max_hnil_warns(&mut self, n: usize) {
        self.driver.limits.max_hnil_warns = n;
    }

    pub fn set_fixed_step(&mut self, fixed: bool) {
        self.driver.controller.set_fixed_step(fixed);
    }

    pub fn set_constraints(&mut self, cfg: crate::constraints::ConstraintConfig) {
        self.driver.constraints = Some(cfg);
    }

    pub fn set_initial_step(&mut self, h0: T) {
        self.h = h0;
    }

    /// Select how the engine folds each step's `dsm` into the
    /// accumulated-error statistic returned by `accumulated_error`.
    pub fn set_accum_error_mode(&mut self, mode: crate::controller::AccumErrorMode) {
        self.driver.accum_error = crate::controller::AccumError::new(mode);
    }

    pub fn accumulated_error(&self) -> T {
        self.driver.accum_error.value()
    }

    /// §9 `force_pass`: when set, a failing local-error test is logged and
    /// committed anyway rather than retried.
    pub fn set_force_pass(&mut self, force_pass: bool) {
        self.driver.force_pass = force_pass;
    }

    /// §4.11/§9: opt in to relaxation. Only consulted by the driver when
    /// the attached stepper also reports `features().relaxable`.
    pub fn set_relax_function(&mut self, rf: Box<dyn RelaxFunction<T, V>>) {
        self.relax_fn = Some(rf);
    }

    pub fn set_relax_config(&mut self, cfg: RelaxConfig<T>) {
        self.driver.relax_cfg = cfg;
    }

    /// §4.9 `RootInit`: enable root-finding for `nrtfn` components.
    pub fn root_init(&mut self, nrtfn: usize) {
        self.roots = Some(RootState::new(nrtfn));
        self.roots_seeded = false;
    }

    pub fn set_root_direction(&mut self, which: usize, dir: RootDirection) {
        if let Some(r) = &mut self.roots {
            r.set_direction(which, dir);
        }
    }

    pub fn set_no_inactive_root_warn(&mut self, v: bool) {
        if let Some(r) = &mut self.roots {
            r.set_no_inactive_warn(v);
        }
    }

    /// §4.12 `Init`/`FirstInit`/`Reset`: (re)seed `(t0, y0)`. `kind`
    /// distinguishes a fresh problem from a mid-run reset/resize.
    pub fn init(&mut self, kind: InitKind, t0: T, y0: V, rhs: &mut dyn RhsEval<T, V>) -> Result<(), Error> {
        if !self.phase.can_init() {
            return Err(Error::IllegalInput {
                detail: "Init is only legal from Attached, Ready or Failed",
            });
        }
        let tol = self
            .tolerance
            .as_mut()
            .ok_or(Error::IllegalInput {
                detail: "SetTolerance must be called before Init",
            })?;
        let ewt = tol.build_weights(&y0).ok_or(Error::IllegalInput {
            detail: "initial tolerances produced a non-positive weight",
        })?;

        if kind == InitKind::First {
            self.driver.first_init_reset();
        }

        if self.h == T::zero() {
            let hmax_inv = if self.driver.limits.hmax > T::zero() {
                T::one() / self.driver.limits.hmax
            } else {
                T::zero()
            };
            let tout_probe = t0 + T::one();
            self.h = estimate_initial_step(t0, tout_probe, &y0, &ewt, hmax_inv, rhs)?;
        }
        self.h = clamp_step(self.h, self.driver.limits.hmin, self.driver.limits.hmax);

        if let Some(features) = self.stepper.as_ref().map(|s| s.features()) {
            if features.full_rhs_available {
                self.dense = DenseOutput::Hermite(HermiteInterp::new(t0, y0.clone(), ewt.clone()));
            } else {
                self.dense = DenseOutput::Lagrange(LagrangeInterp::new(4));
            }
        }

        self.t = t0;
        self.y = Some(y0);
        self.ewt = Some(ewt);
        self.lifecycle.record(kind);
        self.phase = Phase::Ready;
        Ok(())
    }

    /// §6.1 `Evolve`. Runs the driver to `tout` (or `tstop`/a root), then
    /// runs the root check over the step just taken if root-finding is
    /// enabled.
    pub fn evolve(
        &mut self,
        tout: T,
        task: TaskMode,
        root_fn: Option<&mut dyn RootFunction<T, V>>,
    ) -> Result<Status, Error> {
        if !self.phase.can_evolve() {
            return Err(Error::IllegalInput {
                detail: "Evolve is only legal once Init has run",
            });
        }
        let stepper = self.stepper.as_mut().ok_or(Error::IllegalInput {
            detail: "no stepper attached",
        })?;
        let t0 = self.t;
        let y0 = self.y.take().ok_or(Error::BadDky)?;

        let mut root_fn = root_fn;
        if let Some(rf) = root_fn.as_mut() {
            if let Some(roots) = self.roots.as_mut() {
                if !self.roots_seeded {
                    let g0 = match rf.eval(t0, &y0) {
                        CallbackOutcome::Success(g) => g,
                        CallbackOutcome::Recoverable => return Err(Error::VectorOpErr),
                        CallbackOutcome::Fatal(e) => return Err(e),
                    };
                    let ttol0 = root_ttol(t0, self.h);
                    if stepper.features().full_rhs_available {
                        let yd0 = stepper.full_rhs(t0, &y0, FullRhsMode::Start);
                        if let Some(yd0) = yd0 {
                            let mut extrap = |t1: T| VectorOps::linear_sum(T::one(), &y0, t1 - t0, &yd0);
                            roots.check1(t0, g0, self.h, ttol0, *rf, Some(&mut extrap))?;
                        } else {
                            roots.check1::<T, V>(t0, g0, self.h, ttol0, *rf, None)?;
                        }
                    } else {
                        roots.init_g(t0.into(), g0);
                    }
                    self.roots_seeded = true;
                }
            }
        }

        let result =
            self.driver
                .run(stepper, t0, y0, self.h, tout, self.tstop, task, self.relax_fn.as_deref_mut());

        let (status, t, y, h_next) = match result {
            Ok(v) => v,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e);
            }
        };

        if let DenseOutput::Hermite(h) = &mut self.dense {
            let yd = match stepper.full_rhs(t, &y, crate::stepper::FullRhsMode::End) {
                Some(yd) => yd,
                None => y.clone(),
            };
            h.update(t, &y, Some(&yd));
        } else if let DenseOutput::Lagrange(l) = &mut self.dense {
            l.update(t, &y, None);
        }

        let mut final_status = status;
        if let (Some(roots), Some(rf)) = (self.roots.as_mut(), root_fn.as_mut()) {
            let dense = &self.dense;
            let mut eval_y = |tq: T| sample_dense(dense, tq, &y);
            let ttol = root_ttol(t, self.driver.hold);
            match roots.check_step(t, self.driver.hold, *rf, &mut eval_y, ttol) {
                Ok(RootOutcome::Found { troot: _, which }) if !which.is_empty() => {
                    final_status = Status::RootReturn;
                }
                Ok(_) => {}
                Err(e) => {
                    self.phase = Phase::Failed;
                    return Err(e);
                }
            }
        }

        self.t = t;
        self.y = Some(y);
        self.h = h_next;
        Ok(final_status)
    }

    /// §6.1 `GetDky`: evaluate the `k`-th derivative of `y` at `t`, which
    /// must lie within `[tcur - hold - tfuzz, tcur + tfuzz]` — the last
    /// completed step, plus a little roundoff slack on either side.
    pub fn get_dky(&self, t: T, k: usize, deg: usize) -> Result<V, Error> {
        let tfuzz = T::hundred() * T::epsilon() * (self.t.abs() + self.driver.hold.abs());
        let t_lower = self.t - self.driver.hold - tfuzz;
        let t_upper = self.t + tfuzz;
        if t < t_lower || t > t_upper {
            return Err(Error::BadT {
                t: t.into(),
                t_lower: t_lower.into(),
                t_upper: t_upper.into(),
            });
        }
        match &self.dense {
            DenseOutput::Hermite(h) => h.evaluate(t, k, deg).ok_or(Error::BadDky),
            DenseOutput::Lagrange(l) => {
                if k != 0 {
                    Err(Error::BadK { k })
                } else {
                    l.evaluate(t, 0, deg).ok_or(Error::BadDky)
                }
            }
            DenseOutput::None => Err(Error::BadDky),
        }
    }

    pub fn counters(&self) -> EvolveCounters {
        self.driver.counters
    }

    pub fn current_time(&self) -> T {
        self.t
    }
}

impl<T, V, S> Default for Integrator<T, V, S>
where
    T: Float + Constants + Into<f64> + From<f64> + std::fmt::Debug,
    V: VectorOps<T>,
    S: Stepper<T, V>,
{
    fn default() -> Self {
        Self::new()
    }
}

fn sample_dense<T: Float, V: VectorOps<T>>(dense: &DenseOutput<T, V>, t: T, fallback: &V) -> V {
    match dense {
        DenseOutput::Hermite(h) => h.evaluate(t, 0, 3).unwrap_or_else(|| fallback.clone()),
        DenseOutput::Lagrange(l) => l.evaluate(t, 0, 3).unwrap_or_else(|| fallback.clone()),
        DenseOutput::None => fallback.clone(),
    }
}
