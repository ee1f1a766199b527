//! C3 — Step-size controller (§4.7). Turns a completed step's weighted
//! local-error norm `dsm` into the growth/shrink factor `eta` applied to the
//! next step, subject to the engine-wide growth cap `etamax`, the
//! convergence/error-failure shrink floors, and the caller's fixed-step
//! override.

use crate::traits::Constants;
use num_traits::Float;

/// §4.7: the controller only ever multiplies `h` by `eta`; it never touches
/// `h` directly, so a fixed-step caller can simply pin `eta == 1`.
#[derive(Debug, Clone, Copy)]
pub struct Controller<T> {
    /// Growth ceiling applied to a normal (post error-test) step-size update.
    etamax: T,
    /// Ceiling used on the very first step after startup or a reset.
    etamx1: T,
    /// Shrink applied after a nonlinear convergence failure.
    etacf: T,
    /// Shrink applied after a local-error-test failure.
    etamxf: T,
    /// Lower bound below which a computed `eta` is snapped to 1 (no-op)
    /// rather than accepted as a negligible change.
    etamin: T,
    /// `Some` pins every `eta` to this value (fixed-step mode); `None` means
    /// the controller computes `eta` normally.
    fixed: Option<T>,
}

impl<T: Float + Constants> Controller<T> {
    pub fn new() -> Self {
        Controller {
            etamax: T::two() * T::ten(),
            etamx1: T::ten() * T::ten(),
            etacf: T::quarter(),
            etamxf: T::pt2(),
            etamin: T::one(),
            fixed: None,
        }
    }

    pub fn set_fixed_step(&mut self, fixed: bool) {
        self.fixed = if fixed { Some(T::one()) } else { None };
    }

    pub fn is_fixed_step(&self) -> bool {
        self.fixed.is_some()
    }

    /// §4.7 normal step-size update: `eta = k_q * dsm^(-1/(q+1))` is the
    /// stepper's job to compute the order-dependent core factor; the
    /// controller only clamps it to the admissible range. `first_step`
    /// selects between `etamax` and the more generous `etamx1`.
    pub fn accept(&mut self, eta_raw: T, first_step: bool) -> T {
        if let Some(fixed) = self.fixed {
            return fixed;
        }
        let ceiling = if first_step { self.etamx1 } else { self.etamax };
        let eta = eta_raw.min(ceiling);
        if eta < self.etamin {
            T::one()
        } else {
            eta
        }
    }

    /// §4.11 convergence-failure shrink: applied directly, bypassing
    /// `accept`'s growth ceiling (a shrink is never clamped upward).
    pub fn conv_fail_shrink(&self) -> T {
        self.etacf
    }

    /// §4.11 error-test-failure shrink, used from the second consecutive
    /// failure onward (the first failure uses the stepper's own order-based
    /// `eta`, still passed through `accept`).
    pub fn error_fail_shrink(&self) -> T {
        self.etamxf
    }

    pub fn set_etamax(&mut self, v: T) {
        self.etamax = v;
    }

    pub fn set_etamx1(&mut self, v: T) {
        self.etamx1 = v;
    }

    pub fn set_etacf(&mut self, v: T) {
        self.etacf = v;
    }

    pub fn set_etamxf(&mut self, v: T) {
        self.etamxf = v;
    }
}

impl<T: Float + Constants> Default for Controller<T> {
    fn default() -> Self {
        Controller::new()
    }
}

/// How the engine folds the per-step weighted local-error norm `dsm` into
/// one running statistic exposed to the caller (an Open Question in the
/// original design, resolved here: see DESIGN.md for the non-monotone-`h`
/// rationale).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumErrorMode {
    /// Worst `dsm` seen since the last reset.
    Max,
    /// Running total of every accepted step's `dsm`.
    Sum,
    /// Arithmetic mean of every accepted step's `dsm`, unweighted by `h`.
    Avg,
}

/// Running accumulator fed one `dsm` per accepted step.
#[derive(Debug, Clone, Copy)]
pub struct AccumError<T> {
    mode: AccumErrorMode,
    total: T,
    count: usize,
}

impl<T: Float> AccumError<T> {
    pub fn new(mode: AccumErrorMode) -> Self {
        AccumError {
            mode,
            total: T::zero(),
            count: 0,
        }
    }

    pub fn record(&mut self, dsm: T) {
        match self.mode {
            AccumErrorMode::Max => {
                if dsm > self.total {
                    self.total = dsm;
                }
            }
            AccumErrorMode::Sum | AccumErrorMode::Avg => self.total = self.total + dsm,
        }
        self.count += 1;
    }

    pub fn value(&self) -> T {
        match self.mode {
            AccumErrorMode::Avg if self.count > 0 => self.total / T::from(self.count).unwrap(),
            _ => self.total,
        }
    }

    pub fn reset(&mut self) {
        self.total = T::zero();
        self.count = 0;
    }
}

/// Clamp a proposed step `h` to `[hmin, hmax]`, preserving sign.
pub fn clamp_step<T: Float>(h: T, hmin: T, hmax: T) -> T {
    let sign = if h >= T::zero() { T::one() } else { -T::one() };
    let mag = h.abs().max(hmin).min(hmax);
    sign * mag
}
