//! C5 — Root-finding subsystem (§4.9): tracks sign changes of a vector of
//! root functions `g(t, y)` across the just-completed step and refines a
//! root's location with the Illinois modified-secant method. Mirrors the
//! historical `IDARootfind`/`CVRootfind` three-phase check (`Check1`,
//! `Check2`, `Check3`) but drives it from owned `RootState`, not static
//! work arrays.

use crate::callback::CallbackOutcome;
use crate::traits::Constants;
use crate::vector::VectorOps;
use num_traits::Float;

/// §4.9's root tolerance: `(|tcur| + |h|) * uround * 100`, the window
/// within which `Check3`'s bracket refinement stops subdividing and Check1/
/// Check2's `smallh` probes are scaled.
pub fn root_ttol<T: Float + Constants>(t: T, h: T) -> T {
    T::hundred() * T::epsilon() * (t.abs() + h.abs())
}

/// Requested monitoring direction for one root function component (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootDirection {
    Either,
    Rising,
    Falling,
}

impl RootDirection {
    fn admits(self, gold: f64, gnew: f64) -> bool {
        match self {
            RootDirection::Either => true,
            RootDirection::Rising => gnew >= gold,
            RootDirection::Falling => gnew <= gold,
        }
    }
}

/// Evaluate `g(t, y)` as a plain vector of `f64`s: root functions are a
/// diagnostic signal, not part of the state algebra, so they don't need the
/// full `VectorOps` capability.
pub trait RootFunction<T, V> {
    fn eval(&mut self, t: T, y: &V) -> CallbackOutcome<Vec<f64>>;
}

impl<T, V, F> RootFunction<T, V> for F
where
    F: FnMut(T, &V) -> CallbackOutcome<Vec<f64>>,
{
    fn eval(&mut self, t: T, y: &V) -> CallbackOutcome<Vec<f64>> {
        self(t, y)
    }
}

/// Root-tracking state, owned by the engine and threaded through each call
/// to `check_step` (§4.9's `RootState`).
#[derive(Debug, Clone)]
pub struct RootState {
    nrtfn: usize,
    directions: Vec<RootDirection>,
    /// `g` at the last time the engine confirmed a step (`tlo`).
    glo: Vec<f64>,
    /// Time of `glo`.
    tlo: f64,
    /// Whether a component's activity has ever been observed (§4.9: a root
    /// function identically zero across `RootInit` with no sign change is
    /// reported as `Error::BadRootFunction`, but only once the caller opts
    /// out of suppressing that warning).
    active: Vec<bool>,
    no_inactive_warn: bool,
    /// Components found at a root on the last `check_step` call.
    last_roots: Vec<usize>,
    warned_inactive: bool,
}

/// Outcome of `check_step`.
pub enum RootOutcome {
    /// No admissible sign change in `(tlo, thi]`.
    NoRoot,
    /// A root was found at `troot`; `which` lists the component indices
    /// (in admitted direction) that changed sign there.
    Found { troot: f64, which: Vec<usize> },
}

impl RootState {
    pub fn new(nrtfn: usize) -> Self {
        RootState {
            nrtfn,
            directions: vec![RootDirection::Either; nrtfn],
            glo: vec![0.0; nrtfn],
            tlo: 0.0,
            active: vec![false; nrtfn],
            no_inactive_warn: false,
            last_roots: Vec::new(),
            warned_inactive: false,
        }
    }

    pub fn set_direction(&mut self, which: usize, dir: RootDirection) {
        self.directions[which] = dir;
    }

    pub fn set_no_inactive_warn(&mut self, v: bool) {
        self.no_inactive_warn = v;
    }

    /// §4.9 `Check1`: seed `glo` from `g(t0, y0)`, marking any exact-zero
    /// component inactive. If `extrapolate` can produce an approximate `y`
    /// a `smallh` step forward (built from the stepper's `full_rhs`, which
    /// is why this is gated on `full_rhs_available` by the caller), any
    /// component that was exactly zero and becomes nonzero there is
    /// reactivated, with `glo` reseeded from the perturbed value so Check3
    /// doesn't see a spurious sign change at `t0`.
    pub fn check1<T, V>(
        &mut self,
        t0: T,
        g0: Vec<f64>,
        h: T,
        ttol: T,
        root_fn: &mut dyn RootFunction<T, V>,
        mut extrapolate: Option<&mut dyn FnMut(T) -> V>,
    ) -> Result<(), crate::error::Error>
    where
        T: Float + Constants + Into<f64> + From<f64>,
        V: VectorOps<T>,
    {
        self.tlo = t0.into();
        self.glo = g0;
        for i in 0..self.nrtfn {
            self.active[i] = self.glo[i] != 0.0;
        }

        if self.glo.iter().any(|&g| g == 0.0) {
            if let Some(extrap) = extrapolate.as_mut() {
                let ttol_f: f64 = ttol.into();
                let h_f: f64 = h.into();
                let frac = (ttol_f / h_f.abs()).max(0.1);
                let smallh = T::from(frac).unwrap() * h;
                let t1 = t0 + smallh;
                let y1 = extrap(t1);
                let g1 = match root_fn.eval(t1, &y1) {
                    CallbackOutcome::Success(g) => g,
                    CallbackOutcome::Recoverable => return Err(crate::error::Error::VectorOpErr),
                    CallbackOutcome::Fatal(e) => return Err(e),
                };
                for i in 0..self.nrtfn {
                    if self.glo[i] == 0.0 && g1[i] != 0.0 {
                        self.active[i] = true;
                        self.glo[i] = g1[i];
                    }
                }
            }
        }
        Ok(())
    }

    /// §4.9 `Check1`/initialization, legacy path for callers with no
    /// `full_rhs`: seed `glo` at the integration start time with no
    /// perturbation/reactivation pass.
    pub fn init_g(&mut self, t0: f64, g0: Vec<f64>) {
        self.tlo = t0;
        self.glo = g0;
        for i in 0..self.nrtfn {
            self.active[i] = self.glo[i] != 0.0;
        }
    }

    pub fn any_active(&self) -> bool {
        self.active.iter().any(|&a| a)
    }

    pub fn no_inactive_warn(&self) -> bool {
        self.no_inactive_warn
    }

    /// §4.9's three-phase check over the just-completed step `(tlo, thi]`:
    /// Check2 re-verifies a root reported on the *previous* call at `tlo`,
    /// Check3 runs the bisection/Illinois refine between `tlo` and `thi`
    /// using a dense-output evaluator `eval_y` to sample `y` at trial
    /// times. `h` is the step size just used, needed for Check2's `smallh`
    /// probe.
    pub fn check_step<T, V>(
        &mut self,
        thi: T,
        h: T,
        root_fn: &mut dyn RootFunction<T, V>,
        eval_y: &mut dyn FnMut(T) -> V,
        ttol: T,
    ) -> Result<RootOutcome, crate::error::Error>
    where
        T: Float + Constants + Into<f64> + From<f64>,
        V: VectorOps<T>,
    {
        // Check2: a root was reported last call at `tlo`; re-verify it's
        // still exactly zero there (now using this call's dense output,
        // which may differ slightly from what produced the report). If it
        // is, the same root is recurring within tolerance: report
        // `CloseRoot` rather than silently re-finding it. If the
        // component(s) have moved off zero, probe forward by `smallh` to
        // get a clean new baseline before the scan below.
        if !self.last_roots.is_empty() {
            let tlo_t: T = T::from(self.tlo).unwrap();
            let ylo = eval_y(tlo_t);
            let glo_check = match root_fn.eval(tlo_t, &ylo) {
                CallbackOutcome::Success(g) => g,
                CallbackOutcome::Recoverable => return Err(crate::error::Error::VectorOpErr),
                CallbackOutcome::Fatal(e) => return Err(e),
            };
            let still_zero = self.last_roots.iter().all(|&i| glo_check[i] == 0.0);
            if still_zero {
                return Err(crate::error::Error::CloseRoot);
            }

            let ttol_f: f64 = ttol.into();
            let h_f: f64 = h.into();
            let frac = (ttol_f / h_f.abs()).max(0.1);
            let smallh: T = T::from(frac).unwrap() * h;
            let t_probe = tlo_t + smallh;
            let y_probe = eval_y(t_probe);
            let g_probe = match root_fn.eval(t_probe, &y_probe) {
                CallbackOutcome::Success(g) => g,
                CallbackOutcome::Recoverable => return Err(crate::error::Error::VectorOpErr),
                CallbackOutcome::Fatal(e) => return Err(e),
            };
            for i in 0..self.nrtfn {
                if glo_check[i] != 0.0 {
                    self.active[i] = true;
                }
            }
            self.glo = g_probe;
            self.tlo = t_probe.into();
            self.last_roots.clear();
        }

        let thi_f: f64 = thi.into();
        let yhi = eval_y(thi);
        let ghi = match root_fn.eval(thi, &yhi) {
            CallbackOutcome::Success(g) => g,
            CallbackOutcome::Recoverable => return Err(crate::error::Error::VectorOpErr),
            CallbackOutcome::Fatal(e) => return Err(e),
        };

        for i in 0..self.nrtfn {
            if ghi[i] != 0.0 {
                self.active[i] = true;
            }
        }
        if !self.any_active() {
            if self.no_inactive_warn {
                if !self.warned_inactive {
                    log::warn!("all root functions are identically zero; no activity observed since RootInit");
                    self.warned_inactive = true;
                }
            } else {
                return Err(crate::error::Error::BadRootFunction);
            }
        }

        // Exact zero at thi for any admitted-direction component (part of
        // the Check3 bracket scan, not a re-report of the previous root).
        let mut exact: Vec<usize> = Vec::new();
        for i in 0..self.nrtfn {
            if ghi[i] == 0.0 && self.directions[i].admits(self.glo[i], ghi[i]) {
                exact.push(i);
            }
        }
        if !exact.is_empty() {
            self.last_roots = exact.clone();
            self.tlo = thi_f;
            self.glo = ghi;
            return Ok(RootOutcome::Found {
                troot: thi_f,
                which: exact,
            });
        }

        // Any admitted sign change over the interval at all?
        let any_change = (0..self.nrtfn).any(|i| {
            self.glo[i] * ghi[i] < 0.0 && self.directions[i].admits(self.glo[i], ghi[i])
        });
        if !any_change {
            self.tlo = thi_f;
            self.glo = ghi;
            self.last_roots.clear();
            return Ok(RootOutcome::NoRoot);
        }

        // Check3: Illinois modified-secant bracket refinement.
        let tlo0 = self.tlo;
        let glo0 = self.glo.clone();
        let mut tlo = tlo0;
        let mut thi_iter = thi_f;
        let mut glo = glo0;
        let mut ghi_iter = ghi.clone();
        let mut side = 0i32; // 0 = unknown, 1 = lo stuck, -1 = hi stuck

        let ttol_f: f64 = ttol.into();
        let mut troot = thi_iter;
        let mut gtroot = ghi_iter.clone();

        for _ in 0..100 {
            if (thi_iter - tlo).abs() < ttol_f {
                break;
            }
            let frac = if side == 1 {
                0.5
            } else if side == -1 {
                0.5
            } else {
                1.0
            };

            // Pick the component with the largest admitted change to drive
            // the secant estimate, mirroring the historical implementation's
            // single scalar root-search across all functions at once.
            let mut tmid = 0.5 * (tlo + thi_iter);
            for i in 0..self.nrtfn {
                if glo[i] * ghi_iter[i] < 0.0 && self.directions[i].admits(glo[i], ghi_iter[i]) {
                    let denom = ghi_iter[i] - frac * glo[i];
                    if denom != 0.0 {
                        let secant = thi_iter - (thi_iter - tlo) * ghi_iter[i] / denom;
                        tmid = secant;
                    }
                    break;
                }
            }
            if !(tlo < tmid && tmid < thi_iter) {
                tmid = 0.5 * (tlo + thi_iter);
            }

            let tmid_t: T = T::from(tmid).unwrap();
            let ymid = eval_y(tmid_t);
            let gmid = match root_fn.eval(tmid_t, &ymid) {
                CallbackOutcome::Success(g) => g,
                CallbackOutcome::Recoverable => return Err(crate::error::Error::VectorOpErr),
                CallbackOutcome::Fatal(e) => return Err(e),
            };

            let mut changed_lo = false;
            for i in 0..self.nrtfn {
                if glo[i] * gmid[i] < 0.0 && self.directions[i].admits(glo[i], gmid[i]) {
                    changed_lo = true;
                    break;
                }
            }

            if changed_lo {
                thi_iter = tmid;
                ghi_iter = gmid;
                side = if side == 1 { -1 } else { side - 1 };
            } else {
                tlo = tmid;
                glo = gmid;
                side = if side == -1 { 1 } else { side + 1 };
            }
            troot = thi_iter;
            gtroot = ghi_iter.clone();
        }

        let which: Vec<usize> = (0..self.nrtfn)
            .filter(|&i| glo[i] * gtroot[i] <= 0.0 && self.directions[i].admits(glo[i], gtroot[i]))
            .collect();

        self.last_roots = which.clone();
        self.tlo = thi_f;
        self.glo = ghi;
        Ok(RootOutcome::Found { troot, which })
    }
}
