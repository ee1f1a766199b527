//! Newton iteration: the default `NonlinearSolver`. Mirrors the historical
//! `IDANls`/`SUNNonlinSol_Newton` control flow — evaluate the residual,
//! optionally refresh the linear system, iterate `y += A^-1 (-F(y))` until
//! the convergence test passes, and on a recoverable convergence failure
//! with a stale Jacobian, retry once with `lsetup` forced.

use std::marker::PhantomData;

use num_traits::Float;

use crate::callback::{CallbackOutcome, ConvTestOutcome};
use crate::nonlinear::traits::{Error, NonlinearProblem, NonlinearSolver};
use crate::vector::VectorOps;

#[derive(Debug)]
pub struct Newton<T, V> {
    /// maximum Newton iterations per solve attempt
    maxiters: usize,
    /// iterations in the current solve attempt
    curiter: usize,
    /// total nonlinear iterations across all solves
    niters: usize,
    /// total convergence failures across all solves
    nconvfails: usize,
    /// Jacobian status, current = `true` / stale = `false`
    jcur: bool,
    _marker: PhantomData<(T, V)>,
}

impl<T, V> Newton<T, V> {
    pub fn new(maxiters: usize) -> Self {
        Newton {
            maxiters,
            curiter: 0,
            niters: 0,
            nconvfails: 0,
            jcur: false,
            _marker: PhantomData,
        }
    }
}

impl<T, V, P> NonlinearSolver<T, V, P> for Newton<T, V>
where
    T: Float,
    V: VectorOps<T>,
    P: NonlinearProblem<T, V>,
{
    fn solve(
        &mut self,
        problem: &mut P,
        y0: &V,
        w: &V,
        tol: T,
        call_lsetup: bool,
    ) -> Result<V, Error> {
        let mut jbad = false;
        let mut call_lsetup = call_lsetup;

        'outer: loop {
            let delta = match problem.sys(y0) {
                CallbackOutcome::Success(d) => d,
                CallbackOutcome::Recoverable => {
                    self.nconvfails += 1;
                    return Err(Error::ConvergenceRecover);
                }
                CallbackOutcome::Fatal(_) => return Err(Error::Fatal),
            };

            if call_lsetup {
                match problem.lsetup(y0, &delta, jbad) {
                    CallbackOutcome::Success(jcur) => self.jcur = jcur,
                    CallbackOutcome::Recoverable => {
                        self.nconvfails += 1;
                        return Err(Error::ConvergenceRecover);
                    }
                    CallbackOutcome::Fatal(_) => return Err(Error::Fatal),
                }
            }

            self.curiter = 0;
            let mut y = y0.clone();
            let mut delta = delta;

            let inner: Result<V, Error> = loop {
                self.niters += 1;
                let neg_delta = delta.scale(-T::one());
                let step = match problem.lsolve(&y, &neg_delta) {
                    CallbackOutcome::Success(s) => s,
                    CallbackOutcome::Recoverable => break Err(Error::ConvergenceRecover),
                    CallbackOutcome::Fatal(_) => break Err(Error::Fatal),
                };

                y = VectorOps::linear_sum(T::one(), &y, T::one(), &step);

                let outcome = problem.ctest(&y, &step, tol, w).map_err(|_| Error::Fatal)?;
                match outcome {
                    ConvTestOutcome::Converged => {
                        self.jcur = false;
                        break Ok(y.clone());
                    }
                    ConvTestOutcome::Diverging => break Err(Error::ConvergenceRecover),
                    ConvTestOutcome::Continue => {
                        self.curiter += 1;
                        if self.curiter >= self.maxiters {
                            break Err(Error::ConvergenceRecover);
                        }
                        delta = match problem.sys(&y) {
                            CallbackOutcome::Success(d) => d,
                            CallbackOutcome::Recoverable => break Err(Error::ConvergenceRecover),
                            CallbackOutcome::Fatal(_) => break Err(Error::Fatal),
                        };
                    }
                }
            };

            match inner {
                Ok(solution) => return Ok(solution),
                Err(Error::ConvergenceRecover) if !self.jcur => {
                    // Jacobian data was stale: retry once with a forced refresh.
                    self.nconvfails += 1;
                    call_lsetup = true;
                    jbad = true;
                    continue 'outer;
                }
                Err(e) => {
                    self.nconvfails += 1;
                    return Err(e);
                }
            }
        }
    }

    fn num_iters(&self) -> usize {
        self.niters
    }

    fn num_conv_fails(&self) -> usize {
        self.nconvfails
    }

    fn jacobian_current(&self) -> bool {
        self.jcur
    }
}
