//! L3 — nonlinear-solver capability (§4.3): `traits` defines the seam
//! between a solve strategy and the problem it's solving; `newton` is the
//! default Newton-iteration implementation.

pub mod newton;
pub mod traits;

pub use newton::Newton;
pub use traits::{linearly_implicit_ctest, Error, NonlinearProblem, NonlinearSolver, RateConvTest};
