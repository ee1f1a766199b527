//! A stepper-agnostic adaptive time-stepping core for stiff and nonstiff
//! initial value problems (ODEs and semi-explicit DAEs), in the spirit of
//! the Sundials integrator suite (IDA/CVODE): an evolve loop with
//! step-size control, root-finding, algebraic-solver coupling and
//! dense-output interpolation, built around a small set of capability
//! traits rather than one monolithic model type.
//!
//! The layering, innermost first:
//! - [`vector`] — `VectorOps`, the algebraic primitives over the state.
//! - [`matrix`] — `MatrixOps`/`LinearSolver`, the linear-system capability.
//! - [`nonlinear`] — `NonlinearSolver`/`NonlinearProblem` (Newton by default).
//! - [`stepper`] — `Stepper`, one attempt at advancing the state by `h`.
//!
//! On top of those, the engine-owned components:
//! [`tolerance`] (weights), [`init_step`] (initial `h`), [`controller`]
//! (step-size control), [`alg_solver`] (Jacobian/mass-matrix coupling),
//! [`roots`] (root-finding), [`interp`] (dense output), [`constraints`]
//! (inequality enforcement), [`relax`] (optional invariant-preserving
//! relaxation), [`evolve`] (the driver) and [`lifecycle`] (the engine's
//! own state machine) — all wired together behind [`integrator::Integrator`].

pub mod alg_solver;
pub mod callback;
pub mod constraints;
pub mod controller;
pub mod error;
pub mod evolve;
pub mod init_step;
pub mod integrator;
pub mod interp;
pub mod lifecycle;
pub mod matrix;
pub mod nonlinear;
pub mod relax;
pub mod roots;
pub mod stepper;
pub mod tolerance;
pub mod traits;
pub mod vector;

pub use error::{Error, Status};
pub use integrator::Integrator;
pub use stepper::Stepper;
pub use vector::VectorOps;
