//! L2 — `MatrixOps` and `LinearSolver`: matrix storage/algebra and the
//! linear-system solve that backs every implicit stepper (§4.2). Concrete
//! matrix/solver backends (dense LU, sparse, iterative/Krylov) are outside
//! the core's scope; the core only ever calls through these two traits.

use crate::vector::VectorOps;
use num_traits::Float;

/// A square matrix capability. `setup`/`matvec` are optional: a solver that
/// embeds its matrix (matrix-free, Newton-Krylov-style) reports `None` from
/// `as_matrix` on the coupling side and never calls these.
pub trait MatrixOps<T: Float>: Clone {
    fn zeros(n: usize) -> Self;

    /// `self := alpha * self + other`.
    fn scaled_add(&mut self, alpha: T, other: &Self);

    /// `self := alpha * self + I`.
    fn scaled_add_identity(&mut self, alpha: T);

    fn copy_from(&mut self, other: &Self);

    /// Write `col` into column `j`. Used by the finite-difference Jacobian
    /// builder (§4.8), one perturbation direction at a time.
    fn set_column<V: VectorOps<T>>(&mut self, j: usize, col: &V);

    /// Optional dense matvec; `None` means the capability doesn't support
    /// it (e.g. it's a matrix-free placeholder and the real action lives
    /// behind an `ATimes` functional, see `alg_solver::ATimes`).
    fn matvec<V: VectorOps<T>>(&self, _x: &V) -> Option<V> {
        None
    }
}

/// How a `LinearSolver` is implemented, used by the coupling layer (§4.2) to
/// decide whether the `2/(1+gamrat)` solution rescale (valid only when
/// `M = I` and `A = I - gamma*J`) is safe to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverKind {
    /// Direct factorization (dense or sparse LU/QR): rescale is safe.
    Direct,
    /// Iterative/Krylov (no fixed matrix representation): rescale is
    /// unsafe in general.
    Iterative,
    /// Matrix-embedded iterative solver (preconditioned Krylov that still
    /// carries an explicit `A`): rescale is safe, same as `Direct`.
    MatrixIterative,
}

impl LinearSolverKind {
    /// §4.2: "solution scaling by 2/(1+gamrat) is only safe when M=I and
    /// A=I-gamma*J, so it is enabled only for direct and matrix-iterative
    /// classes."
    pub fn supports_gamma_rescale(self) -> bool {
        matches!(self, LinearSolverKind::Direct | LinearSolverKind::MatrixIterative)
    }
}

/// Capability producing a solution to `A x = b`.
pub trait LinearSolver<T: Float, M: MatrixOps<T>, V: VectorOps<T>> {
    fn kind(&self) -> LinearSolverKind;

    /// Factor (or otherwise prepare) `a` for subsequent `solve` calls.
    /// Returns `Err` only for unrecoverable setup failures
    /// (`Error::LinsetupFail`); recoverable conditions (e.g. a singular
    /// pivot the caller should retry with a fresh Jacobian) are reported
    /// by returning `Ok(false)`.
    fn setup(&mut self, a: &M) -> Result<bool, crate::error::Error>;

    /// Solve `A x = b` for `x`, to (approximately, for iterative solvers)
    /// the requested `tol` in the weighted norm implied by the caller's
    /// scaling vectors.
    fn solve(&mut self, a: &M, b: &V, tol: T) -> Result<V, crate::error::Error>;
}
