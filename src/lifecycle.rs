//! C8 — Engine lifecycle (§4.12): the states an `Integrator` passes through
//! outside of ordinary stepping — initial construction, the first problem
//! initialization, a mid-run reset to a new `(t, y)` without discarding
//! attached capabilities, a resize to a different state-vector length, and
//! teardown. Modeled as an explicit enum rather than a collection of
//! boolean flags, per the same "states over flags" approach `evolve`'s
//! `RunState` takes.

/// Lifecycle phase of an `Integrator`. Most operations are only legal in a
/// subset of these phases; §4.12's illegal-call matrix is enforced by the
/// `Integrator` methods checking this before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, no stepper/solvers attached yet.
    Created,
    /// Capabilities attached, but `Init` hasn't run: no valid `(t, y)`.
    Attached,
    /// `Init` has run at least once; `Evolve` is legal.
    Ready,
    /// Irrecoverably failed; only `Reset` or `Teardown` are legal.
    Failed,
    /// Torn down; no further calls are legal.
    Done,
}

impl Phase {
    pub fn can_evolve(self) -> bool {
        matches!(self, Phase::Ready)
    }

    pub fn can_init(self) -> bool {
        matches!(self, Phase::Attached | Phase::Ready | Phase::Failed)
    }

    pub fn can_attach(self) -> bool {
        matches!(self, Phase::Created | Phase::Attached)
    }

    pub fn can_resize(self) -> bool {
        matches!(self, Phase::Ready)
    }
}

/// §4.12: what a `Reset`/`FirstInit`/`Resize` call is allowed to carry
/// over from the previous problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitKind {
    /// First-ever `Init` on this engine: everything starts from scratch.
    First,
    /// Re-initialize at a new `(t, y)` with the same state-vector length;
    /// step-history interpolants and counters reset, attached capabilities
    /// (stepper, solvers) are kept.
    Reset,
    /// Re-initialize with a state vector of different length; everything
    /// `Reset` does, plus any length-dependent scratch storage the
    /// capabilities hold is invalidated and must be rebuilt on first use.
    Resize { old_len: usize, new_len: usize },
}

/// Lifecycle transition table, owned by the `Integrator` alongside its
/// `Phase`. Kept separate from `Phase` itself so the counters it resets are
/// easy to audit independently of the state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleCounters {
    pub ninits: usize,
    pub nresets: usize,
    pub nresizes: usize,
}

impl LifecycleCounters {
    pub fn record(&mut self, kind: InitKind) {
        match kind {
            InitKind::First => self.ninits += 1,
            InitKind::Reset => self.nresets += 1,
            InitKind::Resize { .. } => self.nresizes += 1,
        }
    }
}
