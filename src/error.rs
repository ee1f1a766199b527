//! Error and status taxonomy (§6.3). A single `Result<Status, Error>`
//! replaces the historical mixture of integer return codes and out-of-band
//! flags: `Status` enumerates the positive outcomes an `Evolve` call can
//! report, `Error` enumerates everything that went wrong, tagged
//! recoverable/unrecoverable where §6.3 distinguishes them.

use failure::Fail;

/// Positive outcomes of a call into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Reached or passed `tout` normally (or completed one step in `OneStep` mode).
    Success,
    /// Returned because `tstop` was reached.
    TstopReturn,
    /// Returned because a root was found.
    RootReturn,
    /// A non-fatal warning was issued (e.g. step size below roundoff); the
    /// call still produced a usable result.
    Warning,
}

/// Everything that can keep an `Evolve` (or setup) call from succeeding.
///
/// Variants are grouped by the §7 classification:
/// - invariant violations (programming errors): `IllegalInput`, `BadT`,
///   `BadK`, `BadDky`, `NoMemory`, `NoMalloc`.
/// - recoverable numerical failures that exhausted their retry budget:
///   `ErrFailure`, `ConvFailure`, `ConstraintFail`, `TooClose`.
/// - unrecoverable numerical failures surfaced directly from a callback or
///   capability: `RhsFuncFail` family, `LinsetupFail`, `LinsolveFail`,
///   `MassFuncFail`, `MassSetupFail`, `MassSolveFail`, `VectorOpErr`,
///   `BadRootFunction`.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "too much work done in one internal step (mxstep exceeded)")]
    TooMuchWork,

    #[fail(
        display = "the requested tolerances are too small relative to achievable accuracy (tolsf = {})",
        tolsf
    )]
    TooMuchAccuracy { tolsf: f64 },

    #[fail(display = "too many local error test failures on one step, or |h| = hmin")]
    ErrFailure,

    #[fail(display = "too many nonlinear solver convergence failures on one step, or |h| = hmin")]
    ConvFailure,

    #[fail(display = "the linear solver's setup routine failed unrecoverably")]
    LinsetupFail,

    #[fail(display = "the linear solver's solve routine failed unrecoverably")]
    LinsolveFail,

    #[fail(display = "the right-hand-side function failed unrecoverably")]
    RhsFuncFail,

    #[fail(display = "the right-hand-side function failed recoverably on the very first call")]
    FirstRhsFuncFail,

    #[fail(
        display = "the right-hand-side function had repeated recoverable failures; no further progress"
    )]
    RepeatedRhsFuncFail,

    #[fail(display = "the right-hand-side function returned an unrecoverable error flag")]
    UnrecoverableRhsFuncFail,

    #[fail(display = "the mass-matrix-times-vector routine failed unrecoverably")]
    MassFuncFail,

    #[fail(display = "the mass-solver's solve routine failed unrecoverably")]
    MassSolveFail,

    #[fail(display = "the mass-solver's setup routine failed unrecoverably")]
    MassSetupFail,

    #[fail(display = "inequality constraints could not be satisfied after maxconstrfails retries")]
    ConstraintFail,

    #[fail(display = "a capability failed to allocate required storage")]
    NoMemory,

    #[fail(display = "a capability-level allocation failed")]
    NoMalloc,

    #[fail(display = "an input argument was illegal: {}", detail)]
    IllegalInput { detail: &'static str },

    #[fail(
        display = "t = {} is not between tcur - hused = {} and tcur = {}",
        t, t_lower, t_upper
    )]
    BadT { t: f64, t_lower: f64, t_upper: f64 },

    #[fail(display = "illegal value for derivative order k = {}", k)]
    BadK { k: usize },

    #[fail(display = "GetDky was called on an integrator with no completed step")]
    BadDky,

    #[fail(display = "|tout - t0| is too close to the roundoff floor to integrate")]
    TooClose,

    #[fail(display = "a vector operation reported failure")]
    VectorOpErr,

    #[fail(display = "a root function component stayed at zero across RootInit with no activity")]
    BadRootFunction,

    #[fail(display = "a previously reported root recurred within the root tolerance")]
    CloseRoot,

    #[fail(display = "{}", detail)]
    Other { detail: String },
}

impl Error {
    /// §7(b): recoverable numerical failures are retried up to a
    /// component-specific bound before becoming fatal; this marks which
    /// taxonomy entries are reachable only after that bound is exhausted
    /// (and are therefore reported, not retried again, by the caller).
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            Error::ErrFailure | Error::ConvFailure | Error::ConstraintFail
        )
    }
}
