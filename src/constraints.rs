//! Inequality-constraint enforcement (§6.4): after a candidate step passes
//! the nonlinear solve and error test, check the constraint mask and, on a
//! violation, shrink `h` rather than fail the step outright — mirroring the
//! historical `IDATestError`/constraint-check order (check constraints only
//! after the candidate has otherwise been accepted).

use crate::traits::Constants;
use crate::vector::VectorOps;
use num_traits::Float;

/// §6.4: shrink factor floor — even a badly-violated constraint never
/// shrinks `h` by more than a factor of 10 in one attempt.
const MIN_SHRINK: f64 = 0.1;
/// Factor applied to the tightest per-component bound found.
const SAFETY: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct ConstraintConfig {
    pub codes: &'static [i8],
    pub max_fails: usize,
}

/// Outcome of one constraint check against a candidate `ycur`.
pub enum ConstraintOutcome<T> {
    /// No violation; proceed to commit the step.
    Satisfied,
    /// At least one component violated its constraint; shrink `h` by
    /// `eta` and retry the same step (§6.4: `eta := 0.9 *
    /// min_i(yn_i / (yn_i - ycur_i))`, clamped from below by 0.1).
    Violated { eta: T, offenders: Vec<usize> },
    /// `max_fails` consecutive violations on this step: unrecoverable.
    Exhausted,
}

/// Check `ycur` against `codes` (the per-component `{-2,-1,0,1,2}` encoding
/// from `VectorOps::constraint_violations`), given the previously accepted
/// `yn`. `fails_so_far` is the caller's running count for the current step
/// attempt, incremented by the caller on `Violated`.
pub fn check_constraints<T, V>(
    yn: &V,
    ycur: &V,
    cfg: &ConstraintConfig,
    fails_so_far: usize,
) -> ConstraintOutcome<T>
where
    T: Float + Constants,
    V: VectorOps<T>,
{
    let offenders = ycur.constraint_violations(cfg.codes);
    if offenders.is_empty() {
        return ConstraintOutcome::Satisfied;
    }
    if fails_so_far >= cfg.max_fails {
        return ConstraintOutcome::Exhausted;
    }

    let mut eta = T::one();
    for &i in &offenders {
        let yn_i = yn.get(i);
        let ycur_i = ycur.get(i);
        let denom = yn_i - ycur_i;
        if denom != T::zero() {
            let candidate = (yn_i / denom).abs();
            if candidate < eta {
                eta = candidate;
            }
        }
    }
    eta = eta * T::from(SAFETY).unwrap();
    let floor = T::from(MIN_SHRINK).unwrap();
    if eta < floor {
        eta = floor;
    }

    ConstraintOutcome::Violated { eta, offenders }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn no_violation_reports_satisfied() {
        let yn = array![1.0, 1.0];
        let ycur = array![0.5, 0.5];
        let cfg = ConstraintConfig {
            codes: &[2, 2],
            max_fails: 10,
        };
        let outcome: ConstraintOutcome<f64> = check_constraints(&yn, &ycur, &cfg, 0);
        assert!(matches!(outcome, ConstraintOutcome::Satisfied));
    }

    #[test]
    fn violation_shrinks_h_and_reports_offenders() {
        let yn = array![1.0];
        let ycur = array![-0.2];
        let cfg = ConstraintConfig {
            codes: &[2],
            max_fails: 10,
        };
        let outcome: ConstraintOutcome<f64> = check_constraints(&yn, &ycur, &cfg, 0);
        match outcome {
            ConstraintOutcome::Violated { eta, offenders } => {
                assert_eq!(offenders, vec![0]);
                assert!(eta > 0.0 && eta <= 1.0);
            }
            _ => panic!("expected a violation"),
        }
    }

    #[test]
    fn exhausted_after_max_fails() {
        let yn = array![1.0];
        let ycur = array![-0.2];
        let cfg = ConstraintConfig {
            codes: &[2],
            max_fails: 3,
        };
        let outcome: ConstraintOutcome<f64> = check_constraints(&yn, &ycur, &cfg, 3);
        assert!(matches!(outcome, ConstraintOutcome::Exhausted));
    }

    #[test]
    fn shrink_never_drops_below_floor() {
        let yn = array![1.0];
        let ycur = array![-1000.0];
        let cfg = ConstraintConfig {
            codes: &[2],
            max_fails: 10,
        };
        let outcome: ConstraintOutcome<f64> = check_constraints(&yn, &ycur, &cfg, 0);
        match outcome {
            ConstraintOutcome::Violated { eta, .. } => assert!(eta >= 0.1),
            _ => panic!("expected a violation"),
        }
    }
}
