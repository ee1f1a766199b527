//! C1 — Tolerance/weight engine (§4.5). Turns a `TolerancePolicy` plus the
//! current state into an error-weight vector `ewt` (and, when a mass
//! matrix is present, a separate residual weight `rwt`), with the
//! `ewt_i = 1 / (rtol*|y_i| + atol_i)` invariant and the "non-positive
//! atol is an input error, never a crash" rule.

use crate::vector::VectorOps;
use num_traits::Float;

/// §3 `TolerancePolicy`: tagged variant over scalar/vector/user-function
/// tolerances.
pub enum TolerancePolicy<T, V> {
    Scalar { rtol: T, atol: T },
    Vector { rtol: T, atol: V },
    /// User-supplied weight function; receives `y` and writes `ewt`
    /// directly. `None` return means a recoverable failure to build
    /// weights (propagates as `Error::IllegalInput`).
    UserFn(Box<dyn FnMut(&V) -> Option<V>>),
}

impl<T, V> TolerancePolicy<T, V>
where
    T: Float,
    V: VectorOps<T>,
{
    /// Whether `min(atol)` is zero, which per §4.5 changes the safety
    /// checks the weight build performs (non-positive `y_i` becomes fatal
    /// to the weight rather than merely producing a huge weight).
    pub fn min_atol_is_zero(&self) -> bool {
        match self {
            TolerancePolicy::Scalar { atol, .. } => *atol == T::zero(),
            TolerancePolicy::Vector { atol, .. } => atol.min() == T::zero(),
            TolerancePolicy::UserFn(_) => false,
        }
    }

    /// Build `ewt` such that `ewt_i = 1 / (rtol*|y_i| + atol_i)`. Returns
    /// `None` (signal, never panic) when a component's tolerance would be
    /// non-positive.
    pub fn build_weights(&mut self, y: &V) -> Option<V> {
        match self {
            TolerancePolicy::Scalar { rtol, atol } => {
                let rtol = *rtol;
                let atol = *atol;
                build_scalar_weights(y, rtol, atol)
            }
            TolerancePolicy::Vector { rtol, atol } => build_vector_weights(y, *rtol, atol),
            TolerancePolicy::UserFn(f) => f(y),
        }
    }
}

fn build_scalar_weights<T: Float, V: VectorOps<T>>(y: &V, rtol: T, atol: T) -> Option<V> {
    if atol < T::zero() || rtol < T::zero() {
        return None;
    }
    let tol = y.abs().scale(rtol).add_constant(atol);
    if tol.min() <= T::zero() {
        return None;
    }
    Some(tol.inv())
}

fn build_vector_weights<T: Float, V: VectorOps<T>>(y: &V, rtol: T, atol: &V) -> Option<V> {
    if rtol < T::zero() || atol.min() < T::zero() {
        return None;
    }
    let tol = VectorOps::linear_sum(rtol, &y.abs(), T::one(), atol);
    if tol.min() <= T::zero() {
        return None;
    }
    Some(tol.inv())
}

/// §4.5: "A special weight mode `ewt_i := SmallReal` is used only for
/// explicit fixed-step methods to avoid spurious too-much-accuracy
/// faults." `SmallReal` is chosen well below any realistic tolerance so
/// the `tolsf` check in the evolve driver never trips for a method that
/// isn't adaptive in the first place.
pub fn fixed_step_weights<T: Float, V: VectorOps<T>>(n: usize) -> V {
    let small = T::from(1e-10).unwrap_or_else(|| T::epsilon() * T::from(1e4).unwrap());
    V::const_vector(n, T::one() / small)
}

/// The pair of weight vectors the engine carries (§3 `Weights`): `rwt`
/// aliases `ewt` unless a separate residual tolerance was set.
pub struct Weights<V> {
    pub ewt: V,
    pub rwt: V,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scalar_weights_match_formula() {
        let y = array![1.0, -2.0, 0.0];
        let mut pol: TolerancePolicy<f64, ndarray::Array1<f64>> = TolerancePolicy::Scalar {
            rtol: 1e-4,
            atol: 1e-6,
        };
        let w = pol.build_weights(&y).unwrap();
        assert!((w[0] - 1.0 / (1e-4 * 1.0 + 1e-6)).abs() < 1e-12);
        assert!((w[2] - 1.0 / 1e-6).abs() < 1e-12);
    }

    #[test]
    fn zero_atol_with_zero_component_is_signalled() {
        let y = array![0.0];
        let mut pol: TolerancePolicy<f64, ndarray::Array1<f64>> = TolerancePolicy::Scalar {
            rtol: 1e-4,
            atol: 0.0,
        };
        assert!(pol.build_weights(&y).is_none());
    }

    #[test]
    fn negative_atol_is_illegal() {
        let y = array![1.0];
        let mut pol: TolerancePolicy<f64, ndarray::Array1<f64>> = TolerancePolicy::Scalar {
            rtol: 1e-4,
            atol: -1.0,
        };
        assert!(pol.build_weights(&y).is_none());
    }
}
