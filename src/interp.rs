//! C6 — Dense-output interpolation (§4.10): reconstructs `y(t)` (and its
//! derivatives, up to the order the scheme supports) at any `t` inside the
//! last completed step, without retaking it. Two schemes are offered, the
//! way the historical BDF/Adams interpolant and a lower-order fallback
//! coexist: a Hermite interpolant built from `y`/`y'` at both step
//! endpoints (needs `full_rhs`), and a Lagrange interpolant built purely
//! from a history of `y` samples (works for any stepper, at lower order).

use crate::vector::VectorOps;
use num_traits::Float;

/// §4.10: which interpolation scheme an `Interpolant` provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpKind {
    Hermite,
    Lagrange,
}

/// A dense-output model over the interval `[t_old, t_cur]` (or a short
/// history window, for `Lagrange`).
pub trait Interpolant<T: Float, V: VectorOps<T>> {
    fn kind(&self) -> InterpKind;

    /// Reset the interpolant's history; called on every successful step
    /// commit before the new sample is pushed.
    fn update(&mut self, t: T, y: &V, ydot: Option<&V>);

    /// Evaluate the `k`-th derivative of `y` at `t`, `0 <= k <= 3`. `deg`
    /// caps the polynomial degree/sample count the fit uses — meaningful
    /// for `LagrangeInterp`'s variable-length history; for `HermiteInterp`
    /// it's mostly a validity bound, since the stored cubic is fixed.
    /// Returns `None` (mapped by the caller to `Error::BadK`/`Error::BadDky`)
    /// if `k` exceeds what the scheme can provide or `t` falls outside the
    /// window the interpolant retains.
    fn evaluate(&self, t: T, k: usize, deg: usize) -> Option<V>;

    /// Highest derivative order this interpolant can produce right now
    /// (depends on how much history it has accumulated).
    fn max_order(&self) -> usize;
}

/// Cubic Hermite interpolant from `(t0, y0, y0')` and `(t1, y1, y1')`,
/// available whenever the stepper implements `full_rhs` (§6.2, §4.10).
pub struct HermiteInterp<T, V> {
    t0: T,
    y0: V,
    yd0: V,
    t1: T,
    y1: V,
    yd1: V,
    ready: bool,
}

impl<T: Float, V: VectorOps<T>> HermiteInterp<T, V> {
    pub fn new(t0: T, y0: V, yd0: V) -> Self {
        HermiteInterp {
            t1: t0,
            y1: y0.clone(),
            yd1: yd0.clone(),
            t0,
            y0,
            yd0,
            ready: false,
        }
    }
}

impl<T: Float, V: VectorOps<T>> Interpolant<T, V> for HermiteInterp<T, V> {
    fn kind(&self) -> InterpKind {
        InterpKind::Hermite
    }

    fn update(&mut self, t: T, y: &V, ydot: Option<&V>) {
        let yd = ydot.cloned().unwrap_or_else(|| self.yd1.clone());
        self.t0 = self.t1;
        self.y0 = self.y1.clone();
        self.yd0 = self.yd1.clone();
        self.t1 = t;
        self.y1 = y.clone();
        self.yd1 = yd;
        self.ready = true;
    }

    fn evaluate(&self, t: T, k: usize, _deg: usize) -> Option<V> {
        if !self.ready || k > 3 {
            return None;
        }
        let h = self.t1 - self.t0;
        if h == T::zero() {
            return None;
        }
        // Normalized local coordinate s in [0,1].
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let two = T::from(2.0).unwrap();
        let three = T::from(3.0).unwrap();
        let four = T::from(4.0).unwrap();
        let six = T::from(6.0).unwrap();
        let twelve = T::from(12.0).unwrap();

        match k {
            0 => {
                // Standard cubic Hermite basis.
                let h00 = two * s3 - three * s2 + T::one();
                let h10 = s3 - two * s2 + s;
                let h01 = -two * s3 + three * s2;
                let h11 = s3 - s2;

                let term1 = VectorOps::linear_sum(h00, &self.y0, h * h10, &self.yd0);
                let term2 = VectorOps::linear_sum(h01, &self.y1, h * h11, &self.yd1);
                Some(VectorOps::linear_sum(T::one(), &term1, T::one(), &term2))
            }
            1 => {
                // First derivative of the basis w.r.t. t.
                let dh00 = (six * s2 - six * s) / h;
                let dh10 = three * s2 - four * s + T::one();
                let dh01 = (-six * s2 + six * s) / h;
                let dh11 = three * s2 - two * s;

                let term1 = VectorOps::linear_sum(dh00, &self.y0, dh10, &self.yd0);
                let term2 = VectorOps::linear_sum(dh01, &self.y1, dh11, &self.yd1);
                Some(VectorOps::linear_sum(T::one(), &term1, T::one(), &term2))
            }
            2 => {
                // Second derivative: two more factors of ds/dt = 1/h apply
                // to the y0/y1 terms (whose basis already carried no h), and
                // one more to the yd0/yd1 terms (whose basis carried one h).
                let ddh00 = (twelve * s - six) / (h * h);
                let ddh10 = (six * s - four) / h;
                let ddh01 = (-twelve * s + six) / (h * h);
                let ddh11 = (six * s - two) / h;

                let term1 = VectorOps::linear_sum(ddh00, &self.y0, ddh10, &self.yd0);
                let term2 = VectorOps::linear_sum(ddh01, &self.y1, ddh11, &self.yd1);
                Some(VectorOps::linear_sum(T::one(), &term1, T::one(), &term2))
            }
            _ => {
                // k == 3: the cubic's third derivative is constant in s.
                let dddh00 = twelve / (h * h * h);
                let dddh10 = six / (h * h);
                let dddh01 = -twelve / (h * h * h);
                let dddh11 = six / (h * h);

                let term1 = VectorOps::linear_sum(dddh00, &self.y0, dddh10, &self.yd0);
                let term2 = VectorOps::linear_sum(dddh01, &self.y1, dddh11, &self.yd1);
                Some(VectorOps::linear_sum(T::one(), &term1, T::one(), &term2))
            }
        }
    }

    fn max_order(&self) -> usize {
        if self.ready {
            3
        } else {
            0
        }
    }
}

/// Fixed-size ring of `(t, y)` samples, fitted with a Lagrange polynomial
/// for dense output when the stepper has no `full_rhs` (§4.10: "a lower-
/// order fallback which needs only a history of y samples").
pub struct LagrangeInterp<T, V> {
    capacity: usize,
    history: Vec<(T, V)>,
}

impl<T: Float, V: VectorOps<T>> LagrangeInterp<T, V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "need at least 2 points to interpolate");
        LagrangeInterp {
            capacity,
            history: Vec::with_capacity(capacity),
        }
    }
}

impl<T: Float, V: VectorOps<T>> Interpolant<T, V> for LagrangeInterp<T, V> {
    fn kind(&self) -> InterpKind {
        InterpKind::Lagrange
    }

    fn update(&mut self, t: T, y: &V, _ydot: Option<&V>) {
        if self.history.len() == self.capacity {
            self.history.remove(0);
        }
        self.history.push((t, y.clone()));
    }

    fn evaluate(&self, t: T, k: usize, deg: usize) -> Option<V> {
        if k != 0 || self.history.len() < 2 {
            return None;
        }
        // Fit only the most recent `deg + 1` samples (capped by what's
        // available), so a caller asking for a lower-order fit isn't handed
        // the full history's polynomial degree.
        let npts = deg.saturating_add(1).clamp(2, self.history.len());
        let window = &self.history[self.history.len() - npts..];

        let mut coeffs = vec![T::zero(); npts];
        for i in 0..npts {
            let mut li = T::one();
            let ti = window[i].0;
            for j in 0..npts {
                if i == j {
                    continue;
                }
                let tj = window[j].0;
                let denom = ti - tj;
                if denom == T::zero() {
                    return None;
                }
                li = li * (t - tj) / denom;
            }
            coeffs[i] = li;
        }
        let terms: Vec<&V> = window.iter().map(|(_, y)| y).collect();
        Some(V::linear_combination(&coeffs, &terms))
    }

    fn max_order(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn hermite_reproduces_endpoints() {
        let mut h: HermiteInterp<f64, ndarray::Array1<f64>> =
            HermiteInterp::new(0.0, array![1.0], array![-1.0]);
        h.update(1.0, &array![0.3678794], Some(&array![-0.3678794]));

        let y0 = h.evaluate(0.0, 0, 3).unwrap();
        let y1 = h.evaluate(1.0, 0, 3).unwrap();
        assert!((y0[0] - 1.0).abs() < 1e-9);
        assert!((y1[0] - 0.3678794).abs() < 1e-6);
    }

    #[test]
    fn hermite_mid_point_is_between_endpoints() {
        let mut h: HermiteInterp<f64, ndarray::Array1<f64>> =
            HermiteInterp::new(0.0, array![1.0], array![-1.0]);
        h.update(1.0, &array![0.3678794], Some(&array![-0.3678794]));
        let mid = h.evaluate(0.5, 0, 3).unwrap();
        assert!(mid[0] < 1.0 && mid[0] > 0.3678794);
    }

    #[test]
    fn hermite_second_and_third_derivatives_are_available() {
        let mut h: HermiteInterp<f64, ndarray::Array1<f64>> =
            HermiteInterp::new(0.0, array![1.0], array![-1.0]);
        h.update(1.0, &array![0.3678794], Some(&array![-0.3678794]));
        assert!(h.evaluate(0.5, 2, 3).is_some());
        assert!(h.evaluate(0.5, 3, 3).is_some());
        assert!(h.evaluate(0.5, 4, 3).is_none());
    }

    #[test]
    fn lagrange_interpolates_quadratic_exactly() {
        // y = t^2 sampled at three points; quadratic Lagrange is exact.
        let mut l: LagrangeInterp<f64, ndarray::Array1<f64>> = LagrangeInterp::new(3);
        l.update(0.0, &array![0.0], None);
        l.update(1.0, &array![1.0], None);
        l.update(2.0, &array![4.0], None);
        let y = l.evaluate(1.5, 0, 2).unwrap();
        assert!((y[0] - 2.25).abs() < 1e-9);
    }

    #[test]
    fn lagrange_evicts_oldest_sample_past_capacity() {
        let mut l: LagrangeInterp<f64, ndarray::Array1<f64>> = LagrangeInterp::new(2);
        l.update(0.0, &array![0.0], None);
        l.update(1.0, &array![1.0], None);
        l.update(2.0, &array![2.0], None);
        assert_eq!(l.history.len(), 2);
        assert_eq!(l.history[0].0, 1.0);
    }
}
