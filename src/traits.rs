//! Small numeric building blocks shared across every component: named float
//! constants (so the engine never sprinkles `T::from(0.9).unwrap()`
//! everywhere) and the weighted root-mean-square norm that underlies every
//! tolerance/error check in the engine.

use ndarray::*;

/// Named constants used throughout the engine's numerics. Implemented for
/// `f64` and `f32` so the whole crate stays generic over the caller's
/// floating point type, the way the rest of the engine is generic over
/// `T: num_traits::Float`.
pub trait Constants {
    fn half() -> Self;
    fn quarter() -> Self;
    fn pt1() -> Self;
    fn pt01() -> Self;
    fn pt001() -> Self;
    fn pt0001() -> Self;
    fn pt2() -> Self;
    fn pt25() -> Self;
    fn pt5() -> Self;
    fn pt9() -> Self;
    fn pt99() -> Self;
    fn two() -> Self;
    fn four() -> Self;
    fn five() -> Self;
    fn ten() -> Self;
    fn twelve() -> Self;
    fn twenty() -> Self;
    fn hundred() -> Self;
}

macro_rules! impl_constants {
    ($t:ty) => {
        impl Constants for $t {
            fn half() -> Self {
                0.5
            }
            fn quarter() -> Self {
                0.25
            }
            fn pt1() -> Self {
                0.1
            }
            fn pt01() -> Self {
                0.01
            }
            fn pt001() -> Self {
                0.001
            }
            fn pt0001() -> Self {
                0.0001
            }
            fn pt2() -> Self {
                0.2
            }
            fn pt25() -> Self {
                0.25
            }
            fn pt5() -> Self {
                0.5
            }
            fn pt9() -> Self {
                0.9
            }
            fn pt99() -> Self {
                0.99
            }
            fn two() -> Self {
                2.0
            }
            fn four() -> Self {
                4.0
            }
            fn five() -> Self {
                5.0
            }
            fn ten() -> Self {
                10.0
            }
            fn twelve() -> Self {
                12.0
            }
            fn twenty() -> Self {
                20.0
            }
            fn hundred() -> Self {
                100.0
            }
        }
    };
}

impl_constants!(f64);
impl_constants!(f32);

/// Weighted root-mean-square norm: `sqrt((1/N) * sum((w_i * v_i)^2))`.
pub trait NormRms<A, S, D>
where
    A: num_traits::float::Float,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn norm_wrms(&self, w: &ArrayBase<S, D>) -> A;
}

/// Weighted, masked root-mean-square norm, used to suppress algebraic
/// components from a local error test (`suppressalg` in the teacher, the
/// `id` differential/algebraic mask in the DAE literature).
pub trait NormRmsMasked<A, S, D, B>
where
    A: num_traits::float::Float,
    S: Data<Elem = A>,
    D: Dimension,
    B: Data<Elem = bool>,
{
    fn norm_wrms_masked(&self, w: &ArrayBase<S, D>, id: &ArrayBase<B, D>) -> A;
}

impl<A, S, D> NormRms<A, S, D> for ArrayBase<S, D>
where
    A: num_traits::float::Float,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn norm_wrms(&self, w: &ArrayBase<S, D>) -> A {
        ((self * w)
            .iter()
            .map(|x| x.powi(2))
            .fold(A::zero(), |acc, x| acc + x)
            / A::from(self.len()).unwrap())
        .sqrt()
    }
}

impl<A, S, D, B> NormRmsMasked<A, S, D, B> for ArrayBase<S, D>
where
    A: num_traits::float::Float,
    S: Data<Elem = A>,
    D: Dimension,
    B: Data<Elem = bool>,
{
    fn norm_wrms_masked(&self, w: &ArrayBase<S, D>, id: &ArrayBase<B, D>) -> A {
        let mask = id.map(|x| if *x { A::one() } else { A::zero() });
        ((self * w * mask)
            .iter()
            .map(|x| x.powi(2))
            .fold(A::zero(), |acc, x| acc + x)
            / A::from(self.len()).unwrap())
        .sqrt()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_norm_wrms() {
        const LENGTH: usize = 32;
        let x = Array::from_elem(LENGTH, -0.5);
        let w = Array::from_elem(LENGTH, 0.5);
        assert_eq!(x.norm_wrms(&w), 0.25);
    }

    #[test]
    fn test_norm_wrms_masked() {
        const LENGTH: usize = 32;
        let fac = (((LENGTH - 1) as f64) / (LENGTH as f64)).sqrt();

        let x = Array::from_elem(LENGTH, -0.5);
        let w = Array::from_elem(LENGTH, 0.5);
        let mut id = Array::from_elem(LENGTH, true);
        id[LENGTH - 1] = false;

        assert_eq!(x.norm_wrms_masked(&w, &id), fac * 0.5 * 0.5);
    }
}
