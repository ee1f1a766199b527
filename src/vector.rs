//! L1 — `VectorOps`: the algebraic primitives the engine needs over an
//! abstract state vector (§4.1). The trait exposes the atomic operations a
//! caller's vector type must support, plus default (fused) implementations
//! built from those atomics — so a minimal implementation "just works" and
//! a vector type that can do better (e.g. a single BLAS `axpy` instead of a
//! scale-then-add) only needs to override the fused methods it wants to
//! accelerate. There's no runtime capability probe: the type system is the
//! probe, and the default method bodies are the "fallback to atomics" path
//! called out in §4.1 and §9.

use num_traits::Float;

/// Capability contract for the engine's state vector. The engine never
/// looks inside `Self`; it only ever calls these operations.
pub trait VectorOps<T: Float>: Clone {
    /// A vector of length `n` with every component set to `c`.
    fn const_vector(n: usize, c: T) -> Self;

    /// Number of components.
    fn len(&self) -> usize;

    /// Read component `i`. The one indexing primitive the engine needs,
    /// used by column-wise matrix assembly (§4.8's finite-difference
    /// Jacobian) where the vector is otherwise treated opaquely.
    fn get(&self, i: usize) -> T;

    /// Write component `i`. Paired with `get` to perturb a single
    /// direction when probing a finite-difference Jacobian column.
    fn set(&mut self, i: usize, v: T);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `self := a*x + b*y` computed elementwise, returned as a new vector.
    fn linear_sum(a: T, x: &Self, b: T, y: &Self) -> Self;

    /// `self *= c`.
    fn scale(&self, c: T) -> Self;

    /// Elementwise absolute value.
    fn abs(&self) -> Self;

    /// Elementwise reciprocal.
    fn inv(&self) -> Self;

    /// Elementwise division, `self_i / other_i`.
    fn div(&self, other: &Self) -> Self;

    /// Elementwise product, `self_i * other_i`.
    fn product(&self, other: &Self) -> Self;

    /// `self_i + b` for every component.
    fn add_constant(&self, b: T) -> Self;

    /// Weighted root-mean-square norm: `sqrt((1/N) sum (w_i v_i)^2)`.
    fn wrms_norm(&self, w: &Self) -> T;

    /// Weighted, masked root-mean-square norm: components where `mask_i`
    /// is `false` are excluded, as in §4.5's `suppressalg` local-error
    /// test.
    fn wrms_norm_masked(&self, w: &Self, mask: &[bool]) -> T;

    /// Smallest component.
    fn min(&self) -> T;

    /// Largest-magnitude component.
    fn maxnorm(&self) -> T;

    /// Dot product.
    fn dot(&self, other: &Self) -> T;

    /// §6.4 constraint mask: `codes[i]` encodes `{-2,-1,0,1,2}` for
    /// `{<=0, <0, free, >0, >=0}`. Returns the indices of components that
    /// violate their constraint; `Vec::new()` means every constraint holds.
    fn constraint_violations(&self, codes: &[i8]) -> Vec<usize>;

    /// Linear combination `sum_i c[i] * x[i]`, used by dense output (§4.1,
    /// §4.10) and by the BDF-style history update. The default walks the
    /// atomic `linear_sum` pairwise; implementations backed by a true fused
    /// BLAS-3-style kernel can override this for speed.
    fn linear_combination(c: &[T], x: &[&Self]) -> Self {
        assert_eq!(c.len(), x.len(), "linear_combination: length mismatch");
        assert!(!x.is_empty(), "linear_combination: need at least one term");
        let mut acc = x[0].scale(c[0]);
        for i in 1..x.len() {
            acc = Self::linear_sum(T::one(), &acc, c[i], x[i]);
        }
        acc
    }
}

impl<T> VectorOps<T> for ndarray::Array1<T>
where
    T: Float + num_traits::NumAssignRef + std::fmt::Debug,
{
    fn const_vector(n: usize, c: T) -> Self {
        ndarray::Array1::from_elem(n, c)
    }

    fn len(&self) -> usize {
        ndarray::Array1::len(self)
    }

    fn get(&self, i: usize) -> T {
        self[i]
    }

    fn set(&mut self, i: usize, v: T) {
        self[i] = v;
    }

    fn linear_sum(a: T, x: &Self, b: T, y: &Self) -> Self {
        x * a + y * b
    }

    fn scale(&self, c: T) -> Self {
        self * c
    }

    fn abs(&self) -> Self {
        self.mapv(|v| v.abs())
    }

    fn inv(&self) -> Self {
        self.mapv(|v| T::one() / v)
    }

    fn div(&self, other: &Self) -> Self {
        self / other
    }

    fn product(&self, other: &Self) -> Self {
        self * other
    }

    fn add_constant(&self, b: T) -> Self {
        self.mapv(|v| v + b)
    }

    fn wrms_norm(&self, w: &Self) -> T {
        use crate::traits::NormRms;
        ndarray::ArrayBase::norm_wrms(self, w)
    }

    fn wrms_norm_masked(&self, w: &Self, mask: &[bool]) -> T {
        let id = ndarray::Array1::from(mask.to_vec());
        use crate::traits::NormRmsMasked;
        ndarray::ArrayBase::norm_wrms_masked(self, w, &id)
    }

    fn min(&self) -> T {
        self.iter().cloned().fold(T::infinity(), |a, b| a.min(b))
    }

    fn maxnorm(&self) -> T {
        self.iter()
            .map(|v| v.abs())
            .fold(T::zero(), |a, b| a.max(b))
    }

    fn dot(&self, other: &Self) -> T {
        ndarray::Array1::dot(self, other)
    }

    fn constraint_violations(&self, codes: &[i8]) -> Vec<usize> {
        self.iter()
            .zip(codes.iter())
            .enumerate()
            .filter_map(|(i, (&v, &code))| {
                let ok = match code {
                    -2 => v <= T::zero(),
                    -1 => v < T::zero(),
                    0 => true,
                    1 => v > T::zero(),
                    2 => v >= T::zero(),
                    _ => true,
                };
                if ok {
                    None
                } else {
                    Some(i)
                }
            })
            .collect()
    }
}
