//! Distance metric implementations.
//!
//! Every metric is a pure kernel `fn(&[f32], &[T]) -> f32` comparing an f32 query
//! with a stored vector of any [`Element`] encoding. The kernel is resolved once per
//! search via [`DistanceMetric::kernel`] so the hot loop never re-dispatches.
//!
//! All kernels return finite, non-negative values. Non-finite components count as 0,
//! and inputs where a metric is undefined (a zero vector under cosine, a point outside
//! the Poincare ball) get `f32::MAX` so they sort last instead of poisoning the ranking.

use crate::error::IndexError;
use crate::space::encoding::Element;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance kernel comparing an f32 query with a stored vector.
pub type Kernel<T> = fn(&[f32], &[T]) -> f32;

/// Distance metric used for vector similarity computation.
///
/// All metrics return a distance where **lower is better** (more similar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Manhattan distance `Σ|a - b|`.
    L1,
    /// Euclidean distance `√Σ(a - b)²` (not squared).
    L2,
    /// Number of differing bits over the byte encoding.
    Hamming,
    /// Angle between vectors in radians. Range: \[0, π\].
    Angle,
    /// `1 - cosine_similarity`. Range: \[0, 2\].
    Cosine,
    /// Angle over vectors normalized at write time.
    NormalizedAngle,
    /// Cosine distance over vectors normalized at write time.
    NormalizedCosine,
    /// `1 - |a ∧ b| / |a ∨ b|` over the byte encoding.
    Jaccard,
    /// Jaccard distance over the sets of non-zero integer labels.
    SparseJaccard,
    /// Euclidean distance over vectors normalized at write time.
    NormalizedL2,
    /// Hyperbolic distance in the Poincare ball model.
    Poincare,
    /// Hyperbolic distance in the Lorentz (hyperboloid) model.
    Lorentz,
}

impl DistanceMetric {
    /// Every metric, in code order.
    pub const ALL: [DistanceMetric; 12] = [
        DistanceMetric::L1,
        DistanceMetric::L2,
        DistanceMetric::Hamming,
        DistanceMetric::Angle,
        DistanceMetric::Cosine,
        DistanceMetric::NormalizedAngle,
        DistanceMetric::NormalizedCosine,
        DistanceMetric::Jaccard,
        DistanceMetric::SparseJaccard,
        DistanceMetric::NormalizedL2,
        DistanceMetric::Poincare,
        DistanceMetric::Lorentz,
    ];

    /// Stable integer code used by bindings.
    pub fn code(self) -> i32 {
        match self {
            DistanceMetric::L1 => 0,
            DistanceMetric::L2 => 1,
            DistanceMetric::Hamming => 2,
            DistanceMetric::Angle => 3,
            DistanceMetric::Cosine => 4,
            DistanceMetric::NormalizedAngle => 5,
            DistanceMetric::NormalizedCosine => 6,
            DistanceMetric::Jaccard => 7,
            DistanceMetric::SparseJaccard => 8,
            DistanceMetric::NormalizedL2 => 9,
            DistanceMetric::Poincare => 100,
            DistanceMetric::Lorentz => 101,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DistanceMetric::L1 => "l1",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Hamming => "hamming",
            DistanceMetric::Angle => "angle",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::NormalizedAngle => "normalized_angle",
            DistanceMetric::NormalizedCosine => "normalized_cosine",
            DistanceMetric::Jaccard => "jaccard",
            DistanceMetric::SparseJaccard => "sparse_jaccard",
            DistanceMetric::NormalizedL2 => "normalized_l2",
            DistanceMetric::Poincare => "poincare",
            DistanceMetric::Lorentz => "lorentz",
        }
    }

    /// Whether vectors are scaled to unit length before storage and search.
    pub fn normalizes(self) -> bool {
        matches!(
            self,
            DistanceMetric::NormalizedAngle
                | DistanceMetric::NormalizedCosine
                | DistanceMetric::NormalizedL2
        )
    }

    /// Resolves the kernel for stored element type `T`.
    pub fn kernel<T: Element>(self) -> Kernel<T> {
        match self {
            DistanceMetric::L1 => l1::<T>,
            DistanceMetric::L2 | DistanceMetric::NormalizedL2 => l2::<T>,
            DistanceMetric::Hamming => hamming::<T>,
            DistanceMetric::Angle => angle::<T>,
            DistanceMetric::Cosine => cosine::<T>,
            DistanceMetric::NormalizedAngle => normalized_angle::<T>,
            DistanceMetric::NormalizedCosine => normalized_cosine::<T>,
            DistanceMetric::Jaccard => jaccard::<T>,
            DistanceMetric::SparseJaccard => sparse_jaccard::<T>,
            DistanceMetric::Poincare => poincare::<T>,
            DistanceMetric::Lorentz => lorentz::<T>,
        }
    }

    /// Exact f32-vs-f32 distance. Convenience for callers outside the search loop.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        self.kernel::<f32>()(a, b)
    }
}

impl TryFrom<i32> for DistanceMetric {
    type Error = IndexError;

    fn try_from(code: i32) -> Result<Self, IndexError> {
        DistanceMetric::ALL
            .into_iter()
            .find(|m| m.code() == code)
            .ok_or_else(|| IndexError::InvalidProperty(format!("unknown distance code {code}")))
    }
}

impl FromStr for DistanceMetric {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, IndexError> {
        let lowered = s.to_ascii_lowercase().replace('-', "_");
        DistanceMetric::ALL
            .into_iter()
            .find(|m| m.name() == lowered)
            .ok_or_else(|| IndexError::InvalidProperty(format!("unknown distance '{s}'")))
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-finite components are treated as 0.
#[inline(always)]
fn clean(x: f32) -> f64 {
    if x.is_finite() {
        x as f64
    } else {
        0.0
    }
}

/// Converts an f64 accumulator to the final f32 distance.
#[inline(always)]
fn finish(d: f64) -> f32 {
    let d = d as f32;
    if d.is_finite() {
        d.max(0.0)
    } else {
        f32::MAX
    }
}

#[inline(always)]
fn byte<T: Element>(x: T) -> u8 {
    let v = x.to_f32();
    if v.is_finite() {
        u8::encode(v)
    } else {
        0
    }
}

fn l1<T: Element>(a: &[f32], b: &[T]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (clean(x) - clean(y.to_f32())).abs())
        .sum();
    finish(sum)
}

fn l2<T: Element>(a: &[f32], b: &[T]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = clean(x) - clean(y.to_f32());
            d * d
        })
        .sum();
    finish(sum.sqrt())
}

/// Returns `(dot, |a|², |b|²)`.
#[inline]
fn dot_and_norms<T: Element>(a: &[f32], b: &[T]) -> (f64, f64, f64) {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let x = clean(x);
        let y = clean(y.to_f32());
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    (dot, na, nb)
}

/// Cosine similarity, or `None` when either vector is zero.
#[inline]
fn cosine_similarity<T: Element>(a: &[f32], b: &[T]) -> Option<f64> {
    let (dot, na, nb) = dot_and_norms(a, b);
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    // sqrt(na * nb) keeps identical vectors at exactly 1.0
    Some((dot / (na * nb).sqrt()).clamp(-1.0, 1.0))
}

fn cosine<T: Element>(a: &[f32], b: &[T]) -> f32 {
    match cosine_similarity(a, b) {
        Some(cos) => finish(1.0 - cos),
        None => f32::MAX,
    }
}

fn angle<T: Element>(a: &[f32], b: &[T]) -> f32 {
    match cosine_similarity(a, b) {
        Some(cos) => finish(cos.acos()),
        None => f32::MAX,
    }
}

/// Dot product of unit vectors, or `None` when either side is the zero vector.
#[inline]
fn unit_dot<T: Element>(a: &[f32], b: &[T]) -> Option<f64> {
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| clean(x) * clean(y.to_f32()))
        .sum();
    if dot == 0.0 {
        let a_zero = a.iter().all(|&x| clean(x) == 0.0);
        let b_zero = b.iter().all(|&y| clean(y.to_f32()) == 0.0);
        if a_zero || b_zero {
            return None;
        }
    }
    Some(dot.clamp(-1.0, 1.0))
}

fn normalized_cosine<T: Element>(a: &[f32], b: &[T]) -> f32 {
    match unit_dot(a, b) {
        Some(dot) => finish(1.0 - dot),
        None => f32::MAX,
    }
}

fn normalized_angle<T: Element>(a: &[f32], b: &[T]) -> f32 {
    match unit_dot(a, b) {
        Some(dot) => finish(dot.acos()),
        None => f32::MAX,
    }
}

fn hamming<T: Element>(a: &[f32], b: &[T]) -> f32 {
    let bits: u32 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (byte(x) ^ byte(y)).count_ones())
        .sum();
    bits as f32
}

fn jaccard<T: Element>(a: &[f32], b: &[T]) -> f32 {
    let mut common = 0u32;
    let mut union = 0u32;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (byte(x), byte(y));
        common += (x & y).count_ones();
        union += (x | y).count_ones();
    }
    if union == 0 {
        return 0.0;
    }
    finish(1.0 - common as f64 / union as f64)
}

/// Sorted, de-duplicated non-zero integer labels.
fn labels<T: Element>(v: &[T]) -> Vec<i64> {
    let mut out: Vec<i64> = v
        .iter()
        .map(|&x| clean(x.to_f32()).round() as i64)
        .filter(|&l| l != 0)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn sparse_jaccard<T: Element>(a: &[f32], b: &[T]) -> f32 {
    let la = labels(a);
    let lb = labels(b);
    if la.is_empty() && lb.is_empty() {
        return 0.0;
    }
    let (mut i, mut j, mut common) = (0, 0, 0usize);
    while i < la.len() && j < lb.len() {
        match la[i].cmp(&lb[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                common += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = la.len() + lb.len() - common;
    finish(1.0 - common as f64 / union as f64)
}

fn poincare<T: Element>(a: &[f32], b: &[T]) -> f32 {
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    let mut diff = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let x = clean(x);
        let y = clean(y.to_f32());
        na += x * x;
        nb += y * y;
        diff += (x - y) * (x - y);
    }
    if na >= 1.0 || nb >= 1.0 {
        return f32::MAX;
    }
    let arg = 1.0 + 2.0 * diff / ((1.0 - na) * (1.0 - nb));
    finish(arg.max(1.0).acosh())
}

fn lorentz<T: Element>(a: &[f32], b: &[T]) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    let mut s = clean(a[0]) * clean(b[0].to_f32());
    for (&x, &y) in a.iter().zip(b).skip(1) {
        s -= clean(x) * clean(y.to_f32());
    }
    finish(s.max(1.0).acosh())
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_l2_not_squared() {
        let a = [1.0, 1.0, 2.0, 1.0];
        let b = [1.0, 2.0, 1.0, 2.0];
        let d = DistanceMetric::L2.distance(&a, &b);
        assert!((d - 3.0f32.sqrt()).abs() < 1e-6, "got {d}");
        let c = [5.0, 4.0, 6.0, 5.0];
        let d = DistanceMetric::L2.distance(&a, &c);
        assert!((d - 57.0f32.sqrt()).abs() < 1e-5, "got {d}");
    }

    #[test]
    fn test_l1() {
        let d = DistanceMetric::L1.distance(&[0.0, 0.0, 0.0], &[1.0, -2.0, 3.0]);
        assert!((d - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_self_is_exactly_zero() {
        let v = [0.3, -1.7, 2.2, 9.0];
        assert_eq!(DistanceMetric::Cosine.distance(&v, &v), 0.0);
        assert_eq!(DistanceMetric::Angle.distance(&v, &v), 0.0);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((d - 1.0).abs() < 1e-6, "orthogonal cosine distance = 1.0, got {d}");
        let a = DistanceMetric::Angle.distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((a - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_max_not_nan() {
        let zero = [0.0, 0.0, 0.0, 0.0];
        let v = [1.0, 1.0, 2.0, 1.0];
        for m in [
            DistanceMetric::Cosine,
            DistanceMetric::Angle,
            DistanceMetric::NormalizedCosine,
            DistanceMetric::NormalizedAngle,
        ] {
            assert_eq!(m.distance(&v, &zero), f32::MAX, "{m}");
            assert_eq!(m.distance(&zero, &v), f32::MAX, "{m}");
        }
    }

    #[test]
    fn test_non_finite_components_are_neutral() {
        let poisoned = [f32::NAN, 1.0, f32::INFINITY];
        let clean = [0.0, 1.0, 0.0];
        for m in DistanceMetric::ALL {
            let d = m.distance(&poisoned, &clean);
            assert!(d.is_finite(), "{m} produced {d}");
            assert!(d >= 0.0, "{m} produced {d}");
        }
        assert_eq!(DistanceMetric::L2.distance(&poisoned, &clean), 0.0);
    }

    #[test]
    fn test_overflow_maps_to_max() {
        let a = [f32::MAX, f32::MAX];
        let b = [-f32::MAX, -f32::MAX];
        assert_eq!(DistanceMetric::L2.distance(&a, &b), f32::MAX);
    }

    #[test]
    fn test_hamming_and_jaccard_bits() {
        // 3 = 0b011, 5 = 0b101
        let d = DistanceMetric::Hamming.distance(&[3.0], &[5.0]);
        assert_eq!(d, 2.0);
        let j = DistanceMetric::Jaccard.distance(&[3.0], &[5.0]);
        assert!((j - (1.0 - 1.0 / 3.0)).abs() < 1e-6);
        assert_eq!(DistanceMetric::Jaccard.distance(&[0.0], &[0.0]), 0.0);
    }

    #[test]
    fn test_sparse_jaccard_sets() {
        let d = DistanceMetric::SparseJaccard.distance(&[1.0, 2.0, 3.0, 0.0], &[2.0, 3.0, 4.0, 0.0]);
        assert!((d - 0.5).abs() < 1e-6, "got {d}");
        let same = DistanceMetric::SparseJaccard.distance(&[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(same, 0.0);
    }

    #[test]
    fn test_poincare() {
        let origin = [0.0, 0.0];
        assert_eq!(DistanceMetric::Poincare.distance(&origin, &origin), 0.0);
        let p = [0.5, 0.0];
        let d = DistanceMetric::Poincare.distance(&origin, &p);
        // arcosh(1 + 2*0.25/0.75) = 2*artanh(0.5)
        assert!((d - 2.0 * 0.5f32.atanh()).abs() < 1e-5, "got {d}");
        assert_eq!(DistanceMetric::Poincare.distance(&origin, &[1.0, 0.0]), f32::MAX);
    }

    #[test]
    fn test_lorentz_self_is_zero() {
        // point on the hyperboloid: x0 = sqrt(1 + x1²)
        let p = [2.0f32.sqrt(), 1.0];
        let d = DistanceMetric::Lorentz.distance(&p, &p);
        assert!(d.abs() < 1e-3, "got {d}");
    }

    #[test]
    fn test_kernel_reads_other_encodings() {
        let query = [1.0, 2.0, 3.0];
        let half: Vec<f16> = query.iter().map(|&x| f16::from_f32(x)).collect();
        let bytes: Vec<u8> = vec![1, 2, 3];
        assert_eq!(DistanceMetric::L2.kernel::<f16>()(&query, &half), 0.0);
        assert_eq!(DistanceMetric::L2.kernel::<u8>()(&query, &bytes), 0.0);
    }

    #[test]
    fn test_codes_and_names_round_trip() {
        for m in DistanceMetric::ALL {
            assert_eq!(DistanceMetric::try_from(m.code()).unwrap(), m);
            assert_eq!(m.name().parse::<DistanceMetric>().unwrap(), m);
        }
        assert!(DistanceMetric::try_from(-1).is_err());
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
