//! Similarity kernel: cosine, dot product and (negated) Euclidean distance.
//!
//! All three functions share the same invalid-input contract: a zero
//! dimension or mismatched slice lengths yields `0.0` rather than panicking,
//! matching the defensive style of the rest of the engine's hot path. The
//! HNSW graph and the brute-force fallback both assume "higher is more
//! similar", so Euclidean distance is negated here rather than left as a
//! plain positive magnitude.

use serde::{Deserialize, Serialize};

/// Distance/similarity metric used to compare vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum DistanceMetric {
    /// Cosine similarity. Range `[-1, 1]`, higher is more similar.
    Cosine = 0,
    /// Raw dot product. Unbounded, higher is more similar.
    DotProduct = 1,
    /// Negated Euclidean (L2) distance. `<= 0`, higher (closer to zero) is
    /// more similar.
    Euclidean = 2,
}

impl DistanceMetric {
    /// Decodes a metric from its on-disk wire value.
    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Cosine),
            1 => Some(Self::DotProduct),
            2 => Some(Self::Euclidean),
            _ => None,
        }
    }

    /// Encodes this metric to its on-disk wire value.
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        self as u32
    }

    /// Computes the similarity score between `a` and `b` under this metric.
    ///
    /// Returns `0.0` if either slice is empty or the lengths differ, instead
    /// of panicking: callers on the hot insert/search path already validate
    /// dimension elsewhere, and this keeps the kernel itself infallible.
    #[must_use]
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || b.is_empty() || a.len() != b.len() {
            return 0.0;
        }

        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::DotProduct => dot_product(a, b),
            Self::Euclidean => -euclidean_distance(a, b),
        }
    }
}

/// Cosine similarity between `a` and `b`. Returns `0.0` if either vector's
/// norm is below `f32::EPSILON` (degenerate near-zero vector).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    norm_a = norm_a.sqrt();
    norm_b = norm_b.sqrt();

    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Dot product between `a` and `b`.
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean (L2) distance between `a` and `b`. Always `>= 0.0`.
#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// L2 norm of `vector`.
#[must_use]
pub fn vector_norm(vector: &[f32]) -> f32 {
    if vector.is_empty() {
        return 0.0;
    }
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalizes `vector` to unit length in place. A no-op on a zero (or
/// near-zero) vector, since it cannot be normalized.
pub fn normalize_vector(vector: &mut [f32]) {
    if vector.is_empty() {
        return;
    }
    let norm = vector_norm(vector);
    if norm < f32::EPSILON {
        return;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let a = [1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_returns_zero() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn euclidean_distance_matches_pythagorean_triple() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn euclidean_metric_is_negated_for_max_heap_convention() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        let sim = DistanceMetric::Euclidean.similarity(&a, &b);
        assert!((sim + 5.0).abs() < 1e-6);
        assert!(sim <= 0.0);
    }

    #[test]
    fn dot_product_matches_manual_computation() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_input_returns_zero_not_panic() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(dot_product(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(euclidean_distance(&[], &[1.0]), 0.0);
    }

    #[test]
    fn normalize_zero_vector_is_a_no_op() {
        let mut v = [0.0, 0.0, 0.0];
        normalize_vector(&mut v);
        assert_eq!(v, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let mut v = [3.0, 4.0];
        normalize_vector(&mut v);
        assert!((vector_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn wire_roundtrip() {
        for m in [
            DistanceMetric::Cosine,
            DistanceMetric::DotProduct,
            DistanceMetric::Euclidean,
        ] {
            assert_eq!(DistanceMetric::from_wire(m.to_wire()), Some(m));
        }
        assert_eq!(DistanceMetric::from_wire(99), None);
    }
}
